//! Compiled contract artifacts on disk.
//!
//! Hardhat writes `artifacts/contracts/<File>.sol/<Name>.json` with a hex `bytecode` string;
//! Foundry writes `out/<File>.sol/<Name>.json` with `bytecode.object`. Both are accepted.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde::Deserialize;

/// Directory holding Hardhat build metadata, never contract artifacts.
const BUILD_INFO_DIR: &str = "build-info";

/// Creation bytecode of a compiled contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub contract_name: String,
    pub path: PathBuf,
    pub bytecode: Bytes,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Hardhat(Bytes),
    Foundry { object: Bytes },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    #[serde(default)]
    contract_name: Option<String>,
    bytecode: BytecodeField,
}

/// Looks up artifacts by contract name below a root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the artifact of `name`, failing if it is missing or has no creation code.
    pub fn load(&self, name: &str) -> Result<Artifact> {
        let path = self.find(name)?.with_context(|| {
            format!(
                "No artifact for contract {} under {}",
                name,
                self.root.display()
            )
        })?;

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let raw: RawArtifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        if let Some(contract_name) = raw.contract_name.as_deref().filter(|n| *n != name) {
            anyhow::bail!(
                "Artifact {} describes {} instead of {}",
                path.display(),
                contract_name,
                name
            );
        }

        let bytecode = match raw.bytecode {
            BytecodeField::Hardhat(bytes) | BytecodeField::Foundry { object: bytes } => bytes,
        };
        if bytecode.is_empty() {
            anyhow::bail!(
                "Artifact {} has no creation bytecode (interface or abstract contract?)",
                path.display()
            );
        }

        tracing::debug!(
            name = %name,
            path = %path.display(),
            size = bytecode.len(),
            "Artifact loaded"
        );

        Ok(Artifact {
            contract_name: name.to_string(),
            path,
            bytecode,
        })
    }

    /// Find `<name>.json` below the root.
    ///
    /// Returns an error if the same contract name appears in more than one source file.
    pub fn find(&self, name: &str) -> Result<Option<PathBuf>> {
        if !self.root.is_dir() {
            anyhow::bail!("Artifacts directory not found: {}", self.root.display());
        }

        let file_name = format!("{name}.json");
        let mut matches = Vec::new();
        Self::collect(&self.root, &file_name, &mut matches)?;

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => {
                matches.sort();
                anyhow::bail!(
                    "Contract name {} is ambiguous: {}",
                    name,
                    matches
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        }
    }

    fn collect(dir: &Path, file_name: &str, matches: &mut Vec<PathBuf>) -> Result<()> {
        let entries =
            std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
            let path = entry.path();

            if path.is_dir() {
                if entry.file_name() != BUILD_INFO_DIR {
                    Self::collect(&path, file_name, matches)?;
                }
            } else if entry.file_name() == file_name {
                matches.push(path);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_hardhat_artifact() {
        let dir = TempDir::new("artifacts").unwrap();
        write(
            dir.path(),
            "contracts/FakeNFTMarketplace.sol/FakeNFTMarketplace.json",
            r#"{"contractName":"FakeNFTMarketplace","bytecode":"0x6080604052","abi":[]}"#,
        );
        write(
            dir.path(),
            "contracts/FakeNFTMarketplace.sol/FakeNFTMarketplace.dbg.json",
            r#"{"buildInfo":"../../build-info/abc.json"}"#,
        );

        let artifact = ArtifactStore::new(dir.path()).load("FakeNFTMarketplace").unwrap();
        assert_eq!(artifact.bytecode, Bytes::from(vec![0x60, 0x80, 0x60, 0x40, 0x52]));
    }

    #[test]
    fn test_load_foundry_artifact() {
        let dir = TempDir::new("out").unwrap();
        write(
            dir.path(),
            "CryptoDevsDAO.sol/CryptoDevsDAO.json",
            r#"{"abi":[],"bytecode":{"object":"0x6001","linkReferences":{}}}"#,
        );

        let artifact = ArtifactStore::new(dir.path()).load("CryptoDevsDAO").unwrap();
        assert_eq!(artifact.bytecode.len(), 2);
    }

    #[test]
    fn test_missing_and_empty_artifacts_fail() {
        let dir = TempDir::new("artifacts").unwrap();
        write(
            dir.path(),
            "contracts/IFakeNFTMarketplace.sol/IFakeNFTMarketplace.json",
            r#"{"contractName":"IFakeNFTMarketplace","bytecode":"0x"}"#,
        );
        let store = ArtifactStore::new(dir.path());

        assert!(store.load("CryptoDevsDAO").is_err());
        assert!(store.load("IFakeNFTMarketplace").is_err());
        assert!(ArtifactStore::new(dir.path().join("nope")).load("CryptoDevsDAO").is_err());
    }

    #[test]
    fn test_build_info_is_skipped_and_duplicates_are_ambiguous() {
        let dir = TempDir::new("artifacts").unwrap();
        write(dir.path(), "build-info/Token.json", r#"{"bytecode":"0x01"}"#);
        write(dir.path(), "contracts/A.sol/Token.json", r#"{"bytecode":"0x02"}"#);

        let store = ArtifactStore::new(dir.path());
        assert_eq!(store.load("Token").unwrap().bytecode, Bytes::from(vec![0x02]));

        write(dir.path(), "contracts/B.sol/Token.json", r#"{"bytecode":"0x03"}"#);
        assert!(store.load("Token").is_err());
    }
}
