//! Deployment targets and the ordered plan that wires them together.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    str::FromStr,
};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{
        Address, U256,
        utils::format_ether,
    },
};
use derive_more::Deref;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{DeployError, DeploymentLog};

/// Name of the marketplace facade contract.
pub const MARKETPLACE_CONTRACT: &str = "FakeNFTMarketplace";

/// Name of the DAO contract.
pub const DAO_CONTRACT: &str = "CryptoDevsDAO";

/// Key of the pre-existing NFT collection address in the `constants` table.
pub const NFT_CONSTANT_KEY: &str = "crypto_devs_nft";

/// Number of decimals of the chain's base unit.
const ETHER_DECIMALS: usize = 18;

/// Wei in one ether.
pub const WEI_PER_ETHER: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// A single constructor argument of a deployment target.
///
/// In TOML: `{ kind = "target", value = "FakeNFTMarketplace" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ConstructorArg {
    /// Address of an earlier target of the same plan.
    Target(String),
    /// Address looked up in the `constants` table.
    Constant(String),
    Address(Address),
    Uint(U256),
    Bool(bool),
    String(String),
}

impl ConstructorArg {
    /// Resolve the argument to an ABI value.
    ///
    /// A `Target` reference only resolves once that target is confirmed in `log`.
    pub fn resolve(
        &self,
        log: &DeploymentLog,
        constants: &BTreeMap<String, Address>,
    ) -> Result<DynSolValue, DeployError> {
        let value = match self {
            Self::Target(name) => {
                let address = log.address_of(name).ok_or_else(|| {
                    DeployError::Ledger(format!(
                        "{name} is referenced before it was confirmed (state: {})",
                        log.state(name)
                    ))
                })?;
                DynSolValue::Address(address)
            }
            Self::Constant(key) => {
                let address = constants
                    .get(key)
                    .ok_or_else(|| DeployError::ConfigurationMissing(format!("constants.{key}")))?;
                DynSolValue::Address(*address)
            }
            Self::Address(address) => DynSolValue::Address(*address),
            Self::Uint(value) => DynSolValue::Uint(*value, 256),
            Self::Bool(value) => DynSolValue::Bool(*value),
            Self::String(value) => DynSolValue::String(value.clone()),
        };
        Ok(value)
    }
}

/// Value attached to a deployment transaction, held in wei.
///
/// Deserializes from a decimal ether string or a bare number, so `dao_funding = 1` and
/// `DAPPLOY_DAO_FUNDING=0.5` parse the same way as their quoted forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct FundingAmount(U256);

impl FundingAmount {
    /// One ether.
    pub const ONE_ETHER: Self = Self(WEI_PER_ETHER);

    /// Parse a decimal amount of whole ether (`"1"`, `"0.25"`) into wei without rounding.
    pub fn from_ether(amount: &str) -> Result<Self, DeployError> {
        let amount = amount.trim();
        let invalid = |reason: &str| {
            DeployError::InvalidPlan(format!("invalid funding amount '{amount}': {reason}"))
        };

        let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("empty"));
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected a non-negative decimal number"));
        }
        if fraction.len() > ETHER_DECIMALS {
            return Err(invalid("more than 18 decimal places"));
        }

        let overflow = || invalid("amount overflows 256 bits");
        let whole = match whole {
            "" => U256::ZERO,
            digits => U256::from_str_radix(digits, 10).map_err(|_| overflow())?,
        };
        // Right-pad to exactly 18 digits, which always fits in 64 bits.
        let fraction = format!("{fraction:0<width$}", width = ETHER_DECIMALS);
        let fraction = U256::from_str_radix(&fraction, 10).map_err(|_| overflow())?;

        whole
            .checked_mul(WEI_PER_ETHER)
            .and_then(|wei| wei.checked_add(fraction))
            .map(Self)
            .ok_or_else(overflow)
    }

    pub fn from_wei(wei: U256) -> Self {
        Self(wei)
    }

    pub fn wei(&self) -> U256 {
        self.0
    }
}

impl FromStr for FundingAmount {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_ether(s)
    }
}

impl<'de> Deserialize<'de> for FundingAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Whole(u64),
            Decimal(f64),
        }

        let amount = match Repr::deserialize(deserializer)? {
            Repr::Text(amount) => amount,
            Repr::Whole(amount) => amount.to_string(),
            Repr::Decimal(amount) => amount.to_string(),
        };
        Self::from_ether(&amount).map_err(serde::de::Error::custom)
    }
}

impl From<FundingAmount> for String {
    fn from(value: FundingAmount) -> Self {
        format_ether(value.0)
    }
}

impl fmt::Display for FundingAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} wei", self.0)
    }
}

/// A contract to deploy, with the inputs its constructor needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentTarget {
    /// Contract name, used to resolve the compiled artifact.
    pub name: String,
    /// Constructor arguments, ABI-encoded in this order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ConstructorArg>,
    /// Value sent with the deployment transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding: Option<FundingAmount>,
}

impl DeploymentTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            funding: None,
        }
    }

    pub fn arg(mut self, arg: ConstructorArg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn funding(mut self, funding: FundingAmount) -> Self {
        self.funding = Some(funding);
        self
    }

    /// Names of the plan targets this one depends on.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(|arg| match arg {
            ConstructorArg::Target(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

/// Ordered list of targets. A target's position is its index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentPlan(Vec<DeploymentTarget>);

impl DeploymentPlan {
    pub fn new(targets: Vec<DeploymentTarget>) -> Self {
        Self(targets)
    }

    /// The marketplace, then the DAO wired to the marketplace, the NFT collection and `funding`.
    pub fn marketplace_dao(funding: FundingAmount) -> Self {
        Self(vec![
            DeploymentTarget::new(MARKETPLACE_CONTRACT),
            DeploymentTarget::new(DAO_CONTRACT)
                .arg(ConstructorArg::Target(MARKETPLACE_CONTRACT.to_string()))
                .arg(ConstructorArg::Constant(NFT_CONSTANT_KEY.to_string()))
                .funding(funding),
        ])
    }

    /// Position of the named target in the plan.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|t| t.name == name)
    }

    /// Check the plan can run against `constants` without submitting anything.
    ///
    /// Every target reference must point at an earlier target, and every constant must be set.
    pub fn validate(&self, constants: &BTreeMap<String, Address>) -> Result<(), DeployError> {
        if self.0.is_empty() {
            return Err(DeployError::InvalidPlan("the plan has no targets".to_string()));
        }

        let mut positions = HashMap::with_capacity(self.0.len());
        for (position, target) in self.0.iter().enumerate() {
            if target.name.trim().is_empty() {
                return Err(DeployError::InvalidPlan(format!(
                    "target at position {position} has an empty name"
                )));
            }
            if positions.insert(target.name.as_str(), position).is_some() {
                return Err(DeployError::InvalidPlan(format!(
                    "target {} appears more than once",
                    target.name
                )));
            }
        }

        for (position, target) in self.0.iter().enumerate() {
            for dependency in target.dependencies() {
                match positions.get(dependency) {
                    Some(&dep_position) if dep_position < position => {}
                    Some(_) => {
                        return Err(DeployError::InvalidPlan(format!(
                            "{} depends on {dependency}, which is deployed after it",
                            target.name
                        )));
                    }
                    None => {
                        return Err(DeployError::InvalidPlan(format!(
                            "{} depends on unknown target {dependency}",
                            target.name
                        )));
                    }
                }
            }

            let missing = target.args.iter().find_map(|arg| match arg {
                ConstructorArg::Constant(key) if !constants.contains_key(key) => Some(key),
                _ => None,
            });
            if let Some(key) = missing {
                return Err(DeployError::ConfigurationMissing(format!("constants.{key}")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::address;

    const NFT: Address = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");

    fn constants() -> BTreeMap<String, Address> {
        BTreeMap::from([(NFT_CONSTANT_KEY.to_string(), NFT)])
    }

    #[test]
    fn test_one_ether_is_exactly_ten_to_the_eighteen_wei() {
        let funding = FundingAmount::from_ether("1").unwrap();
        assert_eq!(funding.wei(), U256::from(10u64).pow(U256::from(18u64)));
    }

    #[test]
    fn test_fractional_funding_is_exact() {
        assert_eq!(
            FundingAmount::from_ether("0.000000000000000001").unwrap().wei(),
            U256::from(1u64)
        );
        assert_eq!(
            FundingAmount::from_ether("2.5").unwrap().wei(),
            U256::from(2_500_000_000_000_000_000u128)
        );
    }

    #[test]
    fn test_invalid_funding_is_rejected() {
        assert!(FundingAmount::from_ether("").is_err());
        assert!(FundingAmount::from_ether("-1").is_err());
        assert!(FundingAmount::from_ether("one").is_err());
        assert!(FundingAmount::from_ether("1.2.3").is_err());
        assert!(FundingAmount::from_ether("0.0000000000000000001").is_err());
        assert!(FundingAmount::from_ether(".").is_err());
        assert!(FundingAmount::from_ether("1e3").is_err());
    }

    #[test]
    fn test_oversized_funding_is_rejected_instead_of_wrapping() {
        let nines = "9".repeat(77);
        assert!(matches!(
            FundingAmount::from_ether(&nines),
            Err(DeployError::InvalidPlan(reason)) if reason.contains("overflows")
        ));
        // Largest whole amount that still fits once scaled to wei.
        let max_ether = (U256::MAX / WEI_PER_ETHER).to_string();
        let over_ether = (U256::MAX / WEI_PER_ETHER + U256::from(1u64)).to_string();
        assert_eq!(
            FundingAmount::from_ether(&max_ether).unwrap().wei(),
            U256::MAX / WEI_PER_ETHER * WEI_PER_ETHER
        );
        assert!(FundingAmount::from_ether(&over_ether).is_err());
    }

    #[test]
    fn test_large_funding_is_exact() {
        assert_eq!(
            FundingAmount::from_ether("1000000000000000000000000000000").unwrap().wei(),
            U256::from(10u64).pow(U256::from(48u64))
        );
    }

    #[test]
    fn test_funding_deserializes_from_numbers_and_strings() {
        let parse = |value: serde_json::Value| serde_json::from_value::<FundingAmount>(value);

        assert_eq!(parse(serde_json::json!(1)).unwrap(), FundingAmount::ONE_ETHER);
        assert_eq!(parse(serde_json::json!("1")).unwrap(), FundingAmount::ONE_ETHER);
        assert_eq!(
            parse(serde_json::json!(0.5)).unwrap().wei(),
            U256::from(500_000_000_000_000_000u64)
        );
        assert!(parse(serde_json::json!(-1)).is_err());
        assert!(parse(serde_json::json!("abc")).is_err());
    }

    #[test]
    fn test_marketplace_dao_plan_order_and_wiring() {
        let plan = DeploymentPlan::marketplace_dao(FundingAmount::from_ether("1").unwrap());

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].name, MARKETPLACE_CONTRACT);
        assert!(plan[0].args.is_empty());
        assert!(plan[0].funding.is_none());

        assert_eq!(plan[1].name, DAO_CONTRACT);
        assert_eq!(
            plan[1].args,
            vec![
                ConstructorArg::Target(MARKETPLACE_CONTRACT.to_string()),
                ConstructorArg::Constant(NFT_CONSTANT_KEY.to_string()),
            ]
        );
        assert_eq!(
            plan[1].funding.map(|f| f.wei()),
            Some(U256::from(1_000_000_000_000_000_000u128))
        );
        assert!(plan.validate(&constants()).is_ok());
    }

    #[test]
    fn test_validate_requires_constants() {
        let plan = DeploymentPlan::marketplace_dao(FundingAmount::from_ether("1").unwrap());
        let err = plan.validate(&BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            DeployError::ConfigurationMissing(key) if key == "constants.crypto_devs_nft"
        ));
    }

    #[test]
    fn test_validate_rejects_forward_references() {
        let plan = DeploymentPlan::new(vec![
            DeploymentTarget::new("B").arg(ConstructorArg::Target("A".to_string())),
            DeploymentTarget::new("A"),
        ]);
        assert!(matches!(plan.validate(&constants()), Err(DeployError::InvalidPlan(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_and_self_references() {
        let unknown = DeploymentPlan::new(vec![
            DeploymentTarget::new("A").arg(ConstructorArg::Target("Z".to_string())),
        ]);
        assert!(matches!(unknown.validate(&constants()), Err(DeployError::InvalidPlan(_))));

        let cyclic = DeploymentPlan::new(vec![
            DeploymentTarget::new("A").arg(ConstructorArg::Target("A".to_string())),
        ]);
        assert!(matches!(cyclic.validate(&constants()), Err(DeployError::InvalidPlan(_))));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_empty_plans() {
        let duplicate =
            DeploymentPlan::new(vec![DeploymentTarget::new("A"), DeploymentTarget::new("A")]);
        assert!(matches!(duplicate.validate(&constants()), Err(DeployError::InvalidPlan(_))));
        assert!(matches!(
            DeploymentPlan::default().validate(&constants()),
            Err(DeployError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_target_reference_needs_confirmation() {
        let log = DeploymentLog::default();
        let err = ConstructorArg::Target(MARKETPLACE_CONTRACT.to_string())
            .resolve(&log, &constants())
            .unwrap_err();
        assert!(matches!(err, DeployError::Ledger(_)));

        let value = ConstructorArg::Constant(NFT_CONSTANT_KEY.to_string())
            .resolve(&log, &constants())
            .unwrap();
        assert_eq!(value, DynSolValue::Address(NFT));
    }

    #[test]
    fn test_plan_parses_from_toml() {
        let toml = r#"
            [[targets]]
            name = "Token"

            [[targets]]
            name = "Vault"
            funding = "0.5"
            args = [
                { kind = "target", value = "Token" },
                { kind = "bool", value = true },
                { kind = "string", value = "vault" },
            ]
        "#;

        #[derive(Deserialize)]
        struct Wrapper {
            targets: DeploymentPlan,
        }

        let plan = toml::from_str::<Wrapper>(toml).unwrap().targets;
        assert_eq!(plan.position("Vault"), Some(1));
        assert_eq!(plan[1].dependencies().collect::<Vec<_>>(), vec!["Token"]);
        assert_eq!(
            plan[1].funding.map(|f| f.wei()),
            Some(U256::from(500_000_000_000_000_000u128))
        );
        assert!(plan.validate(&BTreeMap::new()).is_ok());
    }
}
