//! Append-only record of what a run has deployed.

use std::collections::HashMap;

use alloy_core::primitives::{Address, B256};
use derive_more::Deref;
use serde::{Deserialize, Serialize};

use crate::DeployError;

/// Per-target progress through a run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TargetState {
    #[default]
    Unstarted,
    Submitting,
    Confirmed,
    Failed,
}

/// Confirmation status of a submitted deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Failed,
}

/// A contract whose deployment transaction was accepted by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    pub name: String,
    pub address: Address,
    pub status: ConfirmationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
}

/// Ordered log of the deployments of one run.
///
/// Records are only appended. A record moves from pending to confirmed or failed exactly
/// once, and a confirmed address never changes.
#[derive(Debug, Clone, Default, Deref)]
pub struct DeploymentLog {
    #[deref]
    contracts: Vec<DeployedContract>,
    states: HashMap<String, TargetState>,
}

impl DeploymentLog {
    pub fn state(&self, name: &str) -> TargetState {
        self.states.get(name).copied().unwrap_or_default()
    }

    /// Address of `name`, only once it is confirmed.
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.confirmed()
            .find(|contract| contract.name == name)
            .map(|contract| contract.address)
    }

    /// Confirmed contracts in deployment order.
    pub fn confirmed(&self) -> impl Iterator<Item = &DeployedContract> {
        self.contracts
            .iter()
            .filter(|contract| contract.status == ConfirmationStatus::Confirmed)
    }

    /// `Unstarted -> Submitting`.
    pub fn begin(&mut self, name: &str) -> Result<(), DeployError> {
        self.transition(name, TargetState::Unstarted, TargetState::Submitting)
    }

    /// Record the pending deployment returned by the provider.
    pub fn record_pending(
        &mut self,
        name: &str,
        address: Address,
        tx_hash: Option<B256>,
    ) -> Result<(), DeployError> {
        self.expect_state(name, TargetState::Submitting)?;
        if self.contracts.iter().any(|contract| contract.name == name) {
            return Err(DeployError::Ledger(format!("{name} already has a pending record")));
        }

        self.contracts.push(DeployedContract {
            name: name.to_string(),
            address,
            status: ConfirmationStatus::Pending,
            tx_hash,
        });
        Ok(())
    }

    /// `Submitting -> Confirmed`, fixing the record's address to the confirmed one.
    pub fn confirm(
        &mut self,
        name: &str,
        address: Address,
    ) -> Result<&DeployedContract, DeployError> {
        self.expect_state(name, TargetState::Submitting)?;
        let index = self
            .pending_index(name)
            .ok_or_else(|| DeployError::Ledger(format!("{name} has no pending record")))?;
        self.transition(name, TargetState::Submitting, TargetState::Confirmed)?;

        let contract = &mut self.contracts[index];
        if contract.address != address {
            tracing::warn!(
                name = %name,
                predicted = %contract.address,
                confirmed = %address,
                "Confirmed address differs from the predicted one"
            );
        }
        contract.address = address;
        contract.status = ConfirmationStatus::Confirmed;
        Ok(&self.contracts[index])
    }

    /// `Submitting -> Failed`. A pending record, if any, is marked failed.
    pub fn fail(&mut self, name: &str) -> Result<(), DeployError> {
        self.transition(name, TargetState::Submitting, TargetState::Failed)?;
        if let Some(index) = self.pending_index(name) {
            self.contracts[index].status = ConfirmationStatus::Failed;
        }
        Ok(())
    }

    fn pending_index(&self, name: &str) -> Option<usize> {
        self.contracts.iter().position(|contract| {
            contract.name == name && contract.status == ConfirmationStatus::Pending
        })
    }

    fn expect_state(&self, name: &str, expected: TargetState) -> Result<(), DeployError> {
        let current = self.state(name);
        if current != expected {
            return Err(DeployError::Ledger(format!(
                "{name} is {current}, expected {expected}"
            )));
        }
        Ok(())
    }

    fn transition(
        &mut self,
        name: &str,
        from: TargetState,
        to: TargetState,
    ) -> Result<(), DeployError> {
        self.expect_state(name, from)?;
        tracing::debug!(name = %name, from = %from, to = %to, "Target state transition");
        self.states.insert(name.to_string(), to);
        Ok(())
    }
}
