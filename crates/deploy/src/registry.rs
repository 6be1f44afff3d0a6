//! In-memory record of the addresses produced by a deployment run.

use std::collections::BTreeMap;

use alloy_core::primitives::Address;

use crate::DeployError;

/// Append-only mapping from step name to deployed contract address.
///
/// Entries are immutable once assigned, and no two steps may share an address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployedRegistry {
    entries: BTreeMap<String, Address>,
    order: Vec<String>,
}

impl DeployedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the address of a step.
    pub fn insert(&mut self, step: impl Into<String>, address: Address) -> Result<(), DeployError> {
        let step = step.into();

        if address.is_zero() {
            return Err(DeployError::ZeroAddress(step));
        }
        if self.entries.contains_key(&step) {
            return Err(DeployError::AddressAlreadyRecorded(step));
        }
        if let Some((existing, _)) = self.entries.iter().find(|(_, a)| **a == address) {
            return Err(DeployError::DuplicateAddress {
                address,
                existing: existing.clone(),
            });
        }

        self.entries.insert(step.clone(), address);
        self.order.push(step);
        Ok(())
    }

    pub fn get(&self, step: &str) -> Option<Address> {
        self.entries.get(step).copied()
    }

    /// Look up the address of `dependency` on behalf of `required_by`.
    ///
    /// Fails with [`DeployError::MissingAddress`] instead of handing out a placeholder.
    pub fn require(&self, dependency: &str, required_by: &str) -> Result<Address, DeployError> {
        self.get(dependency)
            .ok_or_else(|| DeployError::MissingAddress {
                dependency: dependency.to_string(),
                required_by: required_by.to_string(),
            })
    }

    pub fn contains(&self, step: &str) -> bool {
        self.entries.contains_key(step)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Address)> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name).map(|a| (name.as_str(), *a)))
    }
}
