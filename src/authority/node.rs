//! Trusted node whitelist
//!
//! Manages the nodes allowed to lock accounts without stake and to earn
//! withdrawal and execution fees.

use crate::error::{CustodyError, Result};
use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whitelisted node
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node {
    pub address: Address,
    pub enabled: bool,
    /// Allowance units billed per proxy execution
    pub gas_allowance: u128,
    pub fee_numerator: u128,
    pub fee_denominator: u128,
}

impl Node {
    pub fn new(
        address: Address,
        enabled: bool,
        gas_allowance: u128,
        fee_numerator: u128,
        fee_denominator: u128,
    ) -> Self {
        Self {
            address,
            enabled,
            gas_allowance,
            fee_numerator,
            fee_denominator,
        }
    }

    /// Enabled nodes may lock without stake and earn fees
    pub fn is_active(&self) -> bool {
        self.enabled
    }
}

/// Node registry keyed by address
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<Address, Node>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.address) {
            return Err(CustodyError::NodeExists(node.address));
        }
        self.nodes.insert(node.address, node);
        Ok(())
    }

    pub fn update(&mut self, node: Node) -> Result<()> {
        let slot = self
            .nodes
            .get_mut(&node.address)
            .ok_or(CustodyError::UnknownNode(node.address))?;
        *slot = node;
        Ok(())
    }

    pub fn get(&self, address: &Address) -> Option<&Node> {
        self.nodes.get(address)
    }

    /// Check if address is an enabled node
    pub fn is_node(&self, address: &Address) -> bool {
        self.nodes
            .get(address)
            .map(|n| n.is_active())
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.nodes.values().filter(|n| n.is_active()).count()
    }
}
