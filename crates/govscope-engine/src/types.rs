use govscope_registry::{Address, TokenAmount};
use serde::{Deserialize, Serialize};

/// Why a proposed delegation edge was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelegationVerdict {
    /// Edge is acceptable
    None,
    /// Edge would close a loop or reconnect converging paths
    Cycle,
    /// Resulting chain would exceed the depth limit
    DepthExceeded,
}

/// Result of validating a proposed delegation edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationCheck {
    pub valid: bool,
    pub reason: DelegationVerdict,
    /// Depth of the longest chain through the new edge; 0 for self/null delegation
    pub resulting_depth: u32,
    pub max_depth: u32,
}

impl DelegationCheck {
    pub(crate) fn accepted(resulting_depth: u32, max_depth: u32) -> Self {
        Self {
            valid: true,
            reason: DelegationVerdict::None,
            resulting_depth,
            max_depth,
        }
    }

    pub(crate) fn rejected(reason: DelegationVerdict, resulting_depth: u32, max_depth: u32) -> Self {
        Self {
            valid: false,
            reason,
            resulting_depth,
            max_depth,
        }
    }
}

/// Outcome of the notifying delegation check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationWarning {
    /// 0 (fine) to 3 (must block)
    pub level: u8,
    pub check: DelegationCheck,
    /// Only level 3 blocks
    pub blocked: bool,
}

/// Per-account delegation statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDelegationStats {
    pub account: Address,
    pub delegate: Option<Address>,
    pub is_delegating: bool,
    pub delegator_count: usize,
    /// Sum of direct delegators' balances
    pub delegated_balance: TokenAmount,
    /// `delegated_balance` as basis points of total supply
    pub delegated_share_bps: u32,
}

/// Level-by-level listing of everyone delegating (directly or transitively) to a root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorSubtree {
    pub root: Address,
    /// `levels[0]` are direct delegators, `levels[1]` their delegators, ...
    pub levels: Vec<Vec<Address>>,
    pub total_nodes: usize,
    /// Walk stopped at the node cap before exhausting the subtree
    pub truncated: bool,
}

impl DelegatorSubtree {
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn members(&self) -> impl Iterator<Item = &Address> {
        self.levels.iter().flatten()
    }
}

/// Engine-owned observation of an account's delegation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account: Address,
    /// `None` when self-delegated
    pub delegate: Option<Address>,
    /// Balance at the time of the last observation
    pub voting_power: TokenAmount,
    pub chain_depth: u32,
    pub active: bool,
    pub first_seen: u64,
    pub last_updated: u64,
    pub observations: u64,
}

/// One row of the top-delegate concentration ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcentrationEntry {
    pub delegate: Address,
    pub delegated_power: TokenAmount,
    pub delegator_count: usize,
    pub share_bps: u32,
}

/// Root balance plus every balance in its delegator subtree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreePower {
    pub root: Address,
    pub total_power: TokenAmount,
    pub contributing_accounts: usize,
    /// Subtree walk hit the node cap, so `total_power` is a lower bound
    pub truncated: bool,
}
