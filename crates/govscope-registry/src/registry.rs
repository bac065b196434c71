//! Read interfaces into the externally-owned registries.
//!
//! Implementations may be backed by anything (a chain client, a database, the
//! in-memory registries in [`crate::memory`]). Each call is a single round trip;
//! callers must expect state to move between calls.

use crate::error::Result;
use crate::types::{
    Address, GovernanceParameters, ProposalRecord, ProposalState, SnapshotMetrics, ThreatLevel,
    TimelockTransaction, TokenAmount, TxHash,
};

/// Balances, delegation edges and supply snapshots
pub trait TokenRegistry: Send + Sync {
    fn balance_of(&self, account: &Address) -> Result<TokenAmount>;

    /// Current delegate of `account`; `None` when self-delegated
    fn delegate_of(&self, account: &Address) -> Result<Option<Address>>;

    /// Accounts whose delegate is currently `account`
    fn delegators_of(&self, account: &Address) -> Result<Vec<Address>>;

    fn total_supply(&self) -> Result<TokenAmount>;

    fn current_snapshot_id(&self) -> Result<u64>;

    fn snapshot_metrics(&self, snapshot_id: u64) -> Result<SnapshotMetrics>;

    /// Registry-side depth limit; 0 means "not configured"
    fn max_delegation_depth(&self) -> Result<u32>;
}

/// Proposal records and per-voter weights
pub trait ProposalRegistry: Send + Sync {
    /// Fails with `NotFound` for ids that do not exist
    fn proposal_state(&self, id: u64) -> Result<ProposalState>;

    fn proposal(&self, id: u64) -> Result<ProposalRecord>;

    /// Weight recorded for `voter` on proposal `id`; zero when the voter has not voted
    fn voter_weight(&self, id: u64, voter: &Address) -> Result<TokenAmount>;

    fn governance_parameters(&self) -> Result<GovernanceParameters>;
}

/// Delayed-execution transactions and their threat classification
pub trait TimelockRegistry: Send + Sync {
    fn transaction(&self, hash: &TxHash) -> Result<TimelockTransaction>;

    fn is_queued(&self, hash: &TxHash) -> Result<bool>;

    fn threat_level(&self, target: &Address, payload: &[u8]) -> Result<ThreatLevel>;

    /// Configured minimum delay in seconds for a threat level
    fn delay_for(&self, level: ThreatLevel) -> Result<u64>;

    /// Window after eta during which a queued transaction stays executable
    fn grace_period(&self) -> Result<u64>;
}
