/*!
# govscope registry accessors

Typed read interfaces into the three externally-owned registries the analytics
engine consumes:

- **TokenRegistry**: balances, delegation edges, supply snapshots
- **ProposalRegistry**: proposal records, voter weights, governance parameters
- **TimelockRegistry**: queued transactions, threat levels, configured delays

The engine never owns this state. It reads it through `Arc<dyn ...>` handles and
tolerates it changing between calls.

The [`memory`] module provides in-memory implementations for tests and for hosts
that mirror registry state locally.
*/

pub mod error;
pub mod memory;
pub mod registry;
pub mod types;

pub use error::{RegistryError, Result};
pub use memory::{MemoryProposalRegistry, MemoryTimelockRegistry, MemoryTokenRegistry};
pub use registry::{ProposalRegistry, TimelockRegistry, TokenRegistry};
pub use types::{
    ratio_bps, Address, GovernanceParameters, ProposalRecord, ProposalState, ProposalType,
    SnapshotMetrics, ThreatLevel, TimelockTransaction, TokenAmount, TxHash, VoteDirection,
    VoteTally, BPS_DENOMINATOR,
};
