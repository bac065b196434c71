/*!
# govscope analytics engine

Delegation integrity checks and governance analytics over externally-owned
token, proposal and timelock registries.

## Delegation integrity

- **Cycle detection**: a proposed edge is rejected if it closes a loop or reconnects
  two delegation paths that already converge (diamond pattern)
- **Depth limit**: `backward_depth(delegator) + 1 + forward_depth(delegatee)` must stay
  within `max_depth` (8 unless the token registry says otherwise)
- **Warning levels**: 0 (clear) to 3 (blocked), with tracing events and metrics for
  every level above 0
- **Complexity refusal**: neighbourhoods too large to analyse online yield
  `AnalyticsError::TooComplex` rather than a guess

## Analytics

- Single-hop and whole-subtree voting power
- Observed-delegation recorder with top-delegate concentration ranking
- Windowed proposal, participation, voter behaviour and timelock aggregation
- Composite health score (five sub-scores of 0-20)
- Append-only, blake3-sealed snapshot log

## Bounded work

Every walk is capped by [`EngineConfig`]: hop limit, subtree node cap, complexity
threshold, voter candidate cap and proposal window width. A registry read that fails
mid-walk ends that branch; it never aborts the query.

## Example

```rust
use govscope_engine::{EngineConfig, GovernanceAnalytics};
use govscope_registry::{Address, MemoryTokenRegistry, TokenAmount};
use std::sync::Arc;

let token = Arc::new(MemoryTokenRegistry::new());
let (a, b) = (Address::repeat(1), Address::repeat(2));
token.set_balance(a, TokenAmount::new(100));
token.set_delegate(b, a);

let engine = GovernanceAnalytics::new(EngineConfig::default()).with_token_registry(token);

// b -> a already exists, so a -> b would close a loop
let check = engine.validate_delegation(&a, &b).unwrap();
assert!(!check.valid);
assert_eq!(engine.warning_level(&a, &b).unwrap(), 3);
```
*/

pub mod clock;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod power;
pub mod proposals;
pub mod recorder;
pub mod snapshot;
pub mod timelock;
pub mod tree;
pub mod types;
pub mod voters;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EngineConfig, DEFAULT_MAX_DEPTH};
pub use cycle::{level_for_depth, DelegationLimits, DelegationValidator, BLOCKING_WARNING_LEVEL};
pub use engine::GovernanceAnalytics;
pub use error::{AnalyticsError, Result};
pub use health::{HealthScore, MAX_SUB_SCORE};
pub use logging::{init_logging, LoggingConfig};
pub use power::PowerCalculator;
pub use proposals::{ParticipationMetrics, ProposalAggregator, ProposalAnalytics, TypeStats};
pub use recorder::{DelegationRecorder, Observation};
pub use snapshot::{AnalyticsSnapshot, SnapshotContent, SnapshotLog};
pub use timelock::{LevelStats, TimelockAggregator, TimelockAnalytics, TimelockStatus};
pub use tree::DelegationTreeWalker;
pub use types::{
    AccountDelegationStats, AccountRecord, ConcentrationEntry, DelegationCheck, DelegationVerdict,
    DelegationWarning, DelegatorSubtree, SubtreePower,
};
pub use voters::{classify, VoterAnalyzer, VoterBehaviorReport, VoterClass, VoterProfile};
