//! Query facade over the three registries
//!
//! `GovernanceAnalytics` wires the components together. Registries are optional
//! collaborators attached with the `with_*` builders; a query that needs one that
//! is missing fails with `RegistryUnavailable` instead of guessing. The only state
//! the engine owns is the delegation recorder and the snapshot log.

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::cycle::{DelegationLimits, DelegationValidator};
use crate::error::{AnalyticsError, Result};
use crate::health::{self, HealthScore};
use crate::power::PowerCalculator;
use crate::proposals::{read_window, ParticipationMetrics, ProposalAggregator, ProposalAnalytics};
use crate::recorder::{DelegationRecorder, Observation};
use crate::snapshot::{AnalyticsSnapshot, SnapshotContent, SnapshotLog};
use crate::timelock::{TimelockAggregator, TimelockAnalytics};
use crate::tree::DelegationTreeWalker;
use crate::types::{
    AccountDelegationStats, AccountRecord, ConcentrationEntry, DelegationCheck, DelegationWarning,
    DelegatorSubtree, SubtreePower,
};
use crate::voters::{VoterAnalyzer, VoterBehaviorReport};
use govscope_registry::{
    Address, ProposalRegistry, TimelockRegistry, TokenAmount, TokenRegistry,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Concentration entries kept in each snapshot
const SNAPSHOT_TOP_DELEGATES: usize = 5;

pub struct GovernanceAnalytics {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    token: Option<Arc<dyn TokenRegistry>>,
    proposals: Option<Arc<dyn ProposalRegistry>>,
    timelock: Option<Arc<dyn TimelockRegistry>>,
    recorder: DelegationRecorder,
    snapshots: SnapshotLog,
}

impl GovernanceAnalytics {
    pub fn new(config: EngineConfig) -> Self {
        info!(
            max_depth = config.max_depth,
            max_window = config.max_window,
            max_candidates = config.max_candidates,
            "🏛️ Governance analytics engine created"
        );
        Self {
            config,
            clock: Arc::new(SystemClock),
            token: None,
            proposals: None,
            timelock: None,
            recorder: DelegationRecorder::new(),
            snapshots: SnapshotLog::new(),
        }
    }

    /// Set token registry (balances and delegation edges)
    pub fn with_token_registry(mut self, registry: Arc<dyn TokenRegistry>) -> Self {
        self.token = Some(registry);
        self
    }

    /// Set proposal registry
    pub fn with_proposal_registry(mut self, registry: Arc<dyn ProposalRegistry>) -> Self {
        self.proposals = Some(registry);
        self
    }

    /// Set timelock registry
    pub fn with_timelock_registry(mut self, registry: Arc<dyn TimelockRegistry>) -> Self {
        self.timelock = Some(registry);
        self
    }

    /// Replace the wall clock, e.g. with a `FixedClock` for replays
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn recorder(&self) -> &DelegationRecorder {
        &self.recorder
    }

    pub fn snapshot_log(&self) -> &SnapshotLog {
        &self.snapshots
    }

    fn token(&self) -> Result<&Arc<dyn TokenRegistry>> {
        self.token
            .as_ref()
            .ok_or(AnalyticsError::RegistryUnavailable("token"))
    }

    fn proposals(&self) -> Result<&Arc<dyn ProposalRegistry>> {
        self.proposals
            .as_ref()
            .ok_or(AnalyticsError::RegistryUnavailable("proposal"))
    }

    fn timelock(&self) -> Result<&Arc<dyn TimelockRegistry>> {
        self.timelock
            .as_ref()
            .ok_or(AnalyticsError::RegistryUnavailable("timelock"))
    }

    fn validator(&self) -> Result<DelegationValidator> {
        let token = self.token()?.clone();
        let limits = DelegationLimits::resolve(&self.config, token.as_ref());
        Ok(DelegationValidator::new(token, limits))
    }

    fn walker(&self) -> Result<DelegationTreeWalker> {
        Ok(DelegationTreeWalker::new(
            self.token()?.clone(),
            self.config.max_subtree_nodes,
            self.config.loop_scan_max_hops,
        ))
    }

    fn aggregator(&self) -> Result<ProposalAggregator> {
        Ok(ProposalAggregator::new(
            self.proposals()?.clone(),
            self.token()?.clone(),
            self.config.clone(),
        ))
    }

    // ========== Delegation Integrity ==========

    pub fn validate_delegation(
        &self,
        delegator: &Address,
        delegatee: &Address,
    ) -> Result<DelegationCheck> {
        self.validator()?.validate(delegator, delegatee)
    }

    pub fn warning_level(&self, delegator: &Address, delegatee: &Address) -> Result<u8> {
        self.validator()?.warning_level(delegator, delegatee)
    }

    pub fn check_and_notify(
        &self,
        delegator: &Address,
        delegatee: &Address,
    ) -> Result<DelegationWarning> {
        self.validator()?.check_and_notify(delegator, delegatee)
    }

    pub fn forward_depth(&self, account: &Address) -> Result<u32> {
        Ok(self.validator()?.forward_depth(account))
    }

    pub fn backward_depth(&self, account: &Address) -> Result<u32> {
        self.validator()?.backward_depth(account)
    }

    pub fn resulting_depth(&self, delegator: &Address, delegatee: &Address) -> Result<u32> {
        self.validator()?.resulting_depth(delegator, delegatee)
    }

    pub fn detect_cycle(&self, delegator: &Address, delegatee: &Address) -> Result<bool> {
        self.validator()?.detect_cycle(delegator, delegatee)
    }

    // ========== Voting Power ==========

    /// Own balance plus direct delegators' balances (single hop)
    pub fn effective_power(&self, account: &Address) -> Result<TokenAmount> {
        PowerCalculator::new(self.token()?.clone()).effective_power(account)
    }

    /// Own balance plus every balance in the delegator subtree, to the depth limit
    pub fn subtree_power(&self, root: &Address) -> Result<SubtreePower> {
        let max_depth = self.validator()?.limits().max_depth;
        self.walker()?.subtree_power(root, max_depth)
    }

    pub fn account_delegation_stats(&self, account: &Address) -> Result<AccountDelegationStats> {
        PowerCalculator::new(self.token()?.clone()).account_stats(account)
    }

    // ========== Graph Walks ==========

    pub fn full_delegator_subtree(&self, root: &Address, max_depth: u32) -> Result<DelegatorSubtree> {
        Ok(self.walker()?.full_delegator_subtree(root, max_depth))
    }

    /// Audit the forward chain of every recorded account for a loop
    pub fn detect_global_loops(&self) -> Result<Option<Vec<Address>>> {
        let roots = self.recorder.known_accounts();
        Ok(self.walker()?.detect_global_loops(roots))
    }

    // ========== Recorder ==========

    /// Record an observed delegation. Null or self clears it.
    ///
    /// Voting power and chain depth are read fresh from the token registry.
    pub fn record_delegation(&self, delegator: &Address, delegatee: &Address) -> Result<AccountRecord> {
        let validator = self.validator()?;
        let voting_power = self.token()?.balance_of(delegator)?;

        let clears = delegatee.is_null() || delegatee == delegator;
        let chain_depth = if clears {
            0
        } else {
            1 + validator.forward_depth(delegatee)
        };

        Ok(self.recorder.record(Observation {
            delegator: *delegator,
            delegatee: *delegatee,
            voting_power,
            chain_depth,
            observed_at: self.clock.now(),
        }))
    }

    pub fn top_delegate_concentration(&self, n: usize) -> Result<Vec<ConcentrationEntry>> {
        let total_supply = self.token()?.total_supply()?;
        Ok(self.recorder.top_delegate_concentration(n, total_supply))
    }

    // ========== Windowed Analytics ==========

    pub fn aggregate_proposals(&self, start_id: u64, end_id: u64) -> Result<ProposalAnalytics> {
        self.aggregator()?
            .aggregate(start_id, end_id, self.clock.now())
    }

    pub fn participation_metrics(&self, start_id: u64, end_id: u64) -> Result<ParticipationMetrics> {
        self.aggregator()?.participation(start_id, end_id)
    }

    pub fn analyze_voters(&self, start_id: u64, end_id: u64) -> Result<VoterBehaviorReport> {
        let proposals = self.proposals()?.clone();
        let token = self.token()?.clone();
        let window = read_window(proposals.as_ref(), &self.config, start_id, end_id)?;

        let fallback_top = self.top_share_from_recorder(&token).map(|e| e.delegate);
        let analyzer = VoterAnalyzer::new(proposals, token, self.config.max_candidates);
        Ok(analyzer.analyze(start_id, end_id, &window, fallback_top))
    }

    pub fn timelock_analytics(&self, start_id: u64, end_id: u64) -> Result<TimelockAnalytics> {
        let timelock = self.timelock()?.clone();
        let window = read_window(self.proposals()?.as_ref(), &self.config, start_id, end_id)?;
        Ok(TimelockAggregator::new(timelock).aggregate(start_id, end_id, &window, self.clock.now()))
    }

    pub fn health_score(&self, start_id: u64, end_id: u64) -> Result<HealthScore> {
        let proposals = self.aggregate_proposals(start_id, end_id)?;
        let timelock = self.timelock_analytics(start_id, end_id)?;
        Ok(health::score(&proposals, &timelock, self.top_delegate_share_bps()?))
    }

    /// Top delegate's share of supply: snapshot figures first, recorder second
    fn top_delegate_share_bps(&self) -> Result<u32> {
        let token = self.token()?;

        let from_snapshot = token
            .current_snapshot_id()
            .and_then(|id| token.snapshot_metrics(id));
        match from_snapshot {
            Ok(metrics) if metrics.top_delegate.is_some() => {
                return Ok(metrics.top_delegate_amount.share_bps(metrics.total_supply));
            }
            Ok(_) => debug!("Snapshot names no top delegate, using recorder"),
            Err(e) => debug!(error = %e, "Snapshot metrics unavailable, using recorder"),
        }

        Ok(self
            .top_share_from_recorder(token)
            .map(|entry| entry.share_bps)
            .unwrap_or(0))
    }

    fn top_share_from_recorder(&self, token: &Arc<dyn TokenRegistry>) -> Option<ConcentrationEntry> {
        let supply = token.total_supply().unwrap_or(TokenAmount::ZERO);
        self.recorder
            .top_delegate_concentration(1, supply)
            .into_iter()
            .next()
    }

    // ========== Snapshot Log ==========

    /// Compute every window analytic, seal it and append it to the log
    pub fn capture_snapshot(&self, start_id: u64, end_id: u64) -> Result<AnalyticsSnapshot> {
        let proposals = self.aggregate_proposals(start_id, end_id)?;
        let timelock = self.timelock_analytics(start_id, end_id)?;
        let health = health::score(&proposals, &timelock, self.top_delegate_share_bps()?);
        let top_concentration = self.top_delegate_concentration(SNAPSHOT_TOP_DELEGATES)?;

        self.snapshots.append(SnapshotContent {
            sequence: 0,
            captured_at: self.clock.now(),
            start_id,
            end_id,
            proposals,
            timelock,
            health,
            top_concentration,
        })
    }

    pub fn snapshots(&self) -> Vec<AnalyticsSnapshot> {
        self.snapshots.snapshots()
    }
}
