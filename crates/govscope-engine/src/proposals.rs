//! Windowed proposal aggregation
//!
//! Scans a capped id window once and derives per-state counts, per-type success
//! rates, lifetime, turnout and quorum figures. Ids the registry does not know are
//! skipped, as are proposals whose reads fail; neither aborts the scan.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::metrics;
use govscope_registry::{
    ratio_bps, Address, GovernanceParameters, ProposalRecord, ProposalRegistry, ProposalState,
    ProposalType, TokenAmount, TokenRegistry, BPS_DENOMINATOR,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Attempts and executions for one proposal type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStats {
    pub attempted: u64,
    pub executed: u64,
    /// `executed / attempted` in basis points; 0 when nothing was attempted
    pub success_rate_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalAnalytics {
    pub start_id: u64,
    pub end_id: u64,
    /// Proposals found in the window
    pub proposals: u64,
    pub state_counts: BTreeMap<ProposalState, u64>,
    pub type_stats: BTreeMap<ProposalType, TypeStats>,
    /// Mean of `now - created_at` across every proposal found
    pub average_lifetime_secs: u64,
    pub average_turnout_bps: u32,
    pub quorum_reached: u64,
    pub total_votes_cast: TokenAmount,
    pub computed_at: u64,
}

impl ProposalAnalytics {
    pub fn count(&self, state: ProposalState) -> u64 {
        self.state_counts.get(&state).copied().unwrap_or(0)
    }

    pub fn completed(&self) -> u64 {
        self.state_counts
            .iter()
            .filter(|(state, _)| state.is_completed())
            .map(|(_, n)| n)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationMetrics {
    pub start_id: u64,
    pub end_id: u64,
    pub proposals_considered: u64,
    pub average_turnout_bps: u32,
    pub highest_turnout_bps: u32,
    pub lowest_turnout_bps: u32,
    pub unique_proposers: u64,
    pub total_votes_cast: TokenAmount,
    pub quorum_reached: u64,
}

/// A proposal read during a window scan, with its turnout resolved
#[derive(Debug, Clone)]
pub(crate) struct ScannedProposal {
    pub record: ProposalRecord,
    pub turnout_bps: u32,
    pub reached_quorum: bool,
}

pub struct ProposalAggregator {
    proposals: Arc<dyn ProposalRegistry>,
    token: Arc<dyn TokenRegistry>,
    config: EngineConfig,
}

impl ProposalAggregator {
    pub fn new(
        proposals: Arc<dyn ProposalRegistry>,
        token: Arc<dyn TokenRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            proposals,
            token,
            config,
        }
    }

    pub fn aggregate(&self, start_id: u64, end_id: u64, now: u64) -> Result<ProposalAnalytics> {
        let _timer = metrics::AGGREGATION_SECONDS
            .with_label_values(&["proposals"])
            .start_timer();
        let scanned = self.scan(start_id, end_id)?;

        let mut state_counts: BTreeMap<ProposalState, u64> = BTreeMap::new();
        let mut type_stats: BTreeMap<ProposalType, TypeStats> = BTreeMap::new();
        let mut lifetime_sum: u128 = 0;
        let mut turnout_sum: u128 = 0;
        let mut quorum_reached = 0;
        let mut total_votes_cast = TokenAmount::ZERO;

        for item in &scanned {
            let record = &item.record;
            *state_counts.entry(record.state).or_default() += 1;

            let stats = type_stats.entry(record.proposal_type).or_default();
            stats.attempted += 1;
            if record.state == ProposalState::Executed {
                stats.executed += 1;
            }

            lifetime_sum += now.saturating_sub(record.created_at) as u128;
            turnout_sum += item.turnout_bps as u128;
            total_votes_cast = total_votes_cast.saturating_add(record.votes.total());
            if item.reached_quorum {
                quorum_reached += 1;
            }
        }

        for stats in type_stats.values_mut() {
            stats.success_rate_bps = ratio_bps(stats.executed as u128, stats.attempted as u128);
        }

        let count = scanned.len() as u128;
        let analytics = ProposalAnalytics {
            start_id,
            end_id,
            proposals: scanned.len() as u64,
            state_counts,
            type_stats,
            average_lifetime_secs: rounded_mean(lifetime_sum, count) as u64,
            average_turnout_bps: rounded_mean(turnout_sum, count) as u32,
            quorum_reached,
            total_votes_cast,
            computed_at: now,
        };

        info!(
            start_id,
            end_id,
            proposals = analytics.proposals,
            average_turnout_bps = analytics.average_turnout_bps,
            quorum_reached,
            "📊 Proposal analytics aggregated"
        );
        Ok(analytics)
    }

    pub fn participation(&self, start_id: u64, end_id: u64) -> Result<ParticipationMetrics> {
        let _timer = metrics::AGGREGATION_SECONDS
            .with_label_values(&["participation"])
            .start_timer();
        let scanned = self.scan(start_id, end_id)?;

        let turnouts: Vec<u32> = scanned.iter().map(|p| p.turnout_bps).collect();
        let turnout_sum: u128 = turnouts.iter().map(|t| *t as u128).sum();
        let proposers: BTreeSet<Address> = scanned.iter().map(|p| p.record.proposer).collect();

        let participation = ParticipationMetrics {
            start_id,
            end_id,
            proposals_considered: scanned.len() as u64,
            average_turnout_bps: rounded_mean(turnout_sum, scanned.len() as u128) as u32,
            highest_turnout_bps: turnouts.iter().copied().max().unwrap_or(0),
            lowest_turnout_bps: turnouts.iter().copied().min().unwrap_or(0),
            unique_proposers: proposers.len() as u64,
            total_votes_cast: scanned.iter().map(|p| p.record.votes.total()).sum(),
            quorum_reached: scanned.iter().filter(|p| p.reached_quorum).count() as u64,
        };

        debug!(
            start_id,
            end_id,
            proposals = participation.proposals_considered,
            unique_proposers = participation.unique_proposers,
            "Participation metrics computed"
        );
        Ok(participation)
    }

    /// Read every existing proposal in `[start_id, end_id]` and resolve its turnout
    pub(crate) fn scan(&self, start_id: u64, end_id: u64) -> Result<Vec<ScannedProposal>> {
        let window = read_window(self.proposals.as_ref(), &self.config, start_id, end_id)?;
        let parameters = self.parameters();
        let mut current_supply: Option<TokenAmount> = None;

        let scanned = window
            .into_iter()
            .map(|record| {
                let supply = match self.snapshot_supply(record.snapshot_id) {
                    Some(supply) => supply,
                    None => *current_supply.get_or_insert_with(|| self.current_supply()),
                };
                let votes = record.votes.total();
                let turnout_bps = votes.share_bps(supply);
                let reached_quorum = parameters
                    .as_ref()
                    .map(|p| meets_quorum(votes, supply, p.quorum_bps))
                    .unwrap_or(false);

                ScannedProposal {
                    record,
                    turnout_bps,
                    reached_quorum,
                }
            })
            .collect();

        Ok(scanned)
    }

    fn snapshot_supply(&self, snapshot_id: u64) -> Option<TokenAmount> {
        match self.token.snapshot_metrics(snapshot_id) {
            Ok(metrics) if !metrics.total_supply.is_zero() => Some(metrics.total_supply),
            Ok(_) => None,
            Err(e) => {
                debug!(snapshot_id, error = %e, "Snapshot supply unavailable, using current supply");
                None
            }
        }
    }

    fn current_supply(&self) -> TokenAmount {
        self.token.total_supply().unwrap_or_else(|e| {
            debug!(error = %e, "Current supply unavailable, turnout reported as zero");
            TokenAmount::ZERO
        })
    }

    fn parameters(&self) -> Option<GovernanceParameters> {
        match self.proposals.governance_parameters() {
            Ok(parameters) => Some(parameters),
            Err(e) => {
                debug!(error = %e, "Governance parameters unavailable, quorum not evaluated");
                None
            }
        }
    }
}

/// Every proposal in `[start_id, end_id]` the registry can produce, in id order.
///
/// Ids whose state read fails do not exist and are passed over; proposals whose
/// record read fails are skipped and counted.
pub(crate) fn read_window(
    proposals: &dyn ProposalRegistry,
    config: &EngineConfig,
    start_id: u64,
    end_id: u64,
) -> Result<Vec<ProposalRecord>> {
    config.check_window(start_id, end_id)?;

    let mut window = Vec::new();
    for id in start_id..=end_id {
        let Ok(state) = proposals.proposal_state(id) else {
            continue;
        };
        match proposals.proposal(id) {
            Ok(mut record) => {
                record.state = state;
                window.push(record);
            }
            Err(e) => {
                metrics::SCAN_ITEMS_SKIPPED
                    .with_label_values(&["proposals"])
                    .inc();
                debug!(proposal_id = id, error = %e, "Skipping unreadable proposal");
            }
        }
    }
    Ok(window)
}

fn meets_quorum(votes: TokenAmount, supply: TokenAmount, quorum_bps: u32) -> bool {
    if supply.is_zero() {
        return false;
    }
    votes.units().saturating_mul(BPS_DENOMINATOR) >= supply.units().saturating_mul(quorum_bps as u128)
}

/// Integer mean rounded half-up; 0 for an empty set
pub(crate) fn rounded_mean(sum: u128, count: u128) -> u128 {
    if count == 0 {
        0
    } else {
        (sum + count / 2) / count
    }
}
