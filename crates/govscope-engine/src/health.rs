//! Composite governance health score
//!
//! Five sub-scores, each clamped to [0, 20], summed into a total in [0, 100].
//! The total is always exactly the sum of the reported breakdown.

use crate::metrics;
use crate::proposals::ProposalAnalytics;
use crate::timelock::TimelockAnalytics;
use govscope_registry::{ratio_bps, ProposalState, ThreatLevel};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const MAX_SUB_SCORE: u32 = 20;

/// Turnout that earns the full participation score
const FULL_PARTICIPATION_BPS: u32 = 5_000;
/// Top-delegate share at which the delegation score bottoms out
const ZERO_BALANCE_SHARE_BPS: u32 = 5_000;
const POINTS_PER_TYPE: u32 = 5;
/// Even split across the four threat levels
const EVEN_LEVEL_SHARE_BPS: u32 = 2_500;
/// Largest possible total deviation from an even split (everything at one level)
const MAX_LEVEL_DEVIATION_BPS: u32 = 15_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthScore {
    pub total: u32,
    pub participation: u32,
    pub delegation_balance: u32,
    pub type_diversity: u32,
    pub execution: u32,
    pub threat_evenness: u32,
}

impl HealthScore {
    pub fn breakdown_sum(&self) -> u32 {
        self.participation
            + self.delegation_balance
            + self.type_diversity
            + self.execution
            + self.threat_evenness
    }
}

/// Score a window from its proposal and timelock analytics and the current
/// top-delegate share of supply
pub fn score(
    proposals: &ProposalAnalytics,
    timelock: &TimelockAnalytics,
    top_delegate_share_bps: u32,
) -> HealthScore {
    let participation = scaled(proposals.average_turnout_bps, FULL_PARTICIPATION_BPS);
    let delegation_balance =
        MAX_SUB_SCORE - scaled(top_delegate_share_bps, ZERO_BALANCE_SHARE_BPS);

    let distinct_types = proposals
        .type_stats
        .values()
        .filter(|s| s.attempted > 0)
        .count() as u32;
    let type_diversity = (distinct_types * POINTS_PER_TYPE).min(MAX_SUB_SCORE);

    let completed = proposals.completed();
    let execution = if completed == 0 {
        0
    } else {
        let executed = proposals.count(ProposalState::Executed) as u128;
        ((executed * MAX_SUB_SCORE as u128 / completed as u128) as u32).min(MAX_SUB_SCORE)
    };

    let threat_evenness = evenness(timelock);

    let mut health = HealthScore {
        total: 0,
        participation,
        delegation_balance,
        type_diversity,
        execution,
        threat_evenness,
    };
    health.total = health.breakdown_sum();

    metrics::HEALTH_SCORE.set(health.total as i64);
    info!(
        total = health.total,
        participation,
        delegation_balance,
        type_diversity,
        execution,
        threat_evenness,
        "🩺 Governance health scored"
    );
    health
}

/// `value / full * 20`, clamped to [0, 20]
fn scaled(value: u32, full: u32) -> u32 {
    let points = value as u64 * MAX_SUB_SCORE as u64 / full as u64;
    points.min(MAX_SUB_SCORE as u64) as u32
}

fn evenness(timelock: &TimelockAnalytics) -> u32 {
    let total = timelock.total_transactions();
    if total == 0 {
        return 0;
    }

    let deviation: u32 = ThreatLevel::ALL
        .iter()
        .map(|level| {
            let count = timelock.levels.get(level).map(|s| s.transactions).unwrap_or(0);
            ratio_bps(count as u128, total as u128).abs_diff(EVEN_LEVEL_SHARE_BPS)
        })
        .sum();

    MAX_SUB_SCORE - scaled(deviation, MAX_LEVEL_DEVIATION_BPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposals::TypeStats;
    use crate::timelock::LevelStats;
    use govscope_registry::{ProposalType, TokenAmount};
    use std::collections::BTreeMap;

    fn proposals(turnout_bps: u32, states: &[(ProposalState, u64)], types: &[ProposalType]) -> ProposalAnalytics {
        ProposalAnalytics {
            start_id: 1,
            end_id: 10,
            proposals: states.iter().map(|(_, n)| n).sum(),
            state_counts: states.iter().copied().collect(),
            type_stats: types
                .iter()
                .map(|t| (*t, TypeStats { attempted: 1, executed: 0, success_rate_bps: 0 }))
                .collect(),
            average_lifetime_secs: 0,
            average_turnout_bps: turnout_bps,
            quorum_reached: 0,
            total_votes_cast: TokenAmount::ZERO,
            computed_at: 0,
        }
    }

    fn timelock(counts: [u64; 4]) -> TimelockAnalytics {
        let levels: BTreeMap<ThreatLevel, LevelStats> = ThreatLevel::ALL
            .iter()
            .zip(counts)
            .map(|(level, n)| {
                (
                    *level,
                    LevelStats {
                        level: *level,
                        transactions: n,
                        executed: 0,
                        pending: n,
                        expired: 0,
                        canceled: 0,
                        configured_delay_secs: None,
                        average_observed_delay_secs: 0,
                        success_rate_bps: 0,
                    },
                )
            })
            .collect();
        TimelockAnalytics {
            start_id: 1,
            end_id: 10,
            proposals_with_timelock: counts.iter().sum(),
            levels,
            computed_at: 0,
        }
    }

    #[test]
    fn test_perfect_score() {
        let p = proposals(
            6_000,
            &[(ProposalState::Executed, 4)],
            &[ProposalType::General, ProposalType::TokenMint, ProposalType::TokenBurn, ProposalType::Withdrawal],
        );
        let health = score(&p, &timelock([1, 1, 1, 1]), 0);
        assert_eq!(health.participation, 20);
        assert_eq!(health.delegation_balance, 20);
        assert_eq!(health.type_diversity, 20);
        assert_eq!(health.execution, 20);
        assert_eq!(health.threat_evenness, 20);
        assert_eq!(health.total, 100);
    }

    #[test]
    fn test_empty_window_scores_delegation_only() {
        let p = proposals(0, &[], &[]);
        let health = score(&p, &timelock([0, 0, 0, 0]), 0);
        assert_eq!(health.total, 20);
        assert_eq!(health.delegation_balance, 20);
        assert_eq!(health.execution, 0);
        assert_eq!(health.threat_evenness, 0);
    }

    #[test]
    fn test_partial_scores() {
        let p = proposals(
            1_250,
            &[
                (ProposalState::Executed, 1),
                (ProposalState::Defeated, 3),
                (ProposalState::Active, 5),
                (ProposalState::Canceled, 2),
            ],
            &[ProposalType::General, ProposalType::TokenMint],
        );
        // all timelocked txs at one level: deviation 7500 + 3 * 2500 = 15000
        let health = score(&p, &timelock([4, 0, 0, 0]), 2_500);
        assert_eq!(health.participation, 5);
        assert_eq!(health.delegation_balance, 10);
        assert_eq!(health.type_diversity, 10);
        assert_eq!(health.execution, 5);
        assert_eq!(health.threat_evenness, 0);
        assert_eq!(health.total, health.breakdown_sum());
        assert_eq!(health.total, 30);
    }

    #[test]
    fn test_dominant_delegate_zeroes_balance() {
        let p = proposals(0, &[], &[]);
        assert_eq!(score(&p, &timelock([0; 4]), 5_000).delegation_balance, 0);
        assert_eq!(score(&p, &timelock([0; 4]), 9_000).delegation_balance, 0);
    }
}
