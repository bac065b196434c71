//! Timelock analytics by threat level

use crate::metrics;
use crate::proposals::rounded_mean;
use govscope_registry::{
    ratio_bps, ProposalRecord, ProposalState, ThreatLevel, TimelockRegistry, TimelockTransaction,
    TxHash,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Where a timelocked transaction stands at evaluation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelockStatus {
    Executed,
    /// Queued and still inside `eta + grace`
    Pending,
    /// Queued but past `eta + grace`
    Expired,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelStats {
    pub level: ThreatLevel,
    pub transactions: u64,
    pub executed: u64,
    pub pending: u64,
    pub expired: u64,
    pub canceled: u64,
    /// `None` when the registry could not report it
    pub configured_delay_secs: Option<u64>,
    /// Mean of `eta - proposal deadline`
    pub average_observed_delay_secs: u64,
    pub success_rate_bps: u32,
}

impl LevelStats {
    fn empty(level: ThreatLevel) -> Self {
        Self {
            level,
            transactions: 0,
            executed: 0,
            pending: 0,
            expired: 0,
            canceled: 0,
            configured_delay_secs: None,
            average_observed_delay_secs: 0,
            success_rate_bps: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockAnalytics {
    pub start_id: u64,
    pub end_id: u64,
    pub proposals_with_timelock: u64,
    /// Every threat level is present, even with zero transactions
    pub levels: BTreeMap<ThreatLevel, LevelStats>,
    pub computed_at: u64,
}

impl TimelockAnalytics {
    pub fn total_transactions(&self) -> u64 {
        self.levels.values().map(|l| l.transactions).sum()
    }

    pub fn total_executed(&self) -> u64 {
        self.levels.values().map(|l| l.executed).sum()
    }
}

pub struct TimelockAggregator {
    timelock: Arc<dyn TimelockRegistry>,
}

impl TimelockAggregator {
    pub fn new(timelock: Arc<dyn TimelockRegistry>) -> Self {
        Self { timelock }
    }

    pub fn aggregate(
        &self,
        start_id: u64,
        end_id: u64,
        window: &[ProposalRecord],
        now: u64,
    ) -> TimelockAnalytics {
        let _timer = metrics::AGGREGATION_SECONDS
            .with_label_values(&["timelock"])
            .start_timer();

        let grace = self.timelock.grace_period().unwrap_or_else(|e| {
            debug!(error = %e, "Grace period unavailable, treating as zero");
            0
        });

        let mut levels: BTreeMap<ThreatLevel, LevelStats> = ThreatLevel::ALL
            .iter()
            .map(|level| (*level, LevelStats::empty(*level)))
            .collect();
        let mut delay_sums: BTreeMap<ThreatLevel, u128> = BTreeMap::new();
        let mut with_timelock = 0u64;

        for record in window {
            let Some(hash) = record.timelock_tx else {
                continue;
            };
            let Some((tx, level, status)) = self.classify(record, &hash, grace, now) else {
                metrics::SCAN_ITEMS_SKIPPED
                    .with_label_values(&["timelock"])
                    .inc();
                continue;
            };
            with_timelock += 1;

            let stats = levels.entry(level).or_insert_with(|| LevelStats::empty(level));
            stats.transactions += 1;
            match status {
                TimelockStatus::Executed => stats.executed += 1,
                TimelockStatus::Pending => stats.pending += 1,
                TimelockStatus::Expired => stats.expired += 1,
                TimelockStatus::Canceled => stats.canceled += 1,
            }
            *delay_sums.entry(level).or_default() += tx.eta.saturating_sub(record.deadline) as u128;
        }

        for (level, stats) in levels.iter_mut() {
            stats.configured_delay_secs = match self.timelock.delay_for(*level) {
                Ok(delay) => Some(delay),
                Err(e) => {
                    debug!(level = ?level, error = %e, "Configured delay unavailable");
                    None
                }
            };
            let sum = delay_sums.get(level).copied().unwrap_or(0);
            stats.average_observed_delay_secs = rounded_mean(sum, stats.transactions as u128) as u64;
            stats.success_rate_bps = ratio_bps(stats.executed as u128, stats.transactions as u128);
        }

        info!(
            start_id,
            end_id,
            proposals_with_timelock = with_timelock,
            "⏳ Timelock analytics aggregated"
        );

        TimelockAnalytics {
            start_id,
            end_id,
            proposals_with_timelock: with_timelock,
            levels,
            computed_at: now,
        }
    }

    /// Resolve a proposal's transaction, threat level and status; `None` if unreadable
    fn classify(
        &self,
        record: &ProposalRecord,
        hash: &TxHash,
        grace: u64,
        now: u64,
    ) -> Option<(TimelockTransaction, ThreatLevel, TimelockStatus)> {
        let tx = match self.timelock.transaction(hash) {
            Ok(tx) => tx,
            Err(e) => {
                debug!(proposal_id = record.id, error = %e, "Skipping unreadable timelock transaction");
                return None;
            }
        };
        let level = match self.timelock.threat_level(&tx.target, &tx.payload) {
            Ok(level) => level,
            Err(e) => {
                debug!(proposal_id = record.id, error = %e, "Skipping transaction without threat level");
                return None;
            }
        };

        let status = if tx.executed {
            TimelockStatus::Executed
        } else if record.state == ProposalState::Canceled {
            TimelockStatus::Canceled
        } else {
            match self.timelock.is_queued(hash) {
                Ok(true) if now <= tx.eta.saturating_add(grace) => TimelockStatus::Pending,
                Ok(true) => TimelockStatus::Expired,
                Ok(false) => TimelockStatus::Canceled,
                Err(e) => {
                    debug!(proposal_id = record.id, error = %e, "Skipping transaction with unknown queue state");
                    return None;
                }
            }
        };

        Some((tx, level, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govscope_registry::{
        Address, MemoryTimelockRegistry, ProposalType, TokenAmount, VoteTally,
    };

    const DAY: u64 = 24 * 3600;

    fn record(id: u64, state: ProposalState, tx: Option<TxHash>) -> ProposalRecord {
        ProposalRecord {
            id,
            proposal_type: ProposalType::General,
            state,
            snapshot_id: 1,
            created_at: 0,
            deadline: 1_000,
            votes: VoteTally::default(),
            proposer: Address::repeat(1),
            timelock_tx: tx,
        }
    }

    fn transaction(seed: u8, target: Address, eta: u64) -> TimelockTransaction {
        TimelockTransaction {
            hash: [seed; 32],
            target,
            value: TokenAmount::ZERO,
            payload: vec![seed],
            eta,
            executed: false,
        }
    }

    #[test]
    fn test_statuses_and_levels() {
        let registry = Arc::new(MemoryTimelockRegistry::new());
        let critical = Address::repeat(0xC0);
        registry.set_target_level(critical, ThreatLevel::Critical);

        // executed Low, pending Low, expired Critical, canceled Critical
        registry.queue(transaction(1, Address::repeat(9), 1_000 + DAY));
        registry.execute(&[1; 32]).unwrap();
        registry.queue(transaction(2, Address::repeat(9), 1_000 + 20 * DAY));
        registry.queue(transaction(3, critical, 1_000 + 14 * DAY));
        registry.queue(transaction(4, critical, 1_000 + 14 * DAY));
        registry.cancel(&[4; 32]).unwrap();

        let window = vec![
            record(1, ProposalState::Executed, Some([1; 32])),
            record(2, ProposalState::Queued, Some([2; 32])),
            record(3, ProposalState::Queued, Some([3; 32])),
            record(4, ProposalState::Queued, Some([4; 32])),
            record(5, ProposalState::Defeated, None),
        ];

        let now = 1_000 + 29 * DAY;
        let analytics = TimelockAggregator::new(registry).aggregate(1, 5, &window, now);

        assert_eq!(analytics.proposals_with_timelock, 4);
        assert_eq!(analytics.levels.len(), 4);

        let low = &analytics.levels[&ThreatLevel::Low];
        assert_eq!(low.transactions, 2);
        assert_eq!(low.executed, 1);
        assert_eq!(low.pending, 1);
        assert_eq!(low.success_rate_bps, 5_000);
        assert_eq!(low.average_observed_delay_secs, 21 * DAY / 2);
        assert_eq!(low.configured_delay_secs, Some(DAY));

        let critical = &analytics.levels[&ThreatLevel::Critical];
        assert_eq!(critical.transactions, 2);
        assert_eq!(critical.expired, 1);
        assert_eq!(critical.canceled, 1);
        assert_eq!(critical.success_rate_bps, 0);

        let medium = &analytics.levels[&ThreatLevel::Medium];
        assert_eq!(medium.transactions, 0);
        assert_eq!(medium.configured_delay_secs, Some(3 * DAY));
    }

    #[test]
    fn test_missing_transaction_skipped() {
        let registry = Arc::new(MemoryTimelockRegistry::new());
        let window = vec![record(1, ProposalState::Queued, Some([7; 32]))];
        let analytics = TimelockAggregator::new(registry).aggregate(1, 1, &window, 0);
        assert_eq!(analytics.proposals_with_timelock, 0);
        assert_eq!(analytics.total_transactions(), 0);
    }

    #[test]
    fn test_canceled_proposal_overrides_queue() {
        let registry = Arc::new(MemoryTimelockRegistry::new());
        registry.queue(transaction(5, Address::repeat(9), 2_000));
        let window = vec![record(1, ProposalState::Canceled, Some([5; 32]))];
        let analytics = TimelockAggregator::new(registry).aggregate(1, 1, &window, 0);
        assert_eq!(analytics.levels[&ThreatLevel::Low].canceled, 1);
    }
}
