//! Engine-owned record of observed delegations
//!
//! The token registry stays authoritative for edges. This book keeps what the
//! engine saw and when, so concentration can be ranked and the loop audit knows
//! which accounts exist. Records are upserted and deactivated, never deleted.

use crate::metrics;
use crate::types::{AccountRecord, ConcentrationEntry};
use govscope_registry::{Address, TokenAmount};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::info;

/// One delegation observation handed to the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub delegator: Address,
    /// Null or equal to `delegator` means self-delegated
    pub delegatee: Address,
    pub voting_power: TokenAmount,
    /// Freshly computed `1 + forward_depth(delegatee)`; ignored for self-delegation
    pub chain_depth: u32,
    pub observed_at: u64,
}

impl Observation {
    pub fn is_self_delegation(&self) -> bool {
        self.delegatee.is_null() || self.delegatee == self.delegator
    }
}

#[derive(Default)]
pub struct DelegationRecorder {
    records: RwLock<BTreeMap<Address, AccountRecord>>,
}

impl DelegationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the delegator's record and return its new state
    pub fn record(&self, observation: Observation) -> AccountRecord {
        let clears = observation.is_self_delegation();
        let mut records = self.records.write();

        let record = records
            .entry(observation.delegator)
            .or_insert_with(|| AccountRecord {
                account: observation.delegator,
                delegate: None,
                voting_power: TokenAmount::ZERO,
                chain_depth: 0,
                active: false,
                first_seen: observation.observed_at,
                last_updated: observation.observed_at,
                observations: 0,
            });

        record.voting_power = observation.voting_power;
        record.last_updated = observation.observed_at;
        record.observations += 1;

        if clears {
            record.delegate = None;
            record.chain_depth = 0;
            record.active = false;
        } else {
            record.delegate = Some(observation.delegatee);
            record.chain_depth = observation.chain_depth;
            record.active = true;
        }

        let kind = if clears { "cleared" } else { "delegated" };
        metrics::DELEGATIONS_RECORDED
            .with_label_values(&[kind])
            .inc();
        info!(
            delegator = %observation.delegator,
            delegatee = %observation.delegatee,
            chain_depth = record.chain_depth,
            power = %record.voting_power,
            kind,
            "📝 Delegation recorded"
        );

        record.clone()
    }

    pub fn account(&self, account: &Address) -> Option<AccountRecord> {
        self.records.read().get(account).cloned()
    }

    /// Every account ever observed, in address order
    pub fn known_accounts(&self) -> Vec<Address> {
        self.records.read().keys().copied().collect()
    }

    pub fn active_count(&self) -> usize {
        self.records.read().values().filter(|r| r.active).count()
    }

    /// Active records grouped by delegate, largest delegated power first.
    ///
    /// Ties are broken by address so the ranking is stable.
    pub fn top_delegate_concentration(
        &self,
        n: usize,
        total_supply: TokenAmount,
    ) -> Vec<ConcentrationEntry> {
        let mut by_delegate: BTreeMap<Address, (TokenAmount, usize)> = BTreeMap::new();

        for record in self.records.read().values().filter(|r| r.active) {
            if let Some(delegate) = record.delegate {
                let entry = by_delegate.entry(delegate).or_default();
                entry.0 = entry.0.saturating_add(record.voting_power);
                entry.1 += 1;
            }
        }

        let mut ranked: Vec<ConcentrationEntry> = by_delegate
            .into_iter()
            .map(|(delegate, (delegated_power, delegator_count))| ConcentrationEntry {
                delegate,
                delegated_power,
                delegator_count,
                share_bps: delegated_power.share_bps(total_supply),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.delegated_power
                .cmp(&a.delegated_power)
                .then_with(|| a.delegate.cmp(&b.delegate))
        });
        ranked.truncate(n);
        ranked
    }
}
