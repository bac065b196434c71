//! In-memory registries.
//!
//! Used as test fixtures and by hosts that mirror registry state locally. None of
//! them validate delegation edges: cycles and over-deep chains can be built on
//! purpose so the analytics engine can be exercised against adversarial graphs.

use crate::error::{RegistryError, Result};
use crate::registry::{ProposalRegistry, TimelockRegistry, TokenRegistry};
use crate::types::{
    Address, GovernanceParameters, ProposalRecord, ProposalState, SnapshotMetrics, ThreatLevel,
    TimelockTransaction, TokenAmount, TxHash, VoteDirection, VoteTally,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct TokenState {
    balances: HashMap<Address, TokenAmount>,
    delegates: HashMap<Address, Address>,
    delegators: HashMap<Address, BTreeSet<Address>>,
    removed: HashSet<Address>,
    snapshots: BTreeMap<u64, SnapshotMetrics>,
    current_snapshot: u64,
    supply_override: Option<TokenAmount>,
    max_depth: u32,
    available: bool,
}

/// Token registry held in memory
pub struct MemoryTokenRegistry {
    state: RwLock<TokenState>,
}

impl Default for MemoryTokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTokenRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(TokenState {
                available: true,
                ..TokenState::default()
            }),
        }
    }

    pub fn with_max_depth(self, max_depth: u32) -> Self {
        self.state.write().max_depth = max_depth;
        self
    }

    pub fn set_balance(&self, account: Address, balance: TokenAmount) {
        let mut state = self.state.write();
        state.removed.remove(&account);
        state.balances.insert(account, balance);
    }

    /// Point `delegator` at `delegatee`. Null or self clears the edge.
    pub fn set_delegate(&self, delegator: Address, delegatee: Address) {
        let mut state = self.state.write();
        state.removed.remove(&delegator);

        if let Some(previous) = state.delegates.remove(&delegator) {
            if let Some(set) = state.delegators.get_mut(&previous) {
                set.remove(&delegator);
            }
        }

        if delegatee.is_null() || delegatee == delegator {
            debug!(delegator = %delegator, "Delegation cleared");
            return;
        }

        state.delegates.insert(delegator, delegatee);
        state
            .delegators
            .entry(delegatee)
            .or_default()
            .insert(delegator);
        debug!(delegator = %delegator, delegatee = %delegatee, "Delegation set");
    }

    /// Drop an account entirely; subsequent reads for it fail with `NotFound`
    pub fn remove_account(&self, account: Address) {
        let mut state = self.state.write();
        state.balances.remove(&account);
        if let Some(previous) = state.delegates.remove(&account) {
            if let Some(set) = state.delegators.get_mut(&previous) {
                set.remove(&account);
            }
        }
        if let Some(incoming) = state.delegators.remove(&account) {
            for delegator in incoming {
                state.delegates.remove(&delegator);
            }
        }
        state.removed.insert(account);
    }

    /// Pin total supply instead of summing balances
    pub fn set_total_supply(&self, supply: TokenAmount) {
        self.state.write().supply_override = Some(supply);
    }

    /// Simulate an outage: every read fails with `Unavailable` while false
    pub fn set_available(&self, available: bool) {
        self.state.write().available = available;
    }

    pub fn set_snapshot_metrics(&self, snapshot_id: u64, metrics: SnapshotMetrics) {
        let mut state = self.state.write();
        state.snapshots.insert(snapshot_id, metrics);
        state.current_snapshot = state.current_snapshot.max(snapshot_id);
    }

    /// Freeze current balances and delegations into a new snapshot
    pub fn take_snapshot(&self) -> u64 {
        let mut state = self.state.write();
        let metrics = Self::compute_metrics(&state);
        let id = state.current_snapshot + 1;
        state.snapshots.insert(id, metrics.clone());
        state.current_snapshot = id;

        info!(
            snapshot_id = id,
            total_supply = %metrics.total_supply,
            active_delegates = metrics.active_delegates,
            "📸 Token snapshot taken"
        );
        id
    }

    fn compute_metrics(state: &TokenState) -> SnapshotMetrics {
        let total_supply = Self::supply_of(state);
        let active_holders = state.balances.values().filter(|b| !b.is_zero()).count() as u64;

        let mut delegated: BTreeMap<Address, TokenAmount> = BTreeMap::new();
        for (delegator, delegatee) in &state.delegates {
            let balance = state.balances.get(delegator).copied().unwrap_or_default();
            let entry = delegated.entry(*delegatee).or_default();
            *entry = entry.saturating_add(balance);
        }

        let total_delegated = delegated.values().copied().sum();
        let top = delegated
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(addr, amount)| (*addr, *amount));

        SnapshotMetrics {
            total_supply,
            active_holders,
            active_delegates: delegated.len() as u64,
            total_delegated,
            top_delegate: top.map(|(addr, _)| addr),
            top_delegate_amount: top.map(|(_, amount)| amount).unwrap_or_default(),
        }
    }

    fn supply_of(state: &TokenState) -> TokenAmount {
        state
            .supply_override
            .unwrap_or_else(|| state.balances.values().copied().sum())
    }

    fn check_available(state: &TokenState) -> Result<()> {
        if state.available {
            Ok(())
        } else {
            Err(RegistryError::Unavailable("token registry offline".to_string()))
        }
    }

    fn check_present(state: &TokenState, account: &Address) -> Result<()> {
        if state.removed.contains(account) {
            Err(RegistryError::NotFound(format!("account {}", account)))
        } else {
            Ok(())
        }
    }
}

impl TokenRegistry for MemoryTokenRegistry {
    fn balance_of(&self, account: &Address) -> Result<TokenAmount> {
        let state = self.state.read();
        Self::check_available(&state)?;
        Self::check_present(&state, account)?;
        Ok(state.balances.get(account).copied().unwrap_or_default())
    }

    fn delegate_of(&self, account: &Address) -> Result<Option<Address>> {
        let state = self.state.read();
        Self::check_available(&state)?;
        Self::check_present(&state, account)?;
        Ok(state.delegates.get(account).copied())
    }

    fn delegators_of(&self, account: &Address) -> Result<Vec<Address>> {
        let state = self.state.read();
        Self::check_available(&state)?;
        Self::check_present(&state, account)?;
        Ok(state
            .delegators
            .get(account)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn total_supply(&self) -> Result<TokenAmount> {
        let state = self.state.read();
        Self::check_available(&state)?;
        Ok(Self::supply_of(&state))
    }

    fn current_snapshot_id(&self) -> Result<u64> {
        let state = self.state.read();
        Self::check_available(&state)?;
        Ok(state.current_snapshot)
    }

    fn snapshot_metrics(&self, snapshot_id: u64) -> Result<SnapshotMetrics> {
        let state = self.state.read();
        Self::check_available(&state)?;
        state
            .snapshots
            .get(&snapshot_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("snapshot {}", snapshot_id)))
    }

    fn max_delegation_depth(&self) -> Result<u32> {
        let state = self.state.read();
        Self::check_available(&state)?;
        Ok(state.max_depth)
    }
}

#[derive(Debug, Default)]
struct ProposalBook {
    proposals: BTreeMap<u64, ProposalRecord>,
    weights: HashMap<(u64, Address), TokenAmount>,
    parameters: GovernanceParameters,
}

/// Proposal registry held in memory
pub struct MemoryProposalRegistry {
    state: RwLock<ProposalBook>,
}

impl Default for MemoryProposalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProposalRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ProposalBook::default()),
        }
    }

    pub fn with_parameters(self, parameters: GovernanceParameters) -> Self {
        self.state.write().parameters = parameters;
        self
    }

    pub fn insert(&self, record: ProposalRecord) {
        let mut state = self.state.write();
        debug!(proposal_id = record.id, state = ?record.state, "Proposal stored");
        state.proposals.insert(record.id, record);
    }

    pub fn set_state(&self, id: u64, next: ProposalState) -> Result<()> {
        let mut state = self.state.write();
        let record = state
            .proposals
            .get_mut(&id)
            .ok_or_else(|| RegistryError::NotFound(format!("proposal {}", id)))?;
        record.state = next;
        Ok(())
    }

    /// Replace the tally of an Active proposal; decreases and frozen tallies are refused
    pub fn update_tally(&self, id: u64, tally: VoteTally) -> Result<()> {
        let mut state = self.state.write();
        let record = state
            .proposals
            .get_mut(&id)
            .ok_or_else(|| RegistryError::NotFound(format!("proposal {}", id)))?;

        if record.state != ProposalState::Active {
            return Err(RegistryError::Rejected(format!(
                "proposal {} is {:?}, tallies are frozen",
                id, record.state
            )));
        }
        if !record.votes.is_monotonic_successor(&tally) {
            return Err(RegistryError::Rejected(format!(
                "proposal {} tally would decrease",
                id
            )));
        }
        record.votes = tally;
        Ok(())
    }

    /// Record a ballot: stores the voter weight and adds it to the matching bucket
    pub fn cast_vote(
        &self,
        id: u64,
        voter: Address,
        direction: VoteDirection,
        weight: TokenAmount,
    ) -> Result<()> {
        let mut state = self.state.write();
        if state.weights.contains_key(&(id, voter)) {
            return Err(RegistryError::Rejected(format!(
                "{} already voted on proposal {}",
                voter, id
            )));
        }

        let record = state
            .proposals
            .get_mut(&id)
            .ok_or_else(|| RegistryError::NotFound(format!("proposal {}", id)))?;
        if record.state != ProposalState::Active {
            return Err(RegistryError::Rejected(format!(
                "proposal {} is not active",
                id
            )));
        }

        match direction {
            VoteDirection::Yes => record.votes.yes = record.votes.yes.saturating_add(weight),
            VoteDirection::No => record.votes.no = record.votes.no.saturating_add(weight),
            VoteDirection::Abstain => {
                record.votes.abstain = record.votes.abstain.saturating_add(weight)
            }
        }
        state.weights.insert((id, voter), weight);
        Ok(())
    }

    /// Store a voter weight without touching the tally
    pub fn set_voter_weight(&self, id: u64, voter: Address, weight: TokenAmount) {
        self.state.write().weights.insert((id, voter), weight);
    }

    pub fn len(&self) -> usize {
        self.state.read().proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProposalRegistry for MemoryProposalRegistry {
    fn proposal_state(&self, id: u64) -> Result<ProposalState> {
        self.state
            .read()
            .proposals
            .get(&id)
            .map(|p| p.state)
            .ok_or_else(|| RegistryError::NotFound(format!("proposal {}", id)))
    }

    fn proposal(&self, id: u64) -> Result<ProposalRecord> {
        self.state
            .read()
            .proposals
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("proposal {}", id)))
    }

    fn voter_weight(&self, id: u64, voter: &Address) -> Result<TokenAmount> {
        let state = self.state.read();
        if !state.proposals.contains_key(&id) {
            return Err(RegistryError::NotFound(format!("proposal {}", id)));
        }
        Ok(state.weights.get(&(id, *voter)).copied().unwrap_or_default())
    }

    fn governance_parameters(&self) -> Result<GovernanceParameters> {
        Ok(self.state.read().parameters.clone())
    }
}

const DAY_SECS: u64 = 24 * 3600;

#[derive(Debug)]
struct TimelockState {
    transactions: HashMap<TxHash, TimelockTransaction>,
    queued: HashSet<TxHash>,
    target_levels: HashMap<Address, ThreatLevel>,
    delays: BTreeMap<ThreatLevel, u64>,
    grace_period: u64,
}

/// Timelock registry held in memory
pub struct MemoryTimelockRegistry {
    state: RwLock<TimelockState>,
}

impl Default for MemoryTimelockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTimelockRegistry {
    /// Default delays: Low 1d, Medium 3d, High 7d, Critical 14d; grace 14d
    pub fn new() -> Self {
        let delays = BTreeMap::from([
            (ThreatLevel::Low, DAY_SECS),
            (ThreatLevel::Medium, 3 * DAY_SECS),
            (ThreatLevel::High, 7 * DAY_SECS),
            (ThreatLevel::Critical, 14 * DAY_SECS),
        ]);
        Self {
            state: RwLock::new(TimelockState {
                transactions: HashMap::new(),
                queued: HashSet::new(),
                target_levels: HashMap::new(),
                delays,
                grace_period: 14 * DAY_SECS,
            }),
        }
    }

    pub fn set_delay(&self, level: ThreatLevel, delay_secs: u64) {
        self.state.write().delays.insert(level, delay_secs);
    }

    pub fn set_grace_period(&self, grace_secs: u64) {
        self.state.write().grace_period = grace_secs;
    }

    /// Classify every call to `target` at `level`; unclassified targets are Low
    pub fn set_target_level(&self, target: Address, level: ThreatLevel) {
        self.state.write().target_levels.insert(target, level);
    }

    pub fn queue(&self, transaction: TimelockTransaction) {
        let mut state = self.state.write();
        state.queued.insert(transaction.hash);
        state.transactions.insert(transaction.hash, transaction);
    }

    pub fn execute(&self, hash: &TxHash) -> Result<()> {
        let mut state = self.state.write();
        if !state.queued.remove(hash) {
            return Err(RegistryError::Rejected(format!(
                "transaction {} is not queued",
                hex::encode(&hash[..8])
            )));
        }
        let tx = state
            .transactions
            .get_mut(hash)
            .ok_or_else(|| RegistryError::NotFound(hex::encode(&hash[..8])))?;
        tx.executed = true;
        Ok(())
    }

    pub fn cancel(&self, hash: &TxHash) -> Result<()> {
        let mut state = self.state.write();
        if state.queued.remove(hash) {
            Ok(())
        } else {
            Err(RegistryError::Rejected(format!(
                "transaction {} is not queued",
                hex::encode(&hash[..8])
            )))
        }
    }
}

impl TimelockRegistry for MemoryTimelockRegistry {
    fn transaction(&self, hash: &TxHash) -> Result<TimelockTransaction> {
        self.state
            .read()
            .transactions
            .get(hash)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(hex::encode(&hash[..8])))
    }

    fn is_queued(&self, hash: &TxHash) -> Result<bool> {
        Ok(self.state.read().queued.contains(hash))
    }

    fn threat_level(&self, target: &Address, _payload: &[u8]) -> Result<ThreatLevel> {
        Ok(self
            .state
            .read()
            .target_levels
            .get(target)
            .copied()
            .unwrap_or(ThreatLevel::Low))
    }

    fn delay_for(&self, level: ThreatLevel) -> Result<u64> {
        self.state
            .read()
            .delays
            .get(&level)
            .copied()
            .ok_or_else(|| RegistryError::NotFound(format!("delay for {:?}", level)))
    }

    fn grace_period(&self) -> Result<u64> {
        Ok(self.state.read().grace_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::repeat(b)
    }

    #[test]
    fn test_delegation_index_follows_redelegation() {
        let registry = MemoryTokenRegistry::new();
        registry.set_delegate(addr(1), addr(2));
        registry.set_delegate(addr(3), addr(2));
        assert_eq!(registry.delegators_of(&addr(2)).unwrap(), vec![addr(1), addr(3)]);

        registry.set_delegate(addr(1), addr(4));
        assert_eq!(registry.delegators_of(&addr(2)).unwrap(), vec![addr(3)]);
        assert_eq!(registry.delegate_of(&addr(1)).unwrap(), Some(addr(4)));

        registry.set_delegate(addr(1), Address::NULL);
        assert_eq!(registry.delegate_of(&addr(1)).unwrap(), None);
        assert!(registry.delegators_of(&addr(4)).unwrap().is_empty());
    }

    #[test]
    fn test_removed_account_reads_fail() {
        let registry = MemoryTokenRegistry::new();
        registry.set_balance(addr(1), TokenAmount::new(10));
        registry.set_delegate(addr(2), addr(1));
        registry.remove_account(addr(1));

        assert!(registry.balance_of(&addr(1)).unwrap_err().is_not_found());
        assert_eq!(registry.delegate_of(&addr(2)).unwrap(), None);
    }

    #[test]
    fn test_snapshot_metrics_pick_top_delegate() {
        let registry = MemoryTokenRegistry::new();
        registry.set_balance(addr(1), TokenAmount::new(100));
        registry.set_balance(addr(2), TokenAmount::new(300));
        registry.set_balance(addr(3), TokenAmount::new(50));
        registry.set_delegate(addr(1), addr(9));
        registry.set_delegate(addr(2), addr(8));
        registry.set_delegate(addr(3), addr(9));

        let id = registry.take_snapshot();
        let metrics = registry.snapshot_metrics(id).unwrap();
        assert_eq!(metrics.total_supply, TokenAmount::new(450));
        assert_eq!(metrics.top_delegate, Some(addr(8)));
        assert_eq!(metrics.top_delegate_amount, TokenAmount::new(300));
        assert_eq!(metrics.active_delegates, 2);
        assert_eq!(registry.current_snapshot_id().unwrap(), id);
    }

    #[test]
    fn test_outage_fails_reads() {
        let registry = MemoryTokenRegistry::new();
        registry.set_available(false);
        assert!(matches!(
            registry.total_supply(),
            Err(RegistryError::Unavailable(_))
        ));
    }

    #[test]
    fn test_tallies_freeze_after_active() {
        let registry = MemoryProposalRegistry::new();
        registry.insert(ProposalRecord {
            id: 1,
            proposal_type: crate::ProposalType::General,
            state: ProposalState::Active,
            snapshot_id: 1,
            created_at: 0,
            deadline: 100,
            votes: VoteTally::default(),
            proposer: addr(1),
            timelock_tx: None,
        });

        registry
            .cast_vote(1, addr(2), VoteDirection::Yes, TokenAmount::new(5))
            .unwrap();
        assert!(registry
            .cast_vote(1, addr(2), VoteDirection::No, TokenAmount::new(5))
            .is_err());
        assert!(registry.update_tally(1, VoteTally::new(4, 0, 0)).is_err());

        registry.set_state(1, ProposalState::Defeated).unwrap();
        assert!(registry.update_tally(1, VoteTally::new(6, 0, 0)).is_err());
        assert_eq!(registry.voter_weight(1, &addr(2)).unwrap(), TokenAmount::new(5));
        assert_eq!(registry.voter_weight(1, &addr(3)).unwrap(), TokenAmount::ZERO);
        assert!(registry.proposal_state(2).unwrap_err().is_not_found());
    }

    #[test]
    fn test_timelock_queue_execute_cancel() {
        let registry = MemoryTimelockRegistry::new();
        let tx = TimelockTransaction {
            hash: [7u8; 32],
            target: addr(5),
            value: TokenAmount::ZERO,
            payload: vec![1, 2, 3],
            eta: 1_000,
            executed: false,
        };
        registry.queue(tx.clone());
        registry.set_target_level(addr(5), ThreatLevel::High);

        assert!(registry.is_queued(&tx.hash).unwrap());
        assert_eq!(
            registry.threat_level(&addr(5), &tx.payload).unwrap(),
            ThreatLevel::High
        );
        registry.execute(&tx.hash).unwrap();
        assert!(registry.transaction(&tx.hash).unwrap().executed);
        assert!(registry.cancel(&tx.hash).is_err());
        assert_eq!(registry.delay_for(ThreatLevel::Critical).unwrap(), 14 * DAY_SECS);
    }
}
