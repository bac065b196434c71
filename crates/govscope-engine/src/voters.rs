//! Heuristic voter behaviour classification
//!
//! The proposal registry only exposes per-voter weights, not ballots, so a voter's
//! direction on a proposal is inferred as the plurality bucket of that proposal's
//! aggregate tally. Reports carry `direction_inferred = true` and are only meaningful
//! in aggregate.

use crate::cycle::direct_delegators;
use govscope_registry::{
    ratio_bps, Address, ProposalRecord, ProposalRegistry, TokenRegistry, VoteDirection,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

const SUPER_ACTIVE_BPS: u32 = 8_000;
const CONSISTENT_BPS: u32 = 8_000;
const LEANING_BPS: u32 = 6_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VoterClass {
    /// No recorded votes in the window
    Inactive,
    /// Voted on at least 80% of the window's proposals
    SuperActive,
    /// At least 80% of directional votes share one direction
    Consistent,
    YesLeaning,
    NoLeaning,
    Balanced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterProfile {
    pub voter: Address,
    pub proposals_voted: u64,
    pub participation_bps: u32,
    pub inferred_yes: u64,
    pub inferred_no: u64,
    pub inferred_abstain: u64,
    /// Votes on proposals whose tally had no single plurality
    pub undetermined: u64,
    pub class: VoterClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterBehaviorReport {
    pub start_id: u64,
    pub end_id: u64,
    pub proposals_in_window: u64,
    pub candidates_considered: u64,
    /// Directions come from tallies, not ballots
    pub direction_inferred: bool,
    pub profiles: Vec<VoterProfile>,
    pub class_counts: BTreeMap<VoterClass, u64>,
}

pub struct VoterAnalyzer {
    proposals: Arc<dyn ProposalRegistry>,
    token: Arc<dyn TokenRegistry>,
    max_candidates: usize,
}

impl VoterAnalyzer {
    pub fn new(
        proposals: Arc<dyn ProposalRegistry>,
        token: Arc<dyn TokenRegistry>,
        max_candidates: usize,
    ) -> Self {
        Self {
            proposals,
            token,
            max_candidates,
        }
    }

    /// Classify the candidate set against the proposals of one window.
    ///
    /// `fallback_top` is used as the seed delegate when the token registry has no
    /// snapshot naming one.
    pub fn analyze(
        &self,
        start_id: u64,
        end_id: u64,
        window: &[ProposalRecord],
        fallback_top: Option<Address>,
    ) -> VoterBehaviorReport {
        let candidates = self.candidates(window, fallback_top);
        let mut profiles = Vec::with_capacity(candidates.len());
        let mut class_counts: BTreeMap<VoterClass, u64> = BTreeMap::new();

        for voter in &candidates {
            let profile = self.profile(voter, window);
            *class_counts.entry(profile.class).or_default() += 1;
            profiles.push(profile);
        }

        info!(
            start_id,
            end_id,
            proposals = window.len(),
            candidates = candidates.len(),
            "🗳️ Voter behaviour analysed"
        );

        VoterBehaviorReport {
            start_id,
            end_id,
            proposals_in_window: window.len() as u64,
            candidates_considered: candidates.len() as u64,
            direction_inferred: true,
            profiles,
            class_counts,
        }
    }

    /// Top delegate, its direct delegators, then every proposer; deduplicated and capped
    fn candidates(&self, window: &[ProposalRecord], fallback_top: Option<Address>) -> Vec<Address> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut push = |candidate: Address, candidates: &mut Vec<Address>| {
            if candidates.len() < self.max_candidates && !candidate.is_null() && seen.insert(candidate) {
                candidates.push(candidate);
            }
        };

        if let Some(top) = self.top_delegate().or(fallback_top) {
            push(top, &mut candidates);
            for delegator in direct_delegators(self.token.as_ref(), &top) {
                push(delegator, &mut candidates);
            }
        }
        for record in window {
            push(record.proposer, &mut candidates);
        }

        candidates
    }

    fn top_delegate(&self) -> Option<Address> {
        let snapshot_id = self.token.current_snapshot_id().ok()?;
        match self.token.snapshot_metrics(snapshot_id) {
            Ok(metrics) => metrics.top_delegate,
            Err(e) => {
                debug!(snapshot_id, error = %e, "No snapshot top delegate, using recorder");
                None
            }
        }
    }

    fn profile(&self, voter: &Address, window: &[ProposalRecord]) -> VoterProfile {
        let mut voted = 0u64;
        let mut counts: BTreeMap<VoteDirection, u64> = BTreeMap::new();
        let mut undetermined = 0u64;

        for record in window {
            let weight = match self.proposals.voter_weight(record.id, voter) {
                Ok(weight) => weight,
                Err(e) => {
                    debug!(proposal_id = record.id, voter = %voter, error = %e, "Skipping unreadable voter weight");
                    continue;
                }
            };
            if weight.is_zero() {
                continue;
            }
            voted += 1;
            match record.votes.plurality() {
                Some(direction) => *counts.entry(direction).or_default() += 1,
                None => undetermined += 1,
            }
        }

        let count = |d: VoteDirection| counts.get(&d).copied().unwrap_or(0);
        let participation_bps = ratio_bps(voted as u128, window.len() as u128);
        let class = classify(
            voted,
            participation_bps,
            count(VoteDirection::Yes),
            count(VoteDirection::No),
            count(VoteDirection::Abstain),
        );

        VoterProfile {
            voter: *voter,
            proposals_voted: voted,
            participation_bps,
            inferred_yes: count(VoteDirection::Yes),
            inferred_no: count(VoteDirection::No),
            inferred_abstain: count(VoteDirection::Abstain),
            undetermined,
            class,
        }
    }
}

/// First matching rule wins: Inactive, SuperActive, Consistent, Yes/NoLeaning, Balanced
pub fn classify(voted: u64, participation_bps: u32, yes: u64, no: u64, abstain: u64) -> VoterClass {
    if voted == 0 {
        return VoterClass::Inactive;
    }
    if participation_bps >= SUPER_ACTIVE_BPS {
        return VoterClass::SuperActive;
    }

    let directional = (yes + no + abstain) as u128;
    let share = |n: u64| ratio_bps(n as u128, directional);
    let dominant = yes.max(no).max(abstain);

    if directional > 0 && share(dominant) >= CONSISTENT_BPS {
        VoterClass::Consistent
    } else if share(yes) >= LEANING_BPS {
        VoterClass::YesLeaning
    } else if share(no) >= LEANING_BPS {
        VoterClass::NoLeaning
    } else {
        VoterClass::Balanced
    }
}
