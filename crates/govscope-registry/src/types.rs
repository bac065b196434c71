use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One basis point is 1/10000
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Token quantity in base units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub const fn new(units: u128) -> Self {
        Self(units)
    }

    pub fn units(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Share of `total` in basis points, rounded half-up. Zero when `total` is zero.
    pub fn share_bps(&self, total: TokenAmount) -> u32 {
        ratio_bps(self.0, total.0)
    }
}

impl std::iter::Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc.saturating_add(x))
    }
}

impl From<u128> for TokenAmount {
    fn from(units: u128) -> Self {
        Self(units)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `numerator / denominator` in basis points, rounded half-up.
///
/// 2/3 maps to 6667. Returns 0 for a zero denominator.
pub fn ratio_bps(numerator: u128, denominator: u128) -> u32 {
    if denominator == 0 {
        return 0;
    }
    let scaled = numerator
        .saturating_mul(BPS_DENOMINATOR)
        .saturating_add(denominator / 2)
        / denominator;
    scaled.min(u32::MAX as u128) as u32
}

/// 32-byte account identity. The all-zero address is the null sentinel.
///
/// Serialized as a `0x`-prefixed hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; 32]);

impl Address {
    /// "No delegate" marker
    pub const NULL: Self = Self([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Short test/fixture constructor: every byte set to `byte`
    pub const fn repeat(byte: u8) -> Self {
        Self([byte; 32])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(address: &str) -> Result<Self> {
        let hex_str = address.strip_prefix("0x").unwrap_or(address);
        let bytes = hex::decode(hex_str)
            .map_err(|e| RegistryError::Rejected(format!("Invalid hex address: {}", e)))?;

        if bytes.len() != 32 {
            return Err(RegistryError::Rejected(format!(
                "Invalid address length: expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

/// Timelock transaction identifier
pub type TxHash = [u8; 32];

/// Proposal category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProposalType {
    General,
    Withdrawal,
    TokenTransfer,
    GovernanceChange,
    ExternalAssetTransfer,
    TokenMint,
    TokenBurn,
}

impl ProposalType {
    pub const ALL: [ProposalType; 7] = [
        ProposalType::General,
        ProposalType::Withdrawal,
        ProposalType::TokenTransfer,
        ProposalType::GovernanceChange,
        ProposalType::ExternalAssetTransfer,
        ProposalType::TokenMint,
        ProposalType::TokenBurn,
    ];
}

/// Proposal lifecycle state as reported by the proposal registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProposalState {
    Active,
    Canceled,
    Defeated,
    Succeeded,
    Queued,
    Executed,
    Expired,
}

impl ProposalState {
    /// Voting is over and the proposal was not withdrawn
    pub fn is_completed(&self) -> bool {
        !matches!(self, Self::Active | Self::Canceled)
    }
}

/// Risk classification of a queued transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub const ALL: [ThreatLevel; 4] = [
        ThreatLevel::Low,
        ThreatLevel::Medium,
        ThreatLevel::High,
        ThreatLevel::Critical,
    ];
}

/// Direction of a ballot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VoteDirection {
    Yes,
    No,
    Abstain,
}

/// Aggregate vote tallies for a proposal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub yes: TokenAmount,
    pub no: TokenAmount,
    pub abstain: TokenAmount,
}

impl VoteTally {
    pub fn new(yes: u128, no: u128, abstain: u128) -> Self {
        Self {
            yes: TokenAmount::new(yes),
            no: TokenAmount::new(no),
            abstain: TokenAmount::new(abstain),
        }
    }

    pub fn total(&self) -> TokenAmount {
        self.yes.saturating_add(self.no).saturating_add(self.abstain)
    }

    pub fn bucket(&self, direction: VoteDirection) -> TokenAmount {
        match direction {
            VoteDirection::Yes => self.yes,
            VoteDirection::No => self.no,
            VoteDirection::Abstain => self.abstain,
        }
    }

    /// Bucket holding strictly the most weight; `None` on ties or an empty tally
    pub fn plurality(&self) -> Option<VoteDirection> {
        let buckets = [
            (VoteDirection::Yes, self.yes),
            (VoteDirection::No, self.no),
            (VoteDirection::Abstain, self.abstain),
        ];
        let max = buckets.iter().map(|(_, w)| *w).max()?;
        if max.is_zero() {
            return None;
        }
        let mut leaders = buckets.iter().filter(|(_, w)| *w == max);
        let leader = leaders.next().map(|(d, _)| *d);
        if leaders.next().is_some() {
            None
        } else {
            leader
        }
    }

    /// True if every bucket of `next` is at least the matching bucket of `self`
    pub fn is_monotonic_successor(&self, next: &VoteTally) -> bool {
        next.yes >= self.yes && next.no >= self.no && next.abstain >= self.abstain
    }
}

/// Proposal as exposed by the proposal registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub id: u64,
    pub proposal_type: ProposalType,
    pub state: ProposalState,
    pub snapshot_id: u64,
    /// Unix seconds
    pub created_at: u64,
    /// Unix seconds
    pub deadline: u64,
    pub votes: VoteTally,
    pub proposer: Address,
    pub timelock_tx: Option<TxHash>,
}

/// Queued transaction as exposed by the timelock registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockTransaction {
    pub hash: TxHash,
    pub target: Address,
    pub value: TokenAmount,
    pub payload: Vec<u8>,
    /// Earliest execution time, unix seconds
    pub eta: u64,
    pub executed: bool,
}

/// Point-in-time token metrics for a snapshot id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetrics {
    pub total_supply: TokenAmount,
    pub active_holders: u64,
    pub active_delegates: u64,
    pub total_delegated: TokenAmount,
    pub top_delegate: Option<Address>,
    pub top_delegate_amount: TokenAmount,
}

/// Voting configuration of the proposal registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceParameters {
    /// Quorum as basis points of total supply
    pub quorum_bps: u32,
    pub voting_period_secs: u64,
    pub proposal_threshold: TokenAmount,
}

impl Default for GovernanceParameters {
    fn default() -> Self {
        Self {
            quorum_bps: 400,
            voting_period_secs: 7 * 24 * 3600,
            proposal_threshold: TokenAmount::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_bps_rounds_half_up() {
        assert_eq!(ratio_bps(2, 3), 6667);
        assert_eq!(ratio_bps(1, 3), 3333);
        assert_eq!(ratio_bps(1, 2), 5000);
        assert_eq!(ratio_bps(5, 5), 10_000);
        assert_eq!(ratio_bps(7, 0), 0);
    }

    #[test]
    fn test_address_hex_parsing() {
        let addr = Address::repeat(0xAB);
        let parsed = Address::from_hex(&addr.to_hex()).unwrap();
        assert_eq!(parsed, addr);

        assert!(Address::from_hex("0x1234").is_err());
        assert!(Address::from_hex("not-hex").is_err());
    }

    #[test]
    fn test_address_serializes_as_hex() {
        let addr = Address::repeat(0x0F);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "0f".repeat(32)));
        assert_eq!(serde_json::from_str::<Address>(&json).unwrap(), addr);
        assert!(serde_json::from_str::<Address>("\"0xzz\"").is_err());
    }

    #[test]
    fn test_null_sentinel() {
        assert!(Address::NULL.is_null());
        assert!(!Address::repeat(1).is_null());
        assert_eq!(format!("{}", Address::repeat(0x11)), "0x1111111111111111");
    }

    #[test]
    fn test_vote_tally_monotonicity() {
        let before = VoteTally::new(10, 5, 0);
        assert!(before.is_monotonic_successor(&VoteTally::new(12, 5, 1)));
        assert!(!before.is_monotonic_successor(&VoteTally::new(9, 6, 0)));
        assert_eq!(before.total(), TokenAmount::new(15));
    }

    #[test]
    fn test_plurality() {
        assert_eq!(VoteTally::new(10, 5, 1).plurality(), Some(VoteDirection::Yes));
        assert_eq!(VoteTally::new(1, 5, 1).plurality(), Some(VoteDirection::No));
        assert_eq!(VoteTally::new(1, 1, 9).plurality(), Some(VoteDirection::Abstain));
        assert_eq!(VoteTally::new(5, 5, 1).plurality(), None);
        assert_eq!(VoteTally::default().plurality(), None);
    }

    #[test]
    fn test_completed_states() {
        assert!(!ProposalState::Active.is_completed());
        assert!(!ProposalState::Canceled.is_completed());
        assert!(ProposalState::Executed.is_completed());
        assert!(ProposalState::Defeated.is_completed());
    }
}
