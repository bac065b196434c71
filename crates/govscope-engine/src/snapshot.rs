//! Append-only log of sealed analytics snapshots
//!
//! Each entry carries a blake3 digest over the canonical JSON of its content, so a
//! copy exported elsewhere can be checked with [`AnalyticsSnapshot::verify`].

use crate::error::Result;
use crate::health::HealthScore;
use crate::metrics;
use crate::proposals::ProposalAnalytics;
use crate::timelock::TimelockAnalytics;
use crate::types::ConcentrationEntry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Everything a snapshot records, minus its seal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotContent {
    /// Assigned by the log on append
    pub sequence: u64,
    pub captured_at: u64,
    pub start_id: u64,
    pub end_id: u64,
    pub proposals: ProposalAnalytics,
    pub timelock: TimelockAnalytics,
    pub health: HealthScore,
    pub top_concentration: Vec<ConcentrationEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub content: SnapshotContent,
    /// Hex blake3 of `content` as JSON
    pub digest: String,
}

impl AnalyticsSnapshot {
    pub fn seal(content: SnapshotContent) -> Result<Self> {
        let digest = digest_of(&content)?;
        Ok(Self { content, digest })
    }

    /// Recompute the digest and compare
    pub fn verify(&self) -> bool {
        match digest_of(&self.content) {
            Ok(digest) => digest == self.digest,
            Err(e) => {
                warn!(sequence = self.content.sequence, error = %e, "Snapshot content failed to serialize");
                false
            }
        }
    }
}

fn digest_of(content: &SnapshotContent) -> Result<String> {
    let bytes = serde_json::to_vec(content)?;
    Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
}

#[derive(Default)]
pub struct SnapshotLog {
    entries: RwLock<Vec<AnalyticsSnapshot>>,
}

impl SnapshotLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next sequence number, seal and append
    pub fn append(&self, mut content: SnapshotContent) -> Result<AnalyticsSnapshot> {
        let mut entries = self.entries.write();
        content.sequence = entries.len() as u64;
        let snapshot = AnalyticsSnapshot::seal(content)?;
        entries.push(snapshot.clone());

        metrics::SNAPSHOTS_APPENDED.inc();
        info!(
            sequence = snapshot.content.sequence,
            start_id = snapshot.content.start_id,
            end_id = snapshot.content.end_id,
            health = snapshot.content.health.total,
            digest = %&snapshot.digest[..16],
            "📸 Analytics snapshot appended"
        );
        Ok(snapshot)
    }

    pub fn snapshots(&self) -> Vec<AnalyticsSnapshot> {
        self.entries.read().clone()
    }

    pub fn latest(&self) -> Option<AnalyticsSnapshot> {
        self.entries.read().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.entries.read())?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.export_json()?;
        std::fs::write(path.as_ref(), json)?;
        info!(path = %path.as_ref().display(), entries = self.len(), "💾 Snapshot log exported");
        Ok(())
    }
}
