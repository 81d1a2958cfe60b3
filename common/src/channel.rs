use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One named stream address listed in a playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub address: String,
}

impl Channel {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Outcome of capturing one channel's thumbnail.
///
/// `image_data` is `None` when the capture failed; the page renders a placeholder for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub name: String,
    pub image_data: Option<Bytes>,
}

impl CaptureResult {
    pub fn captured(name: impl Into<String>, image_data: Bytes) -> Self {
        Self {
            name: name.into(),
            image_data: Some(image_data),
        }
    }

    pub fn failed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_data: None,
        }
    }

    pub fn is_captured(&self) -> bool {
        self.image_data.is_some()
    }
}

/// The thumbnails of one completed refresh cycle, in channel order.
///
/// Never mutated after publication; each cycle builds a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// 0 for the empty startup snapshot, then 1, 2, ... per completed cycle.
    pub cycle: u64,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Vec<CaptureResult>,
}

impl Snapshot {
    /// The snapshot readers see before the first cycle completes.
    pub fn empty() -> Self {
        Self {
            cycle: 0,
            completed_at: None,
            results: Vec::new(),
        }
    }

    pub fn new(cycle: u64, results: Vec<CaptureResult>) -> Self {
        Self {
            cycle,
            completed_at: Some(Utc::now()),
            results,
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn captured_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_captured()).count()
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            cycle: self.cycle,
            completed_at: self.completed_at,
            channels: self
                .results
                .iter()
                .map(|r| ChannelSummary {
                    name: r.name.clone(),
                    available: r.is_captured(),
                })
                .collect(),
        }
    }
}

/// JSON view of a snapshot without the image payloads.
#[derive(Debug, Serialize)]
pub struct SnapshotSummary {
    pub cycle: u64,
    pub completed_at: Option<DateTime<Utc>>,
    pub channels: Vec<ChannelSummary>,
}

#[derive(Debug, Serialize)]
pub struct ChannelSummary {
    pub name: String,
    pub available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_no_cycle() {
        let snapshot = Snapshot::empty();
        assert_eq!(snapshot.cycle, 0);
        assert!(snapshot.completed_at.is_none());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn summary_marks_failed_captures_unavailable() {
        let snapshot = Snapshot::new(
            3,
            vec![
                CaptureResult::captured("One", Bytes::from_static(b"\x89PNG")),
                CaptureResult::failed("Two"),
            ],
        );
        assert_eq!(snapshot.captured_count(), 1);

        let summary = snapshot.summary();
        assert_eq!(summary.cycle, 3);
        assert_eq!(summary.channels.len(), 2);
        assert!(summary.channels[0].available);
        assert_eq!(summary.channels[1].name, "Two");
        assert!(!summary.channels[1].available);
    }
}
