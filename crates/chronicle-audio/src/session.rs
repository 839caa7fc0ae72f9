//! Per-client audio session state and conversation rotation (§4.4).

use crate::keys::SessionStatus;

/// Snapshot of `audio:session:{id}` plus the persistence job's own
/// bookkeeping, enough to decide whether to terminate or rotate output.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub sample_rate: u32,
    pub current_conversation_id: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::Active,
            sample_rate: 16_000,
            current_conversation_id: None,
        }
    }
}

/// Tracks whether a persistence job should keep draining, and when a
/// conversation rotation requires closing the current output file.
#[derive(Debug, Default)]
pub struct RotationTracker {
    open_conversation_id: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RotationAction {
    None,
    Open(String),
    CloseThenOpen { close: String, open: String },
    Close,
}

impl RotationTracker {
    pub fn observe(&mut self, current_conversation_id: Option<&str>) -> RotationAction {
        match (&self.open_conversation_id, current_conversation_id) {
            (None, None) => RotationAction::None,
            (None, Some(new_id)) => {
                self.open_conversation_id = Some(new_id.to_string());
                RotationAction::Open(new_id.to_string())
            }
            (Some(_), None) => {
                self.open_conversation_id = None;
                RotationAction::Close
            }
            (Some(open), Some(new_id)) if open == new_id => RotationAction::None,
            (Some(open), Some(new_id)) => {
                let close = open.clone();
                self.open_conversation_id = Some(new_id.to_string());
                RotationAction::CloseThenOpen {
                    close,
                    open: new_id.to_string(),
                }
            }
        }
    }
}

/// File name for a rotated output, matching
/// `{timestamp}_{client_id}_{conversation_id}.wav`.
pub fn output_filename(timestamp_unix: i64, client_id: &str, conversation_id: &str) -> String {
    format!("{timestamp_unix}_{client_id}_{conversation_id}.wav")
}

/// Termination reasons for the audio persistence job (§4.4 a-d).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    EndMarkerDrained,
    SessionComplete,
    JobZombie,
    MaxDurationElapsed,
}

const CONSECUTIVE_EMPTY_READS_TO_END: u32 = 3;
pub const MAX_JOB_DURATION_SECS: u64 = 23 * 3600 + 59 * 60;

/// Drives condition (a): end-marker seen, then drained on 3 consecutive
/// empty reads.
#[derive(Debug, Default)]
pub struct EndMarkerDrain {
    end_marker_seen: bool,
    consecutive_empty_reads: u32,
}

impl EndMarkerDrain {
    pub fn observe_end_marker(&mut self) {
        self.end_marker_seen = true;
    }

    /// Call once per poll iteration with whether this read yielded any
    /// entries. Returns true once drain is complete.
    pub fn observe_read(&mut self, had_entries: bool) -> bool {
        if had_entries {
            self.consecutive_empty_reads = 0;
            return false;
        }
        self.consecutive_empty_reads += 1;
        self.end_marker_seen && self.consecutive_empty_reads >= CONSECUTIVE_EMPTY_READS_TO_END
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_opens_on_first_conversation() {
        let mut tracker = RotationTracker::default();
        assert_eq!(
            tracker.observe(Some("conv-1")),
            RotationAction::Open("conv-1".into())
        );
    }

    #[test]
    fn rotation_closes_and_opens_on_conversation_change() {
        let mut tracker = RotationTracker::default();
        tracker.observe(Some("conv-1"));
        assert_eq!(
            tracker.observe(Some("conv-2")),
            RotationAction::CloseThenOpen {
                close: "conv-1".into(),
                open: "conv-2".into(),
            }
        );
    }

    #[test]
    fn rotation_closes_when_key_deleted() {
        let mut tracker = RotationTracker::default();
        tracker.observe(Some("conv-1"));
        assert_eq!(tracker.observe(None), RotationAction::Close);
    }

    #[test]
    fn end_marker_drain_requires_three_consecutive_empty_reads() {
        let mut drain = EndMarkerDrain::default();
        drain.observe_end_marker();
        assert!(!drain.observe_read(false));
        assert!(!drain.observe_read(false));
        assert!(drain.observe_read(false));
    }

    #[test]
    fn end_marker_drain_resets_on_nonempty_read() {
        let mut drain = EndMarkerDrain::default();
        drain.observe_end_marker();
        drain.observe_read(false);
        drain.observe_read(true);
        assert!(!drain.observe_read(false));
    }
}
