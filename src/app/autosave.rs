use std::time::{Duration, Instant};

use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    Idle {
        last_saved_at: Option<OffsetDateTime>,
    },
    Pending {
        since: OffsetDateTime,
    },
    Error {
        message: String,
        occurred_at: OffsetDateTime,
    },
}

/// Tracks whether the open draft has edits the store has not seen yet.
///
/// With a zero debounce every change is due immediately, which gives the
/// write-on-every-change behaviour. Only the latest draft is ever written, so
/// deferring commits never reorders or drops edits.
#[derive(Debug)]
pub struct CommitScheduler {
    debounce: Duration,
    dirty_since: Option<Instant>,
    dirty_since_wall: Option<OffsetDateTime>,
    last_saved_at: Option<OffsetDateTime>,
    last_error: Option<CommitFailure>,
}

#[derive(Debug, Clone)]
struct CommitFailure {
    message: String,
    occurred_at: OffsetDateTime,
}

impl CommitScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            dirty_since: None,
            dirty_since_wall: None,
            last_saved_at: None,
            last_error: None,
        }
    }

    pub fn is_immediate(&self) -> bool {
        self.debounce.is_zero()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_since.is_some()
    }

    /// Keeps the first dirty instant so a steady stream of keystrokes still
    /// commits once per debounce window.
    pub fn mark_dirty(&mut self) {
        if self.dirty_since.is_none() {
            self.dirty_since = Some(Instant::now());
            self.dirty_since_wall = Some(OffsetDateTime::now_utc());
        }
    }

    pub fn is_due(&self) -> bool {
        self.dirty_since
            .map(|since| since.elapsed() >= self.debounce)
            .unwrap_or(false)
    }

    pub fn mark_saved(&mut self, at: OffsetDateTime) {
        self.dirty_since = None;
        self.dirty_since_wall = None;
        self.last_saved_at = Some(at);
        self.last_error = None;
    }

    /// Failed commits are not retried; the draft stays in memory and the next
    /// edit schedules a fresh commit.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.dirty_since = None;
        self.dirty_since_wall = None;
        self.last_error = Some(CommitFailure {
            message: message.into(),
            occurred_at: OffsetDateTime::now_utc(),
        });
    }

    pub fn reset(&mut self) {
        self.dirty_since = None;
        self.dirty_since_wall = None;
        self.last_saved_at = None;
        self.last_error = None;
    }

    pub fn status(&self) -> CommitStatus {
        if let Some(failure) = &self.last_error {
            return CommitStatus::Error {
                message: failure.message.clone(),
                occurred_at: failure.occurred_at,
            };
        }
        if let Some(since) = self.dirty_since_wall {
            return CommitStatus::Pending { since };
        }
        CommitStatus::Idle {
            last_saved_at: self.last_saved_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn zero_debounce_is_due_as_soon_as_dirty() {
        let mut scheduler = CommitScheduler::new(Duration::ZERO);
        assert!(scheduler.is_immediate());
        assert!(!scheduler.is_due());
        scheduler.mark_dirty();
        assert!(scheduler.is_due());
        assert_matches!(scheduler.status(), CommitStatus::Pending { .. });
    }

    #[test]
    fn long_debounce_waits() {
        let mut scheduler = CommitScheduler::new(Duration::from_secs(3600));
        scheduler.mark_dirty();
        assert!(scheduler.is_dirty());
        assert!(!scheduler.is_due());
    }

    #[test]
    fn failure_clears_dirty_state_and_saving_clears_failure() {
        let mut scheduler = CommitScheduler::new(Duration::ZERO);
        scheduler.mark_dirty();
        scheduler.record_failure("disk full");
        assert!(!scheduler.is_dirty());
        assert_matches!(scheduler.status(), CommitStatus::Error { ref message, .. } if message == "disk full");

        let saved_at = OffsetDateTime::now_utc();
        scheduler.mark_dirty();
        scheduler.mark_saved(saved_at);
        assert_eq!(
            scheduler.status(),
            CommitStatus::Idle {
                last_saved_at: Some(saved_at)
            }
        );
    }
}
