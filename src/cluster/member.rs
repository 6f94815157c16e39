//! # Per-member liveness tracking.
//!
//! Every known member gets a [`MemberState`] on join, updated by each
//! heartbeat and dropped on leave. Suspicion is derived, never stored: a
//! member is suspect once it has missed [`MISSED_BEATS`] consecutive
//! heartbeat intervals. Gap statistics keep a rolling window so jittery
//! members can be told apart from dead ones.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::cluster::substrate::Member;

/// Interval at which members publish heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Consecutive missed intervals after which a member is suspect.
pub const MISSED_BEATS: u32 = 3;
/// Rolling window kept for gap statistics.
pub const STATS_WINDOW: Duration = Duration::from_secs(600);

/// Rolling numeric samples limited to a time window.
pub struct RollingStats {
    window: Duration,
    samples: VecDeque<(Instant, f64)>,
}

impl RollingStats {
    /// Creates empty statistics over the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Records a sample and prunes everything older than the window.
    pub fn push(&mut self, at: Instant, value: f64) {
        self.samples.push_back((at, value));
        while let Some((oldest, _)) = self.samples.front() {
            if at.duration_since(*oldest) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of samples currently in the window.
    pub fn count(&self) -> usize {
        self.samples.len()
    }

    /// Mean of the samples in the window, if any.
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|(_, v)| v).sum();
        Some(sum / self.samples.len() as f64)
    }

    /// Largest sample in the window, if any.
    pub fn max(&self) -> Option<f64> {
        self.samples
            .iter()
            .map(|(_, v)| *v)
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }
}

/// Liveness state of one cluster member.
pub struct MemberState {
    /// The member this state tracks.
    pub member: Member,
    last_heartbeat: Instant,
    gaps: RollingStats,
}

impl MemberState {
    /// Creates state for a member seen now.
    pub fn new(member: Member) -> Self {
        Self {
            member,
            last_heartbeat: Instant::now(),
            gaps: RollingStats::new(STATS_WINDOW),
        }
    }

    /// Records a heartbeat, folding the gap since the previous one into the
    /// statistics.
    pub fn beat(&mut self, at: Instant) {
        let gap = at.duration_since(self.last_heartbeat);
        self.gaps.push(at, gap.as_secs_f64());
        self.last_heartbeat = at;
    }

    /// When the last heartbeat arrived.
    pub fn last_heartbeat(&self) -> Instant {
        self.last_heartbeat
    }

    /// Whether the member has missed enough intervals to be suspect.
    pub fn is_suspect(&self, now: Instant) -> bool {
        now.duration_since(self.last_heartbeat) > HEARTBEAT_INTERVAL * MISSED_BEATS
    }

    /// Gap statistics over the rolling window.
    pub fn gap_stats(&self) -> &RollingStats {
        &self.gaps
    }
}
