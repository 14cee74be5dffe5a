//! Generation tracker - identifies the newest unit of diff work.
//!
//! Each `submit_list` allocates a generation. Results are committed only if
//! their generation is still the latest scheduled one and newer than the
//! last committed one, so a slow diff that finishes after a faster, later
//! one is dropped.
//!
//! Same idea as the epoch counter used to skip stale worker jobs, but with
//! two counters: `scheduled` moves on submit, `finished` on commit.

/// Pair of monotonic counters. Invariant: `finished <= scheduled`.
///
/// Not synchronized on its own; the differ keeps it under the same lock as
/// the live list so generation and list are captured atomically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationTracker {
    scheduled: u64,
    finished: u64,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next generation
    pub fn next_scheduled(&mut self) -> u64 {
        self.scheduled += 1;
        self.scheduled
    }

    /// Try to commit `generation`.
    ///
    /// Returns true only if it is the latest scheduled generation and
    /// strictly newer than the last finished one.
    pub fn finish(&mut self, generation: u64) -> bool {
        let accepted = self.scheduled == generation && generation > self.finished;
        if accepted {
            self.finished = generation;
        }
        accepted
    }

    /// Mark everything scheduled so far as finished, so in-flight results
    /// become stale. Returns whether anything was in flight.
    pub fn finish_max(&mut self) -> bool {
        let in_flight = self.has_unfinished();
        self.finished = self.scheduled;
        in_flight
    }

    pub fn has_unfinished(&self) -> bool {
        self.scheduled > self.finished
    }

    pub fn scheduled(&self) -> u64 {
        self.scheduled
    }

    pub fn finished(&self) -> u64 {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_generation_commits() {
        let mut tracker = GenerationTracker::new();
        let g1 = tracker.next_scheduled();
        assert!(tracker.has_unfinished());
        assert!(tracker.finish(g1));
        assert!(!tracker.has_unfinished());
        assert_eq!(tracker.finished(), 1);
    }

    #[test]
    fn test_superseded_generation_rejected() {
        let mut tracker = GenerationTracker::new();
        let g1 = tracker.next_scheduled();
        let g2 = tracker.next_scheduled();
        // g1 completes late, after g2 was scheduled
        assert!(!tracker.finish(g1));
        assert!(tracker.finish(g2));
        // and never after g2 committed
        assert!(!tracker.finish(g1));
    }

    #[test]
    fn test_no_double_commit() {
        let mut tracker = GenerationTracker::new();
        let g = tracker.next_scheduled();
        assert!(tracker.finish(g));
        assert!(!tracker.finish(g));
    }

    #[test]
    fn test_finish_max_poisons_in_flight() {
        let mut tracker = GenerationTracker::new();
        assert!(!tracker.finish_max());

        let g = tracker.next_scheduled();
        assert!(tracker.finish_max());
        assert!(!tracker.finish(g));
        assert_eq!(tracker.finished(), tracker.scheduled());
        assert!(!tracker.finish_max());
    }
}
