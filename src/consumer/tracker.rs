use crate::models::constants::MAX_CONSUMER_CRASHES;

/// What to do after the consumer exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Exit code 0; supervision ends.
    Clean,
    /// Crash within the threshold.
    Relaunch,
    /// One crash too many.
    Fatal,
}

/// Consecutive crash count against a fixed threshold.
#[derive(Debug, Clone, Copy)]
pub struct CrashTracker {
    crashes: u32,
    threshold: u32,
}

impl Default for CrashTracker {
    fn default() -> Self {
        Self::new(MAX_CONSUMER_CRASHES)
    }
}

impl CrashTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            crashes: 0,
            threshold,
        }
    }

    pub fn crashes(&self) -> u32 {
        self.crashes
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Relaunch iff the crash count after this exit is within the threshold.
    pub fn record(&mut self, exit_code: i32) -> Verdict {
        if exit_code == 0 {
            self.crashes = 0;
            return Verdict::Clean;
        }

        self.crashes = self.crashes.saturating_add(1);
        if self.crashes > self.threshold {
            Verdict::Fatal
        } else {
            Verdict::Relaunch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relaunch_up_to_threshold() {
        let mut tracker = CrashTracker::new(3);
        assert_eq!(tracker.record(139), Verdict::Relaunch);
        assert_eq!(tracker.record(139), Verdict::Relaunch);
        assert_eq!(tracker.record(1), Verdict::Relaunch);
        assert_eq!(tracker.record(139), Verdict::Fatal);
        assert_eq!(tracker.crashes(), 4);
    }

    #[test]
    fn test_clean_exit_resets() {
        let mut tracker = CrashTracker::default();
        tracker.record(139);
        tracker.record(139);
        assert_eq!(tracker.record(0), Verdict::Clean);
        assert_eq!(tracker.crashes(), 0);
    }

    #[test]
    fn test_zero_threshold_is_fatal_on_first_crash() {
        let mut tracker = CrashTracker::new(0);
        assert_eq!(tracker.record(2), Verdict::Fatal);
    }
}
