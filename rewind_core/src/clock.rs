// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Replay time correction and pause/resume bookkeeping.
//!
//! During replay every recorded timestamp is shifted by a single correction
//! offset, `replay_start - record_start`, and then passed through the pause
//! clamp:
//!
//! ```text
//!   t == 0                     → 0              (unset stays unset)
//!   boundary set && t ≥ boundary → boundary - paused_total
//!   otherwise                  → t - paused_total
//! ```
//!
//! [`pause_at`](ReplayClock::pause_at) arms a boundary; once real time has
//! passed it, everything is frozen at the boundary until
//! [`resume`](ReplayClock::resume) folds the time spent past the boundary
//! into `paused_total`. Corrected time is therefore non-decreasing across any
//! number of pause/resume cycles, and no physical pause time leaks into
//! logical replay time.

use crate::time::{Duration, HostTime};

/// Time-virtualization state for one replay session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayClock {
    correction: i64,
    replay_start: HostTime,
    record_start: HostTime,
    boundary: HostTime,
    paused_total: Duration,
}

impl ReplayClock {
    /// Creates a clock with no correction and no pause.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            correction: 0,
            replay_start: HostTime::ZERO,
            record_start: HostTime::ZERO,
            boundary: HostTime::ZERO,
            paused_total: Duration::ZERO,
        }
    }

    /// Sets the correction offset from the replay and recorded start times.
    pub fn set_correction(&mut self, replay_start: HostTime, record_start: HostTime) {
        self.replay_start = replay_start;
        self.record_start = record_start;
        self.correction = replay_start.nanos() as i64 - record_start.nanos() as i64;
    }

    /// Returns the signed correction in nanoseconds.
    #[must_use]
    pub const fn correction(&self) -> i64 {
        self.correction
    }

    /// Returns the replay start time.
    #[must_use]
    pub const fn replay_start(&self) -> HostTime {
        self.replay_start
    }

    /// Returns the recorded start time.
    #[must_use]
    pub const fn record_start(&self) -> HostTime {
        self.record_start
    }

    /// Returns the armed pause boundary, if any.
    #[must_use]
    pub const fn pause_boundary(&self) -> Option<HostTime> {
        if self.boundary.is_zero() {
            None
        } else {
            Some(self.boundary)
        }
    }

    /// Returns the total time spent paused so far.
    #[must_use]
    pub const fn paused_total(&self) -> Duration {
        self.paused_total
    }

    /// Arms `until` as the next pause boundary.
    ///
    /// If a boundary is already armed and `now` is past it, the overrun is
    /// folded into the paused total first.
    pub fn pause_at(&mut self, now: HostTime, until: HostTime) {
        self.fold_overrun(now);
        self.boundary = until;
    }

    /// Resumes after a pause, folding the time spent past the boundary into
    /// the paused total and disarming the boundary.
    pub fn resume(&mut self, now: HostTime) {
        self.fold_overrun(now);
        self.boundary = HostTime::ZERO;
    }

    /// Drops the correction and all pause state.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Applies the pause clamp to an already corrected timestamp.
    #[must_use]
    pub fn patch(&self, time: HostTime) -> HostTime {
        if time.is_zero() {
            return HostTime::ZERO;
        }
        if !self.boundary.is_zero() && time >= self.boundary {
            return self.boundary.saturating_sub(self.paused_total);
        }
        time.saturating_sub(self.paused_total)
    }

    /// Shifts a recorded timestamp into replay time, then applies the pause
    /// clamp.
    #[must_use]
    pub fn patch_transaction(&self, time: HostTime) -> HostTime {
        if time.is_zero() {
            return HostTime::ZERO;
        }
        self.patch(time.saturating_add_signed(self.correction))
    }

    fn fold_overrun(&mut self, now: HostTime) {
        if !self.boundary.is_zero() && now > self.boundary {
            self.paused_total = self
                .paused_total
                .saturating_add(now.saturating_duration_since(self.boundary));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    #[test]
    fn unset_time_passes_through() {
        let mut clock = ReplayClock::new();
        clock.set_correction(HostTime(1_000), HostTime(100));
        assert_eq!(clock.patch(HostTime::ZERO), HostTime::ZERO);
        assert_eq!(clock.patch_transaction(HostTime::ZERO), HostTime::ZERO);
    }

    #[test]
    fn correction_shifts_recorded_time() {
        let mut clock = ReplayClock::new();
        clock.set_correction(HostTime(5_000), HostTime(1_000));
        assert_eq!(clock.correction(), 4_000);
        assert_eq!(clock.patch_transaction(HostTime(1_500)), HostTime(5_500));
    }

    #[test]
    fn negative_correction() {
        let mut clock = ReplayClock::new();
        clock.set_correction(HostTime(1_000), HostTime(5_000));
        assert_eq!(clock.patch_transaction(HostTime(6_000)), HostTime(2_000));
    }

    #[test]
    fn pause_clamps_then_resume_subtracts() {
        let mut clock = ReplayClock::new();
        clock.pause_at(HostTime(100), HostTime(200));
        assert_eq!(clock.patch(HostTime(150)), HostTime(150));
        assert_eq!(clock.patch(HostTime(250)), HostTime(200), "clamped");
        assert_eq!(clock.patch(HostTime(900)), HostTime(200), "still clamped");

        clock.resume(HostTime(300));
        assert_eq!(clock.paused_total(), Duration(100));
        assert_eq!(clock.pause_boundary(), None);
        assert_eq!(clock.patch(HostTime(300)), HostTime(200), "continues from boundary");
        assert_eq!(clock.patch(HostTime(350)), HostTime(250));
    }

    #[test]
    fn resume_before_boundary_adds_nothing() {
        let mut clock = ReplayClock::new();
        clock.pause_at(HostTime(100), HostTime(500));
        clock.resume(HostTime(200));
        assert_eq!(clock.paused_total(), Duration::ZERO);
        assert_eq!(clock.patch(HostTime(600)), HostTime(600));
    }

    #[test]
    fn rearming_past_boundary_folds_overrun() {
        let mut clock = ReplayClock::new();
        clock.pause_at(HostTime(0), HostTime(100));
        clock.pause_at(HostTime(160), HostTime(300));
        assert_eq!(clock.paused_total(), Duration(60));
        assert_eq!(clock.patch(HostTime(200)), HostTime(140));
    }

    #[test]
    fn clear_resets_everything() {
        let mut clock = ReplayClock::new();
        clock.set_correction(HostTime(10), HostTime(1));
        clock.pause_at(HostTime(0), HostTime(5));
        clock.resume(HostTime(9));
        clock.clear();
        assert_eq!(clock, ReplayClock::new());
    }

    #[derive(Clone, Copy, Debug)]
    enum Step {
        Advance(u64),
        Pause(u64),
        Resume,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (1_u64..1_000).prop_map(Step::Advance),
            (0_u64..2_000).prop_map(Step::Pause),
            Just(Step::Resume),
        ]
    }

    proptest! {
        #[test]
        fn corrected_time_is_monotonic_and_excludes_pauses(steps in prop::collection::vec(step(), 1..64)) {
            let mut clock = ReplayClock::new();
            let start = HostTime(1);
            let mut now = start;
            let mut outputs = Vec::new();
            outputs.push(clock.patch(now));

            for s in steps {
                match s {
                    Step::Advance(d) => now = now + Duration(d),
                    Step::Pause(ahead) => clock.pause_at(now, now + Duration(ahead)),
                    Step::Resume => clock.resume(now),
                }
                outputs.push(clock.patch(now));
            }

            for pair in outputs.windows(2) {
                prop_assert!(pair[0] <= pair[1], "corrected time went backwards: {:?}", pair);
            }

            // Close any open pause so the paused total is final.
            clock.resume(now);
            let logical = clock.patch(now).saturating_duration_since(outputs[0]);
            let real = now.saturating_duration_since(start);
            prop_assert_eq!(logical, real.saturating_sub(clock.paused_total()));
        }
    }
}
