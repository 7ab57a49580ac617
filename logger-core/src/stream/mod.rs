//! Rate-limited sample streaming.
//!
//! [`StreamScheduler`] decides, once per loop iteration, whether one sample is
//! due. Emission targets advance by whole intervals so scheduling jitter never
//! drifts the sample rate; a backlog beyond two intervals resynchronizes to
//! the present instead of bursting, trading sample-count accuracy under
//! sustained overload for bounded output burstiness.

use core::fmt::Write;

use heapless::String;

use crate::clock::{interval_for_rate, ticks_elapsed};

/// Worst case: six `i16` axes with signs, separators, and CRLF.
pub const MAX_SAMPLE_LINE: usize = 64;

/// Formatted sample line ready for the transport.
pub type SampleLine = String<MAX_SAMPLE_LINE>;

/// Outcome of one scheduler poll.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Emission {
    /// Not yet time for a sample.
    Idle,
    /// Emit one sample; the target advanced by one interval.
    Sample,
    /// Emit one sample; the backlog exceeded two intervals and the target
    /// snapped to the present.
    Resynced,
}

impl Emission {
    /// Returns `true` when a sample should be emitted.
    #[must_use]
    pub const fn is_due(self) -> bool {
        !matches!(self, Emission::Idle)
    }
}

/// Drift-free emission scheduler over the wrapping RTC tick counter.
#[derive(Clone, Debug)]
pub struct StreamScheduler {
    interval: u32,
    last_sample_ticks: Option<u32>,
}

impl StreamScheduler {
    /// Creates a scheduler for the given streaming rate.
    #[must_use]
    pub fn new(rate_hz: u16) -> Self {
        Self {
            interval: interval_for_rate(rate_hz),
            last_sample_ticks: None,
        }
    }

    /// Adopts a new streaming rate, keeping the current emission target.
    pub fn set_rate(&mut self, rate_hz: u16) {
        self.interval = interval_for_rate(rate_hz);
    }

    /// Current emission interval in ticks.
    #[must_use]
    pub const fn interval(&self) -> u32 {
        self.interval
    }

    /// Tick value of the last emission target, once armed.
    #[must_use]
    pub const fn last_sample_ticks(&self) -> Option<u32> {
        self.last_sample_ticks
    }

    /// Decides whether one sample is due at `now_ticks`.
    ///
    /// The first poll arms the scheduler without emitting. At most one sample
    /// is due per call regardless of backlog.
    pub fn poll(&mut self, now_ticks: u32) -> Emission {
        let Some(last) = self.last_sample_ticks else {
            self.last_sample_ticks = Some(now_ticks);
            return Emission::Idle;
        };

        if ticks_elapsed(now_ticks, last) <= self.interval {
            return Emission::Idle;
        }

        let advanced = last.wrapping_add(self.interval);
        if ticks_elapsed(now_ticks, advanced) > 2 * self.interval {
            // Not keeping up with the sample rate.
            self.last_sample_ticks = Some(now_ticks);
            Emission::Resynced
        } else {
            self.last_sample_ticks = Some(advanced);
            Emission::Sample
        }
    }
}

/// Formats axis readings as comma-separated signed integers with CRLF.
#[must_use]
pub fn format_sample(accel: [i16; 3], gyro: Option<[i16; 3]>) -> SampleLine {
    let mut line = SampleLine::new();
    // Capacity covers the worst case, so the writes cannot fail.
    let _ = write!(line, "{},{},{}", accel[0], accel[1], accel[2]);
    if let Some(gyro) = gyro {
        let _ = write!(line, ",{},{},{}", gyro[0], gyro[1], gyro[2]);
    }
    let _ = line.push_str("\r\n");
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_poll_arms_without_emitting() {
        let mut scheduler = StreamScheduler::new(100);
        assert_eq!(scheduler.poll(1000), Emission::Idle);
        assert_eq!(scheduler.last_sample_ticks(), Some(1000));
        // Same instant again: zero elapsed, still idle.
        assert_eq!(scheduler.poll(1000), Emission::Idle);
    }

    #[test]
    fn normal_load_advances_by_exactly_one_interval() {
        let mut scheduler = StreamScheduler::new(100);
        assert_eq!(scheduler.interval(), 655);
        scheduler.poll(1000);

        assert_eq!(scheduler.poll(1656), Emission::Sample);
        assert_eq!(scheduler.last_sample_ticks(), Some(1655));
        // 1656 - 1655 = 1 <= 655, so no further emission this instant.
        assert_eq!(scheduler.poll(1656), Emission::Idle);
    }

    #[test]
    fn elapsed_equal_to_interval_is_not_due() {
        let mut scheduler = StreamScheduler::new(100);
        scheduler.poll(1000);
        assert_eq!(scheduler.poll(1655), Emission::Idle);
        assert_eq!(scheduler.poll(1656), Emission::Sample);
    }

    #[test]
    fn overload_emits_once_and_resynchronizes() {
        let mut scheduler = StreamScheduler::new(100);
        scheduler.poll(1000);

        // 3000 - 1000 = 2000 ticks behind; after one advance the backlog is
        // 3000 - 1655 = 1345 > 2 * 655, so the target snaps to now.
        assert_eq!(scheduler.poll(3000), Emission::Resynced);
        assert_eq!(scheduler.last_sample_ticks(), Some(3000));
        assert_eq!(scheduler.poll(3001), Emission::Idle);
    }

    #[test]
    fn sustained_overload_never_bursts() {
        let mut scheduler = StreamScheduler::new(100);
        let mut now = 0u32;
        scheduler.poll(now);

        for _ in 0..50 {
            now += 5 * scheduler.interval();
            assert!(scheduler.poll(now).is_due());
            // Immediately after the resync nothing further is due.
            assert_eq!(scheduler.poll(now), Emission::Idle);
        }
    }

    #[test]
    fn wraparound_elapsed_is_correct() {
        let mut scheduler = StreamScheduler::new(100);
        let last = u32::MAX - 100;
        scheduler.poll(last);

        // 701 ticks elapsed across the wrap.
        assert_eq!(scheduler.poll(600), Emission::Sample);
        assert_eq!(scheduler.last_sample_ticks(), Some(last.wrapping_add(655)));
    }

    #[test]
    fn rate_change_keeps_the_emission_target() {
        let mut scheduler = StreamScheduler::new(100);
        scheduler.poll(1000);
        scheduler.set_rate(200);
        assert_eq!(scheduler.interval(), 327);
        assert_eq!(scheduler.poll(1328), Emission::Sample);
        assert_eq!(scheduler.last_sample_ticks(), Some(1327));
    }

    #[test]
    fn formats_three_and_six_axis_lines() {
        let line = format_sample([1, -2, 3], None);
        assert_eq!(line.as_str(), "1,-2,3\r\n");

        let line = format_sample([-32768, 32767, 0], Some([7, -8, 9]));
        assert_eq!(line.as_str(), "-32768,32767,0,7,-8,9\r\n");
    }
}
