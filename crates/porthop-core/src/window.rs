//! Period-aligned time windows.
//!
//! A window is the period that contains `now + offset`, widened by the
//! extension on both sides so that peers with slightly different clocks still
//! overlap:
//!
//! ```text
//!   valid_start     window_start               window_start + period    valid_end
//!        |<-extend->|<---------- period ---------->|<-extend->|
//! ```

/// One rotation slot and its validity interval.
///
/// All times are Unix seconds. The interval is half-open:
/// `valid_start <= t < valid_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    /// Probe offset this window was computed for
    pub offset: i64,
    /// Start of the period containing `now + offset`; a multiple of the period
    pub window_start: i64,
    /// First second at which the window is active
    pub valid_start: i64,
    /// First second at which the window is no longer active
    pub valid_end: i64,
}

impl TimeWindow {
    /// Compute the window for `offset` at `now`.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    #[must_use]
    pub fn compute(offset: i64, period: u32, extension: u32, now: i64) -> Self {
        assert!(period > 0, "period must be greater than zero");

        let period = i64::from(period);
        let extension = i64::from(extension);

        let window_start = (now + offset).div_euclid(period) * period;

        Self {
            offset,
            window_start,
            valid_start: window_start - extension,
            valid_end: window_start + period + extension,
        }
    }

    /// Whether the window is active at `t`
    #[must_use]
    pub fn is_active(&self, t: i64) -> bool {
        self.valid_start <= t && t < self.valid_end
    }

    /// Whether the window has ended at `t`
    #[must_use]
    pub fn is_expired(&self, t: i64) -> bool {
        t >= self.valid_end
    }

    /// Width of the validity interval in seconds
    #[must_use]
    pub fn span(&self) -> i64 {
        self.valid_end - self.valid_start
    }

    /// Seconds left until the window expires, zero once expired
    #[must_use]
    pub fn remaining(&self, t: i64) -> u64 {
        u64::try_from(self.valid_end - t).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_now_is_window_start() {
        let w = TimeWindow::compute(0, 30, 15, 1_700_000_010);
        assert_eq!(1_700_000_010 % 30, 0);
        assert_eq!(w.window_start, 1_700_000_010);
        assert_eq!(w.valid_start, 1_699_999_995);
        assert_eq!(w.valid_end, 1_700_000_055);
    }

    #[test]
    fn test_span_is_period_plus_two_extensions() {
        for extension in [0, 1, 15, 60] {
            let w = TimeWindow::compute(7, 30, extension, 1_234_567);
            assert_eq!(w.span(), 30 + 2 * i64::from(extension));
        }
    }

    #[test]
    fn test_offsets_shift_the_window() {
        let now = 1_700_000_020; // 10 seconds into a period
        let past = TimeWindow::compute(-15, 30, 15, now);
        let current = TimeWindow::compute(0, 30, 15, now);
        let future = TimeWindow::compute(15, 30, 15, now);

        assert_eq!(past.window_start, 1_699_999_980);
        assert_eq!(current.window_start, 1_700_000_010);
        assert_eq!(future.window_start, 1_700_000_010);
        assert_eq!(past.offset, -15);
        assert_eq!(future.offset, 15);
    }

    #[test]
    fn test_scenario_offsets_cover_a_minute_around_now() {
        for now in 1_700_000_000..1_700_000_030 {
            let windows: Vec<_> = [-15, 0, 15]
                .into_iter()
                .map(|offset| TimeWindow::compute(offset, 30, 15, now))
                .collect();

            for pair in windows.windows(2) {
                let gap = pair[1].window_start - pair[0].window_start;
                assert!(gap == 0 || gap == 30, "gap {gap} at {now}");
            }

            let lowest = windows.iter().map(|w| w.valid_start).min().unwrap();
            let highest = windows.iter().map(|w| w.valid_end).max().unwrap();
            assert!(highest - lowest >= 60);
            assert!(lowest <= now && now < highest);
        }
    }

    #[test]
    fn test_half_open_interval() {
        let w = TimeWindow::compute(0, 30, 15, 1_700_000_010);
        assert!(w.is_active(w.valid_start));
        assert!(w.is_active(w.valid_end - 1));
        assert!(!w.is_active(w.valid_end));
        assert!(!w.is_active(w.valid_start - 1));
        assert!(w.is_expired(w.valid_end));
        assert!(!w.is_expired(w.valid_end - 1));
    }

    #[test]
    fn test_negative_times_floor() {
        let w = TimeWindow::compute(-20, 30, 0, 10);
        assert_eq!(w.window_start, -30);
        assert_eq!(w.window_start % 30, 0);
    }

    #[test]
    fn test_remaining_saturates() {
        let w = TimeWindow::compute(0, 30, 5, 600);
        assert_eq!(w.remaining(600), 35);
        assert_eq!(w.remaining(w.valid_end + 100), 0);
    }
}
