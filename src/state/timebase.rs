//! # Time Base Tracker
//!
//! Converts the device millisecond counter into seconds since the start of the
//! current epoch and spots device reboots by their timestamp rollback.

/// Result of feeding one line's timestamp to the tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStep {
    /// Elapsed seconds for this sample
    pub elapsed: f64,
    /// The timestamp rolled back past the tolerance; nothing was admitted
    pub reboot_detected: bool,
}

/// Device time base for one epoch
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBase {
    origin_ms: Option<f64>,
    last_raw_ms: Option<f64>,
    dt_guess_s: f64,
    reboot_tolerance_ms: f64,
}

impl TimeBase {
    /// Create a tracker with no origin
    ///
    /// # Arguments
    ///
    /// * `dt_guess_s` - Step used for lines without a timestamp
    /// * `reboot_tolerance_ms` - Backwards jump that counts as a reboot
    pub fn new(dt_guess_s: f64, reboot_tolerance_ms: f64) -> Self {
        Self {
            origin_ms: None,
            last_raw_ms: None,
            dt_guess_s,
            reboot_tolerance_ms,
        }
    }

    /// Compute the elapsed time for the next sample
    ///
    /// When a reboot is detected the tracker is left untouched and the step
    /// reports `reboot_detected`. The caller must reset the session (which
    /// calls [`TimeBase::reset`]) and feed the same timestamp again, which
    /// then becomes the origin of the new epoch.
    ///
    /// # Arguments
    ///
    /// * `timestamp_ms` - Device timestamp of the line, if any
    /// * `last_elapsed` - Elapsed time of the previous sample in this epoch
    ///
    /// # Examples
    ///
    /// ```
    /// use flight_telemetry::state::TimeBase;
    ///
    /// let mut tb = TimeBase::new(0.05, 1000.0);
    /// assert_eq!(tb.next_elapsed(Some(1000.0), None).elapsed, 0.0);
    /// assert_eq!(tb.next_elapsed(Some(2000.0), Some(0.0)).elapsed, 1.0);
    /// assert!(tb.next_elapsed(Some(500.0), Some(1.0)).reboot_detected);
    /// ```
    pub fn next_elapsed(&mut self, timestamp_ms: Option<f64>, last_elapsed: Option<f64>) -> TimeStep {
        let Some(ts) = timestamp_ms else {
            let elapsed = last_elapsed.map_or(0.0, |last| last + self.dt_guess_s);
            return TimeStep {
                elapsed,
                reboot_detected: false,
            };
        };

        if self.is_rollback(ts) {
            return TimeStep {
                elapsed: 0.0,
                reboot_detected: true,
            };
        }

        let origin = *self.origin_ms.get_or_insert(ts);
        self.last_raw_ms = Some(ts);

        let elapsed = ((ts - origin) / 1000.0).max(0.0);
        // Small backwards jitter must not make the axis go backwards
        let elapsed = last_elapsed.map_or(elapsed, |last| elapsed.max(last));

        TimeStep {
            elapsed,
            reboot_detected: false,
        }
    }

    /// True if `timestamp_ms` jumped back further than the tolerance
    pub fn is_rollback(&self, timestamp_ms: f64) -> bool {
        self.last_raw_ms
            .is_some_and(|last| timestamp_ms + self.reboot_tolerance_ms < last)
    }

    /// Clear the origin and last observed timestamp
    pub fn reset(&mut self) {
        self.origin_ms = None;
        self.last_raw_ms = None;
    }

    pub fn origin_ms(&self) -> Option<f64> {
        self.origin_ms
    }

    pub fn last_raw_ms(&self) -> Option<f64> {
        self.last_raw_ms
    }
}
