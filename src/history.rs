//! Main-frame history ring, GPS-home latch, and timestamp rollover recovery.
//!
//! Grounded on the reference decoder's `mainHistory[3]` rotation in
//! `completeIntraframe`/`completeInterframe`, `gpsHomeHistory[2]` latching in
//! `completeGPSHomeFrame`, and `flightLogDetectAndApplyTimestampRollover`.

pub const MAX_TIME_JUMP: i64 = 10_000_000;
pub const MAX_ITER_JUMP: i64 = 5000;

/// Three rotating rows of decoded field values for the main (I/P) stream.
/// `current` is the row the next frame decodes into; `previous`/`previous2`
/// feed the predictor engine and may be absent (e.g. right after a stream
/// invalidation, or before the first I-frame).
pub struct MainHistory {
    rows: [Vec<i64>; 3],
    current_ix: usize,
    previous_ix: usize,
    previous2_ix: usize,
    previous_valid: bool,
    previous2_valid: bool,
}

impl MainHistory {
    pub fn new(field_count: usize) -> Self {
        MainHistory {
            rows: [vec![0i64; field_count], vec![0i64; field_count], vec![0i64; field_count]],
            current_ix: 0,
            previous_ix: 1,
            previous2_ix: 2,
            previous_valid: false,
            previous2_valid: false,
        }
    }

    pub fn current(&self) -> &[i64] {
        &self.rows[self.current_ix]
    }

    pub fn current_mut(&mut self) -> &mut [i64] {
        &mut self.rows[self.current_ix]
    }

    pub fn previous(&self) -> Option<&[i64]> {
        self.previous_valid.then(|| self.rows[self.previous_ix].as_slice())
    }

    pub fn previous2(&self) -> Option<&[i64]> {
        self.previous2_valid.then(|| self.rows[self.previous2_ix].as_slice())
    }

    /// I-frame success: both `previous` and `previous2` collapse onto the
    /// row just completed, and `current` advances to a fresh slot.
    pub fn rotate_after_intraframe(&mut self) {
        self.previous_ix = self.current_ix;
        self.previous2_ix = self.current_ix;
        self.previous_valid = true;
        self.previous2_valid = true;
        self.current_ix = (self.current_ix + 1) % 3;
    }

    /// P-frame success: a plain shift, `previous2 <- previous <- current`.
    pub fn rotate_after_interframe(&mut self) {
        self.previous2_ix = self.previous_ix;
        self.previous2_valid = self.previous_valid;
        self.previous_ix = self.current_ix;
        self.previous_valid = true;
        self.current_ix = (self.current_ix + 1) % 3;
    }

    /// Drops `previous`/`previous2` so the next P-frame can't be predicted
    /// against a desynced history; the next successful I-frame repopulates
    /// them.
    pub fn invalidate(&mut self) {
        self.previous_valid = false;
        self.previous2_valid = false;
    }
}

/// Decoded-then-latched GPS home position. `current` holds the most recent
/// H-frame decode; `latched` is the value predictors see, only updated once
/// an H-frame completes successfully.
pub struct GpsHomeHistory {
    rows: [Vec<i64>; 2],
    valid: bool,
}

impl GpsHomeHistory {
    pub fn new(field_count: usize) -> Self {
        GpsHomeHistory { rows: [vec![0i64; field_count], vec![0i64; field_count]], valid: false }
    }

    pub fn current_mut(&mut self) -> &mut [i64] {
        &mut self.rows[0]
    }

    pub fn latch(&mut self) {
        self.rows[1] = self.rows[0].clone();
        self.valid = true;
    }

    pub fn latched(&self) -> Option<&[i64]> {
        self.valid.then(|| self.rows[1].as_slice())
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Recovers a monotonically increasing 64-bit time from an on-wire 32-bit
/// timestamp that wraps around every 2^32 units.
#[derive(Default)]
pub struct Rollover {
    accumulator: i64,
}

impl Rollover {
    pub fn new() -> Self {
        Rollover { accumulator: 0 }
    }

    /// The raw accumulator, for event payloads that add it to an on-wire
    /// time directly without running wraparound detection themselves.
    pub fn accumulator(&self) -> i64 {
        self.accumulator
    }

    /// `last_time` is the previously recovered 64-bit time (0 if there is
    /// none yet). Returns the recovered 64-bit time for `wire_time`.
    pub fn apply(&mut self, wire_time: u32, last_time: i64) -> i64 {
        let last_u32 = last_time as u32;
        if wire_time < last_u32 {
            let diff = wire_time.wrapping_sub(last_u32);
            if (diff as i64) < MAX_TIME_JUMP {
                self.accumulator += 1i64 << 32;
            }
        }
        wire_time as i64 + self.accumulator
    }
}

/// `iteration`/`time` must be non-decreasing and bounded since the last
/// successful main frame.
pub fn validate_main_frame(
    iteration: i64,
    time: i64,
    last_iteration: i64,
    last_time: i64,
) -> bool {
    iteration >= last_iteration
        && iteration < last_iteration + MAX_ITER_JUMP
        && time >= last_time
        && time < last_time + MAX_TIME_JUMP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollover_detects_wraparound() {
        let mut r = Rollover::new();
        assert_eq!(r.apply(0xFFFFFF00, 0), 0xFFFFFF00);
        assert_eq!(r.apply(0x100, 0xFFFFFF00), 0x100000100);
    }

    #[test]
    fn rollover_does_not_trigger_on_large_backward_jump() {
        let mut r = Rollover::new();
        assert_eq!(r.apply(1000, 1000), 1000);
        // A huge backward jump that isn't a wraparound should not add 2^32.
        assert_eq!(r.apply(10, 1000), 10);
    }

    #[test]
    fn intraframe_rotation_collapses_both_previous_rows() {
        let mut h = MainHistory::new(2);
        h.current_mut().copy_from_slice(&[1, 2]);
        h.rotate_after_intraframe();
        assert_eq!(h.previous(), Some(&[1i64, 2i64][..]));
        assert_eq!(h.previous2(), Some(&[1i64, 2i64][..]));
    }

    #[test]
    fn interframe_rotation_shifts_normally() {
        let mut h = MainHistory::new(1);
        h.current_mut().copy_from_slice(&[10]);
        h.rotate_after_intraframe();
        h.current_mut().copy_from_slice(&[20]);
        h.rotate_after_interframe();
        assert_eq!(h.previous(), Some(&[20i64][..]));
        assert_eq!(h.previous2(), Some(&[10i64][..]));
    }

    #[test]
    fn validate_rejects_backward_iteration() {
        assert!(!validate_main_frame(9, 1000, 10, 1000));
    }
}
