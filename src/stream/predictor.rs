//! The twelve-way predictor engine: reconstructs an absolute field value
//! from a decoded delta plus historical/system context.
//!
//! Grounded on the reference decoder's `applyPrediction` switch; the
//! straight-line and average arithmetic is kept from the teacher's
//! overflow-safe formulation in its prior `StraightLinePredictor`/
//! `AveragePredictor`.

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldPredictor {
    None,
    Previous,
    StraightLine,
    Average2,
    MinThrottle,
    Motor0,
    Inc,
    HomeCoord,
    HomeCoord1,
    Const1500,
    VbatRef,
    LastMainFrameTime,
    MinMotor,
}

impl FieldPredictor {
    pub fn from_id(id: u32) -> Result<Self> {
        Ok(match id {
            0 => FieldPredictor::None,
            1 => FieldPredictor::Previous,
            2 => FieldPredictor::StraightLine,
            3 => FieldPredictor::Average2,
            4 => FieldPredictor::MinThrottle,
            5 => FieldPredictor::Motor0,
            6 => FieldPredictor::Inc,
            7 => FieldPredictor::HomeCoord,
            8 => FieldPredictor::Const1500,
            9 => FieldPredictor::VbatRef,
            10 => FieldPredictor::LastMainFrameTime,
            11 => FieldPredictor::MinMotor,
            // 256 (HOME_COORD_1) never appears in raw header data; it's
            // assigned by the GPS home-coordinate-pair rewrite pass instead.
            other => return Err(Error::UnknownPredictor(other)),
        })
    }
}

/// Everything a predictor might need besides the field's own decoded delta.
/// Fields that a given predictor doesn't use are simply ignored.
pub struct PredictorContext<'a> {
    pub min_throttle: i64,
    pub motor_output_low: i64,
    pub vbat_ref: i64,
    pub motor0_value: Option<i64>,
    pub home_coord_0: Option<i64>,
    pub home_coord_1: Option<i64>,
    pub previous: Option<&'a [i64]>,
    pub previous2: Option<&'a [i64]>,
    pub last_main_frame_time: Option<i64>,
    pub skipped_frames: i64,
}

fn straight_line(p1: i64, p2: i64) -> i64 {
    // 2*p1 - p2 computed so it can't overflow i64 the way a naive `2*p1`
    // could for values near the edges of the range.
    p1.wrapping_sub(p2).wrapping_add(p1)
}

fn average2(p1: i64, p2: i64) -> i64 {
    // Widen rather than split the sum: field values are well under i64
    // range, so the overflow the split trick guards against isn't
    // reachable here, and the split version rounds differently than plain
    // truncating division for mixed-sign operands.
    ((p1 as i128 + p2 as i128) / 2) as i64
}

/// Applies `predictor` to `delta` for field `field_ix`, returning the
/// reconstructed absolute value. `field_ix` is only used for error
/// reporting.
pub fn apply(
    predictor: FieldPredictor,
    field_ix: usize,
    delta: i64,
    ctx: &PredictorContext,
) -> Result<i64> {
    let base = match predictor {
        FieldPredictor::None => 0,
        FieldPredictor::Previous => ctx.previous.map_or(0, |p| p[field_ix]),
        FieldPredictor::StraightLine => {
            let p1 = ctx.previous.map_or(0, |p| p[field_ix]);
            let p2 = ctx.previous2.map_or(0, |p| p[field_ix]);
            straight_line(p1, p2)
        }
        FieldPredictor::Average2 => {
            let p1 = ctx.previous.map_or(0, |p| p[field_ix]);
            let p2 = ctx.previous2.map_or(0, |p| p[field_ix]);
            average2(p1, p2)
        }
        FieldPredictor::MinThrottle => ctx.min_throttle,
        FieldPredictor::Motor0 => ctx.motor0_value.ok_or(Error::MissingSemanticField {
            predictor,
            field: field_ix,
            needed: "motor[0]",
        })?,
        FieldPredictor::Inc => {
            ctx.previous.map_or(0, |p| p[field_ix]) + 1 + ctx.skipped_frames
        }
        FieldPredictor::HomeCoord => ctx.home_coord_0.ok_or(Error::MissingSemanticField {
            predictor,
            field: field_ix,
            needed: "GPS_home[0]",
        })?,
        FieldPredictor::HomeCoord1 => ctx.home_coord_1.ok_or(Error::MissingSemanticField {
            predictor,
            field: field_ix,
            needed: "GPS_home[1]",
        })?,
        FieldPredictor::Const1500 => 1500,
        FieldPredictor::VbatRef => ctx.vbat_ref,
        FieldPredictor::LastMainFrameTime => ctx.last_main_frame_time.unwrap_or(0),
        FieldPredictor::MinMotor => ctx.motor_output_low,
    };
    // INC bypasses the encoded delta entirely -- `base` already carries the
    // whole reconstructed value.
    Ok(if predictor == FieldPredictor::Inc { base } else { base + delta })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PredictorContext<'static> {
        PredictorContext {
            min_throttle: 1150,
            motor_output_low: 1150,
            vbat_ref: 4095,
            motor0_value: Some(1500),
            home_coord_0: Some(123456),
            home_coord_1: Some(654321),
            previous: None,
            previous2: None,
            last_main_frame_time: None,
            skipped_frames: 0,
        }
    }

    #[test]
    fn none_predictor_passes_delta_through() {
        assert_eq!(apply(FieldPredictor::None, 0, 42, &ctx()).unwrap(), 42);
    }

    #[test]
    fn previous_predictor_adds_prior_row() {
        let row = [7i64];
        let mut c = ctx();
        c.previous = Some(&row);
        assert_eq!(apply(FieldPredictor::Previous, 0, 3, &c).unwrap(), 10);
    }

    #[test]
    fn inc_adds_skipped_frames_and_one() {
        let row = [10i64];
        let mut c = ctx();
        c.previous = Some(&row);
        c.skipped_frames = 4;
        assert_eq!(apply(FieldPredictor::Inc, 0, 999, &c).unwrap(), 15);
    }

    #[test]
    fn motor0_missing_is_an_error() {
        let mut c = ctx();
        c.motor0_value = None;
        assert!(apply(FieldPredictor::Motor0, 0, 0, &c).is_err());
    }

    #[test]
    fn straight_line_extrapolates() {
        let prev = [20i64];
        let prev2 = [10i64];
        let mut c = ctx();
        c.previous = Some(&prev);
        c.previous2 = Some(&prev2);
        assert_eq!(apply(FieldPredictor::StraightLine, 0, 0, &c).unwrap(), 30);
    }

    #[test]
    fn average2_is_overflow_safe() {
        let prev = [i64::MAX];
        let prev2 = [i64::MAX];
        let mut c = ctx();
        c.previous = Some(&prev);
        c.previous2 = Some(&prev2);
        assert_eq!(apply(FieldPredictor::Average2, 0, 0, &c).unwrap(), i64::MAX);
    }

    #[test]
    fn average2_truncates_like_plain_integer_division() {
        // (-1 + 2) / 2 == 0 under truncating division; a split-then-recombine
        // formula that doesn't account for mixed-sign remainders gets this
        // wrong (it would return 1).
        let prev = [-1i64];
        let prev2 = [2i64];
        let mut c = ctx();
        c.previous = Some(&prev);
        c.previous2 = Some(&prev2);
        assert_eq!(apply(FieldPredictor::Average2, 0, 0, &c).unwrap(), 0);
    }
}
