//! Header section parsing: turns the run of `H <key>:<value>` lines at the
//! start of a log into a [`Header`] carrying system configuration, the five
//! frame definitions (I/P/S/G/H), and the semantic field indexes the
//! predictor engine and callers rely on.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use nom::{
    error::{ErrorKind, FromExternalError, ParseError},
    multi::fold_many0,
    IResult,
};
use num_rational::Ratio;

use crate::frame::header::{parse_header, Frame};
use crate::frame::{FieldConvError, FieldEncoding};
use crate::semantic::{
    self, GpsFieldIndexes, GpsHomeFieldIndexes, MainFieldIndexes, SlowFieldIndexes,
};
use crate::stream::predictor::FieldPredictor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareType {
    Unknown,
    Baseflight,
    Cleanflight,
}

/// Per-field declarations for one frame type (I, P, S, G, or H).
#[derive(Debug, Clone, Default)]
pub struct FrameDef {
    pub field_name: Vec<String>,
    pub field_signed: Vec<bool>,
    pub field_predictor: Vec<FieldPredictor>,
    pub field_encoding: Vec<FieldEncoding>,
    /// Byte width used to truncate the value after prediction (4 or 8). The
    /// reference decoder hardcodes every field to 4 at frame-definition
    /// build time; no header key overrides it, so this is always `4` here
    /// too, but it's carried as data rather than a literal so a future
    /// header key could set it without touching the predictor/codec paths.
    pub field_width: Vec<u8>,
}

impl FrameDef {
    pub fn field_count(&self) -> usize {
        self.field_name.len()
    }
}

/// System configuration values, with the reference decoder's defaults for
/// anything the header doesn't override.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub minthrottle: u16,
    pub maxthrottle: u16,
    pub motor_output_low: u16,
    pub motor_output_high: u16,
    pub vbatref: u16,
    pub vbatscale: u16,
    pub vbat_min_cell_voltage: u16,
    pub vbat_max_cell_voltage: u16,
    pub vbat_warning_cell_voltage: u16,
    pub current_meter_offset: u16,
    pub current_meter_scale: u16,
    pub rc_rate: u16,
    pub yaw_rate: u16,
    pub acc_1g: u16,
    pub firmware_type: FirmwareType,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            minthrottle: 1150,
            maxthrottle: 1850,
            motor_output_low: 1150,
            motor_output_high: 1850,
            vbatref: 4095,
            vbatscale: 110,
            vbat_min_cell_voltage: 33,
            vbat_max_cell_voltage: 43,
            vbat_warning_cell_voltage: 35,
            current_meter_offset: 0,
            current_meter_scale: 400,
            rc_rate: 90,
            yaw_rate: 0,
            acc_1g: 1,
            firmware_type: FirmwareType::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Header {
    pub product: String,
    pub data_version: u32,
    pub firmware_revision: Option<String>,
    pub board_information: Option<String>,
    pub log_start_datetime: Option<DateTime<Utc>>,
    pub craft_name: Option<String>,
    pub i_interval: i16,
    pub p_interval: Ratio<u16>,
    /// Radians per microsecond, converted from the raw header value unless
    /// the firmware dialect is Baseflight (which stores it already
    /// converted).
    pub gyro_scale: f32,
    pub sys_config: SystemConfig,
    pub other_headers: HashMap<String, String>,

    pub i_frame: FrameDef,
    pub p_frame: FrameDef,
    pub s_frame: FrameDef,
    pub g_frame: FrameDef,
    pub h_frame: FrameDef,

    pub main_fields: MainFieldIndexes,
    pub gps_fields: GpsFieldIndexes,
    pub gps_home_fields: GpsHomeFieldIndexes,
    pub slow_fields: SlowFieldIndexes,
}

#[derive(Debug, thiserror::Error)]
pub enum HeaderBuildError {
    #[error("missing required header '{0}'")]
    MissingHeader(&'static str),
    #[error("'I interval' header must be >= 1")]
    InvalidIInterval,
}

/// Rewrites the second of every adjacent `HomeCoord`/`HomeCoord` pair in a
/// G-frame's predictor list to `HomeCoord1`, so the predictor engine can
/// dispatch each GPS coordinate to its matching home coordinate without
/// re-deriving pair membership at decode time.
fn rewrite_home_coord_pairs(predictors: &mut [FieldPredictor]) {
    let mut pending = false;
    for p in predictors.iter_mut() {
        if *p == FieldPredictor::HomeCoord {
            if pending {
                *p = FieldPredictor::HomeCoord1;
                pending = false;
            } else {
                pending = true;
            }
        } else {
            pending = false;
        }
    }
}

#[derive(Default)]
struct HeaderBuilder {
    product: Option<String>,
    data_version: Option<u32>,
    firmware_type: Option<String>,
    firmware_revision: Option<String>,
    board_information: Option<String>,
    log_start_datetime: Option<DateTime<Utc>>,
    craft_name: Option<String>,
    i_interval: Option<i16>,
    p_interval: Option<Ratio<u16>>,
    gyro_scale_raw: Option<f32>,

    sys_config: SystemConfig,
    other_headers: HashMap<String, String>,

    i_field_name: Vec<String>,
    i_field_signed: Vec<bool>,
    i_field_encoding: Vec<FieldEncoding>,
    i_field_predictor: Vec<FieldPredictor>,

    p_field_name: Option<Vec<String>>,
    p_field_signed: Option<Vec<bool>>,
    p_field_encoding: Vec<FieldEncoding>,
    p_field_predictor: Vec<FieldPredictor>,

    s_frame: FrameDef,
    g_frame: FrameDef,
    h_frame: FrameDef,
}

impl HeaderBuilder {
    fn apply(&mut self, frame: Frame) {
        match frame {
            Frame::Product(v) => self.product = Some(v.to_owned()),
            Frame::DataVersion(v) => self.data_version = Some(v),
            Frame::IInterval(v) => self.i_interval = Some(v),
            Frame::PInterval(v) => self.p_interval = Some(v),
            Frame::FirmwareType(v) => self.firmware_type = Some(v.to_owned()),
            Frame::FirmwareRevision(v) => self.firmware_revision = v.map(String::from),
            Frame::BoardInformation(v) => self.board_information = Some(v.to_owned()),
            Frame::LogStart(v) => self.log_start_datetime = Some(v),
            Frame::CraftName(v) => self.craft_name = Some(v.to_owned()),
            Frame::MinThrottle(v) => self.sys_config.minthrottle = v,
            Frame::MaxThrottle(v) => self.sys_config.maxthrottle = v,
            Frame::MotorOutput(lo, hi) => {
                self.sys_config.motor_output_low = lo;
                self.sys_config.motor_output_high = hi;
            }
            Frame::GyroScale(v) => self.gyro_scale_raw = Some(v),
            Frame::Acc1G(v) => self.sys_config.acc_1g = v,
            Frame::RcRate(v) => self.sys_config.rc_rate = v,
            Frame::YawRate(v) => self.sys_config.yaw_rate = v,
            Frame::VBatScale(v) => self.sys_config.vbatscale = v,
            Frame::VBatRef(v) => self.sys_config.vbatref = v,
            Frame::VBatCellVoltage { min, warning, max } => {
                self.sys_config.vbat_min_cell_voltage = min;
                self.sys_config.vbat_warning_cell_voltage = warning;
                self.sys_config.vbat_max_cell_voltage = max;
            }
            Frame::CurrentMeter { offset, scale } => {
                self.sys_config.current_meter_offset = offset;
                self.sys_config.current_meter_scale = scale;
            }
            Frame::LoopTime(_) => {}
            Frame::FieldIName(v) => self.i_field_name = v.into_iter().map(String::from).collect(),
            Frame::FieldISignedness(v) => self.i_field_signed = v,
            Frame::FieldIEncoding(v) => self.i_field_encoding = v,
            Frame::FieldIPredictor(v) => self.i_field_predictor = v,
            Frame::FieldPName(v) => self.p_field_name = Some(v.into_iter().map(String::from).collect()),
            Frame::FieldPSignedness(v) => self.p_field_signed = Some(v),
            Frame::FieldPEncoding(v) => self.p_field_encoding = v,
            Frame::FieldPPredictor(v) => self.p_field_predictor = v,
            Frame::FieldSName(v) => self.s_frame.field_name = v.into_iter().map(String::from).collect(),
            Frame::FieldSSignedness(v) => self.s_frame.field_signed = v,
            Frame::FieldSEncoding(v) => self.s_frame.field_encoding = v,
            Frame::FieldSPredictor(v) => self.s_frame.field_predictor = v,
            Frame::FieldGName(v) => self.g_frame.field_name = v.into_iter().map(String::from).collect(),
            Frame::FieldGSignedness(v) => self.g_frame.field_signed = v,
            Frame::FieldGEncoding(v) => self.g_frame.field_encoding = v,
            Frame::FieldGPredictor(v) => self.g_frame.field_predictor = v,
            Frame::FieldHName(v) => self.h_frame.field_name = v.into_iter().map(String::from).collect(),
            Frame::FieldHSignedness(v) => self.h_frame.field_signed = v,
            Frame::FieldHEncoding(v) => self.h_frame.field_encoding = v,
            Frame::FieldHPredictor(v) => self.h_frame.field_predictor = v,
            Frame::UnknownHeader(name, value) => {
                self.other_headers.insert(name.to_owned(), value.to_owned());
            }
        }
    }

    fn build(mut self) -> Result<Header, HeaderBuildError> {
        let product = self.product.ok_or(HeaderBuildError::MissingHeader("Product"))?;
        let data_version = self.data_version.ok_or(HeaderBuildError::MissingHeader("Data version"))?;
        let i_interval = self.i_interval.ok_or(HeaderBuildError::MissingHeader("I interval"))?;
        if i_interval < 1 {
            return Err(HeaderBuildError::InvalidIInterval);
        }
        let p_interval = self.p_interval.ok_or(HeaderBuildError::MissingHeader("P interval"))?;

        self.sys_config.firmware_type = match self.firmware_type.as_deref() {
            Some("Cleanflight") => FirmwareType::Cleanflight,
            Some(_) => FirmwareType::Baseflight,
            None => FirmwareType::Unknown,
        };

        let gyro_scale_raw = self.gyro_scale_raw.unwrap_or(1.0);
        let gyro_scale = if self.sys_config.firmware_type != FirmwareType::Baseflight {
            gyro_scale_raw * (std::f32::consts::PI / 180.0) * 0.000001
        } else {
            gyro_scale_raw
        };

        let p_field_name = self.p_field_name.unwrap_or_else(|| self.i_field_name.clone());
        let p_field_signed = self.p_field_signed.unwrap_or_else(|| self.i_field_signed.clone());

        let i_field_count = self.i_field_name.len();
        let p_field_count = p_field_name.len();
        let i_frame = FrameDef {
            field_name: self.i_field_name,
            field_signed: self.i_field_signed,
            field_predictor: self.i_field_predictor,
            field_encoding: self.i_field_encoding,
            field_width: vec![4u8; i_field_count],
        };
        let p_frame = FrameDef {
            field_name: p_field_name,
            field_signed: p_field_signed,
            field_predictor: self.p_field_predictor,
            field_encoding: self.p_field_encoding,
            field_width: vec![4u8; p_field_count],
        };

        let mut g_frame = self.g_frame;
        g_frame.field_width = vec![4u8; g_frame.field_count()];
        rewrite_home_coord_pairs(&mut g_frame.field_predictor);
        let mut s_frame = self.s_frame;
        s_frame.field_width = vec![4u8; s_frame.field_count()];
        let mut h_frame = self.h_frame;
        h_frame.field_width = vec![4u8; h_frame.field_count()];

        let main_fields = semantic::identify_main_fields(&i_frame.field_name);
        let gps_fields = semantic::identify_gps_fields(&g_frame.field_name);
        let gps_home_fields = semantic::identify_gps_home_fields(&h_frame.field_name);
        let slow_fields = semantic::identify_slow_fields(&s_frame.field_name);

        Ok(Header {
            product,
            data_version,
            firmware_revision: self.firmware_revision,
            board_information: self.board_information,
            log_start_datetime: self.log_start_datetime,
            craft_name: self.craft_name,
            i_interval,
            p_interval,
            gyro_scale,
            sys_config: self.sys_config,
            other_headers: self.other_headers,
            i_frame,
            p_frame,
            s_frame,
            g_frame,
            h_frame,
            main_fields,
            gps_fields,
            gps_home_fields,
            slow_fields,
        })
    }
}

#[derive(Debug)]
pub enum ParseHeadersError<I> {
    HeaderBuildError(HeaderBuildError),
    /// An unknown field encoding/predictor id, or any other fatal
    /// configuration error, surfaced from inside the header grammar.
    Fatal(crate::error::Error),
    Nom(I, ErrorKind),
}

impl<I> ParseError<I> for ParseHeadersError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        ParseHeadersError::Nom(input, kind)
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<I> From<nom::error::Error<I>> for ParseHeadersError<I> {
    fn from(err: nom::error::Error<I>) -> Self {
        Self::Nom(err.input, err.code)
    }
}

impl<I> FromExternalError<I, ()> for ParseHeadersError<I> {
    fn from_external_error(input: I, kind: ErrorKind, _e: ()) -> Self {
        ParseHeadersError::Nom(input, kind)
    }
}

impl<I> FromExternalError<I, FieldConvError> for ParseHeadersError<I> {
    fn from_external_error(input: I, kind: ErrorKind, e: FieldConvError) -> Self {
        match e {
            FieldConvError::InvalidDigits => ParseHeadersError::Nom(input, kind),
            FieldConvError::Unknown(err) => ParseHeadersError::Fatal(err),
        }
    }
}

/// Unwraps a fatal configuration error (an unknown encoding/predictor id)
/// back out to the crate's own error type; any other header-parse failure
/// collapses to [`crate::error::Error::HeaderParse`], same as before.
impl<'a> From<nom::Err<ParseHeadersError<&'a [u8]>>> for crate::error::Error {
    fn from(err: nom::Err<ParseHeadersError<&'a [u8]>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => {
                crate::error::Error::HeaderParse("incomplete header section".to_owned())
            }
            nom::Err::Error(ParseHeadersError::Fatal(e))
            | nom::Err::Failure(ParseHeadersError::Fatal(e)) => e,
            nom::Err::Error(other) | nom::Err::Failure(other) => {
                crate::error::Error::HeaderParse(format!("{:?}", other))
            }
        }
    }
}

/// Consumes every `H ...` line at the front of `input`, stopping at the
/// first byte that doesn't start a recognisable header line (the start of
/// data, per [`crate::parser`]'s own lookahead).
pub fn parse_headers(input: &[u8]) -> IResult<&[u8], Header, ParseHeadersError<&[u8]>> {
    let (input, builder) =
        fold_many0(parse_header, HeaderBuilder::default, |mut builder, frame| {
            builder.apply(frame);
            builder
        })(input)
        .map_err(nom::Err::convert)?;

    let header = builder
        .build()
        .map_err(|err| nom::Err::Failure(ParseHeadersError::HeaderBuildError(err)))?;
    Ok((input, header))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_coord_pair_rewrite_only_touches_second_of_pair() {
        let mut preds = vec![
            FieldPredictor::HomeCoord,
            FieldPredictor::HomeCoord,
            FieldPredictor::Previous,
            FieldPredictor::HomeCoord,
            FieldPredictor::HomeCoord,
        ];
        rewrite_home_coord_pairs(&mut preds);
        assert_eq!(
            preds,
            vec![
                FieldPredictor::HomeCoord,
                FieldPredictor::HomeCoord1,
                FieldPredictor::Previous,
                FieldPredictor::HomeCoord,
                FieldPredictor::HomeCoord1,
            ]
        );
    }

    #[test]
    fn gyro_scale_conversion_skipped_for_baseflight() {
        let mut b = HeaderBuilder::default();
        b.product = Some("x".into());
        b.data_version = Some(1);
        b.i_interval = Some(1);
        b.p_interval = Some(Ratio::new(1, 1));
        b.firmware_type = Some("Baseflight".into());
        b.gyro_scale_raw = Some(1.0);
        let h = b.build().unwrap();
        assert_eq!(h.gyro_scale, 1.0);
    }

    #[test]
    fn firmware_type_defaults_to_unknown_and_still_converts_gyro_scale() {
        let mut b = HeaderBuilder::default();
        b.product = Some("x".into());
        b.data_version = Some(1);
        b.i_interval = Some(1);
        b.p_interval = Some(Ratio::new(1, 1));
        b.firmware_type = None;
        b.gyro_scale_raw = Some(1.0);
        let h = b.build().unwrap();
        assert_eq!(h.sys_config.firmware_type, FirmwareType::Unknown);
        assert!((h.gyro_scale - (std::f32::consts::PI / 180.0 * 0.000001)).abs() < 1e-12);
    }

    #[test]
    fn gyro_scale_conversion_applied_for_cleanflight() {
        let mut b = HeaderBuilder::default();
        b.product = Some("x".into());
        b.data_version = Some(1);
        b.i_interval = Some(1);
        b.p_interval = Some(Ratio::new(1, 1));
        b.firmware_type = Some("Cleanflight".into());
        b.gyro_scale_raw = Some(1.0);
        let h = b.build().unwrap();
        assert!((h.gyro_scale - (std::f32::consts::PI / 180.0 * 0.000001)).abs() < 1e-12);
    }
}
