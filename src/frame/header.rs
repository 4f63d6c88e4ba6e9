use chrono::{DateTime, NaiveDateTime, Utc};
use nom::{
    bytes::streaming::{tag, take_until},
    combinator::{map, map_res},
    IResult,
};
use num_rational::Ratio;

use crate::stream::predictor::FieldPredictor;

use super::{
    parse_dec_as_bool_list, parse_dec_as_encoding_list, parse_dec_as_predictor_list, parse_i16_dec,
    parse_str, parse_str_list, parse_u16_dec, parse_u16_pair_dec,
    parse_u16_ratio_dec_or_inverse_dec, parse_u16_triple_dec, parse_u32_dec, parse_u32_hex,
    FieldEncoding,
};

/// One recognised `H <key>:<value>` header line. Only keys that feed the
/// system configuration or frame definitions this crate decodes get a
/// dedicated variant; flight-tuning parameters the reference firmware also
/// logs (PID gains, rate curves, filter cutoffs, ...) fall through to
/// `UnknownHeader`, same as any other key the original tool doesn't
/// special-case.
#[derive(Debug)]
#[allow(dead_code)]
pub(crate) enum Frame<'f> {
    Product(&'f str),
    DataVersion(u32),
    FieldIName(Vec<&'f str>),
    FieldISignedness(Vec<bool>),
    FieldIEncoding(Vec<FieldEncoding>),
    FieldIPredictor(Vec<FieldPredictor>),
    FieldPName(Vec<&'f str>),
    FieldPSignedness(Vec<bool>),
    FieldPEncoding(Vec<FieldEncoding>),
    FieldPPredictor(Vec<FieldPredictor>),
    FieldSName(Vec<&'f str>),
    FieldSSignedness(Vec<bool>),
    FieldSEncoding(Vec<FieldEncoding>),
    FieldSPredictor(Vec<FieldPredictor>),
    FieldGName(Vec<&'f str>),
    FieldGSignedness(Vec<bool>),
    FieldGEncoding(Vec<FieldEncoding>),
    FieldGPredictor(Vec<FieldPredictor>),
    FieldHName(Vec<&'f str>),
    FieldHSignedness(Vec<bool>),
    FieldHEncoding(Vec<FieldEncoding>),
    FieldHPredictor(Vec<FieldPredictor>),
    FirmwareType(&'f str),
    FirmwareRevision(Option<&'f str>),
    BoardInformation(&'f str),
    LogStart(DateTime<Utc>),
    CraftName(&'f str),
    IInterval(i16),
    PInterval(Ratio<u16>),
    MinThrottle(u16),
    MaxThrottle(u16),
    MotorOutput(u16, u16),
    GyroScale(f32),
    Acc1G(u16),
    RcRate(u16),
    YawRate(u16),
    VBatScale(u16),
    VBatRef(u16),
    VBatCellVoltage { min: u16, warning: u16, max: u16 },
    CurrentMeter { offset: u16, scale: u16 },
    LoopTime(u32),

    UnknownHeader(&'f str, &'f str),
}

fn parse_datetime(input: &[u8]) -> IResult<&[u8], DateTime<Utc>> {
    map_res(take_until("\n"), |bytes: &[u8]| {
        let s = std::str::from_utf8(bytes).map_err(|_| ())?;
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(|ndt| DateTime::<Utc>::from_utc(ndt, Utc))
            .map_err(|_| ())
    })(input)
}

fn parse_firmware_revision(input: &[u8]) -> IResult<&[u8], Option<&str>> {
    map(parse_str, |s: &str| {
        let mut tokens = s.split(' ');
        match tokens.next() {
            Some("Betaflight") => tokens.next(),
            _ => None,
        }
    })(input)
}

pub(crate) fn parse_header(
    input: &[u8],
) -> IResult<&[u8], Frame, crate::stream::header::ParseHeadersError<&[u8]>> {
    let (input, _) = tag("H ")(input)?;
    let (input, name) = map_res(take_until(":"), super::str_from_bytes)(input)?;
    let (input, _) = tag(":")(input)?;

    // Every arm but the two encoding/predictor ones runs the field value
    // through a fixed-signature helper that returns the default nom error;
    // `nom::Err::convert` lifts that into `ParseHeadersError` so the whole
    // match unifies on one error type.
    let (input, header_frame) = match name {
        "Product" => map(parse_str, Frame::Product)(input).map_err(nom::Err::convert),
        "Data version" => map(parse_u32_dec, Frame::DataVersion)(input).map_err(nom::Err::convert),
        "I interval" => map(parse_i16_dec, Frame::IInterval)(input).map_err(nom::Err::convert),
        "P interval" => map(parse_u16_ratio_dec_or_inverse_dec, Frame::PInterval)(input)
            .map_err(nom::Err::convert),
        "Field I name" => map(parse_str_list, Frame::FieldIName)(input).map_err(nom::Err::convert),
        "Field I signed" => {
            map(parse_dec_as_bool_list, Frame::FieldISignedness)(input).map_err(nom::Err::convert)
        }
        "Field I encoding" => map(parse_dec_as_encoding_list, Frame::FieldIEncoding)(input),
        "Field I predictor" => map(parse_dec_as_predictor_list, Frame::FieldIPredictor)(input),
        "Field P name" => map(parse_str_list, Frame::FieldPName)(input).map_err(nom::Err::convert),
        "Field P signed" => {
            map(parse_dec_as_bool_list, Frame::FieldPSignedness)(input).map_err(nom::Err::convert)
        }
        "Field P encoding" => map(parse_dec_as_encoding_list, Frame::FieldPEncoding)(input),
        "Field P predictor" => map(parse_dec_as_predictor_list, Frame::FieldPPredictor)(input),
        "Field S name" => map(parse_str_list, Frame::FieldSName)(input).map_err(nom::Err::convert),
        "Field S signed" => {
            map(parse_dec_as_bool_list, Frame::FieldSSignedness)(input).map_err(nom::Err::convert)
        }
        "Field S encoding" => map(parse_dec_as_encoding_list, Frame::FieldSEncoding)(input),
        "Field S predictor" => map(parse_dec_as_predictor_list, Frame::FieldSPredictor)(input),
        "Field G name" => map(parse_str_list, Frame::FieldGName)(input).map_err(nom::Err::convert),
        "Field G signed" => {
            map(parse_dec_as_bool_list, Frame::FieldGSignedness)(input).map_err(nom::Err::convert)
        }
        "Field G encoding" => map(parse_dec_as_encoding_list, Frame::FieldGEncoding)(input),
        "Field G predictor" => map(parse_dec_as_predictor_list, Frame::FieldGPredictor)(input),
        "Field H name" => map(parse_str_list, Frame::FieldHName)(input).map_err(nom::Err::convert),
        "Field H signed" => {
            map(parse_dec_as_bool_list, Frame::FieldHSignedness)(input).map_err(nom::Err::convert)
        }
        "Field H encoding" => map(parse_dec_as_encoding_list, Frame::FieldHEncoding)(input),
        "Field H predictor" => map(parse_dec_as_predictor_list, Frame::FieldHPredictor)(input),
        "Firmware type" => map(parse_str, Frame::FirmwareType)(input).map_err(nom::Err::convert),
        "Firmware revision" => {
            map(parse_firmware_revision, Frame::FirmwareRevision)(input).map_err(nom::Err::convert)
        }
        "Board information" => {
            map(parse_str, Frame::BoardInformation)(input).map_err(nom::Err::convert)
        }
        "Log start datetime" => map(parse_datetime, Frame::LogStart)(input).map_err(nom::Err::convert),
        "Craft name" => map(parse_str, Frame::CraftName)(input).map_err(nom::Err::convert),
        "minthrottle" => map(parse_u16_dec, Frame::MinThrottle)(input).map_err(nom::Err::convert),
        "maxthrottle" => map(parse_u16_dec, Frame::MaxThrottle)(input).map_err(nom::Err::convert),
        "motorOutput" => map(parse_u16_pair_dec, |(lo, hi)| Frame::MotorOutput(lo, hi))(input)
            .map_err(nom::Err::convert),
        "gyro.scale" | "gyro_scale" => {
            map(parse_u32_hex, |bits| Frame::GyroScale(f32::from_bits(bits)))(input)
                .map_err(nom::Err::convert)
        }
        "acc_1G" => map(parse_u16_dec, Frame::Acc1G)(input).map_err(nom::Err::convert),
        "rcRate" => map(parse_u16_dec, Frame::RcRate)(input).map_err(nom::Err::convert),
        "yawRate" => map(parse_u16_dec, Frame::YawRate)(input).map_err(nom::Err::convert),
        "vbatscale" => map(parse_u16_dec, Frame::VBatScale)(input).map_err(nom::Err::convert),
        "vbatref" => map(parse_u16_dec, Frame::VBatRef)(input).map_err(nom::Err::convert),
        "vbatcellvoltage" => map(parse_u16_triple_dec, |(min, warning, max)| {
            Frame::VBatCellVoltage { min, warning, max }
        })(input)
        .map_err(nom::Err::convert),
        "currentMeter" => map(parse_u16_pair_dec, |(offset, scale)| Frame::CurrentMeter {
            offset,
            scale,
        })(input)
        .map_err(nom::Err::convert),
        "looptime" => map(parse_u32_dec, Frame::LoopTime)(input).map_err(nom::Err::convert),
        name => map(parse_str, |v| Frame::UnknownHeader(name, v))(input).map_err(nom::Err::convert),
    }?;

    let (input, _) = tag("\n")(input)?;
    Ok((input, header_frame))
}
