use nom::{
    bytes::streaming::{is_not, tag, take_until},
    combinator::map,
    error::ParseError,
    multi::separated_list0,
    IResult,
};
use num_rational::Ratio;

use crate::stream::predictor::FieldPredictor;

pub(crate) mod data;
pub mod event;
pub(crate) mod header;

/// Field encoding ids as declared in the reference decoder's field
/// definitions header. Note id 2 is unused/reserved and ids 10/11 are the
/// Elias-gamma codecs, not the teacher-only "Tag2_3SVariable" this crate
/// replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FieldEncoding {
    SignedVb,
    UnsignedVb,
    Neg14Bit,
    EliasDeltaU32,
    EliasDeltaS32,
    Tag8_8Svb,
    Tag2_3S32,
    Tag8_4S16,
    Null,
    EliasGammaU32,
    EliasGammaS32,
}

impl FieldEncoding {
    pub(crate) fn from_id(id: u32) -> crate::error::Result<Self> {
        Ok(match id {
            0 => FieldEncoding::SignedVb,
            1 => FieldEncoding::UnsignedVb,
            3 => FieldEncoding::Neg14Bit,
            4 => FieldEncoding::EliasDeltaU32,
            5 => FieldEncoding::EliasDeltaS32,
            6 => FieldEncoding::Tag8_8Svb,
            7 => FieldEncoding::Tag2_3S32,
            8 => FieldEncoding::Tag8_4S16,
            9 => FieldEncoding::Null,
            10 => FieldEncoding::EliasGammaU32,
            11 => FieldEncoding::EliasGammaS32,
            other => return Err(crate::error::Error::UnknownEncoding(other)),
        })
    }

    /// True for the composite codecs that consume more than one logical
    /// field per call.
    pub(crate) fn group_size(self) -> usize {
        match self {
            FieldEncoding::Tag2_3S32 => 3,
            FieldEncoding::Tag8_4S16 => 4,
            FieldEncoding::Tag8_8Svb => 1, // dynamic; caller determines run length
            _ => 1,
        }
    }
}

impl Default for FieldEncoding {
    fn default() -> Self {
        FieldEncoding::Null
    }
}

fn i16_from_dec(bytes: &[u8]) -> Result<i16, ()> {
    std::str::from_utf8(bytes).ok().and_then(|s| s.parse().ok()).ok_or(())
}

fn u16_from_dec(bytes: &[u8]) -> Result<u16, ()> {
    std::str::from_utf8(bytes).ok().and_then(|s| s.parse().ok()).ok_or(())
}

fn u32_from_dec(bytes: &[u8]) -> Result<u32, ()> {
    std::str::from_utf8(bytes).ok().and_then(|s| s.parse().ok()).ok_or(())
}

fn u32_from_hex(bytes: &[u8]) -> Result<u32, ()> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or(())
}

fn str_from_bytes(bytes: &[u8]) -> Result<&str, ()> {
    std::str::from_utf8(bytes).map_err(|_| ())
}

fn bool_from_dec(bytes: &[u8]) -> Result<bool, ()> {
    u16_from_dec(bytes).map(|i| i != 0)
}

/// Failure converting one comma-separated list entry to an encoding or
/// predictor id. `InvalidDigits` is an ordinary parse failure (not decimal
/// digits); `Unknown` carries the specific fatal [`crate::error::Error`] an
/// out-of-range id produces, so callers can recover it instead of just
/// seeing a generic nom error.
pub(crate) enum FieldConvError {
    InvalidDigits,
    Unknown(crate::error::Error),
}

fn field_encoding_from_dec(bytes: &[u8]) -> Result<FieldEncoding, FieldConvError> {
    let i = u16_from_dec(bytes).map_err(|_| FieldConvError::InvalidDigits)? as u32;
    FieldEncoding::from_id(i).map_err(FieldConvError::Unknown)
}

fn field_predictor_from_dec(bytes: &[u8]) -> Result<FieldPredictor, FieldConvError> {
    let i = u16_from_dec(bytes).map_err(|_| FieldConvError::InvalidDigits)? as u32;
    FieldPredictor::from_id(i).map_err(FieldConvError::Unknown)
}

pub(crate) fn parse_str(input: &[u8]) -> IResult<&[u8], &str> {
    nom::combinator::map_res(take_until("\n"), str_from_bytes)(input)
}

pub(crate) fn parse_i16_dec(input: &[u8]) -> IResult<&[u8], i16> {
    nom::combinator::map_res(take_until("\n"), i16_from_dec)(input)
}

pub(crate) fn parse_u16_ratio_dec(input: &[u8]) -> IResult<&[u8], Ratio<u16>> {
    let (input, numer) = nom::combinator::map_res(take_until("/"), u16_from_dec)(input)?;
    let (input, _) = tag("/")(input)?;
    let (input, denom) = nom::combinator::map_res(take_until("\n"), u16_from_dec)(input)?;
    Ok((input, Ratio::new(numer, denom)))
}

pub(crate) fn parse_u16_dec(input: &[u8]) -> IResult<&[u8], u16> {
    nom::combinator::map_res(take_until("\n"), u16_from_dec)(input)
}

pub(crate) fn parse_u32_dec(input: &[u8]) -> IResult<&[u8], u32> {
    nom::combinator::map_res(take_until("\n"), u32_from_dec)(input)
}

pub(crate) fn parse_u16_ratio_dec_or_inverse_dec(input: &[u8]) -> IResult<&[u8], Ratio<u16>> {
    nom::branch::alt((
        parse_u16_ratio_dec,
        map(parse_u16_dec, |denom| Ratio::new(1, denom)),
    ))(input)
}

pub(crate) fn parse_u32_hex(input: &[u8]) -> IResult<&[u8], u32> {
    let (input, _) = tag("0x")(input)?;
    nom::combinator::map_res(take_until("\n"), u32_from_hex)(input)
}

fn parse_list<'a, F, T, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
    parser: F,
) -> IResult<&'a [u8], Vec<T>>
where
    F: Fn(&'a [u8]) -> Result<T, E>,
{
    separated_list0(tag(","), nom::combinator::map_res(is_not(",\n"), parser))(input)
}

pub(crate) fn parse_str_list(input: &[u8]) -> IResult<&[u8], Vec<&str>> {
    parse_list(input, str_from_bytes)
}

pub(crate) fn parse_dec_as_bool_list(input: &[u8]) -> IResult<&[u8], Vec<bool>> {
    parse_list(input, bool_from_dec)
}

/// Unlike [`parse_list`]'s other callers, these two need the specific
/// `Error::UnknownEncoding`/`Error::UnknownPredictor` that an out-of-range id
/// produces to survive all the way to [`crate::parser::Decoder::parse`], so
/// they return the crate's own header-parse error type directly rather than
/// going through `parse_list`'s generic-but-opaque error handling.
pub(crate) fn parse_dec_as_encoding_list<'a>(
    input: &'a [u8],
) -> IResult<&'a [u8], Vec<FieldEncoding>, crate::stream::header::ParseHeadersError<&'a [u8]>> {
    separated_list0(
        tag(","),
        nom::combinator::map_res(is_not(",\n"), field_encoding_from_dec),
    )(input)
}

pub(crate) fn parse_dec_as_predictor_list<'a>(
    input: &'a [u8],
) -> IResult<&'a [u8], Vec<FieldPredictor>, crate::stream::header::ParseHeadersError<&'a [u8]>> {
    separated_list0(
        tag(","),
        nom::combinator::map_res(is_not(",\n"), field_predictor_from_dec),
    )(input)
}

pub(crate) fn parse_u16_pair_dec(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    let (input, a) = nom::combinator::map_res(is_not(","), u16_from_dec)(input)?;
    let (input, _) = tag(",")(input)?;
    let (input, b) = parse_u16_dec(input)?;
    Ok((input, (a, b)))
}

pub(crate) fn parse_u16_triple_dec(input: &[u8]) -> IResult<&[u8], (u16, u16, u16)> {
    let (input, a) = nom::combinator::map_res(is_not(","), u16_from_dec)(input)?;
    let (input, _) = tag(",")(input)?;
    let (input, b) = nom::combinator::map_res(is_not(","), u16_from_dec)(input)?;
    let (input, _) = tag(",")(input)?;
    let (input, c) = parse_u16_dec(input)?;
    Ok((input, (a, b, c)))
}
