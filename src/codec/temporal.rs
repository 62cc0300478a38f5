//! Text-format date and time handling.
//!
//! Postgres sends `2020-01-02 03:04:05.25+07` style text. Two
//! compatibility fixups from old server builds are kept for on-wire
//! compatibility (they are concentrated here so a future knob can
//! bypass them):
//!
//! 1. trailing fractional digits used to get trimmed, leaving a bare
//!    `.` (or a single digit) at the end; a `0` is appended before
//!    parsing.
//! 2. offsets arrive as `±HH` or `±HH:MM`; the parse format grows a
//!    `:00`-style minute component only when the text carries one.
use std::borrow::Cow;

use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset,
    error::Parse,
    format_description::{BorrowedFormatItem as I, Component as C, modifier, well_known::Rfc3339},
};

use super::DecodeError;

const OFFSET_HOUR: modifier::OffsetHour = {
    let mut hour = modifier::OffsetHour::default();
    hour.sign_is_mandatory = true;
    hour
};

const DATE: &[I<'static>] = &[
    I::Component(C::Year(modifier::Year::default())),
    I::Literal(b"-"),
    I::Component(C::Month(modifier::Month::default())),
    I::Literal(b"-"),
    I::Component(C::Day(modifier::Day::default())),
];

const FRACTION: I<'static> = I::Compound(&[
    I::Literal(b"."),
    I::Component(C::Subsecond(modifier::Subsecond::default())),
]);

const TIME_OF_DAY: &[I<'static>] = &[
    I::Component(C::Hour(modifier::Hour::default())),
    I::Literal(b":"),
    I::Component(C::Minute(modifier::Minute::default())),
    I::Literal(b":"),
    I::Component(C::Second(modifier::Second::default())),
    I::Optional(&FRACTION),
];

const TIMESTAMP: &[I<'static>] = &[I::Compound(DATE), I::Literal(b" "), I::Compound(TIME_OF_DAY)];

const OFFSET_HH: &[I<'static>] = &[I::Component(C::OffsetHour(OFFSET_HOUR))];

const OFFSET_HHMM: &[I<'static>] = &[
    I::Component(C::OffsetHour(OFFSET_HOUR)),
    I::Literal(b":"),
    I::Component(C::OffsetMinute(modifier::OffsetMinute::default())),
];

const TIMESTAMPTZ_HH: &[I<'static>] = &[I::Compound(TIMESTAMP), I::Compound(OFFSET_HH)];

const TIMESTAMPTZ_HHMM: &[I<'static>] = &[I::Compound(TIMESTAMP), I::Compound(OFFSET_HHMM)];

// encode-side descriptions carry a mandatory fraction
const ENCODE_TIME: &[I<'static>] = &[
    I::Component(C::Hour(modifier::Hour::default())),
    I::Literal(b":"),
    I::Component(C::Minute(modifier::Minute::default())),
    I::Literal(b":"),
    I::Component(C::Second(modifier::Second::default())),
    I::Literal(b"."),
    I::Component(C::Subsecond(modifier::Subsecond::default())),
];

const ENCODE_TIMESTAMP: &[I<'static>] =
    &[I::Compound(DATE), I::Literal(b"T"), I::Compound(ENCODE_TIME)];

/// Re-grow a fraction that historical server builds trimmed down to a
/// bare `.` or a lone digit.
fn normalize_fractional(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    let trailing_dot = bytes.last() == Some(&b'.');
    let lone_digit = bytes.len() >= 2 && bytes[bytes.len() - 2] == b'.';
    if trailing_dot || lone_digit {
        let mut fixed = String::with_capacity(s.len() + 1);
        fixed.push_str(s);
        fixed.push('0');
        Cow::Owned(fixed)
    } else {
        Cow::Borrowed(s)
    }
}

/// Whether the text ends in a `±HH:MM` offset rather than `±HH`.
fn minute_offset(s: &str) -> bool {
    s.len() >= 3 && s.as_bytes()[s.len() - 3] == b':'
}

pub(crate) fn parse_date(s: &str) -> Result<Date, Parse> {
    Date::parse(s, DATE)
}

pub(crate) fn parse_time(s: &str) -> Result<Time, Parse> {
    Time::parse(&normalize_fractional(s), TIME_OF_DAY)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<PrimitiveDateTime, Parse> {
    PrimitiveDateTime::parse(&normalize_fractional(s), TIMESTAMP)
}

pub(crate) fn parse_timestamptz(s: &str) -> Result<OffsetDateTime, Parse> {
    let s = normalize_fractional(s);
    let format: &[I<'static>] = if minute_offset(&s) { TIMESTAMPTZ_HHMM } else { TIMESTAMPTZ_HH };
    OffsetDateTime::parse(&s, format)
}

pub(crate) fn parse_timetz(s: &str) -> Result<(Time, UtcOffset), DecodeError> {
    let s = normalize_fractional(s);
    let Some(split) = s.rfind(['+', '-']) else {
        return Err(DecodeError::Malformed("time with time zone missing offset"));
    };
    let (time, offset) = s.split_at(split);
    let format: &[I<'static>] = if minute_offset(&s) { OFFSET_HHMM } else { OFFSET_HH };
    Ok((Time::parse(time, TIME_OF_DAY)?, UtcOffset::parse(offset, format)?))
}

pub(crate) fn format_date(date: Date) -> String {
    date.format(DATE).expect("format is statically known")
}

pub(crate) fn format_time(time: Time) -> String {
    time.format(ENCODE_TIME).expect("format is statically known")
}

pub(crate) fn format_timetz(time: Time, offset: UtcOffset) -> String {
    let mut out = format_time(time);
    out.push_str(&offset.format(OFFSET_HHMM).expect("format is statically known"));
    out
}

pub(crate) fn format_timestamp(dt: PrimitiveDateTime) -> String {
    dt.format(ENCODE_TIMESTAMP).expect("format is statically known")
}

pub(crate) fn format_timestamptz(dt: OffsetDateTime) -> String {
    dt.format(&Rfc3339).expect("format is statically known")
}
