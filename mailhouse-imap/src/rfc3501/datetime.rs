//! Date and date-time parsers.

use abnf_core::is_digit;
use abnf_core::streaming::{dquote, sp};
use nom::branch::alt;
use nom::bytes::streaming::{tag, take_while_m_n};
use nom::combinator::{map, map_opt};
use nom::sequence::{delimited, preceded, tuple};

use chrono::{FixedOffset, NaiveTime, TimeZone};

use crate::codec::decode::{IMAPErrorKind, IMAPParseError, IMAPResult};
use crate::datetime::{DateTime, NaiveDate, MONTHS};

fn digits(m: usize, n: usize) -> impl FnMut(&[u8]) -> IMAPResult<u32> {
    move |input| {
        map(take_while_m_n(m, n, is_digit), |bytes: &[u8]| {
            // `unwrap` is safe: digits only, at most 4 of them.
            std::str::from_utf8(bytes).unwrap().parse::<u32>().unwrap()
        })(input)
    }
}

/// `date = date-text / DQUOTE date-text DQUOTE`
pub(crate) fn date(input: &[u8]) -> IMAPResult<NaiveDate> {
    alt((date_text, delimited(dquote, date_text, dquote)))(input)
}

/// `date-text = date-day "-" date-month "-" date-year`
fn date_text(input: &[u8]) -> IMAPResult<NaiveDate> {
    map_opt(
        tuple((
            digits(1, 2),
            tag(b"-"),
            date_month,
            tag(b"-"),
            digits(4, 4),
        )),
        |(day, _, month, _, year)| {
            chrono::NaiveDate::from_ymd_opt(year as i32, month, day).map(NaiveDate::from)
        },
    )(input)
}

/// `date-month = "Jan" / "Feb" / "Mar" / "Apr" / "May" / "Jun" /
///               "Jul" / "Aug" / "Sep" / "Oct" / "Nov" / "Dec"`
fn date_month(input: &[u8]) -> IMAPResult<u32> {
    map_opt(nom::bytes::streaming::take(3usize), |bytes: &[u8]| {
        MONTHS
            .iter()
            .position(|month| month.as_bytes().eq_ignore_ascii_case(bytes))
            .map(|index| index as u32 + 1)
    })(input)
}

/// `date-time = DQUOTE date-day-fixed "-" date-month "-" date-year
///              SP time SP zone DQUOTE`
pub(crate) fn date_time(input: &[u8]) -> IMAPResult<DateTime> {
    let (remaining, parsed) = delimited(
        dquote,
        tuple((
            date_day_fixed,
            tag(b"-"),
            date_month,
            tag(b"-"),
            digits(4, 4),
            sp,
            time,
            sp,
            zone,
        )),
        dquote,
    )(input)?;

    let (day, _, month, _, year, _, time, _, zone) = parsed;

    let datetime = chrono::NaiveDate::from_ymd_opt(year as i32, month, day)
        .map(|date| date.and_time(time))
        .and_then(|naive| zone.from_local_datetime(&naive).single());

    match datetime {
        Some(datetime) => Ok((remaining, DateTime::from(datetime))),
        None => Err(nom::Err::Failure(IMAPParseError {
            input,
            kind: IMAPErrorKind::BadDateTime,
        })),
    }
}

/// `date-day-fixed = (SP DIGIT) / 2DIGIT`
fn date_day_fixed(input: &[u8]) -> IMAPResult<u32> {
    alt((preceded(sp, digits(1, 1)), digits(2, 2)))(input)
}

/// `time = 2DIGIT ":" 2DIGIT ":" 2DIGIT`
fn time(input: &[u8]) -> IMAPResult<NaiveTime> {
    map_opt(
        tuple((digits(2, 2), tag(b":"), digits(2, 2), tag(b":"), digits(2, 2))),
        |(hour, _, minute, _, second)| NaiveTime::from_hms_opt(hour, minute, second),
    )(input)
}

/// `zone = ("+" / "-") 4DIGIT`
fn zone(input: &[u8]) -> IMAPResult<FixedOffset> {
    map_opt(
        tuple((
            alt((
                nom::combinator::value(true, tag(b"+")),
                nom::combinator::value(false, tag(b"-")),
            )),
            digits(4, 4),
        )),
        |(east, digits)| {
            let seconds = ((digits / 100) * 3600 + (digits % 100) * 60) as i32;
            if east {
                FixedOffset::east_opt(seconds)
            } else {
                FixedOffset::west_opt(seconds)
            }
        },
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date() {
        let (rem, val) = date(b"1-Feb-1994 ").unwrap();
        assert_eq!(rem, b" ");
        assert_eq!(val.to_string(), "1-Feb-1994");

        let (_, val) = date(b"\"21-dec-2023\" ").unwrap();
        assert_eq!(val.to_string(), "21-Dec-2023");

        assert!(date(b"32-Feb-1994 ").is_err());
        assert!(date(b"1-Zzz-1994 ").is_err());
    }

    #[test]
    fn test_date_time() {
        let (rem, val) = date_time(b"\"01-Feb-2023 09:05:00 +0200\"x").unwrap();
        assert_eq!(rem, b"x");
        assert_eq!(val.to_string(), "01-Feb-2023 09:05:00 +0200");

        // Space-padded single-digit day.
        let (_, val) = date_time(b"\" 1-Feb-2023 09:05:00 +0000\"x").unwrap();
        assert_eq!(val.to_string(), "01-Feb-2023 09:05:00 +0000");

        assert!(date_time(b"\"01-Feb-2023 29:05:00 +0200\"x").is_err());
    }
}
