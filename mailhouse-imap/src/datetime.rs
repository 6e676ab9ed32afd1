//! IMAP date and time values.
//!
//! `INTERNALDATE` and the `APPEND` date-time argument use the fixed
//! `DD-Mon-YYYY HH:MM:SS +ZZZZ` shape; `SEARCH` date keys use the
//! date-only `D-Mon-YYYY` shape.

use std::fmt::{Display, Formatter};

use chrono::{Datelike, FixedOffset, Timelike};

pub(crate) const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A full date-time with zone offset (IMAP `date-time`).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DateTime(chrono::DateTime<FixedOffset>);

impl DateTime {
    pub fn inner(&self) -> &chrono::DateTime<FixedOffset> {
        &self.0
    }
}

impl From<chrono::DateTime<FixedOffset>> for DateTime {
    fn from(inner: chrono::DateTime<FixedOffset>) -> Self {
        Self(inner)
    }
}

impl Display for DateTime {
    /// `DD-Mon-YYYY HH:MM:SS +ZZZZ` (unquoted; the encoder adds quotes).
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let date = self.0.date_naive();
        let offset = self.0.offset().local_minus_utc();
        let (sign, offset) = if offset < 0 {
            ('-', -offset)
        } else {
            ('+', offset)
        };

        write!(
            f,
            "{:02}-{}-{:04} {:02}:{:02}:{:02} {}{:02}{:02}",
            date.day(),
            MONTHS[date.month0() as usize],
            date.year(),
            self.0.hour(),
            self.0.minute(),
            self.0.second(),
            sign,
            offset / 3600,
            (offset % 3600) / 60,
        )
    }
}

/// A date without time (IMAP `date`), used by `SEARCH` keys.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NaiveDate(chrono::NaiveDate);

impl NaiveDate {
    pub fn inner(&self) -> &chrono::NaiveDate {
        &self.0
    }
}

impl From<chrono::NaiveDate> for NaiveDate {
    fn from(inner: chrono::NaiveDate) -> Self {
        Self(inner)
    }
}

impl Display for NaiveDate {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{:04}",
            self.0.day(),
            MONTHS[self.0.month0() as usize],
            self.0.year(),
        )
    }
}
