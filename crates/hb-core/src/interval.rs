//! Interval resolution.
//!
//! Maps named range tokens (`today`, `last_7_days`, ...) and explicit dates to
//! half-open `[from, to)` instants, computed in the user's timezone.
//!
//! Calendar tokens (`today`, `week`, `last_month`, ...) cover whole calendar
//! periods. Rolling tokens (`7_days`, `12_months`, ...) end at now. Weeks start
//! on Monday.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, Months, NaiveDate, NaiveTime, TimeZone, Utc,
};
use serde::Serialize;

use crate::error::SummaryError;
use crate::types::UserTimezone;

/// A half-open `[from, to)` range of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Interval {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Interval {
    /// Creates an interval, rejecting empty or inverted ranges.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, SummaryError> {
        if to <= from {
            return Err(SummaryError::InvalidRange(format!(
                "range end {to} is not after start {from}"
            )));
        }
        Ok(Self { from, to })
    }

    pub fn duration(&self) -> Duration {
        self.to - self.from
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from <= ts && ts < self.to
    }

    /// Number of (possibly partial) days covered, at least one.
    pub fn day_count(&self) -> i64 {
        let ms = self.duration().num_milliseconds();
        let day_ms = Duration::days(1).num_milliseconds();
        ((ms + day_ms - 1) / day_ms).max(1)
    }

    /// Splits the interval at local midnights.
    ///
    /// Produces an optional partial head, any number of full local days, and
    /// an optional partial tail, in order.
    pub fn split_by_day(&self, tz: UserTimezone) -> Vec<DaySegment> {
        let mut segments = Vec::new();
        let mut cursor = self.from;
        while cursor < self.to {
            let date = local_date(cursor, tz);
            let day_start = local_midnight_to_utc(date, tz);
            let day_end = local_midnight_to_utc(date + Duration::days(1), tz);
            let end = day_end.min(self.to);
            let segment = Self {
                from: cursor,
                to: end,
            };
            if cursor == day_start && end == day_end {
                segments.push(DaySegment::FullDay(segment));
            } else {
                segments.push(DaySegment::Partial(segment));
            }
            cursor = end;
        }
        segments
    }
}

/// One piece of an interval split at local midnights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaySegment {
    /// Exactly one local day, midnight to midnight.
    FullDay(Interval),
    /// Part of a local day at either end of the interval.
    Partial(Interval),
}

impl DaySegment {
    pub const fn interval(&self) -> Interval {
        match self {
            Self::FullDay(interval) | Self::Partial(interval) => *interval,
        }
    }

    pub const fn is_full_day(&self) -> bool {
        matches!(self, Self::FullDay(_))
    }
}

/// The local calendar date of `ts` in `tz`.
pub fn local_date(ts: DateTime<Utc>, tz: UserTimezone) -> NaiveDate {
    ts.with_timezone(&tz.offset()).date_naive()
}

/// The UTC instant of local midnight starting `date` in `tz`.
pub fn local_midnight_to_utc(date: NaiveDate, tz: UserTimezone) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.offset().from_local_datetime(&midnight) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        // Fixed offsets have no gaps; shift manually if chrono ever says otherwise.
        LocalResult::None => {
            (midnight - Duration::seconds(i64::from(tz.offset().local_minus_utc()))).and_utc()
        }
    }
}

/// Named range tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedRange {
    Today,
    Yesterday,
    ThisWeek,
    ThisMonth,
    ThisYear,
    LastWeek,
    LastMonth,
    LastYear,
    Last7Days,
    Last14Days,
    Last30Days,
    Last6Months,
    Last12Months,
    AllTime,
}

impl NamedRange {
    /// Canonical token name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Yesterday => "yesterday",
            Self::ThisWeek => "week",
            Self::ThisMonth => "month",
            Self::ThisYear => "year",
            Self::LastWeek => "last_week",
            Self::LastMonth => "last_month",
            Self::LastYear => "last_year",
            Self::Last7Days => "last_7_days",
            Self::Last14Days => "last_14_days",
            Self::Last30Days => "last_30_days",
            Self::Last6Months => "last_6_months",
            Self::Last12Months => "last_12_months",
            Self::AllTime => "all_time",
        }
    }

    fn parse(token: &str) -> Option<Self> {
        let range = match token {
            "today" => Self::Today,
            "yesterday" => Self::Yesterday,
            "week" | "this_week" => Self::ThisWeek,
            "month" | "this_month" => Self::ThisMonth,
            "year" | "this_year" => Self::ThisYear,
            "last_week" => Self::LastWeek,
            "last_month" => Self::LastMonth,
            "last_year" => Self::LastYear,
            "7_days" | "last_7_days" => Self::Last7Days,
            "14_days" | "last_14_days" => Self::Last14Days,
            "30_days" | "last_30_days" => Self::Last30Days,
            "6_months" | "last_6_months" => Self::Last6Months,
            "12_months" | "last_12_months" => Self::Last12Months,
            "any" | "all_time" => Self::AllTime,
            _ => return None,
        };
        Some(range)
    }
}

/// A parsed range request, not yet anchored to a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    Named(NamedRange),
    /// Local dates, both inclusive.
    Dates { start: NaiveDate, end: NaiveDate },
}

impl RangeSpec {
    /// Whether resolving needs the user's first heartbeat.
    pub const fn needs_first_heartbeat(&self) -> bool {
        matches!(self, Self::Named(NamedRange::AllTime))
    }

    /// Resolves against the current time.
    pub fn resolve(
        &self,
        tz: UserTimezone,
        first_heartbeat: Option<DateTime<Utc>>,
    ) -> Result<Interval, SummaryError> {
        self.resolve_at(tz, Utc::now(), first_heartbeat)
    }

    /// Resolves relative to `now`.
    pub fn resolve_at(
        &self,
        tz: UserTimezone,
        now: DateTime<Utc>,
        first_heartbeat: Option<DateTime<Utc>>,
    ) -> Result<Interval, SummaryError> {
        let today = local_date(now, tz);
        let midnight = |date: NaiveDate| local_midnight_to_utc(date, tz);

        let (from, to) = match self {
            Self::Dates { start, end } => {
                (midnight(*start), midnight(*end + Duration::days(1)))
            }
            Self::Named(named) => match named {
                NamedRange::Today => (midnight(today), midnight(today + Duration::days(1))),
                NamedRange::Yesterday => (midnight(today - Duration::days(1)), midnight(today)),
                NamedRange::ThisWeek => {
                    let monday = week_start(today);
                    (midnight(monday), midnight(monday + Duration::days(7)))
                }
                NamedRange::LastWeek => {
                    let monday = week_start(today);
                    (midnight(monday - Duration::days(7)), midnight(monday))
                }
                NamedRange::ThisMonth => {
                    let first = month_start(today)?;
                    (midnight(first), midnight(add_months(first, 1)?))
                }
                NamedRange::LastMonth => {
                    let first = month_start(today)?;
                    (midnight(sub_months(first, 1)?), midnight(first))
                }
                NamedRange::ThisYear => {
                    let first = year_start(today.year())?;
                    (midnight(first), midnight(year_start(today.year() + 1)?))
                }
                NamedRange::LastYear => {
                    let first = year_start(today.year())?;
                    (midnight(year_start(today.year() - 1)?), midnight(first))
                }
                NamedRange::Last7Days => (now - Duration::days(7), now),
                NamedRange::Last14Days => (now - Duration::days(14), now),
                NamedRange::Last30Days => (now - Duration::days(30), now),
                NamedRange::Last6Months => (rolling_months(now, tz, 6)?, now),
                NamedRange::Last12Months => (rolling_months(now, tz, 12)?, now),
                NamedRange::AllTime => {
                    let from = first_heartbeat
                        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
                        .min(now - Duration::milliseconds(1));
                    (from, now)
                }
            },
        };
        Interval::new(from, to)
    }
}

impl FromStr for RangeSpec {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        if let Some(named) = NamedRange::parse(&token) {
            return Ok(Self::Named(named));
        }

        let (start, end) = match token.split_once("..") {
            Some((start, end)) => (parse_date(start)?, parse_date(end)?),
            None => {
                let date = parse_date(&token)?;
                (date, date)
            }
        };
        if end < start {
            return Err(SummaryError::InvalidRange(format!(
                "range end {end} is before start {start}"
            )));
        }
        Ok(Self::Dates { start, end })
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(named) => write!(f, "{}", named.as_str()),
            Self::Dates { start, end } if start == end => write!(f, "{start}"),
            Self::Dates { start, end } => write!(f, "{start}..{end}"),
        }
    }
}

/// Resolves a range token in `tz` relative to now.
pub fn resolve_interval(
    token: &str,
    tz: UserTimezone,
    first_heartbeat: Option<DateTime<Utc>>,
) -> Result<Interval, SummaryError> {
    token.parse::<RangeSpec>()?.resolve(tz, first_heartbeat)
}

fn parse_date(s: &str) -> Result<NaiveDate, SummaryError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| SummaryError::InvalidRange(format!("unrecognized range: {s}")))
}

fn week_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
}

fn month_start(today: NaiveDate) -> Result<NaiveDate, SummaryError> {
    today
        .with_day(1)
        .ok_or_else(|| SummaryError::InvalidRange(format!("no month start for {today}")))
}

fn year_start(year: i32) -> Result<NaiveDate, SummaryError> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| SummaryError::InvalidRange(format!("year {year} out of range")))
}

fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate, SummaryError> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| SummaryError::InvalidRange(format!("{date} + {months} months out of range")))
}

fn sub_months(date: NaiveDate, months: u32) -> Result<NaiveDate, SummaryError> {
    date.checked_sub_months(Months::new(months))
        .ok_or_else(|| SummaryError::InvalidRange(format!("{date} - {months} months out of range")))
}

/// `now` minus whole months in local time, clamped to month end.
fn rolling_months(
    now: DateTime<Utc>,
    tz: UserTimezone,
    months: u32,
) -> Result<DateTime<Utc>, SummaryError> {
    now.with_timezone(&tz.offset())
        .checked_sub_months(Months::new(months))
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| SummaryError::InvalidRange(format!("{months} months before {now}")))
}
