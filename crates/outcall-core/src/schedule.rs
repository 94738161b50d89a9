//! Natural-language schedule parsing.
//!
//! [`ScheduleParser`] understands a small English grammar of dates and times
//! ("tomorrow at 9am", "in 2 hours and 30 minutes", "next friday 14:00",
//! "2024-05-01 noon"). Words outside that grammar are skipped, so "please call
//! tomorrow at 9am" reads as "tomorrow at 9am". [`ScheduleResolver`] wraps it
//! with the best-effort policy used for call files: an empty expression means
//! "call now", and an expression with no date or time in it falls back to the
//! reference instant instead of failing.

use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc, Weekday,
};
use regex::Regex;
use tracing::debug;

/// `2024-05-01`.
static DATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("Invalid date regex"));

/// `9am`, `9:30`, `21:15:00`, `9:30pm`.
static TIME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})(?::(\d{2}))?(?::(\d{2}))?(am|pm)?$").expect("Invalid time regex")
});

/// Splits ISO `2024-05-01t09:30` into date and time words.
static ISO_T_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2})t(\d)").expect("Invalid ISO separator regex")
});

/// Outcome of resolving a schedule expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// No schedule given: the call file keeps its natural timestamps.
    Immediate,
    /// Stamp the call file with this instant.
    At(DateTime<Utc>),
}

impl Schedule {
    /// Returns the target instant, if any.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Immediate => None,
            Self::At(at) => Some(*at),
        }
    }
}

/// Parses English date/time expressions relative to a reference instant.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleParser;

#[derive(Debug, Clone, Copy)]
enum DateWord {
    Fixed(NaiveDate),
    Tonight,
}

impl ScheduleParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses `text`, returning `None` if no date, time or offset is found.
    ///
    /// Results are in the reference's time zone. A date without a time keeps
    /// the reference clock time, except `tonight` which means 20:00. The first
    /// date and the first time win; offsets add up and apply last.
    pub fn parse<Tz: TimeZone>(&self, text: &str, reference: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let lowered = text.to_lowercase().replace(',', " ");
        let normalized = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return None;
        }
        let spaced = ISO_T_REGEX.replace_all(&normalized, "$1 $2");
        let words: Vec<&str> = spaced.split(' ').collect();

        let local = reference.naive_local();
        let today = local.date();
        let mut date: Option<DateWord> = None;
        let mut time: Option<NaiveTime> = None;
        let mut offset: Option<Duration> = None;
        let mut anchored = false;

        let mut i = 0;
        while i < words.len() {
            let rest = &words[i..];

            if let Some((delta, consumed)) = parse_offset(rest, offset.is_some()) {
                offset = Some(match offset {
                    Some(sum) => sum.checked_add(&delta)?,
                    None => delta,
                });
                i += consumed;
                continue;
            }

            if rest[0] == "now" {
                anchored = true;
                i += 1;
                continue;
            }

            if date.is_none() {
                if let Some((parsed, consumed)) = parse_date(rest, today) {
                    date = Some(parsed);
                    i += consumed;
                    continue;
                }
            }

            if time.is_none() {
                if let Some((parsed, consumed)) = parse_time(rest) {
                    time = Some(parsed);
                    i += consumed;
                    continue;
                }
            }

            debug!(word = rest[0], "Skipping schedule word");
            i += 1;
        }

        let base = match (date, time) {
            (None, None) if offset.is_some() || anchored => reference.clone(),
            (None, None) => return None,
            (date, time) => {
                let (day, default_time) = match date {
                    Some(DateWord::Fixed(day)) => (day, local.time()),
                    Some(DateWord::Tonight) => (today, NaiveTime::from_hms_opt(20, 0, 0)?),
                    None => (today, local.time()),
                };
                let naive = day.and_time(time.unwrap_or(default_time));
                reference
                    .timezone()
                    .from_local_datetime(&naive)
                    .earliest()?
            }
        };

        match offset {
            Some(delta) => base.checked_add_signed(delta),
            None => Some(base),
        }
    }
}

/// Reads `in 3 hours`, `in half an hour` or `10 minutes from now`.
///
/// A bare `30 minutes` counts only once an offset is running, which is how
/// `in 2 hours and 30 minutes` adds up.
fn parse_offset(words: &[&str], running: bool) -> Option<(Duration, usize)> {
    let lead = usize::from(words.first() == Some(&"in"));
    let rest = &words[lead..];
    let (count, halved, amount_len) = match rest {
        ["half", "a" | "an", ..] => (1, true, 2),
        ["a" | "an" | "one", ..] => (1, false, 1),
        [digits, ..] if digits.bytes().all(|b| b.is_ascii_digit()) => {
            (digits.parse::<i64>().ok()?, false, 1)
        }
        _ => return None,
    };
    let unit = unit_seconds(rest.get(amount_len)?)?;

    let mut consumed = lead + amount_len + 1;
    let from_now = matches!(words.get(consumed..consumed + 2), Some(["from", "now"]));
    if from_now {
        consumed += 2;
    }
    if lead == 0 && !from_now && !running {
        return None;
    }

    let seconds = count.checked_mul(unit)?;
    let seconds = if halved { seconds / 2 } else { seconds };
    Some((Duration::try_seconds(seconds)?, consumed))
}

fn unit_seconds(word: &str) -> Option<i64> {
    let singular = word.strip_suffix('s').unwrap_or(word);
    let seconds = match singular {
        "sec" | "second" => 1,
        "min" | "minute" => 60,
        "hr" | "hour" => 3_600,
        "day" => 86_400,
        "week" => 604_800,
        _ => return None,
    };
    Some(seconds)
}

fn parse_date(words: &[&str], today: NaiveDate) -> Option<(DateWord, usize)> {
    let fixed = |day: NaiveDate| DateWord::Fixed(day);

    match words {
        ["today", ..] => return Some((fixed(today), 1)),
        ["tonight", ..] => return Some((DateWord::Tonight, 1)),
        ["tomorrow", ..] => return Some((fixed(today.succ_opt()?), 1)),
        ["yesterday", ..] => return Some((fixed(today.pred_opt()?), 1)),
        ["next", "week", ..] => {
            return Some((fixed(today.checked_add_signed(Duration::days(7))?), 2));
        }
        ["next", "month", ..] => {
            return Some((fixed(today.checked_add_months(Months::new(1))?), 2));
        }
        _ => {}
    }

    let first = *words.first()?;
    if let Some(caps) = DATE_REGEX.captures(first) {
        let day = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )?;
        return Some((fixed(day), 1));
    }

    let (strictly_after, weekday_word, consumed) = match first {
        "next" => (true, *words.get(1)?, 2),
        "this" => (false, *words.get(1)?, 2),
        other => (false, other, 1),
    };
    let weekday = parse_weekday(weekday_word)?;
    let mut ahead = (weekday.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
    if strictly_after && ahead == 0 {
        ahead = 7;
    }
    let day = today.checked_add_signed(Duration::days(i64::from(ahead)))?;
    Some((fixed(day), consumed))
}

fn parse_weekday(word: &str) -> Option<Weekday> {
    let weekday = match word {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thur" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

fn parse_time(words: &[&str]) -> Option<(NaiveTime, usize)> {
    let first = *words.first()?;
    match first {
        "noon" | "midday" => return Some((NaiveTime::from_hms_opt(12, 0, 0)?, 1)),
        "midnight" => return Some((NaiveTime::from_hms_opt(0, 0, 0)?, 1)),
        _ => {}
    }

    let caps = TIME_REGEX.captures(first)?;
    let mut consumed = 1;
    let mut meridiem = caps.get(4).map(|m| m.as_str());
    if meridiem.is_none() {
        if let Some(next @ ("am" | "pm")) = words.get(1).copied() {
            meridiem = Some(next);
            consumed = 2;
        }
    }
    let has_minutes = caps.get(2).is_some();
    // A bare number is not a time of day.
    if meridiem.is_none() && !has_minutes {
        return None;
    }

    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let second: u32 = caps.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;
    match meridiem {
        Some(suffix) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            hour %= 12;
            if suffix == "pm" {
                hour += 12;
            }
        }
        None if hour > 23 => return None,
        None => {}
    }

    Some((NaiveTime::from_hms_opt(hour, minute, second)?, consumed))
}

/// Applies the best-effort scheduling policy on top of [`ScheduleParser`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleResolver {
    parser: ScheduleParser,
}

impl ScheduleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `text` against `reference`.
    ///
    /// Blank text is [`Schedule::Immediate`]; text the parser does not
    /// understand resolves to the reference instant.
    pub fn resolve<Tz: TimeZone>(&self, text: &str, reference: &DateTime<Tz>) -> Schedule {
        if text.trim().is_empty() {
            return Schedule::Immediate;
        }
        match self.parser.parse(text, reference) {
            Some(at) => Schedule::At(at.with_timezone(&Utc)),
            None => {
                debug!(schedule = text, "Unparsed schedule, calling as soon as possible");
                Schedule::At(reference.with_timezone(&Utc))
            }
        }
    }
}
