//! Reference-layout date handling.
//!
//! A layout is an example rendering of the reference instant
//! `Mon Jan 2 15:04:05 MST 2006`; each recognised component (`2006`, `Jan`,
//! `02`, `-0700`, ...) stands for the corresponding field of the date being
//! parsed or formatted. Everything else in the layout is literal text.

use std::io::Write as _;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike};
use thiserror::Error;

/// The layout dates in mail headers are expected to follow.
pub const RFC1123Z: &str = "Mon, 02 Jan 2006 15:04:05 -0700";

const LONG_DAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];
const SHORT_DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const LONG_MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];
const SHORT_MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Zone abbreviations with a well-known fixed offset (seconds east of UTC).
const NAMED_ZONES: [(&str, i32); 13] = [
    ("EST", -5 * 3600),
    ("EDT", -4 * 3600),
    ("CST", -6 * 3600),
    ("CDT", -5 * 3600),
    ("MST", -7 * 3600),
    ("MDT", -6 * 3600),
    ("PST", -8 * 3600),
    ("PDT", -7 * 3600),
    ("GMT", 0),
    ("UTC", 0),
    ("CET", 3600),
    ("CEST", 2 * 3600),
    ("JST", 9 * 3600),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("parsing time {value:?} as {layout:?}: cannot parse {value_elem:?} as {layout_elem:?}")]
    Mismatch {
        value: String,
        layout: String,
        value_elem: String,
        layout_elem: String,
    },

    #[error("parsing time {value:?}: {field} out of range")]
    OutOfRange { value: String, field: &'static str },

    #[error("parsing time {value:?}: day-of-year does not match {field}")]
    DayOfYear { value: String, field: &'static str },

    #[error("parsing time {value:?}: extra text: {extra:?}")]
    ExtraText { value: String, extra: String },
}

/// How a numeric zone offset is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OffsetStyle {
    /// `-07`
    Hours,
    /// `-0700`
    HoursMinutes,
    /// `-07:00`
    Colon,
    /// `-070000`
    Seconds,
    /// `-07:00:00`
    ColonSeconds,
}

/// One recognised layout component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Std {
    LongMonth,
    Month,
    NumMonth,
    ZeroMonth,
    LongWeekDay,
    WeekDay,
    Day,
    UnderDay,
    ZeroDay,
    UnderYearDay,
    ZeroYearDay,
    Hour,
    Hour12,
    ZeroHour12,
    Minute,
    ZeroMinute,
    Second,
    ZeroSecond,
    LongYear,
    Year,
    Pm { upper: bool },
    ZoneName,
    /// Numeric offset; with `z`, UTC is written as `Z`.
    Offset { z: bool, style: OffsetStyle },
    /// `.000` keeps trailing zeros, `.999` drops them.
    Frac { sep: u8, digits: usize, trim: bool },
}

const OFFSETS: [(&[u8], OffsetStyle); 5] = [
    (b"070000", OffsetStyle::Seconds),
    (b"07:00:00", OffsetStyle::ColonSeconds),
    (b"0700", OffsetStyle::HoursMinutes),
    (b"07:00", OffsetStyle::Colon),
    (b"07", OffsetStyle::Hours),
];

fn starts_lower(s: &[u8]) -> bool {
    s.first().is_some_and(u8::is_ascii_lowercase)
}

fn is_digit(s: &[u8], i: usize) -> bool {
    s.get(i).is_some_and(u8::is_ascii_digit)
}

/// Find the first component in `layout`.
///
/// Returns the length of the literal prefix and, if found, the component
/// with its length in the layout.
fn next_std(layout: &[u8]) -> (usize, Option<(Std, usize)>) {
    for i in 0..layout.len() {
        let rest = &layout[i..];
        let found = match layout[i] {
            b'J' if rest.starts_with(b"January") => Some((Std::LongMonth, 7)),
            b'J' if rest.starts_with(b"Jan") && !starts_lower(&rest[3..]) => {
                Some((Std::Month, 3))
            }
            b'M' if rest.starts_with(b"Monday") => Some((Std::LongWeekDay, 6)),
            b'M' if rest.starts_with(b"Mon") && !starts_lower(&rest[3..]) => {
                Some((Std::WeekDay, 3))
            }
            b'M' if rest.starts_with(b"MST") => Some((Std::ZoneName, 3)),
            b'0' if matches!(rest.get(1), Some(b'1'..=b'6')) => {
                let std = match rest[1] {
                    b'1' => Std::ZeroMonth,
                    b'2' => Std::ZeroDay,
                    b'3' => Std::ZeroHour12,
                    b'4' => Std::ZeroMinute,
                    b'5' => Std::ZeroSecond,
                    _ => Std::Year,
                };
                Some((std, 2))
            }
            b'0' if rest.starts_with(b"002") => Some((Std::ZeroYearDay, 3)),
            b'1' if rest.starts_with(b"15") => Some((Std::Hour, 2)),
            b'1' => Some((Std::NumMonth, 1)),
            b'2' if rest.starts_with(b"2006") => Some((Std::LongYear, 4)),
            b'2' => Some((Std::Day, 1)),
            // `_2006` is a literal underscore followed by the year.
            b'_' if rest.starts_with(b"_2006") => return (i + 1, Some((Std::LongYear, 4))),
            b'_' if rest.starts_with(b"_2") => Some((Std::UnderDay, 2)),
            b'_' if rest.starts_with(b"__2") => Some((Std::UnderYearDay, 3)),
            b'3' => Some((Std::Hour12, 1)),
            b'4' => Some((Std::Minute, 1)),
            b'5' => Some((Std::Second, 1)),
            b'P' if rest.starts_with(b"PM") => Some((Std::Pm { upper: true }, 2)),
            b'p' if rest.starts_with(b"pm") => Some((Std::Pm { upper: false }, 2)),
            b'-' | b'Z' => OFFSETS.iter().find_map(|(pat, style)| {
                rest[1..].starts_with(pat).then_some((
                    Std::Offset {
                        z: layout[i] == b'Z',
                        style: *style,
                    },
                    1 + pat.len(),
                ))
            }),
            b'.' | b',' if matches!(rest.get(1), Some(b'0' | b'9')) => {
                let ch = rest[1];
                let mut j = 1;
                while rest.get(j) == Some(&ch) {
                    j += 1;
                }
                (!is_digit(rest, j)).then_some((
                    Std::Frac {
                        sep: rest[0],
                        digits: j - 1,
                        trim: ch == b'9',
                    },
                    j,
                ))
            }
            _ => None,
        };
        if found.is_some() {
            return (i, found);
        }
    }
    (layout.len(), None)
}

/// Append `x` zero-padded to at least `width` digits.
fn push_int(out: &mut Vec<u8>, x: i64, width: usize) {
    if x < 0 {
        out.push(b'-');
    }
    let _ = write!(out, "{:0width$}", x.unsigned_abs(), width = width);
}

fn push_space_padded(out: &mut Vec<u8>, x: i64, width: usize) {
    let _ = write!(out, "{x:>width$}", width = width);
}

fn push_offset(out: &mut Vec<u8>, offset: i32, style: OffsetStyle) {
    let abs = offset.unsigned_abs();
    out.push(if offset < 0 { b'-' } else { b'+' });
    let _ = write!(out, "{:02}", abs / 3600);
    let colon = matches!(style, OffsetStyle::Colon | OffsetStyle::ColonSeconds);
    if style != OffsetStyle::Hours {
        if colon {
            out.push(b':');
        }
        let _ = write!(out, "{:02}", abs / 60 % 60);
    }
    if matches!(style, OffsetStyle::Seconds | OffsetStyle::ColonSeconds) {
        if colon {
            out.push(b':');
        }
        let _ = write!(out, "{:02}", abs % 60);
    }
}

/// Render `dt` following `layout`. Literal layout bytes are copied unchanged.
pub fn format(dt: &DateTime<FixedOffset>, layout: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(layout.len() + 10);
    let mut layout = layout;
    let year = i64::from(dt.year());
    let offset = dt.offset().local_minus_utc();

    loop {
        let (start, std) = next_std(layout);
        out.extend_from_slice(&layout[..start]);
        let Some((std, len)) = std else { break };
        layout = &layout[start + len..];

        match std {
            Std::Year => push_int(&mut out, year % 100, 2),
            Std::LongYear => push_int(&mut out, year, 4),
            Std::Month => out.extend_from_slice(SHORT_MONTHS[dt.month0() as usize].as_bytes()),
            Std::LongMonth => out.extend_from_slice(LONG_MONTHS[dt.month0() as usize].as_bytes()),
            Std::NumMonth => push_int(&mut out, i64::from(dt.month()), 0),
            Std::ZeroMonth => push_int(&mut out, i64::from(dt.month()), 2),
            Std::WeekDay => {
                out.extend_from_slice(SHORT_DAYS[dt.weekday().num_days_from_sunday() as usize].as_bytes())
            }
            Std::LongWeekDay => {
                out.extend_from_slice(LONG_DAYS[dt.weekday().num_days_from_sunday() as usize].as_bytes())
            }
            Std::Day => push_int(&mut out, i64::from(dt.day()), 0),
            Std::UnderDay => push_space_padded(&mut out, i64::from(dt.day()), 2),
            Std::ZeroDay => push_int(&mut out, i64::from(dt.day()), 2),
            Std::UnderYearDay => push_space_padded(&mut out, i64::from(dt.ordinal()), 3),
            Std::ZeroYearDay => push_int(&mut out, i64::from(dt.ordinal()), 3),
            Std::Hour => push_int(&mut out, i64::from(dt.hour()), 2),
            Std::Hour12 | Std::ZeroHour12 => {
                let hr = match dt.hour() % 12 {
                    0 => 12,
                    h => h,
                };
                let width = if std == Std::ZeroHour12 { 2 } else { 0 };
                push_int(&mut out, i64::from(hr), width);
            }
            Std::Minute => push_int(&mut out, i64::from(dt.minute()), 0),
            Std::ZeroMinute => push_int(&mut out, i64::from(dt.minute()), 2),
            Std::Second => push_int(&mut out, i64::from(dt.second()), 0),
            Std::ZeroSecond => push_int(&mut out, i64::from(dt.second()), 2),
            Std::Pm { upper } => {
                let text = match (dt.hour() >= 12, upper) {
                    (true, true) => "PM",
                    (true, false) => "pm",
                    (false, true) => "AM",
                    (false, false) => "am",
                };
                out.extend_from_slice(text.as_bytes());
            }
            Std::Offset { z: true, .. } if offset == 0 => out.push(b'Z'),
            Std::Offset { style, .. } => push_offset(&mut out, offset, style),
            Std::ZoneName if offset == 0 => out.extend_from_slice(b"UTC"),
            Std::ZoneName => push_offset(&mut out, offset, OffsetStyle::HoursMinutes),
            Std::Frac { sep, digits, trim } => {
                let nanos = format!("{:09}", dt.nanosecond() % 1_000_000_000);
                let mut frac = &nanos[..digits.min(9)];
                if trim {
                    frac = frac.trim_end_matches('0');
                }
                if !frac.is_empty() || !trim {
                    out.push(sep);
                    out.extend_from_slice(frac.as_bytes());
                }
            }
        }
    }
    out
}

/// Fields collected while parsing; `-1` marks "not seen".
struct Fields {
    year: i64,
    month: i64,
    day: i64,
    yday: i64,
    hour: i64,
    minute: i64,
    second: i64,
    nanos: i64,
    pm: bool,
    am: bool,
    utc: bool,
    offset: Option<i64>,
    zone_name: Option<String>,
}

impl Default for Fields {
    fn default() -> Self {
        Self {
            year: 0,
            month: -1,
            day: -1,
            yday: -1,
            hour: 0,
            minute: 0,
            second: 0,
            nanos: 0,
            pm: false,
            am: false,
            utc: false,
            offset: None,
            zone_name: None,
        }
    }
}

enum StdError {
    Bad,
    Range(&'static str),
}

type StdResult<'v> = std::result::Result<&'v [u8], StdError>;

/// One or two digits; `fixed` requires two.
fn getnum(s: &[u8], fixed: bool) -> std::result::Result<(i64, &[u8]), StdError> {
    if !is_digit(s, 0) {
        return Err(StdError::Bad);
    }
    if !is_digit(s, 1) {
        if fixed {
            return Err(StdError::Bad);
        }
        return Ok((i64::from(s[0] - b'0'), &s[1..]));
    }
    Ok((i64::from(s[0] - b'0') * 10 + i64::from(s[1] - b'0'), &s[2..]))
}

/// One to three digits; `fixed` requires three.
fn getnum3(s: &[u8], fixed: bool) -> std::result::Result<(i64, &[u8]), StdError> {
    let mut n = 0;
    let mut i = 0;
    while i < 3 && is_digit(s, i) {
        n = n * 10 + i64::from(s[i] - b'0');
        i += 1;
    }
    if i == 0 || (fixed && i != 3) {
        return Err(StdError::Bad);
    }
    Ok((n, &s[i..]))
}

fn atoi(s: &[u8]) -> std::result::Result<i64, StdError> {
    let (neg, digits) = match s.first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(StdError::Bad);
    }
    let n = std::str::from_utf8(digits)
        .ok()
        .and_then(|d| d.parse::<i64>().ok())
        .ok_or(StdError::Bad)?;
    Ok(if neg { -n } else { n })
}

/// Case-insensitive prefix match against a name table.
fn lookup<'v>(table: &[&str], value: &'v [u8]) -> std::result::Result<(usize, &'v [u8]), StdError> {
    table
        .iter()
        .enumerate()
        .find(|(_, name)| {
            value.len() >= name.len() && value[..name.len()].eq_ignore_ascii_case(name.as_bytes())
        })
        .map(|(i, name)| (i, &value[name.len()..]))
        .ok_or(StdError::Bad)
}

/// Fractional seconds: a separator followed by `nbytes - 1` digits.
fn parse_nanos(value: &[u8], nbytes: usize) -> std::result::Result<i64, StdError> {
    if !matches!(value.first(), Some(b'.' | b',')) {
        return Err(StdError::Bad);
    }
    let digits = &value[1..nbytes.min(10)];
    let mut ns = atoi(digits)?;
    if ns < 0 {
        return Err(StdError::Range("fractional second"));
    }
    for _ in digits.len()..9 {
        ns *= 10;
    }
    Ok(ns)
}

/// Length of a zone abbreviation at the start of `value`, if it looks like one.
fn zone_name_len(value: &[u8]) -> Option<usize> {
    if value.len() < 3 {
        return None;
    }
    if value.starts_with(b"ChST") || value.starts_with(b"MeST") {
        return Some(4);
    }
    if value.starts_with(b"GMT") {
        return Some(3 + signed_offset_len(&value[3..]));
    }
    if matches!(value[0], b'+' | b'-') {
        let n = signed_offset_len(value);
        return (n > 0).then_some(n);
    }
    let upper = value.iter().take_while(|c| c.is_ascii_uppercase()).count();
    match upper {
        3 => Some(3),
        4 if value[3] == b'T' || value.starts_with(b"WITA") => Some(4),
        5 if value[4] == b'T' => Some(5),
        _ => None,
    }
}

/// `+h`/`-hh` after a zone name, up to 24 hours.
fn signed_offset_len(value: &[u8]) -> usize {
    if !matches!(value.first(), Some(b'+' | b'-')) {
        return 0;
    }
    let digits = value[1..].iter().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 2 {
        return 0;
    }
    match atoi(&value[1..1 + digits]) {
        Ok(hours) if hours <= 24 => 1 + digits,
        _ => 0,
    }
}

/// Skip the literal `prefix` in `value`. A run of spaces in the prefix
/// matches any run of spaces in the value.
fn skip<'v>(mut value: &'v [u8], mut prefix: &[u8]) -> std::result::Result<&'v [u8], &'v [u8]> {
    fn cut_space(s: &[u8]) -> &[u8] {
        let n = s.iter().take_while(|&&c| c == b' ').count();
        &s[n..]
    }

    while let Some(&p) = prefix.first() {
        if p == b' ' {
            if value.first().is_some_and(|&c| c != b' ') {
                return Err(value);
            }
            prefix = cut_space(prefix);
            value = cut_space(value);
            continue;
        }
        if value.first() != Some(&p) {
            return Err(value);
        }
        prefix = &prefix[1..];
        value = &value[1..];
    }
    Ok(value)
}

fn parse_offset<'v>(value: &'v [u8], style: OffsetStyle, f: &mut Fields) -> StdResult<'v> {
    let (sign, hour, min, sec, rest): (u8, &[u8], &[u8], &[u8], &[u8]) = match style {
        OffsetStyle::Colon => {
            if value.len() < 6 || value[3] != b':' {
                return Err(StdError::Bad);
            }
            (value[0], &value[1..3], &value[4..6], &b"00"[..], &value[6..])
        }
        OffsetStyle::Hours => {
            if value.len() < 3 {
                return Err(StdError::Bad);
            }
            (value[0], &value[1..3], &b"00"[..], &b"00"[..], &value[3..])
        }
        OffsetStyle::ColonSeconds => {
            if value.len() < 9 || value[3] != b':' || value[6] != b':' {
                return Err(StdError::Bad);
            }
            (value[0], &value[1..3], &value[4..6], &value[7..9], &value[9..])
        }
        OffsetStyle::Seconds => {
            if value.len() < 7 {
                return Err(StdError::Bad);
            }
            (value[0], &value[1..3], &value[3..5], &value[5..7], &value[7..])
        }
        OffsetStyle::HoursMinutes => {
            if value.len() < 5 {
                return Err(StdError::Bad);
            }
            (value[0], &value[1..3], &value[3..5], &b"00"[..], &value[5..])
        }
    };

    let (hr, _) = getnum(hour, true)?;
    let (mm, _) = getnum(min, true)?;
    let (ss, _) = getnum(sec, true)?;
    if hr > 24 {
        return Err(StdError::Range("time zone offset hour"));
    }
    if mm > 60 {
        return Err(StdError::Range("time zone offset minute"));
    }
    if ss > 60 {
        return Err(StdError::Range("time zone offset second"));
    }
    let secs = (hr * 60 + mm) * 60 + ss;
    f.offset = Some(match sign {
        b'+' => secs,
        b'-' => -secs,
        _ => return Err(StdError::Bad),
    });
    Ok(rest)
}

/// Consume one component from `value`. `layout` is what follows the component.
fn parse_std<'v>(std: Std, value: &'v [u8], layout: &[u8], f: &mut Fields) -> StdResult<'v> {
    let rest = match std {
        Std::Year => {
            if value.len() < 2 {
                return Err(StdError::Bad);
            }
            let yy = atoi(&value[..2])?;
            f.year = if yy >= 69 { yy + 1900 } else { yy + 2000 };
            &value[2..]
        }
        Std::LongYear => {
            if value.len() < 4 || !is_digit(value, 0) {
                return Err(StdError::Bad);
            }
            f.year = atoi(&value[..4])?;
            &value[4..]
        }
        Std::Month | Std::LongMonth => {
            let table = if std == Std::Month {
                &SHORT_MONTHS
            } else {
                &LONG_MONTHS
            };
            let (i, rest) = lookup(table, value)?;
            f.month = i as i64 + 1;
            rest
        }
        Std::NumMonth | Std::ZeroMonth => {
            let (month, rest) = getnum(value, std == Std::ZeroMonth)?;
            if !(1..=12).contains(&month) {
                return Err(StdError::Range("month"));
            }
            f.month = month;
            rest
        }
        Std::WeekDay => lookup(&SHORT_DAYS, value)?.1,
        Std::LongWeekDay => lookup(&LONG_DAYS, value)?.1,
        Std::Day | Std::UnderDay | Std::ZeroDay => {
            let value = match value {
                [b' ', rest @ ..] if std == Std::UnderDay => rest,
                _ => value,
            };
            let (day, rest) = getnum(value, std == Std::ZeroDay)?;
            f.day = day;
            rest
        }
        Std::UnderYearDay | Std::ZeroYearDay => {
            let mut value = value;
            for _ in 0..2 {
                if std == Std::UnderYearDay && value.first() == Some(&b' ') {
                    value = &value[1..];
                }
            }
            let (yday, rest) = getnum3(value, std == Std::ZeroYearDay)?;
            f.yday = yday;
            rest
        }
        Std::Hour => {
            let (hour, rest) = getnum(value, false)?;
            if !(0..24).contains(&hour) {
                return Err(StdError::Range("hour"));
            }
            f.hour = hour;
            rest
        }
        Std::Hour12 | Std::ZeroHour12 => {
            let (hour, rest) = getnum(value, std == Std::ZeroHour12)?;
            if !(0..=12).contains(&hour) {
                return Err(StdError::Range("hour"));
            }
            f.hour = hour;
            rest
        }
        Std::Minute | Std::ZeroMinute => {
            let (minute, rest) = getnum(value, std == Std::ZeroMinute)?;
            if !(0..60).contains(&minute) {
                return Err(StdError::Range("minute"));
            }
            f.minute = minute;
            rest
        }
        Std::Second | Std::ZeroSecond => {
            let (second, mut rest) = getnum(value, std == Std::ZeroSecond)?;
            if !(0..60).contains(&second) {
                return Err(StdError::Range("second"));
            }
            f.second = second;

            // Fractional seconds may follow even when the layout has none.
            let frac_in_layout = matches!(next_std(layout).1, Some((Std::Frac { .. }, _)));
            if !frac_in_layout
                && rest.len() >= 2
                && matches!(rest[0], b'.' | b',')
                && is_digit(rest, 1)
            {
                let mut n = 2;
                while is_digit(rest, n) {
                    n += 1;
                }
                f.nanos = parse_nanos(rest, n)?;
                rest = &rest[n..];
            }
            rest
        }
        Std::Pm { upper } => {
            if value.len() < 2 {
                return Err(StdError::Bad);
            }
            let (pm, am): (&[u8], &[u8]) = if upper {
                (&b"PM"[..], &b"AM"[..])
            } else {
                (&b"pm"[..], &b"am"[..])
            };
            match &value[..2] {
                p if p == pm => f.pm = true,
                p if p == am => f.am = true,
                _ => return Err(StdError::Bad),
            }
            &value[2..]
        }
        Std::Offset { z, style } => {
            if z && value.first() == Some(&b'Z') {
                f.utc = true;
                &value[1..]
            } else {
                parse_offset(value, style, f)?
            }
        }
        Std::ZoneName => {
            if value.starts_with(b"UTC") {
                f.utc = true;
                &value[3..]
            } else {
                let n = zone_name_len(value).ok_or(StdError::Bad)?;
                f.zone_name = Some(String::from_utf8_lossy(&value[..n]).into_owned());
                &value[n..]
            }
        }
        Std::Frac {
            digits,
            trim: false,
            ..
        } => {
            let ndigit = 1 + digits;
            if value.len() < ndigit {
                return Err(StdError::Bad);
            }
            f.nanos = parse_nanos(value, ndigit)?;
            &value[ndigit..]
        }
        Std::Frac { trim: true, .. } => {
            // Optional: absent fractions are fine.
            if value.len() < 2 || !matches!(value[0], b'.' | b',') || !is_digit(value, 1) {
                return Ok(value);
            }
            let mut i = 1;
            while is_digit(value, i + 1) {
                i += 1;
            }
            f.nanos = parse_nanos(value, 1 + i)?;
            &value[1 + i..]
        }
    };
    Ok(rest)
}

/// Offset in seconds for a parsed zone abbreviation.
fn zone_offset(name: &str) -> i64 {
    if let Some(hours) = name.strip_prefix("GMT").filter(|h| !h.is_empty()) {
        return atoi(hours.as_bytes()).map(|h| h * 3600).unwrap_or(0);
    }
    NAMED_ZONES
        .iter()
        .find(|(zone, _)| *zone == name)
        .map(|(_, secs)| i64::from(*secs))
        .unwrap_or(0)
}

/// Parse `value` according to `layout`.
pub fn parse(layout: &str, value: &str) -> Result<DateTime<FixedOffset>, LayoutError> {
    let lossy = |s: &[u8]| String::from_utf8_lossy(s).into_owned();
    let out_of_range = |field| LayoutError::OutOfRange {
        value: value.to_string(),
        field,
    };

    let mut f = Fields::default();
    let mut lay = layout.as_bytes();
    let mut val = value.as_bytes();

    loop {
        let (start, std) = next_std(lay);
        let prefix = &lay[..start];
        val = skip(val, prefix).map_err(|rest| LayoutError::Mismatch {
            value: value.to_string(),
            layout: layout.to_string(),
            value_elem: lossy(rest),
            layout_elem: lossy(prefix),
        })?;

        let Some((std, len)) = std else {
            if !val.is_empty() {
                return Err(LayoutError::ExtraText {
                    value: value.to_string(),
                    extra: lossy(val),
                });
            }
            break;
        };
        let std_str = &lay[start..start + len];
        lay = &lay[start + len..];

        val = match parse_std(std, val, lay, &mut f) {
            Ok(rest) => rest,
            Err(StdError::Range(field)) => return Err(out_of_range(field)),
            Err(StdError::Bad) => {
                return Err(LayoutError::Mismatch {
                    value: value.to_string(),
                    layout: layout.to_string(),
                    value_elem: lossy(val),
                    layout_elem: lossy(std_str),
                })
            }
        };
    }

    if f.pm && f.hour < 12 {
        f.hour += 12;
    } else if f.am && f.hour == 12 {
        f.hour = 0;
    }

    let year = i32::try_from(f.year).map_err(|_| out_of_range("year"))?;
    let date = if f.yday >= 0 {
        let date = u32::try_from(f.yday)
            .ok()
            .and_then(|yday| NaiveDate::from_yo_opt(year, yday))
            .ok_or_else(|| out_of_range("day-of-year"))?;
        let mismatch = |field| LayoutError::DayOfYear {
            value: value.to_string(),
            field,
        };
        if f.month >= 0 && f.month != i64::from(date.month()) {
            return Err(mismatch("month"));
        }
        if f.day >= 0 && f.day != i64::from(date.day()) {
            return Err(mismatch("day"));
        }
        date
    } else {
        let month = if f.month < 0 { 1 } else { f.month as u32 };
        let day = if f.day < 0 { 1 } else { f.day };
        u32::try_from(day)
            .ok()
            .and_then(|day| NaiveDate::from_ymd_opt(year, month, day))
            .ok_or_else(|| out_of_range("day"))?
    };

    let time = NaiveTime::from_hms_nano_opt(
        f.hour as u32,
        f.minute as u32,
        f.second as u32,
        f.nanos as u32,
    )
    .ok_or_else(|| out_of_range("time"))?;

    let offset_secs = if f.utc {
        0
    } else if let Some(secs) = f.offset {
        secs
    } else if let Some(name) = &f.zone_name {
        zone_offset(name)
    } else {
        0
    };
    let offset = i32::try_from(offset_secs)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| out_of_range("time zone offset hour"))?;

    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .ok_or_else(|| out_of_range("time"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatted(d: &DateTime<FixedOffset>, layout: &str) -> String {
        String::from_utf8(format(d, layout.as_bytes())).unwrap()
    }

    fn dt(s: &str) -> DateTime<FixedOffset> {
        parse(RFC1123Z, s).unwrap()
    }

    #[test]
    fn test_parse_rfc1123z() {
        let d = dt("Fri, 03 Jan 2025 10:00:00 +0000");
        assert_eq!(d.to_rfc3339(), "2025-01-03T10:00:00+00:00");

        let d = dt("Tue, 15 Jul 2025 08:30:05 -0700");
        assert_eq!(d.to_rfc3339(), "2025-07-15T08:30:05-07:00");
    }

    #[test]
    fn test_parse_weekday_not_checked() {
        let d = dt("Mon, 03 Jan 2025 10:00:00 +0000");
        assert_eq!(d.format("%Y-%m-%d").to_string(), "2025-01-03");
    }

    #[test]
    fn test_parse_case_insensitive_names() {
        let d = dt("fri, 03 JAN 2025 10:00:00 +0100");
        assert_eq!(d.to_rfc3339(), "2025-01-03T10:00:00+01:00");
    }

    #[test]
    fn test_parse_fraction_after_seconds() {
        let d = dt("Fri, 03 Jan 2025 10:00:00.250 +0000");
        assert_eq!(d.nanosecond(), 250_000_000);
    }

    #[test]
    fn test_parse_mismatch() {
        let err = parse(RFC1123Z, "3 Jan 2025 10:00:00 +0000").unwrap_err();
        assert_eq!(
            err.to_string(),
            "parsing time \"3 Jan 2025 10:00:00 +0000\" as \"Mon, 02 Jan 2006 15:04:05 -0700\": cannot parse \"3 Jan 2025 10:00:00 +0000\" as \"Mon\""
        );
    }

    #[test]
    fn test_parse_named_zone_is_not_numeric() {
        assert!(matches!(
            parse(RFC1123Z, "Fri, 03 Jan 2025 10:00:00 GMT"),
            Err(LayoutError::Mismatch { .. })
        ));
    }

    #[test]
    fn test_parse_out_of_range() {
        let err = parse(RFC1123Z, "Fri, 31 Feb 2025 10:00:00 +0000").unwrap_err();
        assert_eq!(
            err,
            LayoutError::OutOfRange {
                value: "Fri, 31 Feb 2025 10:00:00 +0000".into(),
                field: "day"
            }
        );
        let err = parse(RFC1123Z, "Fri, 03 Jan 2025 25:00:00 +0000").unwrap_err();
        assert!(err.to_string().ends_with("hour out of range"));
    }

    #[test]
    fn test_parse_extra_text() {
        let err = parse(RFC1123Z, "Fri, 03 Jan 2025 10:00:00 +0000 (UTC)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "parsing time \"Fri, 03 Jan 2025 10:00:00 +0000 (UTC)\": extra text: \" (UTC)\""
        );
    }

    #[test]
    fn test_parse_other_layouts() {
        let d = parse("2006-01-02T15:04:05Z07:00", "2024-02-29T23:59:58Z").unwrap();
        assert_eq!(d.to_rfc3339(), "2024-02-29T23:59:58+00:00");

        let d = parse("Jan _2 3:04PM MST 06", "Mar  7 9:15PM EST 99").unwrap();
        assert_eq!(d.to_rfc3339(), "1999-03-07T21:15:00-05:00");

        let d = parse("2006 002", "2024 060").unwrap();
        assert_eq!(d.format("%m-%d").to_string(), "02-29");
    }

    #[test]
    fn test_format_components() {
        let d = dt("Fri, 03 Jan 2025 14:05:09 +0530");
        assert_eq!(formatted(&d, "2006-01-02"), "2025-01-03");
        assert_eq!(formatted(&d, "Monday, January 2"), "Friday, January 3");
        assert_eq!(formatted(&d, "Mon Jan _2 3:04:05 PM"), "Fri Jan  3 2:05:09 PM");
        assert_eq!(formatted(&d, "06/1/2 03pm"), "25/1/3 02pm");
        assert_eq!(formatted(&d, "-0700 -07:00 -07 Z07:00"), "+0530 +05:30 +05 +05:30");
        assert_eq!(formatted(&d, "002 __2"), "003   3");
        assert_eq!(formatted(&d, RFC1123Z), "Fri, 03 Jan 2025 14:05:09 +0530");
    }

    #[test]
    fn test_format_zone_and_fraction() {
        let d = parse(
            "2006-01-02 15:04:05.000 -0700",
            "2025-01-03 10:00:00.120 +0000",
        )
        .unwrap();
        assert_eq!(formatted(&d, "MST Z0700"), "UTC Z");
        assert_eq!(formatted(&d, "05.000|05.999|05.9"), "00.120|00.12|00.1");

        let whole = dt("Fri, 03 Jan 2025 10:00:00 -0800");
        assert_eq!(formatted(&whole, "05.999 MST"), "00 -0800");
    }

    #[test]
    fn test_format_literal_text() {
        let d = dt("Fri, 03 Jan 2025 10:00:00 +0000");
        assert_eq!(formatted(&d, "report for 2006"), "report for 2025");
        assert_eq!(formatted(&d, "Monthly"), "Monthly");
    }

    #[test]
    fn test_format_keeps_literal_bytes() {
        let d = dt("Fri, 03 Jan 2025 10:00:00 +0000");
        assert_eq!(format(&d, b"\xe9t\xe9 2006"), b"\xe9t\xe9 2025");
    }
}
