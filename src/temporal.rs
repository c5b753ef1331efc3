//! ISO-8601 temporal arithmetic: date/time/datetime values combined
//! with durations. Implemented directly over `chrono::Naive*` plus a small
//! hand-rolled `IsoDuration`, per the explicit permission to implement just
//! the required subset rather than adopt a full duration crate.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;

/// A parsed `PnYnMnDTnHnMnS` duration. Calendar components (years, months,
/// days) are kept separate from the exact `seconds` component because
/// "a month" has no fixed length; only `seconds` participates in exact
/// ratio/scale arithmetic without approximation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IsoDuration {
    pub years: i32,
    pub months: i32,
    pub days: i32,
    pub seconds: f64,
}

impl IsoDuration {
    pub fn negate(self) -> Self {
        IsoDuration {
            years: -self.years,
            months: -self.months,
            days: -self.days,
            seconds: -self.seconds,
        }
    }

    pub fn add(self, other: Self) -> Self {
        IsoDuration {
            years: self.years + other.years,
            months: self.months + other.months,
            days: self.days + other.days,
            seconds: self.seconds + other.seconds,
        }
    }

    pub fn scale(self, factor: f64) -> Self {
        IsoDuration {
            years: (self.years as f64 * factor).round() as i32,
            months: (self.months as f64 * factor).round() as i32,
            days: (self.days as f64 * factor).round() as i32,
            seconds: self.seconds * factor,
        }
    }

    /// Approximate total seconds, treating a year as 365.25 days and a month
    /// as 30 days. Only used for duration/duration ratio, never for adding a
    /// duration to a calendar date (which uses exact calendar arithmetic).
    fn approx_seconds(self) -> f64 {
        self.years as f64 * 365.25 * 86_400.0
            + self.months as f64 * 30.0 * 86_400.0
            + self.days as f64 * 86_400.0
            + self.seconds
    }

    pub fn ratio(self, other: Self) -> Option<f64> {
        let denom = other.approx_seconds();
        if denom == 0.0 {
            None
        } else {
            Some(self.approx_seconds() / denom)
        }
    }

    pub fn format(self) -> String {
        let negative = self.years < 0 && self.months < 0 && self.days < 0 && self.seconds < 0.0;
        let d = if negative { self.negate() } else { self };
        let mut out = String::new();
        if negative {
            out.push('-');
        }
        out.push('P');
        if d.years != 0 {
            out.push_str(&format!("{}Y", d.years));
        }
        if d.months != 0 {
            out.push_str(&format!("{}M", d.months));
        }
        if d.days != 0 {
            out.push_str(&format!("{}D", d.days));
        }
        if d.seconds != 0.0 {
            out.push('T');
            out.push_str(&format!("{}S", d.seconds));
        }
        if out == "P" || out == "-P" {
            out.push_str("0D");
        }
        out
    }
}

fn duration_pattern() -> Regex {
    Regex::new(r"^(-)?P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:([\d.]+)S)?)?$")
        .expect("static duration pattern is valid")
}

pub fn parse_duration(s: &str) -> Option<IsoDuration> {
    let caps = duration_pattern().captures(s)?;
    let sign = if caps.get(1).is_some() { -1.0 } else { 1.0 };
    let get_i32 = |i: usize| caps.get(i).map(|m| m.as_str().parse::<i32>().unwrap_or(0)).unwrap_or(0);
    let get_f64 = |i: usize| caps.get(i).map(|m| m.as_str().parse::<f64>().unwrap_or(0.0)).unwrap_or(0.0);
    let hours = get_f64(4);
    let minutes = get_f64(5);
    let secs = get_f64(6);
    if caps.iter().skip(2).all(|g| g.is_none()) {
        return None; // "P" alone with nothing after it is not a valid duration
    }
    Some(IsoDuration {
        years: (sign * get_i32(2) as f64) as i32,
        months: (sign * get_i32(3) as f64) as i32,
        days: (sign * get_i32(4) as f64) as i32,
        seconds: sign * (hours * 3600.0 + minutes * 60.0 + secs),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemporalValue {
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Duration(IsoDuration),
}

impl TemporalValue {
    pub fn parse(s: &str) -> Option<TemporalValue> {
        if let Some(d) = parse_duration(s) {
            return Some(TemporalValue::Duration(d));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(TemporalValue::DateTime(dt));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
            return Some(TemporalValue::DateTime(dt));
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Some(TemporalValue::Date(d));
        }
        if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M:%S%.f") {
            return Some(TemporalValue::Time(t));
        }
        None
    }

    pub fn to_text(self) -> String {
        match self {
            TemporalValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            TemporalValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            TemporalValue::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            TemporalValue::Duration(d) => d.format(),
        }
    }
}

fn apply_to_date(d: NaiveDate, dur: IsoDuration) -> Option<NaiveDate> {
    let with_months = if dur.years != 0 || dur.months != 0 {
        let total_months = dur.years * 12 + dur.months;
        shift_months(d, total_months)?
    } else {
        d
    };
    with_months.checked_add_signed(chrono::Duration::days(dur.days as i64))
}

fn shift_months(d: NaiveDate, delta: i32) -> Option<NaiveDate> {
    let total = d.year() * 12 + d.month0() as i32 + delta;
    let year = total.div_euclid(12);
    let month0 = total.rem_euclid(12);
    let last_day = last_day_of_month(year, month0 as u32 + 1);
    NaiveDate::from_ymd_opt(year, month0 as u32 + 1, d.day().min(last_day))
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

fn apply_to_datetime(dt: NaiveDateTime, dur: IsoDuration) -> Option<NaiveDateTime> {
    let date = apply_to_date(dt.date(), IsoDuration { seconds: 0.0, ..dur })?;
    let seconds = dur.seconds;
    date.and_time(dt.time()).checked_add_signed(chrono::Duration::milliseconds((seconds * 1000.0) as i64))
}

fn apply_to_time(t: NaiveTime, dur: IsoDuration) -> NaiveTime {
    let millis = (dur.seconds * 1000.0) as i64;
    t.overflowing_add_signed(chrono::Duration::milliseconds(millis)).0
}

/// `date ± duration`, `datetime ± duration`, `time ± duration`, `date -
/// date`, `duration ± duration`, `duration * number`, `duration / duration`
/// — the type matrix from the scalar-evaluation design. Returns `None` when
/// the combination isn't part of the matrix, letting the caller fall back to
/// plain numeric arithmetic.
pub fn add(a: TemporalValue, b: TemporalValue) -> Option<TemporalValue> {
    match (a, b) {
        (TemporalValue::Date(d), TemporalValue::Duration(du)) | (TemporalValue::Duration(du), TemporalValue::Date(d)) => {
            apply_to_date(d, du).map(TemporalValue::Date)
        }
        (TemporalValue::DateTime(dt), TemporalValue::Duration(du)) | (TemporalValue::Duration(du), TemporalValue::DateTime(dt)) => {
            apply_to_datetime(dt, du).map(TemporalValue::DateTime)
        }
        (TemporalValue::Time(t), TemporalValue::Duration(du)) | (TemporalValue::Duration(du), TemporalValue::Time(t)) => {
            Some(TemporalValue::Time(apply_to_time(t, du)))
        }
        (TemporalValue::Duration(a), TemporalValue::Duration(b)) => Some(TemporalValue::Duration(a.add(b))),
        _ => None,
    }
}

pub fn sub(a: TemporalValue, b: TemporalValue) -> Option<TemporalValue> {
    match (a, b) {
        (TemporalValue::Date(d1), TemporalValue::Date(d2)) => {
            let days = (d1 - d2).num_days() as i32;
            Some(TemporalValue::Duration(IsoDuration { days, ..Default::default() }))
        }
        (TemporalValue::DateTime(d1), TemporalValue::DateTime(d2)) => {
            let secs = (d1 - d2).num_milliseconds() as f64 / 1000.0;
            Some(TemporalValue::Duration(IsoDuration { seconds: secs, ..Default::default() }))
        }
        (TemporalValue::Time(t1), TemporalValue::Time(t2)) => {
            let secs = (t1 - t2).num_milliseconds() as f64 / 1000.0;
            Some(TemporalValue::Duration(IsoDuration { seconds: secs, ..Default::default() }))
        }
        (TemporalValue::Date(d), TemporalValue::Duration(du)) => apply_to_date(d, du.negate()).map(TemporalValue::Date),
        (TemporalValue::DateTime(dt), TemporalValue::Duration(du)) => apply_to_datetime(dt, du.negate()).map(TemporalValue::DateTime),
        (TemporalValue::Time(t), TemporalValue::Duration(du)) => Some(TemporalValue::Time(apply_to_time(t, du.negate()))),
        (TemporalValue::Duration(a), TemporalValue::Duration(b)) => Some(TemporalValue::Duration(a.add(b.negate()))),
        _ => None,
    }
}

pub fn scale(a: TemporalValue, factor: f64) -> Option<TemporalValue> {
    match a {
        TemporalValue::Duration(d) => Some(TemporalValue::Duration(d.scale(factor))),
        _ => None,
    }
}

pub fn ratio(a: TemporalValue, b: TemporalValue) -> Option<f64> {
    match (a, b) {
        (TemporalValue::Duration(a), TemporalValue::Duration(b)) => a.ratio(b),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_plus_duration() {
        let d = TemporalValue::parse("2024-01-31").unwrap();
        let du = TemporalValue::parse("P1M").unwrap();
        let sum = add(d, du).unwrap();
        assert_eq!(sum.to_text(), "2024-02-29");
    }

    #[test]
    fn date_minus_date_is_duration_in_days() {
        let a = TemporalValue::parse("2024-01-10").unwrap();
        let b = TemporalValue::parse("2024-01-01").unwrap();
        let diff = sub(a, b).unwrap();
        assert!(matches!(diff, TemporalValue::Duration(IsoDuration { days: 9, .. })));
    }

    #[test]
    fn duration_ratio() {
        let a = parse_duration("P2D").unwrap();
        let b = parse_duration("P1D").unwrap();
        assert_eq!(a.ratio(b), Some(2.0));
    }

    #[test]
    fn non_temporal_text_does_not_parse() {
        assert!(TemporalValue::parse("hello").is_none());
    }
}
