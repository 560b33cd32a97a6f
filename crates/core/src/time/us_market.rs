use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use std::collections::HashSet;

const ET_OFFSET_SECS: i32 = -5 * 3600;

// If the job runs before this time (ET), treat the day's bar as incomplete and
// use the previous trading date. NYSE close is 16:00 ET; the extra hour also
// absorbs the DST shift of the fixed offset.
const CLOSE_CUTOFF_HOUR_ET: u32 = 17;
const CLOSE_CUTOFF_MINUTE_ET: u32 = 0;

/// Resolves the market date an analysis should run against. An explicit
/// `YYYY-MM-DD` argument wins; otherwise the latest completed US trading date.
pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?);
    }

    let et = chrono::FixedOffset::east_opt(ET_OFFSET_SECS).context("invalid ET offset")?;
    let now_et = now_utc.with_timezone(&et);

    let cutoff_reached =
        (now_et.hour(), now_et.minute()) >= (CLOSE_CUTOFF_HOUR_ET, CLOSE_CUTOFF_MINUTE_ET);
    let mut date = now_et.date_naive();
    if !cutoff_reached {
        date = date - Duration::days(1);
    }

    // Roll back to the previous trading day.
    let holidays = configured_holidays();
    while is_weekend(date) || holidays.contains(&date) {
        date = date - Duration::days(1);
    }

    Ok(date)
}

/// Inclusive fetch range ending at `as_of`, spanning `lookback_days` calendar days.
pub fn history_range(as_of: NaiveDate, lookback_days: i64) -> anyhow::Result<(NaiveDate, NaiveDate)> {
    anyhow::ensure!(
        lookback_days >= 1,
        "lookback_days must be >= 1 (got {lookback_days})"
    );
    Ok((as_of - Duration::days(lookback_days), as_of))
}

/// The next `n` trading days strictly after `after`, skipping weekends and
/// configured holidays. Used to timestamp forecast points.
pub fn next_business_days(after: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let holidays = configured_holidays();
    let mut out = Vec::with_capacity(n);
    let mut date = after;
    while out.len() < n {
        date = date + Duration::days(1);
        if is_weekend(date) || holidays.contains(&date) {
            continue;
        }
        out.push(date);
    }
    out
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(
        chrono::Datelike::weekday(&date),
        chrono::Weekday::Sat | chrono::Weekday::Sun
    )
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // Minimal set of fixed-date NYSE closures.
    // Extend via MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
    let mut out = HashSet::new();
    let years = [2024, 2025, 2026, 2027, 2028, 2029, 2030];
    for y in years {
        if let Some(d) = NaiveDate::from_ymd_opt(y, 1, 1) {
            out.insert(d);
        }
        if let Some(d) = NaiveDate::from_ymd_opt(y, 7, 4) {
            out.insert(d);
        }
        if let Some(d) = NaiveDate::from_ymd_opt(y, 12, 25) {
            out.insert(d);
        }
    }

    if let Ok(s) = std::env::var("MARKET_HOLIDAYS") {
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Ok(d) = NaiveDate::parse_from_str(part, "%Y-%m-%d") {
                out.insert(d);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn explicit_argument_wins() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let d = resolve_as_of_date(Some("2026-02-27"), now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 2, 27).unwrap());
    }

    #[test]
    fn uses_previous_day_before_cutoff() {
        // 2026-03-03 18:00 UTC = 13:00 ET (<17:00 cutoff); Tuesday rolls to Monday.
        let now = Utc.with_ymd_and_hms(2026, 3, 3, 18, 0, 0).unwrap();
        let d = resolve_as_of_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    }

    #[test]
    fn uses_same_day_after_cutoff() {
        // 2026-03-03 23:00 UTC = 18:00 ET (>=17:00 cutoff).
        let now = Utc.with_ymd_and_hms(2026, 3, 3, 23, 0, 0).unwrap();
        let d = resolve_as_of_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
    }

    #[test]
    fn rolls_back_over_weekend() {
        // 2026-03-08 is Sunday; before cutoff the base date is Saturday, which
        // rolls back to Friday 2026-03-06.
        let now = Utc.with_ymd_and_hms(2026, 3, 8, 12, 0, 0).unwrap();
        let d = resolve_as_of_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 3, 6).unwrap());
    }

    #[test]
    fn business_days_skip_weekends() {
        // 2026-03-05 is Thursday.
        let from = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        let days = next_business_days(from, 3);
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
                NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
                NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            ]
        );
    }

    #[test]
    fn history_range_spans_lookback() {
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let (start, end) = history_range(as_of, 365).unwrap();
        assert_eq!(end, as_of);
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        assert!(history_range(as_of, 0).is_err());
    }
}
