use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc, Weekday};

const OPEN_MINUTES: u32 = 9 * 60 + 30;
const CLOSE_MINUTES: u32 = 16 * 60;

/// NYSE/NASDAQ full-day closures.
const MARKET_HOLIDAYS_2026: [&str; 9] = [
    "2026-01-01", // New Year's Day
    "2026-01-19", // MLK Day
    "2026-02-16", // Presidents' Day
    "2026-05-25", // Memorial Day
    "2026-06-19", // Juneteenth
    "2026-07-03", // Independence Day (observed)
    "2026-09-07", // Labor Day
    "2026-11-26", // Thanksgiving
    "2026-12-25", // Christmas
];

/// "Is the market open now / when does it next open", as a pure
/// function of wall-clock time. Implementations must not consult any
/// mutable state so schedulers and the recovery sweep agree.
pub trait MarketCalendar: Send + Sync {
    fn is_open(&self, now: DateTime<Utc>) -> bool;

    /// The next opening bell at or after `now`. Returns `now` itself
    /// when the market is currently open.
    fn next_open(&self, now: DateTime<Utc>) -> DateTime<Utc>;
}

/// US equity regular session: 09:30-16:00 Eastern, weekdays,
/// minus the fixed holiday table.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsEquityCalendar;

/// Seconds east of UTC for US Eastern at the given instant. DST runs
/// from 2:00 local on the second Sunday of March (07:00 UTC) to 2:00
/// local on the first Sunday of November (06:00 UTC).
fn eastern_offset_secs(now: DateTime<Utc>) -> i64 {
    let year = now.year();
    let dst_start = NaiveDate::from_weekday_of_month_opt(year, 3, Weekday::Sun, 2)
        .and_then(|d| d.and_hms_opt(7, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt));
    let dst_end = NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Sun, 1)
        .and_then(|d| d.and_hms_opt(6, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt));

    match (dst_start, dst_end) {
        (Some(start), Some(end)) if now >= start && now < end => -4 * 3600,
        _ => -5 * 3600,
    }
}

fn eastern_naive(now: DateTime<Utc>) -> chrono::NaiveDateTime {
    now.naive_utc() + Duration::seconds(eastern_offset_secs(now))
}

fn is_holiday(date: NaiveDate) -> bool {
    let key = date.format("%Y-%m-%d").to_string();
    MARKET_HOLIDAYS_2026.contains(&key.as_str())
}

fn is_market_day(date: NaiveDate) -> bool {
    let weekday = date.weekday();
    weekday != Weekday::Sat && weekday != Weekday::Sun && !is_holiday(date)
}

/// Opening bell for a given Eastern calendar date, as a UTC instant.
fn open_instant(date: NaiveDate) -> DateTime<Utc> {
    // The offset at noon UTC is the offset in effect at the open;
    // DST transitions happen at 2:00 local, hours earlier.
    let noon = Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).expect("valid time"));
    let offset = eastern_offset_secs(noon);
    let local_open = date.and_hms_opt(9, 30, 0).expect("valid time");
    Utc.from_utc_datetime(&(local_open - Duration::seconds(offset)))
}

impl MarketCalendar for UsEquityCalendar {
    fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = eastern_naive(now);
        if !is_market_day(local.date()) {
            return false;
        }
        let minutes = local.hour() * 60 + local.minute();
        (OPEN_MINUTES..CLOSE_MINUTES).contains(&minutes)
    }

    fn next_open(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if self.is_open(now) {
            return now;
        }

        let local = eastern_naive(now);
        let minutes = local.hour() * 60 + local.minute();

        let mut date = local.date();
        if !is_market_day(date) || minutes >= OPEN_MINUTES {
            date = date.succ_opt().expect("date in range");
        }
        while !is_market_day(date) {
            date = date.succ_opt().expect("date in range");
        }
        open_instant(date)
    }
}
