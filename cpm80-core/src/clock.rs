//! Wall-clock source for the extended date/time BDOS calls, plus the
//! polling sleep used by the delay hooks.

use std::time::{Duration, SystemTime};

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};

use crate::signals;

/// CP/M day number: days since 1978-01-01, local time. The 12-hour bias
/// absorbs DST and leap-second drift. Days outside 1..65535 yield 0
/// (invalid).
pub fn cpm_day<Tz: TimeZone>(t: &DateTime<Tz>) -> u16 {
    let year_start = match Local
        .with_ymd_and_hms(t.year(), 1, 1, 0, 0, 0)
        .single()
    {
        Some(d) => d,
        None => return 0,
    };
    let epoch = match Local.with_ymd_and_hms(1978, 1, 1, 0, 0, 0).single() {
        Some(d) => d,
        None => return 0,
    };
    let days = (year_start.timestamp() - epoch.timestamp() + 43_200).div_euclid(86_400)
        + t.ordinal() as i64;
    if (1..=65_535).contains(&days) {
        days as u16
    } else {
        0
    }
}

pub fn to_bcd(v: u8) -> u8 {
    (v / 10) << 4 | (v % 10)
}

/// Day number plus BCD hour/minute/second for a point in time.
pub fn cpm_stamp<Tz: TimeZone>(t: &DateTime<Tz>) -> (u16, u8, u8, u8) {
    (
        cpm_day(t),
        to_bcd(t.hour() as u8),
        to_bcd(t.minute() as u8),
        to_bcd(t.second() as u8),
    )
}

/// Current local time in CP/M encoding.
pub fn now_stamp() -> (u16, u8, u8, u8) {
    cpm_stamp(&Local::now())
}

/// File timestamp in CP/M encoding; unrepresentable times become day 0.
pub fn file_stamp(t: SystemTime) -> (u16, u8, u8) {
    let dt: DateTime<Local> = t.into();
    let (day, h, m, _) = cpm_stamp(&dt);
    (day, h, m)
}

/// Sleep, sliced so a terminating signal is honored promptly.
pub fn sleep_ms(ms: u64) {
    const SLICE: u64 = 20;
    let mut left = ms;
    while left > 0 {
        if signals::stop_requested() {
            return;
        }
        let chunk = left.min(SLICE);
        std::thread::sleep(Duration::from_millis(chunk));
        left -= chunk;
    }
}
