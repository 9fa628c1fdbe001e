use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn wall_clock_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Strip `user:password@` from a locator so it can be logged.
pub fn redact_locator(locator: &str) -> String {
    let Some((scheme, rest)) = locator.split_once("://") else {
        return locator.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let (authority, path) = rest.split_at(authority_end);

    match authority.rfind('@') {
        Some(at) => format!("{scheme}://***@{}{path}", &authority[at + 1..]),
        None => locator.to_string(),
    }
}

/// Convert a timestamp in `time_base` units (num/den seconds) to microseconds.
pub fn rescale_to_us(ts: i64, num: i32, den: i32) -> Option<u64> {
    if ts < 0 || num <= 0 || den <= 0 {
        return None;
    }
    let us = i128::from(ts) * i128::from(num) * 1_000_000 / i128::from(den);
    u64::try_from(us).ok()
}
