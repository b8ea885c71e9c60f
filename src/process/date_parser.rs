// src/process/date_parser.rs

use chrono::NaiveDate;

#[inline]
fn digits(s: &[u8]) -> Option<u32> {
    let mut v = 0u32;
    for &b in s {
        if !b.is_ascii_digit() {
            return None;
        }
        v = v * 10 + u32::from(b - b'0');
    }
    Some(v)
}

/// Fast parse of `"YYYY-MM-DD"` or `"YYYY-MM-DD[ |T]hh:mm:ss[Z]"` → seconds UTC
pub fn parse_timestamp_seconds(s: &[u8]) -> Option<i64> {
    // minimal length + separators check
    if s.len() < 10 || s[4] != b'-' || s[7] != b'-' {
        return None;
    }
    let year = digits(&s[0..4])? as i32;
    let month = digits(&s[5..7])?;
    let day = digits(&s[8..10])?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let (hour, min, sec) = match &s[10..] {
        [] => (0, 0, 0),
        rest => {
            let rest = rest.strip_suffix(b"Z").unwrap_or(rest);
            if rest.len() != 9 || !(rest[0] == b' ' || rest[0] == b'T') {
                return None;
            }
            if rest[3] != b':' || rest[6] != b':' {
                return None;
            }
            (digits(&rest[1..3])?, digits(&rest[4..6])?, digits(&rest[7..9])?)
        }
    };

    let naive = date.and_hms_opt(hour, min, sec)?;
    Some(naive.and_utc().timestamp())
}

/// Days since the epoch for a plain `"YYYY-MM-DD"`.
pub fn parse_date_days(s: &[u8]) -> Option<i32> {
    if s.len() != 10 {
        return None;
    }
    let secs = parse_timestamp_seconds(s)?;
    i32::try_from(secs.div_euclid(86_400)).ok()
}
