use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::UtilError;
use crate::Result;

/// A housekeeping expiry horizon.
///
/// Configuration values like `gc.pruneExpire` name a point in time;
/// anything older is eligible for expiry. Two values are special:
/// `never` (timestamp 0, nothing expires) and `now` (everything does).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Never,
    Now,
    At(i64),
}

impl Expiry {
    /// Parse a git expiry expression.
    ///
    /// Accepts `never`/`false`, `now`/`all`, `@<epoch>`, `yesterday`,
    /// relative forms in both spellings (`2.weeks.ago`, `2 weeks ago`)
    /// and absolute dates (ISO 8601, RFC 2822, `YYYY-MM-DD`).
    ///
    /// A parse failure is an error, never a silent default: callers
    /// treat an unparseable configured expiry as fatal.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(UtilError::ExpiryParse(input.into()));
        }

        let lower = raw.to_ascii_lowercase();
        match lower.as_str() {
            "never" | "false" => return Ok(Expiry::Never),
            "now" | "all" => return Ok(Expiry::Now),
            _ => {}
        }

        if let Some(ts) = lower.strip_prefix('@') {
            if let Ok(n) = ts.parse::<i64>() {
                return Ok(Expiry::At(n));
            }
        }

        // Relative forms. Dots are separators: "2.weeks.ago" == "2 weeks ago".
        let spaced = lower.replace('.', " ");
        let now = Utc::now().timestamp();

        if spaced == "yesterday" {
            return Ok(Expiry::At(now - 86400));
        }

        if let Some(rest) = spaced.strip_suffix(" ago") {
            let mut parts = rest.splitn(2, ' ');
            if let (Some(count), Some(unit)) = (parts.next(), parts.next()) {
                if let Ok(count) = count.parse::<i64>() {
                    let seconds = match unit.trim().trim_end_matches('s') {
                        "second" => Some(count),
                        "minute" => Some(count * 60),
                        "hour" => Some(count * 3600),
                        "day" => Some(count * 86400),
                        "week" => Some(count * 7 * 86400),
                        "month" => Some(count * 30 * 86400),
                        "year" => Some(count * 365 * 86400),
                        _ => None,
                    };
                    if let Some(seconds) = seconds {
                        return Ok(Expiry::At(now - seconds));
                    }
                }
            }
        }

        // Absolute forms, tried against the original spelling.
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Expiry::At(dt.timestamp()));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return Ok(Expiry::At(dt.timestamp()));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return Ok(Expiry::At(dt.and_utc().timestamp()));
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                return Ok(Expiry::At(dt.and_utc().timestamp()));
            }
        }

        Err(UtilError::ExpiryParse(input.into()))
    }

    /// The horizon as a Unix timestamp, given the current time.
    ///
    /// `Never` maps to 0 so that no mtime ever falls before it.
    pub fn timestamp(&self, now: i64) -> i64 {
        match self {
            Expiry::Never => 0,
            Expiry::Now => now,
            Expiry::At(t) => *t,
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Expiry::Never)
    }

    pub fn is_now(&self) -> bool {
        matches!(self, Expiry::Now)
    }
}
