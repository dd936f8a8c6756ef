//! Signed duration strings ("147h23m43s", "-23m43s", "3h24m5957ms") to seconds

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::constants::EventType;

/// Optional sign, hours, minutes, then seconds with an optional fraction.
/// A trailing `ms` switches the seconds component to milliseconds.
///
/// Anything after the last component is ignored, as long as it cannot continue
/// a component; otherwise `500ms` would read as 500 minutes.
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?)(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)(?:\.\d+)?(m?)s)?(?:$|[^\d.ms])")
        .expect("duration pattern is valid")
});

/// Parse a duration string into signed seconds.
///
/// Never fails: unparsable input is logged as `CACHE_DURATION_PARSE_ERROR` and
/// yields 0, which callers treat as "no extra duration".
pub fn parse_duration(duration: &str) -> i64 {
    match DURATION_RE.captures(duration.trim()).and_then(|caps| seconds_from(&caps)) {
        Some(seconds) => seconds,
        None => {
            log::error!(
                "{} Unable to parse the following duration: {:?}",
                EventType::CacheDurationParseError,
                duration
            );
            0
        }
    }
}

fn seconds_from(caps: &Captures<'_>) -> Option<i64> {
    let component = |index: usize| -> Option<Option<i64>> {
        match caps.get(index) {
            Some(m) => m.as_str().parse::<i64>().ok().map(Some),
            None => Some(None),
        }
    };

    let hours = component(2)?;
    let minutes = component(3)?;
    let seconds = component(4)?;
    if hours.is_none() && minutes.is_none() && seconds.is_none() {
        return None;
    }

    let mut seconds = seconds.unwrap_or(0) as f64;
    if caps.get(5).is_some_and(|unit| unit.as_str() == "m") {
        seconds *= 0.001;
    }

    let total = hours.unwrap_or(0).checked_mul(3600)? as f64
        + minutes.unwrap_or(0).checked_mul(60)? as f64
        + seconds;
    let total = total.round() as i64;

    if caps.get(1).is_some_and(|sign| sign.as_str() == "-") {
        Some(-total)
    } else {
        Some(total)
    }
}
