//! Reference time zone handling

use chrono_tz::Tz;

use crate::error::{CoreError, CoreResult};

/// Zone in which publish dates are rendered and day-bucketed
pub const DEFAULT_REFERENCE_ZONE: Tz = chrono_tz::Europe::Berlin;

/// Parse an IANA zone name such as `Europe/Berlin`
pub fn parse_zone(name: &str) -> CoreResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| CoreError::UnknownTimeZone(name.to_string()))
}
