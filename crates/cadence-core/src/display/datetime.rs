//! DateTime display utilities.

use std::fmt;

use jiff::Timestamp;

/// Formats a timestamp as `YYYY-MM-DD HH:MM UTC`, the zone cron
/// expressions are evaluated in.
pub struct UtcDateTime<'a>(pub &'a Timestamp);

impl fmt::Display for UtcDateTime<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.strftime("%Y-%m-%d %H:%M UTC"))
    }
}
