//! Booking duration, carried on the wire as an ISO 8601 duration (`PT1H30M`).

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when building or parsing a [`BookingDuration`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    /// A booking must last at least one minute.
    #[error("duration must be at least one minute")]
    Zero,
    /// The string is not of the form `PT[nH][nM]`.
    #[error("invalid ISO 8601 duration: {0}")]
    Invalid(String),
}

/// Length of a charging-slot booking, in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BookingDuration(u32);

impl BookingDuration {
    /// Create a duration from minutes.
    ///
    /// # Errors
    ///
    /// Returns [`DurationError::Zero`] for a zero-length booking.
    pub const fn from_minutes(minutes: u32) -> Result<Self, DurationError> {
        if minutes == 0 {
            return Err(DurationError::Zero);
        }
        Ok(Self(minutes))
    }

    /// Total length in minutes.
    #[must_use]
    pub const fn minutes(&self) -> u32 {
        self.0
    }

    /// Render as `PT{h}H{m}M`, omitting zero components.
    #[must_use]
    pub fn to_iso8601(&self) -> String {
        let hours = self.0 / 60;
        let minutes = self.0 % 60;

        let mut out = String::from("PT");
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        out
    }

    /// Parse `PT[nH][nM]`.
    ///
    /// # Errors
    ///
    /// Returns an error for anything other than hour and minute components,
    /// or for a total of zero minutes.
    pub fn parse_iso8601(s: &str) -> Result<Self, DurationError> {
        let invalid = || DurationError::Invalid(s.to_owned());
        let rest = s.trim().strip_prefix("PT").ok_or_else(invalid)?;
        if rest.is_empty() {
            return Err(invalid());
        }

        let (hours, rest) = match rest.split_once('H') {
            Some((h, rest)) => (h.parse::<u32>().map_err(|_| invalid())?, rest),
            None => (0, rest),
        };
        let minutes = match rest.strip_suffix('M') {
            Some(m) => m.parse::<u32>().map_err(|_| invalid())?,
            None if rest.is_empty() => 0,
            None => return Err(invalid()),
        };

        let total = hours
            .checked_mul(60)
            .and_then(|h| h.checked_add(minutes))
            .ok_or_else(invalid)?;
        Self::from_minutes(total)
    }
}

impl fmt::Display for BookingDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl TryFrom<String> for BookingDuration {
    type Error = DurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_iso8601(&value)
    }
}

impl From<BookingDuration> for String {
    fn from(duration: BookingDuration) -> Self {
        duration.to_iso8601()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_to_iso8601() {
        assert_eq!(BookingDuration::from_minutes(60).unwrap().to_iso8601(), "PT1H");
        assert_eq!(BookingDuration::from_minutes(45).unwrap().to_iso8601(), "PT45M");
        assert_eq!(BookingDuration::from_minutes(90).unwrap().to_iso8601(), "PT1H30M");
    }

    #[test]
    fn test_zero_rejected() {
        assert_eq!(BookingDuration::from_minutes(0), Err(DurationError::Zero));
        assert_eq!(BookingDuration::parse_iso8601("PT0M"), Err(DurationError::Zero));
    }

    #[test]
    fn test_parse_iso8601() {
        assert_eq!(BookingDuration::parse_iso8601("PT2H").unwrap().minutes(), 120);
        assert_eq!(BookingDuration::parse_iso8601("PT15M").unwrap().minutes(), 15);
        assert_eq!(BookingDuration::parse_iso8601("PT1H5M").unwrap().minutes(), 65);
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["", "PT", "P1D", "PT1X", "1H", "PTxH"] {
            assert!(
                BookingDuration::parse_iso8601(bad).is_err(),
                "{bad} should be rejected"
            );
        }
    }
}
