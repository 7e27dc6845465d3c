//! Time and identifier sources.
//!
//! Everything that stamps a message (the `Date` header, `Message-ID`, DKIM
//! timestamps) asks a [`Clock`] instead of the system directly, so tests can
//! pin both.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Source of the current time and fresh unique identifiers.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns a fresh identifier.
    fn uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// The wall clock and random v4 identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant that always hands out the same identifier.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
    uuid: Uuid,
}

impl FixedClock {
    /// Freezes time at `now`, with the nil identifier.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            uuid: Uuid::nil(),
        }
    }

    /// Sets the identifier returned by [`Clock::uuid`].
    #[must_use]
    pub const fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn uuid(&self) -> Uuid {
        self.uuid
    }
}

/// Formats a timestamp for the `Date` header.
#[must_use]
pub fn format_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S -0000").to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock() {
        let at = Utc.with_ymd_and_hms(2011, 11, 15, 12, 31, 49).unwrap();
        let clock = FixedClock::new(at).with_uuid(Uuid::from_u128(7));
        assert_eq!(clock.now(), at);
        assert_eq!(clock.uuid(), Uuid::from_u128(7));
        assert_eq!(format_date(clock.now()), "Tue, 15 Nov 2011 12:31:49 -0000");
    }

    #[test]
    fn test_system_clock_ids_differ() {
        assert_ne!(SystemClock.uuid(), SystemClock.uuid());
    }
}
