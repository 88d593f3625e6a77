use time::{Date, OffsetDateTime, UtcOffset, Weekday};

/// A source of wall-clock time for resolving default scopes.
///
/// Runs default to "today" or "yesterday" depending on the feed family, so the
/// clock is injected rather than read ad hoc to keep runs reproducible in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    fn today(&self) -> Date {
        self.now().date()
    }
}

/// Local wall-clock time.
///
/// The local offset is captured once at construction. `time` refuses to read
/// the local offset once other threads exist, so build this before starting
/// the async runtime.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

pub fn yesterday(date: Date) -> Date {
    date.previous_day().unwrap_or(date)
}

/// Three-letter lower-case weekday name, e.g. `mon`.
pub fn weekday_abbrev(date: Date) -> &'static str {
    match date.weekday() {
        Weekday::Monday => "mon",
        Weekday::Tuesday => "tue",
        Weekday::Wednesday => "wed",
        Weekday::Thursday => "thu",
        Weekday::Friday => "fri",
        Weekday::Saturday => "sat",
        Weekday::Sunday => "sun",
    }
}
