use std::fmt;

use time::{Date, Month};

use crate::core::error::{Error, Result};

/// The year/month/optional-day window a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub year: i32,
    pub month: u8,
    pub day: Option<u8>,
}

/// How month and day components are rendered in keys and archive paths.
///
/// Families disagree here: the A51 archive uses bare numbers (`2023/8`) while
/// the exact-date families zero-pad (`2023/08/05`). Each family keeps its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStyle {
    StripZeros,
    ZeroPadded,
}

impl Scope {
    pub fn new(year: i32, month: u8, day: Option<u8>) -> Result<Self> {
        let month_value = Month::try_from(month)
            .map_err(|_| Error::config(format!("malformed scope: month {month} out of range")))?;
        if let Some(day) = day {
            Date::from_calendar_date(year, month_value, day).map_err(|_| {
                Error::config(format!(
                    "malformed scope: {year:04}-{month:02}-{day:02} is not a calendar date"
                ))
            })?;
        }
        Ok(Self { year, month, day })
    }

    /// Whole-month scope containing `date`.
    pub fn month_of(date: Date) -> Self {
        Self {
            year: date.year(),
            month: date.month() as u8,
            day: None,
        }
    }

    /// Single-day scope for `date`.
    pub fn day_of(date: Date) -> Self {
        Self {
            year: date.year(),
            month: date.month() as u8,
            day: Some(date.day()),
        }
    }

    pub fn date(&self) -> Option<Date> {
        let month = Month::try_from(self.month).ok()?;
        Date::from_calendar_date(self.year, month, self.day?).ok()
    }

    pub fn require_day(&self) -> Result<u8> {
        self.day
            .ok_or_else(|| Error::config(format!("malformed scope: {self} needs a day")))
    }

    pub fn year_str(&self) -> String {
        self.year.to_string()
    }

    pub fn month_str(&self, style: PathStyle) -> String {
        pad(self.month, style)
    }

    pub fn day_str(&self, style: PathStyle) -> Option<String> {
        self.day.map(|day| pad(day, style))
    }

    /// `YYYYMMDD`, the prefix date-named objects carry.
    pub fn compact_date(&self) -> Option<String> {
        self.day
            .map(|day| format!("{:04}{:02}{:02}", self.year, self.month, day))
    }

    pub fn matches_date(&self, date: Date) -> bool {
        match self.day {
            Some(day) => {
                date.year() == self.year && date.month() as u8 == self.month && date.day() == day
            }
            None => false,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.day {
            Some(day) => write!(f, "{:04}-{:02}-{:02}", self.year, self.month, day),
            None => write!(f, "{:04}-{:02}", self.year, self.month),
        }
    }
}

fn pad(value: u8, style: PathStyle) -> String {
    match style {
        PathStyle::StripZeros => value.to_string(),
        PathStyle::ZeroPadded => format!("{value:02}"),
    }
}

/// Explicit year/month/day given by the caller, layered over a family default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeOverride {
    pub year: Option<i32>,
    pub month: Option<u8>,
    pub day: Option<u8>,
}

impl ScopeOverride {
    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.month.is_none() && self.day.is_none()
    }

    pub fn resolve(&self, default: Scope) -> Result<Scope> {
        match (self.year, self.month) {
            (Some(year), Some(month)) => Scope::new(year, month, self.day),
            (Some(year), None) => Err(Error::config(format!(
                "malformed scope: year {year} given without a month"
            ))),
            (None, Some(month)) => Err(Error::config(format!(
                "malformed scope: month {month} given without a year"
            ))),
            (None, None) => match self.day {
                Some(day) => Scope::new(default.year, default.month, Some(day)),
                None => Ok(default),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn month_rendering_follows_style() {
        let scope = Scope::new(2023, 8, Some(5)).expect("scope");
        assert_eq!(scope.month_str(PathStyle::StripZeros), "8");
        assert_eq!(scope.month_str(PathStyle::ZeroPadded), "08");
        assert_eq!(scope.day_str(PathStyle::ZeroPadded).as_deref(), Some("05"));
        assert_eq!(scope.compact_date().as_deref(), Some("20230805"));
        assert_eq!(scope.to_string(), "2023-08-05");
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(matches!(Scope::new(2023, 13, None), Err(Error::Config(_))));
        assert!(matches!(Scope::new(2023, 2, Some(30)), Err(Error::Config(_))));
    }

    #[test]
    fn override_requires_year_and_month_together() {
        let default = Scope::month_of(date!(2023 - 08 - 15));
        let partial = ScopeOverride {
            year: Some(2022),
            month: None,
            day: None,
        };
        assert!(matches!(partial.resolve(default), Err(Error::Config(_))));

        let full = ScopeOverride {
            year: Some(2022),
            month: Some(10),
            day: None,
        };
        assert_eq!(
            full.resolve(default).expect("resolve"),
            Scope::new(2022, 10, None).expect("scope")
        );
    }

    #[test]
    fn day_only_override_keeps_default_month() {
        let default = Scope::month_of(date!(2023 - 08 - 15));
        let day_only = ScopeOverride {
            day: Some(3),
            ..Default::default()
        };
        assert_eq!(
            day_only.resolve(default).expect("resolve"),
            Scope::new(2023, 8, Some(3)).expect("scope")
        );
        assert_eq!(ScopeOverride::default().resolve(default).expect("resolve"), default);
    }

    #[test]
    fn matches_date_needs_a_day() {
        let month = Scope::month_of(date!(2023 - 08 - 15));
        assert!(!month.matches_date(date!(2023 - 08 - 15)));
        let day = Scope::day_of(date!(2023 - 08 - 15));
        assert!(day.matches_date(date!(2023 - 08 - 15)));
        assert!(!day.matches_date(date!(2023 - 08 - 14)));
    }
}
