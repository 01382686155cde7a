//! Business-day calendar.
//!
//! A business day is a calendar day that is neither a Saturday/Sunday nor one
//! of the fixed-date holidays in the configured [`HolidayTable`]. Movable
//! holidays (Carnival, Easter-linked dates, Corpus Christi) are not modeled.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// A holiday that falls on the same month/day every year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedHoliday {
    pub month: u32,
    pub day: u32,
    pub name: String,
}

impl FixedHoliday {
    pub fn new<S: Into<String>>(month: u32, day: u32, name: S) -> Self {
        Self {
            month,
            day,
            name: name.into(),
        }
    }
}

/// Set of fixed-date holidays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolidayTable {
    holidays: Vec<FixedHoliday>,
}

impl HolidayTable {
    pub fn new(holidays: Vec<FixedHoliday>) -> Self {
        Self { holidays }
    }

    /// A calendar with weekends only
    pub fn empty() -> Self {
        Self { holidays: Vec::new() }
    }

    /// Brazilian national holidays with a fixed date
    pub fn brazil_fixed() -> Self {
        Self::new(vec![
            FixedHoliday::new(1, 1, "Confraternização Universal"),
            FixedHoliday::new(4, 21, "Tiradentes"),
            FixedHoliday::new(5, 1, "Dia do Trabalho"),
            FixedHoliday::new(9, 7, "Independência"),
            FixedHoliday::new(10, 12, "Nossa Senhora Aparecida"),
            FixedHoliday::new(11, 2, "Finados"),
            FixedHoliday::new(11, 15, "Proclamação da República"),
            FixedHoliday::new(12, 25, "Natal"),
        ])
    }

    pub fn with_holiday(mut self, holiday: FixedHoliday) -> Self {
        self.holidays.push(holiday);
        self
    }

    pub fn holidays(&self) -> &[FixedHoliday] {
        &self.holidays
    }

    pub fn len(&self) -> usize {
        self.holidays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holidays.is_empty()
    }

    /// Holiday falling on `date`, if any
    pub fn holiday_on(&self, date: NaiveDate) -> Option<&FixedHoliday> {
        self.holidays
            .iter()
            .find(|h| h.month == date.month() && h.day == date.day())
    }
}

impl Default for HolidayTable {
    fn default() -> Self {
        Self::brazil_fixed()
    }
}

/// Weekend and holiday rules over a [`HolidayTable`]
#[derive(Debug, Clone, Default)]
pub struct BusinessCalendar {
    holidays: HolidayTable,
}

impl BusinessCalendar {
    pub fn new(holidays: HolidayTable) -> Self {
        Self { holidays }
    }

    pub fn holidays(&self) -> &HolidayTable {
        &self.holidays
    }

    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_fixed_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.holiday_on(date).is_some()
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !self.is_weekend(date) && !self.is_fixed_holiday(date)
    }

    /// Business days in `[start, end]`, both inclusive. Zero when `start > end`.
    pub fn count_business_days(&self, start: NaiveDate, end: NaiveDate) -> u32 {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| self.is_business_day(*d))
            .count() as u32
    }
}

/// Calendar days in `[start, end]`, both inclusive
pub fn days_diff_inclusive(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}
