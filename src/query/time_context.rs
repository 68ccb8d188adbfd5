//! Relative-time terms and their conversion into due-date predicates.
//!
//! Conversion is fixed logic: given the same "today" and week start, a term
//! always resolves to the same filter. Language models may only *name* a
//! term; they never supply the dates.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime, Weekday};

use crate::models::{DueCondition, DueDateFilter, DueDateRange};
use crate::vocabulary::time_names;

static RELATIVE_DAYS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:([+-]?\d{1,4})d|in-(\d{1,4})-days?)$").expect("valid relative-days regex")
});

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_iso_date(text: &str) -> Option<Date> {
    Date::parse(text.trim(), format_description!("[year]-[month]-[day]")).ok()
}

/// First day of the week in the user's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Monday,
    Sunday,
    Saturday,
}

impl WeekStart {
    /// Returns the corresponding weekday.
    pub fn weekday(self) -> Weekday {
        match self {
            Self::Monday => Weekday::Monday,
            Self::Sunday => Weekday::Sunday,
            Self::Saturday => Weekday::Saturday,
        }
    }
}

/// A relative or explicit time term named by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeTerm {
    Today,
    Tomorrow,
    Yesterday,
    Overdue,
    Future,
    ThisWeek,
    NextWeek,
    LastWeek,
    ThisMonth,
    NextMonth,
    /// Any task with a due date.
    Any,
    /// Tasks without a due date.
    Undated,
    /// An explicit calendar date.
    Date(Date),
    /// A date relative to today, in days (negative for the past).
    InDays(i64),
}

impl TimeTerm {
    /// Parses a term name such as `today`, `next week`, `next_week`,
    /// `2025-03-01`, `+3d` or `in 3 days`. Returns `None` for anything else.
    pub fn parse(name: &str) -> Option<Self> {
        let key = name
            .trim()
            .to_lowercase()
            .replace(['_', ' '], "-");
        let term = match key.as_str() {
            time_names::TODAY => Self::Today,
            time_names::TOMORROW => Self::Tomorrow,
            time_names::YESTERDAY => Self::Yesterday,
            time_names::OVERDUE | "past-due" => Self::Overdue,
            time_names::FUTURE | "upcoming" => Self::Future,
            time_names::THIS_WEEK | "week" => Self::ThisWeek,
            time_names::NEXT_WEEK => Self::NextWeek,
            time_names::LAST_WEEK => Self::LastWeek,
            time_names::THIS_MONTH | "month" => Self::ThisMonth,
            time_names::NEXT_MONTH => Self::NextMonth,
            time_names::ANY | "has-date" => Self::Any,
            time_names::NONE | "no-date" | "undated" => Self::Undated,
            _ => {
                if let Some(date) = parse_iso_date(&key) {
                    return Some(Self::Date(date));
                }
                let caps = RELATIVE_DAYS.captures(&key)?;
                let days = caps
                    .get(1)
                    .or_else(|| caps.get(2))?
                    .as_str()
                    .parse::<i64>()
                    .ok()?;
                Self::InDays(days)
            }
        };
        Some(term)
    }

    /// Canonical name of the term.
    pub fn name(&self) -> String {
        match self {
            Self::Today => time_names::TODAY.to_string(),
            Self::Tomorrow => time_names::TOMORROW.to_string(),
            Self::Yesterday => time_names::YESTERDAY.to_string(),
            Self::Overdue => time_names::OVERDUE.to_string(),
            Self::Future => time_names::FUTURE.to_string(),
            Self::ThisWeek => time_names::THIS_WEEK.to_string(),
            Self::NextWeek => time_names::NEXT_WEEK.to_string(),
            Self::LastWeek => time_names::LAST_WEEK.to_string(),
            Self::ThisMonth => time_names::THIS_MONTH.to_string(),
            Self::NextMonth => time_names::NEXT_MONTH.to_string(),
            Self::Any => time_names::ANY.to_string(),
            Self::Undated => time_names::NONE.to_string(),
            Self::Date(d) => d.to_string(),
            Self::InDays(n) => format!("{n:+}d"),
        }
    }
}

/// Today's date in the local timezone, falling back to UTC when the local
/// offset cannot be determined.
pub fn local_today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

/// Converts time terms into due-date filters relative to a fixed "today".
#[derive(Debug, Clone, Copy)]
pub struct TimeContextResolver {
    today: Date,
    week_start: Weekday,
}

impl TimeContextResolver {
    /// Creates a resolver anchored at `today`.
    pub fn new(today: Date, week_start: WeekStart) -> Self {
        Self {
            today,
            week_start: week_start.weekday(),
        }
    }

    /// The date this resolver treats as today.
    pub fn today(&self) -> Date {
        self.today
    }

    /// Parses and resolves a term name. Unknown names resolve to `None`.
    pub fn resolve_name(&self, name: &str, is_vague: bool) -> Option<DueDateFilter> {
        TimeTerm::parse(name).map(|term| self.resolve(term, is_vague))
    }

    /// Resolves a term.
    ///
    /// Specific queries get exact conditions. Vague queries get an inclusive
    /// range that also captures overdue tasks ("due by this boundary"), except
    /// for forward windows such as next week, which stay a `between` range.
    pub fn resolve(&self, term: TimeTerm, is_vague: bool) -> DueDateFilter {
        let today = self.today;
        let (week_start, week_end) = self.week_bounds(today);
        let (month_start, month_end) = month_bounds(today);

        match term {
            TimeTerm::Overdue => exact(DueCondition::Before { date: today }),
            TimeTerm::Future => exact(DueCondition::After { date: today }),
            TimeTerm::Any => exact(DueCondition::Any),
            TimeTerm::Undated => exact(DueCondition::Undated),
            TimeTerm::NextWeek => {
                let start = add_days(week_start, 7);
                let end = add_days(week_end, 7);
                window(start, end, is_vague)
            }
            TimeTerm::LastWeek => {
                window(add_days(week_start, -7), add_days(week_end, -7), is_vague)
            }
            TimeTerm::NextMonth => {
                let (start, end) = month_bounds(add_days(month_end, 1));
                window(start, end, is_vague)
            }
            TimeTerm::ThisWeek if is_vague => range_to(week_end),
            TimeTerm::ThisWeek => within(week_start, week_end),
            TimeTerm::ThisMonth if is_vague => range_to(month_end),
            TimeTerm::ThisMonth => within(month_start, month_end),
            TimeTerm::Today => self.day(today, is_vague),
            TimeTerm::Tomorrow => self.day(add_days(today, 1), is_vague),
            TimeTerm::Yesterday => self.day(add_days(today, -1), is_vague),
            TimeTerm::Date(date) => self.day(date, is_vague),
            TimeTerm::InDays(n) => self.day(add_days(today, n), is_vague),
        }
    }

    /// Resolves several terms into one filter; exact conditions are OR'd.
    pub fn resolve_all(&self, terms: &[TimeTerm], is_vague: bool) -> Option<DueDateFilter> {
        terms
            .iter()
            .map(|term| self.resolve(*term, is_vague))
            .reduce(DueDateFilter::merge)
    }

    fn day(&self, date: Date, is_vague: bool) -> DueDateFilter {
        if is_vague {
            range_to(date)
        } else {
            exact(DueCondition::On { date })
        }
    }

    /// Inclusive first and last day of the week containing `date`.
    pub fn week_bounds(&self, date: Date) -> (Date, Date) {
        let offset = (i64::from(date.weekday().number_days_from_monday()) + 7
            - i64::from(self.week_start.number_days_from_monday()))
            % 7;
        let start = add_days(date, -offset);
        (start, add_days(start, 6))
    }
}

fn exact(condition: DueCondition) -> DueDateFilter {
    DueDateFilter::Matches(vec![condition])
}

fn within(start: Date, end: Date) -> DueDateFilter {
    exact(DueCondition::Within { start, end })
}

fn range_to(end: Date) -> DueDateFilter {
    DueDateFilter::Range(DueDateRange::on_or_before(end))
}

fn window(start: Date, end: Date, is_vague: bool) -> DueDateFilter {
    if is_vague {
        DueDateFilter::Range(DueDateRange::between(start, end))
    } else {
        within(start, end)
    }
}

fn add_days(date: Date, days: i64) -> Date {
    date.saturating_add(Duration::days(days))
}

/// Inclusive first and last day of the month containing `date`.
fn month_bounds(date: Date) -> (Date, Date) {
    let start = date.replace_day(1).unwrap_or(date);
    let (year, month) = match date.month() {
        Month::December => (date.year() + 1, Month::January),
        m => (date.year(), m.next()),
    };
    let end = Date::from_calendar_date(year, month, 1)
        .map(|next| add_days(next, -1))
        .unwrap_or(date);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    // 2025-01-15 is a Wednesday.
    fn resolver() -> TimeContextResolver {
        TimeContextResolver::new(date!(2025 - 01 - 15), WeekStart::Monday)
    }

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!(TimeTerm::parse("today"), Some(TimeTerm::Today));
        assert_eq!(TimeTerm::parse("Next Week"), Some(TimeTerm::NextWeek));
        assert_eq!(TimeTerm::parse("next_week"), Some(TimeTerm::NextWeek));
        assert_eq!(TimeTerm::parse("this-week"), Some(TimeTerm::ThisWeek));
        assert_eq!(TimeTerm::parse("none"), Some(TimeTerm::Undated));
        assert_eq!(TimeTerm::parse("banana"), None);
    }

    #[test]
    fn parses_explicit_and_relative_dates() {
        assert_eq!(
            TimeTerm::parse("2025-03-01"),
            Some(TimeTerm::Date(date!(2025 - 03 - 01)))
        );
        assert_eq!(TimeTerm::parse("+3d"), Some(TimeTerm::InDays(3)));
        assert_eq!(TimeTerm::parse("-2d"), Some(TimeTerm::InDays(-2)));
        assert_eq!(TimeTerm::parse("in 5 days"), Some(TimeTerm::InDays(5)));
        assert_eq!(TimeTerm::parse("in 1 day"), Some(TimeTerm::InDays(1)));
    }

    #[test]
    fn term_names_round_trip() {
        for term in [
            TimeTerm::Today,
            TimeTerm::NextWeek,
            TimeTerm::Undated,
            TimeTerm::InDays(4),
            TimeTerm::Date(date!(2025 - 02 - 02)),
        ] {
            assert_eq!(TimeTerm::parse(&term.name()), Some(term));
        }
    }

    #[test]
    fn today_is_exact_for_specific_queries() {
        let filter = resolver().resolve(TimeTerm::Today, false);
        assert_eq!(
            filter,
            DueDateFilter::Matches(vec![DueCondition::On {
                date: date!(2025 - 01 - 15)
            }])
        );
    }

    #[test]
    fn today_is_a_range_for_vague_queries() {
        let filter = resolver().resolve(TimeTerm::Today, true);
        assert_eq!(
            filter,
            DueDateFilter::Range(DueDateRange::on_or_before(date!(2025 - 01 - 15)))
        );
        // Overdue tasks are included.
        assert!(filter.matches(Some(date!(2024 - 12 - 31))));
    }

    #[test]
    fn resolution_is_deterministic() {
        let r = resolver();
        for _ in 0..3 {
            assert_eq!(
                r.resolve(TimeTerm::Today, true),
                resolver().resolve(TimeTerm::Today, true)
            );
        }
    }

    #[test]
    fn next_week_is_a_seven_day_window_in_both_modes() {
        let r = resolver();
        for vague in [false, true] {
            let filter = r.resolve(TimeTerm::NextWeek, vague);
            let start = date!(2025 - 01 - 20);
            let end = date!(2025 - 01 - 26);
            assert!(filter.matches(Some(start)));
            assert!(filter.matches(Some(end)));
            assert!(!filter.matches(Some(date!(2025 - 01 - 19))));
            assert!(!filter.matches(Some(date!(2025 - 01 - 27))));
            assert_eq!((end - start).whole_days(), 6);
        }
        assert_eq!(
            r.resolve(TimeTerm::NextWeek, true),
            DueDateFilter::Range(DueDateRange::between(
                date!(2025 - 01 - 20),
                date!(2025 - 01 - 26)
            ))
        );
    }

    #[test]
    fn week_bounds_honor_week_start() {
        let monday = resolver();
        assert_eq!(
            monday.week_bounds(date!(2025 - 01 - 15)),
            (date!(2025 - 01 - 13), date!(2025 - 01 - 19))
        );

        let sunday = TimeContextResolver::new(date!(2025 - 01 - 15), WeekStart::Sunday);
        assert_eq!(
            sunday.week_bounds(date!(2025 - 01 - 15)),
            (date!(2025 - 01 - 12), date!(2025 - 01 - 18))
        );
        // A Sunday starts its own week.
        assert_eq!(
            sunday.week_bounds(date!(2025 - 01 - 12)),
            (date!(2025 - 01 - 12), date!(2025 - 01 - 18))
        );
    }

    #[test]
    fn this_week_vague_includes_overdue() {
        let filter = resolver().resolve(TimeTerm::ThisWeek, true);
        assert!(filter.matches(Some(date!(2025 - 01 - 01))));
        assert!(filter.matches(Some(date!(2025 - 01 - 19))));
        assert!(!filter.matches(Some(date!(2025 - 01 - 20))));
    }

    #[test]
    fn this_week_specific_is_bounded() {
        let filter = resolver().resolve(TimeTerm::ThisWeek, false);
        assert!(!filter.matches(Some(date!(2025 - 01 - 01))));
        assert!(filter.matches(Some(date!(2025 - 01 - 13))));
    }

    #[test]
    fn overdue_and_future_exclude_today() {
        let r = resolver();
        let overdue = r.resolve(TimeTerm::Overdue, false);
        assert!(overdue.matches(Some(date!(2025 - 01 - 14))));
        assert!(!overdue.matches(Some(date!(2025 - 01 - 15))));

        let future = r.resolve(TimeTerm::Future, true);
        assert!(future.matches(Some(date!(2025 - 01 - 16))));
        assert!(!future.matches(Some(date!(2025 - 01 - 15))));
    }

    #[test]
    fn month_windows_handle_december() {
        let r = TimeContextResolver::new(date!(2024 - 12 - 10), WeekStart::Monday);
        let next = r.resolve(TimeTerm::NextMonth, false);
        assert!(next.matches(Some(date!(2025 - 01 - 01))));
        assert!(next.matches(Some(date!(2025 - 01 - 31))));
        assert!(!next.matches(Some(date!(2025 - 02 - 01))));

        let this = r.resolve(TimeTerm::ThisMonth, false);
        assert!(this.matches(Some(date!(2024 - 12 - 31))));
        assert!(!this.matches(Some(date!(2024 - 11 - 30))));
    }

    #[test]
    fn relative_days_offset_from_today() {
        let filter = resolver().resolve(TimeTerm::InDays(3), false);
        assert!(filter.matches(Some(date!(2025 - 01 - 18))));
    }

    #[test]
    fn several_terms_are_ored() {
        let filter = resolver()
            .resolve_all(&[TimeTerm::Today, TimeTerm::Tomorrow], false)
            .unwrap();
        assert!(filter.matches(Some(date!(2025 - 01 - 15))));
        assert!(filter.matches(Some(date!(2025 - 01 - 16))));
        assert!(!filter.matches(Some(date!(2025 - 01 - 17))));
        assert!(resolver().resolve_all(&[], false).is_none());
    }
}
