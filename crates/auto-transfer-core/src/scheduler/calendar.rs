use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// The configured day projected onto `year`/`month`, clamped down to the
/// month's last day. Never rolls into the following month.
pub fn clamped_slot(year: i32, month: u32, day: u32, time: NaiveTime) -> Option<NaiveDateTime> {
    let valid_day = day.clamp(1, last_day_of_month(year, month));
    NaiveDate::from_ymd_opt(year, month, valid_day).map(|date| date.and_time(time))
}

/// Move `slot` forward by `months` calendar months and re-clamp from the
/// configured day, so a 31st that became Feb 28 returns to Mar 31.
pub fn advance_slot(
    slot: NaiveDateTime,
    months: u32,
    day: u32,
    time: NaiveTime,
) -> Option<NaiveDateTime> {
    let index = slot.year() as i64 * 12 + slot.month0() as i64 + months as i64;
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = index.rem_euclid(12) as u32 + 1;
    clamped_slot(year, month, day, time)
}

/// Remaining time split into calendar units, months first, like a
/// calendar-aware "relative delta" rather than a raw duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarDiff {
    pub months: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
}

impl CalendarDiff {
    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.days == 0 && self.hours == 0 && self.minutes == 0
    }
}

impl fmt::Display for CalendarDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            (self.months, "month"),
            (self.days, "day"),
            (self.hours, "hour"),
            (self.minutes, "minute"),
        ]
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| {
            if *value > 1 {
                format!("{} {}s", value, unit)
            } else {
                format!("{} {}", value, unit)
            }
        })
        .collect();

        if parts.is_empty() {
            Ok(())
        } else {
            write!(f, "in {}", parts.join(", "))
        }
    }
}

/// Calendar difference from `from` to `to`. Zero when `to` is not after
/// `from`.
pub fn calendar_diff(from: NaiveDateTime, to: NaiveDateTime) -> CalendarDiff {
    if to <= from {
        return CalendarDiff::default();
    }

    let mut months = (to.year() - from.year()) as i64 * 12 + to.month() as i64
        - from.month() as i64;
    let mut anchor = shift_months(from, months);
    while months > 0 && anchor.map_or(true, |a| a > to) {
        months -= 1;
        anchor = shift_months(from, months);
    }

    let remainder = to - anchor.unwrap_or(from);
    CalendarDiff {
        months,
        days: remainder.num_days(),
        hours: remainder.num_hours() % 24,
        minutes: remainder.num_minutes() % 60,
    }
}

fn shift_months(from: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let months = u32::try_from(months).ok()?;
    from.checked_add_months(Months::new(months))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(last_day_of_month(2023, 2), 28);
        assert_eq!(last_day_of_month(2024, 2), 29);
        assert_eq!(last_day_of_month(1900, 2), 28);
        assert_eq!(last_day_of_month(2000, 2), 29);
        assert_eq!(last_day_of_month(2024, 4), 30);
        assert_eq!(last_day_of_month(2024, 12), 31);
    }

    #[test]
    fn test_clamped_slot_never_wraps() {
        assert_eq!(clamped_slot(2023, 2, 31, hm(0, 1)), Some(at(2023, 2, 28, 0, 1)));
        assert_eq!(clamped_slot(2024, 2, 31, hm(0, 1)), Some(at(2024, 2, 29, 0, 1)));
        assert_eq!(clamped_slot(2024, 6, 31, hm(9, 0)), Some(at(2024, 6, 30, 9, 0)));
        assert_eq!(clamped_slot(2024, 7, 31, hm(9, 0)), Some(at(2024, 7, 31, 9, 0)));
    }

    #[test]
    fn test_advance_slot_reclamps_from_configured_day() {
        let feb = at(2023, 2, 28, 8, 0);
        assert_eq!(advance_slot(feb, 1, 31, hm(8, 0)), Some(at(2023, 3, 31, 8, 0)));
        assert_eq!(advance_slot(feb, 12, 31, hm(8, 0)), Some(at(2024, 2, 29, 8, 0)));

        let nov = at(2024, 11, 30, 8, 0);
        assert_eq!(advance_slot(nov, 3, 30, hm(8, 0)), Some(at(2025, 2, 28, 8, 0)));
    }

    #[test]
    fn test_calendar_diff_counts_months_before_days() {
        let diff = calendar_diff(at(2024, 1, 31, 10, 0), at(2024, 3, 1, 12, 30));
        // Jan 31 + 1 month clamps to Feb 29, leaving 1 day 2h30m.
        assert_eq!(
            diff,
            CalendarDiff {
                months: 1,
                days: 1,
                hours: 2,
                minutes: 30
            }
        );
    }

    #[test]
    fn test_calendar_diff_backs_off_overshoot() {
        let diff = calendar_diff(at(2024, 1, 20, 0, 0), at(2024, 2, 10, 0, 0));
        assert_eq!(diff.months, 0);
        assert_eq!(diff.days, 21);
    }

    #[test]
    fn test_calendar_diff_elapsed_is_zero() {
        let diff = calendar_diff(at(2024, 5, 1, 0, 0), at(2024, 4, 1, 0, 0));
        assert!(diff.is_zero());
        assert_eq!(diff.to_string(), "");
    }

    #[test]
    fn test_display_pluralizes() {
        let diff = CalendarDiff {
            months: 2,
            days: 1,
            hours: 0,
            minutes: 5,
        };
        assert_eq!(diff.to_string(), "in 2 months, 1 day, 5 minutes");
    }
}
