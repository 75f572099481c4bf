//! Recurrence scheduler: decides whether "now" is a due moment.
//!
//! Everything here is a pure function of `(now, config, last_run)`. The
//! configured time of day is reattached to the stored last-run date before
//! comparing, and a missing history is treated as a run on
//! [`never_run_sentinel`].
//!
//! Monthly slots are the configured day (clamped per month) at the
//! configured time, every `N` months. The catch-up loop starts at the current
//! month's slot and steps forward by `N` while the last run already covers
//! it, so downtime yields at most one run and never a slot already executed.

pub mod calendar;
pub mod config;

pub use calendar::{calendar_diff, CalendarDiff};
pub use config::{parse_time_of_day, ScheduleConfig};

use crate::settings::SettingsStore;
use calendar::{advance_slot, clamped_slot};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::error;

/// Result of one scheduler evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub due_now: bool,
    /// Next instant to show an operator. Never already elapsed.
    pub next_run: NaiveDateTime,
    pub remaining: CalendarDiff,
    pub summary: String,
    pub config_error: bool,
}

impl Evaluation {
    fn config_error(now: NaiveDateTime, detail: impl std::fmt::Display) -> Self {
        Self {
            due_now: false,
            next_run: now,
            remaining: CalendarDiff::default(),
            summary: format!("Error: Invalid schedule config: {}", detail),
            config_error: true,
        }
    }
}

pub fn never_run_sentinel() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Evaluate straight from a settings store. Total: malformed settings give a
/// non-due evaluation with an error summary.
pub fn evaluate_settings(
    now: NaiveDateTime,
    settings: &dyn SettingsStore,
    last_run: Option<NaiveDate>,
) -> Evaluation {
    match ScheduleConfig::from_store(settings) {
        Ok(config) => evaluate(now, &config, last_run),
        Err(e) => {
            error!(
                "Invalid auto-scheduling configuration (Day/Time/Interval): {}. Please check settings.",
                e
            );
            Evaluation::config_error(now, e)
        }
    }
}

pub fn evaluate(
    now: NaiveDateTime,
    config: &ScheduleConfig,
    last_run: Option<NaiveDate>,
) -> Evaluation {
    let decision = if config.is_daily() {
        Some(evaluate_daily(now, config.time_of_day, last_run))
    } else {
        evaluate_monthly(now, config, last_run)
    };

    let Some((due_now, next_run)) = decision else {
        return Evaluation::config_error(now, "schedule is outside the supported calendar range");
    };

    let remaining = calendar_diff(now, next_run);
    Evaluation {
        due_now,
        next_run,
        remaining,
        summary: summarize(last_run, next_run, &remaining),
        config_error: false,
    }
}

fn evaluate_daily(
    now: NaiveDateTime,
    time: NaiveTime,
    last_run: Option<NaiveDate>,
) -> (bool, NaiveDateTime) {
    let today_at = now.date().and_time(time);
    let not_run_today = last_run.map_or(true, |date| date < now.date());

    let due_now = not_run_today && now >= today_at;
    let next_run = if now >= today_at {
        today_at + Duration::days(1)
    } else {
        today_at
    };
    (due_now, next_run)
}

fn evaluate_monthly(
    now: NaiveDateTime,
    config: &ScheduleConfig,
    last_run: Option<NaiveDate>,
) -> Option<(bool, NaiveDateTime)> {
    let day = config.day_of_month;
    let time = config.time_of_day;
    let step = config.repeat_every_n_months.max(1);

    let effective_last_run = last_run
        .map(|date| date.and_time(time))
        .unwrap_or_else(never_run_sentinel);

    let mut candidate = clamped_slot(now.year(), now.month(), day, time)?;
    while candidate <= effective_last_run {
        candidate = advance_slot(candidate, step, day, time)?;
    }

    let due_now = now >= candidate;
    let next_run = if due_now {
        advance_slot(candidate, step, day, time)?
    } else {
        candidate
    };
    Some((due_now, next_run))
}

fn summarize(last_run: Option<NaiveDate>, next_run: NaiveDateTime, remaining: &CalendarDiff) -> String {
    let last_run_info = match last_run {
        Some(date) => format!("Last Run: {}", date.format("%Y-%m-%d")),
        None => "Last Run: Never".to_string(),
    };
    let mut summary = format!(
        "{} | Next Scheduled: {}",
        last_run_info,
        next_run.format("%Y-%m-%d %H:%M")
    );
    if !remaining.is_zero() {
        summary.push_str(&format!(" | {}", remaining));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{keys, MemorySettings};
    use crate::transfer::Operation;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn monthly(day: u32, every: u32, h: u32, m: u32) -> ScheduleConfig {
        ScheduleConfig {
            day_of_month: day,
            repeat_every_n_months: every,
            time_of_day: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            operation: Operation::Move,
            min_free_space_gb: 5.0,
        }
    }

    #[test]
    fn test_never_run_is_due_once_this_months_slot_passes() {
        let config = monthly(10, 1, 8, 0);
        let before = evaluate(at(2024, 5, 10, 7, 59), &config, None);
        assert!(!before.due_now);
        assert_eq!(before.next_run, at(2024, 5, 10, 8, 0));
        assert_eq!(before.summary, "Last Run: Never | Next Scheduled: 2024-05-10 08:00 | in 1 minute");

        let after = evaluate(at(2024, 5, 10, 8, 0), &config, None);
        assert!(after.due_now);
        assert_eq!(after.next_run, at(2024, 6, 10, 8, 0));
    }

    #[test]
    fn test_run_today_moves_to_next_interval() {
        let config = monthly(10, 1, 8, 0);
        let eval = evaluate(at(2024, 5, 10, 9, 0), &config, Some(date(2024, 5, 10)));
        assert!(!eval.due_now);
        assert_eq!(eval.next_run, at(2024, 6, 10, 8, 0));
    }

    #[test]
    fn test_downtime_waits_for_this_months_slot() {
        let config = monthly(15, 1, 0, 1);
        // Last ran in January, back up on April 10th: the slot is April's,
        // not an overdue earlier month.
        let eval = evaluate(at(2024, 4, 10, 12, 0), &config, Some(date(2024, 1, 15)));
        assert!(!eval.due_now);
        assert_eq!(eval.next_run, at(2024, 4, 15, 0, 1));

        let due = evaluate(at(2024, 4, 16, 8, 0), &config, Some(date(2024, 1, 15)));
        assert!(due.due_now);
        assert_eq!(due.next_run, at(2024, 5, 15, 0, 1));
    }

    #[test]
    fn test_catch_up_runs_once_for_many_missed_slots() {
        let config = monthly(1, 1, 6, 0);
        let now = at(2024, 9, 20, 10, 0);
        let eval = evaluate(now, &config, Some(date(2023, 11, 3)));
        assert!(eval.due_now);
        assert_eq!(eval.next_run, at(2024, 10, 1, 6, 0));

        // Once the run stamps today, nothing else is due until October.
        let after = evaluate(now, &config, Some(now.date()));
        assert!(!after.due_now);
        assert_eq!(after.next_run, at(2024, 10, 1, 6, 0));
    }

    #[test]
    fn test_interval_steps_from_current_month_slot() {
        let config = monthly(15, 3, 0, 1);
        // February's slot is after the January run, so it is due even though
        // three months have not passed.
        let eval = evaluate(at(2024, 2, 20, 0, 0), &config, Some(date(2024, 1, 15)));
        assert!(eval.due_now);
        assert_eq!(eval.next_run, at(2024, 5, 15, 0, 1));

        let after = evaluate(at(2024, 2, 20, 0, 5), &config, Some(date(2024, 2, 20)));
        assert!(!after.due_now);
        assert_eq!(after.next_run, at(2024, 5, 15, 0, 1));
    }

    #[test]
    fn test_day_31_clamps_in_february() {
        let config = monthly(31, 1, 0, 1);
        let non_leap = evaluate(at(2023, 2, 10, 0, 0), &config, Some(date(2023, 1, 31)));
        assert_eq!(non_leap.next_run, at(2023, 2, 28, 0, 1));

        let leap = evaluate(at(2024, 2, 10, 0, 0), &config, Some(date(2024, 1, 31)));
        assert_eq!(leap.next_run, at(2024, 2, 29, 0, 1));

        // The clamp is per month: March goes back to the 31st.
        let after_feb = evaluate(at(2024, 3, 1, 0, 0), &config, Some(date(2024, 2, 29)));
        assert_eq!(after_feb.next_run, at(2024, 3, 31, 0, 1));
    }

    #[test]
    fn test_day_31_in_thirty_day_month_is_due_on_the_30th() {
        let config = monthly(31, 1, 23, 0);
        let eval = evaluate(at(2024, 4, 30, 23, 30), &config, Some(date(2024, 3, 31)));
        assert!(eval.due_now);
        assert_eq!(eval.next_run, at(2024, 5, 31, 23, 0));
    }

    #[test]
    fn test_displayed_next_run_is_never_in_the_past() {
        let config = monthly(5, 2, 12, 0);
        let mut now = at(2024, 1, 1, 0, 0);
        let mut last_run = Some(date(2023, 6, 5));
        for _ in 0..400 {
            let eval = evaluate(now, &config, last_run);
            assert!(eval.next_run > now, "next {} <= now {}", eval.next_run, now);
            if eval.due_now {
                last_run = Some(now.date());
            }
            now += Duration::hours(23);
        }
    }

    #[test]
    fn test_daily_mode() {
        let config = monthly(1, 0, 9, 30);

        let early = evaluate(at(2024, 6, 3, 9, 0), &config, Some(date(2024, 6, 2)));
        assert!(!early.due_now);
        assert_eq!(early.next_run, at(2024, 6, 3, 9, 30));

        let due = evaluate(at(2024, 6, 3, 9, 30), &config, Some(date(2024, 6, 2)));
        assert!(due.due_now);
        assert_eq!(due.next_run, at(2024, 6, 4, 9, 30));

        let never = evaluate(at(2024, 6, 3, 10, 0), &config, None);
        assert!(never.due_now);
    }

    #[test]
    fn test_daily_mode_is_idempotent_within_a_day() {
        let config = monthly(1, 0, 9, 30);
        let today = Some(date(2024, 6, 3));
        let first = evaluate(at(2024, 6, 3, 10, 0), &config, today);
        let second = evaluate(at(2024, 6, 3, 23, 59), &config, today);
        assert!(!first.due_now);
        assert!(!second.due_now);
        assert_eq!(first.next_run, at(2024, 6, 4, 9, 30));
        assert_eq!(second.next_run, at(2024, 6, 4, 9, 30));
    }

    #[test]
    fn test_summary_breaks_down_remaining_time() {
        let config = monthly(20, 1, 10, 0);
        let eval = evaluate(at(2024, 1, 18, 8, 30), &config, Some(date(2023, 12, 20)));
        assert_eq!(
            eval.summary,
            "Last Run: 2023-12-20 | Next Scheduled: 2024-01-20 10:00 | in 2 days, 1 hour, 30 minutes"
        );

        let far = evaluate(at(2024, 1, 21, 10, 0), &monthly(20, 3, 10, 0), Some(date(2024, 1, 20)));
        assert_eq!(far.next_run, at(2024, 4, 20, 10, 0));
        assert_eq!(far.remaining.months, 2);
        assert_eq!(far.remaining.days, 30);
    }

    #[test]
    fn test_bad_settings_report_error_instead_of_failing() {
        let store = MemorySettings::new().with(keys::AUTO_TIME, "24:61");
        let now = at(2024, 1, 1, 0, 0);
        let eval = evaluate_settings(now, &store, None);
        assert!(!eval.due_now);
        assert!(eval.config_error);
        assert!(eval.summary.starts_with("Error: Invalid schedule config:"));

        let store = MemorySettings::new().with(keys::AUTO_DAY, "soon");
        let eval = evaluate_settings(now, &store, None);
        assert!(!eval.due_now);
        assert!(eval.summary.contains("soon"));
    }

    #[test]
    fn test_negative_interval_behaves_as_monthly() {
        let store = MemorySettings::new()
            .with(keys::AUTO_INTERVAL, -2)
            .with(keys::AUTO_DAY, 5)
            .with(keys::AUTO_TIME, "00:00");
        let eval = evaluate_settings(at(2024, 3, 6, 0, 0), &store, Some(date(2024, 2, 5)));
        assert!(eval.due_now);
        assert_eq!(eval.next_run, at(2024, 4, 5, 0, 0));
    }
}
