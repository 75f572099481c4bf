use crate::error::ScheduleError;
use crate::settings::{keys, value_to_f64, value_to_i64, value_to_string, SettingsStore};
use crate::transfer::Operation;
use chrono::NaiveTime;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub day_of_month: u32,
    /// Zero selects daily mode.
    pub repeat_every_n_months: u32,
    pub time_of_day: NaiveTime,
    pub operation: Operation,
    pub min_free_space_gb: f64,
}

impl ScheduleConfig {
    pub fn from_store(store: &dyn SettingsStore) -> Result<Self, ScheduleError> {
        let day_value = store.get_or_default(keys::AUTO_DAY);
        let day_of_month = value_to_i64(&day_value)
            .ok()
            .filter(|day| (1..=31).contains(day))
            .ok_or_else(|| ScheduleError::InvalidDay(value_to_string(&day_value)))?
            as u32;

        let interval_value = store.get_or_default(keys::AUTO_INTERVAL);
        let interval = value_to_i64(&interval_value)
            .map_err(ScheduleError::InvalidInterval)?;
        let repeat_every_n_months = if interval < 0 {
            warn!(
                "'Repeat Every N Months' is set to {}, which is invalid. Using 1 month for calculation.",
                interval
            );
            1
        } else {
            u32::try_from(interval)
                .map_err(|_| ScheduleError::InvalidInterval(interval.to_string()))?
        };

        let time_value = value_to_string(&store.get_or_default(keys::AUTO_TIME));
        let time_of_day = parse_time_of_day(&time_value)?;

        let operation_value = value_to_string(&store.get_or_default(keys::AUTO_OPERATION));
        let operation = operation_value
            .parse::<Operation>()
            .map_err(|_| ScheduleError::InvalidOperation(operation_value.clone()))?;

        let min_free_space_gb = value_to_f64(&store.get_or_default(keys::MIN_FREE_SPACE_GB))
            .map_err(ScheduleError::InvalidFreeSpace)?;

        Ok(Self {
            day_of_month,
            repeat_every_n_months,
            time_of_day,
            operation,
            min_free_space_gb,
        })
    }

    pub fn is_daily(&self) -> bool {
        self.repeat_every_n_months == 0
    }
}

/// `HH:MM`, 24-hour clock. Single-digit fields are accepted.
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, ScheduleError> {
    let invalid = || ScheduleError::InvalidTime(raw.to_string());
    let (hour, minute) = raw.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.trim().parse().map_err(|_| invalid())?;
    let minute: u32 = minute.trim().parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}
