use std::collections::HashMap;

use chrono::{DateTime, Datelike, Days, Local, Months, Timelike};
use serde::{Deserialize, Serialize};

// Before this hour "in the morning" still refers to today.
const DUSK_HOUR: u32 = 4;
const QUARTER_IN_MONTHS: u32 = 3;

/// User preferences for where snooze presets land on the clock. Defaults
/// are supplied here and only persisted once the user changes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub morning_hour: u32,
    pub morning_minute: u32,
    pub evening_hour: u32,
    pub evening_minute: u32,
    /// Day the week starts on, 0 = Sunday.
    pub first_day_of_week: u32,
    /// Day the weekend starts on, 0 = Sunday.
    pub weekend_day: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            morning_hour: 9,
            morning_minute: 0,
            evening_hour: 17,
            evening_minute: 0,
            first_day_of_week: 1,
            weekend_day: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnoozePreset {
    InTheMorning,
    ThisEvening,
    TomorrowMorning,
    ThisWeekend,
    NextWeek,
    InOneQuarter,
    InOneYear,
}

impl SnoozePreset {
    pub fn name(self) -> &'static str {
        match self {
            SnoozePreset::InTheMorning => "in-the-morning",
            SnoozePreset::ThisEvening => "this-evening",
            SnoozePreset::TomorrowMorning => "tomorrow-morning",
            SnoozePreset::ThisWeekend => "this-weekend",
            SnoozePreset::NextWeek => "next-week",
            SnoozePreset::InOneQuarter => "in-one-quarter",
            SnoozePreset::InOneYear => "in-one-year",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "in-the-morning" => Some(SnoozePreset::InTheMorning),
            "this-evening" => Some(SnoozePreset::ThisEvening),
            "tomorrow-morning" => Some(SnoozePreset::TomorrowMorning),
            "this-weekend" => Some(SnoozePreset::ThisWeekend),
            "next-week" => Some(SnoozePreset::NextWeek),
            "in-one-quarter" => Some(SnoozePreset::InOneQuarter),
            "in-one-year" => Some(SnoozePreset::InOneYear),
            _ => None,
        }
    }
}

impl Settings {
    /// Presets relevant right now, sorted by wake time with duplicate
    /// times collapsed (e.g. "this weekend" and "next week" can land on
    /// the same morning).
    pub fn presets(&self, now: DateTime<Local>) -> Vec<(SnoozePreset, DateTime<Local>)> {
        let now = start_of_minute(now);
        let mut presets = Vec::new();

        if DUSK_HOUR < now.hour() && now.hour() + 1 < self.evening_hour {
            presets.push(SnoozePreset::ThisEvening);
        } else if now.hour() < DUSK_HOUR {
            presets.push(SnoozePreset::InTheMorning);
        }
        presets.extend([
            SnoozePreset::TomorrowMorning,
            SnoozePreset::ThisWeekend,
            SnoozePreset::NextWeek,
            SnoozePreset::InOneQuarter,
            SnoozePreset::InOneYear,
        ]);

        let mut resolved: Vec<(SnoozePreset, DateTime<Local>)> = presets
            .into_iter()
            .map(|preset| (preset, self.resolve(preset, now)))
            .collect();
        resolved.sort_by_key(|(_, at)| at.timestamp());
        resolved.dedup_by_key(|(_, at)| at.timestamp());
        resolved
    }

    /// The concrete wake time a preset stands for, relative to `now`.
    pub fn resolve(&self, preset: SnoozePreset, now: DateTime<Local>) -> DateTime<Local> {
        let now = start_of_minute(now);
        let morning = at_time(now, self.morning_hour, self.morning_minute);
        match preset {
            SnoozePreset::InTheMorning => morning,
            SnoozePreset::ThisEvening => at_time(now, self.evening_hour, self.evening_minute),
            SnoozePreset::TomorrowMorning => add_days(morning, 1),
            SnoozePreset::ThisWeekend => next_day_of_week(morning, self.weekend_day),
            SnoozePreset::NextWeek => next_day_of_week(morning, self.first_day_of_week),
            SnoozePreset::InOneQuarter => add_months(morning, QUARTER_IN_MONTHS),
            SnoozePreset::InOneYear => add_months(morning, 12),
        }
    }

    pub fn from_pairs(pairs: &HashMap<String, String>) -> Self {
        let mut settings = Self::default();
        let mut read = |key: &str, slot: &mut u32| {
            if let Some(value) = pairs.get(key).and_then(|v| v.parse().ok()) {
                *slot = value;
            }
        };
        read("morning_hour", &mut settings.morning_hour);
        read("morning_minute", &mut settings.morning_minute);
        read("evening_hour", &mut settings.evening_hour);
        read("evening_minute", &mut settings.evening_minute);
        read("first_day_of_week", &mut settings.first_day_of_week);
        read("weekend_day", &mut settings.weekend_day);
        settings
    }

    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("morning_hour", self.morning_hour.to_string()),
            ("morning_minute", self.morning_minute.to_string()),
            ("evening_hour", self.evening_hour.to_string()),
            ("evening_minute", self.evening_minute.to_string()),
            ("first_day_of_week", self.first_day_of_week.to_string()),
            ("weekend_day", self.weekend_day.to_string()),
        ]
    }
}

fn start_of_minute(date: DateTime<Local>) -> DateTime<Local> {
    date.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(date)
}

fn at_time(date: DateTime<Local>, hour: u32, minute: u32) -> DateTime<Local> {
    date.with_hour(hour)
        .and_then(|d| d.with_minute(minute))
        .unwrap_or(date)
}

fn add_days(date: DateTime<Local>, days: u64) -> DateTime<Local> {
    date.checked_add_days(Days::new(days)).unwrap_or(date)
}

fn add_months(date: DateTime<Local>, months: u32) -> DateTime<Local> {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}

/// The next strictly-future date falling on `day_of_week` (0 = Sunday).
/// A date already on that weekday advances a full week.
fn next_day_of_week(date: DateTime<Local>, day_of_week: u32) -> DateTime<Local> {
    let today = i64::from(date.weekday().num_days_from_sunday());
    let delta = (i64::from(day_of_week) - today - 7) % 7 + 7;
    add_days(date, delta as u64)
}
