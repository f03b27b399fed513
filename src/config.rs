//! Run configuration.
//!
//! Every field except the date range has a default so that a request only
//! needs to spell out what differs from a regular school day.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::data::{Demand, Minute, TimeSlot, hhmm};
use crate::error::ConfigError;

/// Gaps shorter than this never count as a window.
pub const MIN_WINDOW_MINUTES: Minute = 10;

/// Day and slot restrictions for one subject.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRestriction {
    pub subject: String,
    /// Empty means every working day is allowed.
    #[serde(default)]
    pub preferred_days: Vec<Weekday>,
    #[serde(default)]
    pub no_first_lesson: bool,
    #[serde(default)]
    pub no_last_lesson: bool,
}

/// Maps a subject category to the room types it prefers.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPreference {
    pub category: String,
    /// Subjects belonging to this category when a demand carries no explicit category.
    #[serde(default)]
    pub subjects: Vec<String>,
    pub room_types: Vec<String>,
}

/// Weights of the soft-score terms.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SoftWeights {
    pub windows: f64,
    pub fairness: f64,
    pub heavy_late: f64,
    pub transitions: f64,
    pub harmony: f64,
    pub preferences: f64,
}

impl Default for SoftWeights {
    fn default() -> Self {
        Self {
            windows: 1.0,
            fairness: 1.0,
            heavy_late: 1.0,
            transitions: 1.0,
            harmony: 1.0,
            preferences: 1.0,
        }
    }
}

impl SoftWeights {
    fn entries(&self) -> [(&'static str, f64); 6] {
        [
            ("windows", self.windows),
            ("fairness", self.fairness),
            ("heavyLate", self.heavy_late),
            ("transitions", self.transitions),
            ("harmony", self.harmony),
            ("preferences", self.preferences),
        ]
    }
}

fn default_working_hours() -> TimeSlot {
    TimeSlot::new(8 * 60, 17 * 60)
}
fn default_lesson_duration() -> Minute {
    45
}
fn default_break_duration() -> Minute {
    10
}
fn default_true() -> bool {
    true
}
fn default_max_consecutive() -> u32 {
    4
}
fn default_min_break() -> Minute {
    10
}
fn default_heavy_late_after() -> Minute {
    16 * 60
}
fn default_max_iterations() -> u32 {
    2000
}
fn default_time_budget_ms() -> u64 {
    5000
}

/// Configuration of one generation run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_working_hours")]
    pub working_hours: TimeSlot,
    #[serde(default = "default_lesson_duration")]
    pub lesson_duration: Minute,
    #[serde(default = "default_break_duration")]
    pub break_duration: Minute,
    #[serde(default = "default_true")]
    pub exclude_weekends: bool,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
    #[serde(default)]
    pub lunch: Option<TimeSlot>,
    /// Per teacher and per group.
    #[serde(default)]
    pub max_lessons_per_day: Option<u32>,
    #[serde(default = "default_max_consecutive")]
    pub max_consecutive: u32,
    /// Minimum gap between lessons held in different buildings. Also the gap
    /// up to which two lessons still count as consecutive.
    #[serde(default = "default_min_break")]
    pub min_break_minutes: Minute,
    #[serde(default)]
    pub subject_restrictions: Vec<SubjectRestriction>,
    #[serde(default)]
    pub room_preferences: Vec<RoomPreference>,
    /// Keywords marking demanding subjects that should not start late.
    #[serde(default)]
    pub heavy_subjects: Vec<String>,
    #[serde(with = "hhmm", default = "default_heavy_late_after")]
    pub heavy_late_after: Minute,
    #[serde(default)]
    pub weights: SoftWeights,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl EngineConfig {
    /// A configuration with every optional field at its default.
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            working_hours: default_working_hours(),
            lesson_duration: default_lesson_duration(),
            break_duration: default_break_duration(),
            exclude_weekends: true,
            holidays: Vec::new(),
            lunch: None,
            max_lessons_per_day: None,
            max_consecutive: default_max_consecutive(),
            min_break_minutes: default_min_break(),
            subject_restrictions: Vec::new(),
            room_preferences: Vec::new(),
            heavy_subjects: Vec::new(),
            heavy_late_after: default_heavy_late_after(),
            weights: SoftWeights::default(),
            max_iterations: default_max_iterations(),
            time_budget_ms: default_time_budget_ms(),
            seed: None,
        }
    }

    /// Rejects inputs that make a run meaningless before any work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.working_hours.end <= self.working_hours.start {
            return Err(ConfigError::EmptyWorkingHours(self.working_hours));
        }
        if self.end_date < self.start_date {
            return Err(ConfigError::EmptyDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if self.lesson_duration == 0 {
            return Err(ConfigError::ZeroLessonDuration);
        }
        if self.lesson_duration > self.working_hours.duration() {
            return Err(ConfigError::LessonExceedsWorkingHours {
                lesson: self.lesson_duration,
                window: self.working_hours,
            });
        }
        if let Some(lunch) = self.lunch {
            if lunch.end <= lunch.start {
                return Err(ConfigError::InvalidLunchWindow(lunch));
            }
        }
        if self.max_consecutive == 0 {
            return Err(ConfigError::ZeroMaxConsecutive);
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroIterationCap);
        }
        for (term, value) in self.weights.entries() {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { term, value });
            }
        }
        Ok(())
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        !(self.exclude_weekends && matches!(date.weekday(), Weekday::Sat | Weekday::Sun))
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    pub fn overlaps_lunch(&self, slot: TimeSlot) -> bool {
        self.lunch.is_some_and(|lunch| lunch.overlaps(&slot))
    }

    pub fn restriction_for(&self, subject: &str) -> Option<&SubjectRestriction> {
        self.subject_restrictions
            .iter()
            .find(|r| r.subject.eq_ignore_ascii_case(subject))
    }

    /// Room types preferred for a subject, resolved through the explicit
    /// category when given, otherwise through the subject lists.
    pub fn preferred_room_types(&self, subject: &str, category: Option<&str>) -> &[String] {
        let by_category = category.and_then(|c| {
            self.room_preferences
                .iter()
                .find(|p| p.category.eq_ignore_ascii_case(c))
        });
        let preference = by_category.or_else(|| {
            self.room_preferences
                .iter()
                .find(|p| p.subjects.iter().any(|s| s.eq_ignore_ascii_case(subject)))
        });
        preference.map(|p| p.room_types.as_slice()).unwrap_or(&[])
    }

    pub fn demand_room_types(&self, demand: &Demand) -> &[String] {
        self.preferred_room_types(&demand.subject, demand.category.as_deref())
    }

    pub fn is_heavy(&self, subject: &str) -> bool {
        let subject = subject.to_lowercase();
        self.heavy_subjects
            .iter()
            .any(|keyword| !keyword.is_empty() && subject.contains(&keyword.to_lowercase()))
    }

    /// Whether an idle gap between two lessons counts as a window.
    /// The regular break between adjacent slots never does.
    pub fn is_window(&self, gap: Minute) -> bool {
        gap >= MIN_WINDOW_MINUTES && gap > self.break_duration
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::new(
            NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 9, 6).unwrap(),
        )
    }

    #[test]
    fn test_defaults_from_minimal_json() {
        let json = r#"{"startDate": "2024-09-02", "endDate": "2024-09-27"}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.working_hours, TimeSlot::new(480, 1020));
        assert_eq!(config.lesson_duration, 45);
        assert_eq!(config.heavy_late_after, 960);
        assert!(config.exclude_weekends);
        assert_eq!(config.weights, SoftWeights::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_working_hours() {
        let mut config = config();
        config.working_hours = TimeSlot::new(780, 540);
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyWorkingHours(TimeSlot::new(780, 540)))
        );
    }

    #[test]
    fn test_rejects_inverted_date_range() {
        let mut config = config();
        config.end_date = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyDateRange { .. })
        ));
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut config = config();
        config.weights.fairness = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWeight {
                term: "fairness",
                ..
            })
        ));
    }

    #[test]
    fn test_room_type_lookup_prefers_explicit_category() {
        let mut config = config();
        config.room_preferences = vec![
            RoomPreference {
                category: "science".into(),
                subjects: vec!["Chemistry".into()],
                room_types: vec!["lab".into()],
            },
            RoomPreference {
                category: "sport".into(),
                subjects: vec![],
                room_types: vec!["gym".into()],
            },
        ];
        assert_eq!(config.preferred_room_types("chemistry", None), ["lab"]);
        assert_eq!(
            config.preferred_room_types("Chemistry", Some("sport")),
            ["gym"]
        );
        assert!(config.preferred_room_types("History", None).is_empty());
    }

    #[test]
    fn test_heavy_keyword_match() {
        let mut config = config();
        config.heavy_subjects = vec!["math".into()];
        assert!(config.is_heavy("Applied Mathematics"));
        assert!(!config.is_heavy("Art"));
    }

    #[test]
    fn test_regular_break_is_not_a_window() {
        let config = config();
        assert!(!config.is_window(10));
        assert!(config.is_window(11));
        assert!(config.is_window(30));
    }
}
