use chrono::NaiveDate;

use crate::data::{Minute, RoomId, TimeSlot};

/// Inputs rejected before any search begins.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("working hours {0} are empty: end must be after start")]
    EmptyWorkingHours(TimeSlot),
    #[error("date range {start}..={end} is empty")]
    EmptyDateRange { start: NaiveDate, end: NaiveDate },
    #[error("lesson duration must be positive")]
    ZeroLessonDuration,
    #[error("a {lesson} minute lesson does not fit into working hours {window}")]
    LessonExceedsWorkingHours { lesson: Minute, window: TimeSlot },
    #[error("lunch window {0} is empty: end must be after start")]
    InvalidLunchWindow(TimeSlot),
    #[error("max consecutive lessons must be at least 1")]
    ZeroMaxConsecutive,
    #[error("iteration cap must be at least 1")]
    ZeroIterationCap,
    #[error("soft weight '{term}' must be a finite non-negative number, got {value}")]
    InvalidWeight { term: &'static str, value: f64 },
    #[error("room id {0} appears more than once in the inventory")]
    DuplicateRoom(RoomId),
    #[error("no working day falls inside the date range")]
    NoWorkingDays,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
}
