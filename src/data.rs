use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::EngineConfig;
use crate::solver::scorer::ScoreBreakdown;
use crate::solver::validator::Violation;

// Type aliases for clarity
pub type RoomId = u32;
pub type GroupId = u32;
pub type TeacherId = u32;
pub type StudyPlanId = u32;
/// Minutes since midnight.
pub type Minute = u32;

/// Serde adapter for minute-of-day values written as `"HH:MM"`.
pub mod hhmm {
    use super::Minute;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn format(minute: Minute) -> String {
        format!("{:02}:{:02}", minute / 60, minute % 60)
    }

    pub fn parse(text: &str) -> Option<Minute> {
        let (hours, minutes) = text.trim().split_once(':')?;
        let hours: Minute = hours.parse().ok()?;
        let minutes: Minute = minutes.parse().ok()?;
        if hours > 24 || minutes > 59 || (hours == 24 && minutes != 0) {
            return None;
        }
        Some(hours * 60 + minutes)
    }

    pub fn serialize<S: Serializer>(minute: &Minute, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(*minute))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Minute, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).ok_or_else(|| de::Error::custom(format!("invalid time of day '{text}'")))
    }
}

/// A half-open interval `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeSlot {
    #[serde(with = "hhmm")]
    pub start: Minute,
    #[serde(with = "hhmm")]
    pub end: Minute,
}

impl TimeSlot {
    pub fn new(start: Minute, end: Minute) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn duration(&self) -> Minute {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", hhmm::format(self.start), hhmm::format(self.end))
    }
}

/// A schedulable resource. Used as occupancy key and violation payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "camelCase")]
pub enum Resource {
    Teacher(TeacherId),
    Group(GroupId),
    Room(RoomId),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Teacher(id) => write!(f, "teacher {id}"),
            Resource::Group(id) => write!(f, "group {id}"),
            Resource::Room(id) => write!(f, "room {id}"),
        }
    }
}

/// Represents a physical room with a given capacity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub capacity: u32,
    #[serde(rename = "type", default)]
    pub room_type: String,
    #[serde(default)]
    pub building: String,
}

/// An already-committed booking that the run must work around.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingBooking {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: Minute,
    #[serde(with = "hhmm")]
    pub end_time: Minute,
    #[serde(default)]
    pub teacher_id: Option<TeacherId>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub room_id: Option<RoomId>,
}

impl ExistingBooking {
    pub fn slot(&self) -> TimeSlot {
        TimeSlot::new(self.start_time, self.end_time)
    }

    pub fn resources(&self) -> impl Iterator<Item = Resource> + use<> {
        [
            self.teacher_id.map(Resource::Teacher),
            self.group_id.map(Resource::Group),
            self.room_id.map(Resource::Room),
        ]
        .into_iter()
        .flatten()
    }
}

/// Approved teacher unavailability, inclusive on both ends.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Absence {
    pub teacher_id: TeacherId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Absence {
    #[inline]
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// One line of the demand list: a group needs a subject `weekly_lesson_count` times a week.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Demand {
    pub study_plan_id: StudyPlanId,
    pub teacher_id: TeacherId,
    pub group_id: GroupId,
    pub group_size: u32,
    pub subject: String,
    pub weekly_lesson_count: u32,
    /// Explicit subject category for room-type matching. Falls back to the
    /// configured subject table when absent.
    #[serde(default)]
    pub category: Option<String>,
}

/// One concrete lesson at a date, time and (optionally) room.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonInstance {
    pub group_id: GroupId,
    pub teacher_id: TeacherId,
    pub study_plan_id: StudyPlanId,
    pub subject: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: Minute,
    #[serde(with = "hhmm")]
    pub end_time: Minute,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_capacity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl LessonInstance {
    /// An unroomed lesson for `demand` at `date` / `slot`.
    pub fn for_demand(demand: &Demand, date: NaiveDate, slot: TimeSlot) -> Self {
        Self {
            group_id: demand.group_id,
            teacher_id: demand.teacher_id,
            study_plan_id: demand.study_plan_id,
            subject: demand.subject.clone(),
            date,
            start_time: slot.start,
            end_time: slot.end,
            room_id: None,
            room_type: None,
            room_capacity: None,
            group_size: Some(demand.group_size),
            category: demand.category.clone(),
        }
    }

    #[inline]
    pub fn slot(&self) -> TimeSlot {
        TimeSlot::new(self.start_time, self.end_time)
    }

    pub fn set_slot(&mut self, slot: TimeSlot) {
        self.start_time = slot.start;
        self.end_time = slot.end;
    }

    /// Replaces the room assignment, keeping the denormalized room fields in sync.
    pub fn assign_room(&mut self, room: Option<&Room>) {
        self.room_id = room.map(|r| r.id);
        self.room_type = room.map(|r| r.room_type.clone());
        self.room_capacity = room.map(|r| r.capacity);
    }

    pub fn resources(&self) -> impl Iterator<Item = Resource> + use<> {
        [
            Some(Resource::Teacher(self.teacher_id)),
            Some(Resource::Group(self.group_id)),
            self.room_id.map(Resource::Room),
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    Weekly,
    Biweekly,
    Once,
}

impl Repeat {
    pub fn step_days(&self) -> u64 {
        match self {
            Repeat::Weekly => 7,
            Repeat::Biweekly => 14,
            Repeat::Once => 0,
        }
    }
}

/// A weekly or biweekly rule standing in for many lesson instances.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTemplate {
    pub group_id: GroupId,
    pub teacher_id: TeacherId,
    pub study_plan_id: StudyPlanId,
    pub subject: String,
    #[serde(with = "hhmm")]
    pub start_time: Minute,
    #[serde(with = "hhmm")]
    pub end_time: Minute,
    pub day_of_week: Weekday,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub repeat: Repeat,
    pub excluded_dates: Vec<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

impl RecurringTemplate {
    /// Expands the cadence over `[start_date, end_date]`, skipping excluded dates.
    pub fn occurrences(&self) -> Vec<NaiveDate> {
        let step = self.repeat.step_days();
        if step == 0 {
            return vec![self.start_date];
        }
        let mut dates = Vec::new();
        let mut cursor = Some(self.start_date);
        while let Some(date) = cursor {
            if date > self.end_date {
                break;
            }
            if date.weekday() == self.day_of_week && !self.excluded_dates.contains(&date) {
                dates.push(date);
            }
            cursor = date.checked_add_days(Days::new(step));
        }
        dates
    }
}

/// A lesson that does not belong to any recurring pattern.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleOccurrence {
    pub group_id: GroupId,
    pub teacher_id: TeacherId,
    pub study_plan_id: StudyPlanId,
    pub subject: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: Minute,
    #[serde(with = "hhmm")]
    pub end_time: Minute,
    pub repeat: Repeat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

impl From<&LessonInstance> for SingleOccurrence {
    fn from(lesson: &LessonInstance) -> Self {
        Self {
            group_id: lesson.group_id,
            teacher_id: lesson.teacher_id,
            study_plan_id: lesson.study_plan_id,
            subject: lesson.subject.clone(),
            date: lesson.date,
            start_time: lesson.start_time,
            end_time: lesson.end_time,
            repeat: Repeat::Once,
            room_id: lesson.room_id,
        }
    }
}

/// Describes a soft constraint that was not met in the final schedule.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmetSoftConstraint {
    pub constraint_type: String,
    pub description: String,
}

impl fmt::Display for UnmetSoftConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.constraint_type, self.description)
    }
}

/// Expected vs placed lesson count for one group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderFill {
    pub group_id: GroupId,
    pub expected: u32,
    pub placed: u32,
}

/// The complete input for one generation run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub config: EngineConfig,
    pub demands: Vec<Demand>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub bookings: Vec<ExistingBooking>,
    #[serde(default)]
    pub absences: Vec<Absence>,
}

/// Everything the caller needs to decide whether to persist the result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub iterations: u32,
    pub accepted_moves: u32,
    pub seed: u64,
    pub elapsed_ms: u64,
    pub total_cost: f64,
    pub score: ScoreBreakdown,
    pub confidence: f64,
    /// Residual hard-constraint violations. Must be checked before persisting.
    pub violations: Vec<Violation>,
    pub under_fill: Vec<UnderFill>,
    /// Lessons the repair pass could not move to a clean slot.
    pub unrepaired: Vec<LessonInstance>,
    pub compaction_applied: bool,
    pub window_minimization_applied: bool,
    pub unmet_soft_constraints: Vec<UnmetSoftConstraint>,
}

/// The final output of the solver.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub lessons: Vec<LessonInstance>,
    pub templates: Vec<RecurringTemplate>,
    pub singles: Vec<SingleOccurrence>,
    pub diagnostics: Diagnostics,
}

impl GenerationResult {
    pub fn is_feasible(&self) -> bool {
        self.diagnostics.violations.is_empty()
    }
}
