//! Shared fixtures for engine unit tests.

use chrono::NaiveDate;

use crate::config::EngineConfig;
use crate::data::{Absence, Demand, ExistingBooking, LessonInstance, Minute, Room, RoomId, TimeSlot};
use crate::solver::Context;

/// A date in September 2024. The 2nd is a Monday.
pub(crate) fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
}

pub(crate) fn hm(h: u32, m: u32) -> Minute {
    h * 60 + m
}

pub(crate) fn lesson(
    group: u32,
    teacher: u32,
    d: u32,
    start: (u32, u32),
    end: (u32, u32),
    room: Option<RoomId>,
) -> LessonInstance {
    LessonInstance {
        group_id: group,
        teacher_id: teacher,
        study_plan_id: teacher,
        subject: format!("Subject {teacher}"),
        date: day(d),
        start_time: hm(start.0, start.1),
        end_time: hm(end.0, end.1),
        room_id: room,
        room_type: None,
        room_capacity: None,
        group_size: Some(20),
        category: None,
    }
}

pub(crate) fn demand(teacher: u32, group: u32, subject: &str, weekly: u32) -> Demand {
    Demand {
        study_plan_id: teacher * 100 + group,
        teacher_id: teacher,
        group_id: group,
        group_size: 20,
        subject: subject.into(),
        weekly_lesson_count: weekly,
        category: None,
    }
}

pub(crate) fn room(id: RoomId, capacity: u32, room_type: &str, building: &str) -> Room {
    Room {
        id,
        capacity,
        room_type: room_type.into(),
        building: building.into(),
    }
}

/// One school week (Mon 2024-09-02 to Fri 09-06), 09:00-13:00, 45 min lessons
/// with 10 min breaks. Rooms 1-3 are in building A, room 4 in building B.
pub(crate) struct Fixture {
    pub config: EngineConfig,
    pub rooms: Vec<Room>,
    pub bookings: Vec<ExistingBooking>,
    pub absences: Vec<Absence>,
}

impl Fixture {
    pub fn new() -> Self {
        let mut config = EngineConfig::new(day(2), day(6));
        config.working_hours = TimeSlot::new(hm(9, 0), hm(13, 0));
        config.max_iterations = 300;
        config.seed = Some(7);
        Self {
            config,
            rooms: vec![
                room(1, 30, "classroom", "A"),
                room(2, 30, "classroom", "A"),
                room(3, 60, "lab", "A"),
                room(4, 30, "classroom", "B"),
            ],
            bookings: Vec::new(),
            absences: Vec::new(),
        }
    }

    pub fn ctx(&self) -> Context<'_> {
        Context::new(&self.config, &self.rooms, &self.bookings, &self.absences)
    }
}
