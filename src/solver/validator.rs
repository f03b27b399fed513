//! Hard-constraint validation.
//!
//! [`validate`] is pure and lists every violation of a candidate plan; an
//! empty list is the feasibility predicate used everywhere else. All hard
//! constraints are local to one date, so the work is split per date and
//! [`validate_date`] lets callers re-check a single day cheaply.
//!
//! Checks, per date:
//! 1. teacher double-booking
//! 2. group double-booking
//! 3. room double-booking
//! 4. overlap with an existing booking of the same teacher, group or room
//! 5. room capacity below group size
//! 6. teacher absent
//! 7. configured holiday
//! 8. overlap with the lunch window
//! 9. daily lesson cap per teacher and group
//! 10. consecutive-chain limit per teacher and group
//! 11. building change without the minimum transition buffer

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use crate::data::{GroupId, LessonInstance, Minute, Resource, RoomId, TeacherId, TimeSlot};
use crate::solver::Context;

/// What went wrong, with the entities involved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ViolationKind {
    TeacherOverlap {
        teacher_id: TeacherId,
        date: NaiveDate,
        first: TimeSlot,
        second: TimeSlot,
    },
    GroupOverlap {
        group_id: GroupId,
        date: NaiveDate,
        first: TimeSlot,
        second: TimeSlot,
    },
    RoomOverlap {
        room_id: RoomId,
        date: NaiveDate,
        first: TimeSlot,
        second: TimeSlot,
    },
    BookingConflict {
        resource: Resource,
        date: NaiveDate,
        lesson: TimeSlot,
        booking: TimeSlot,
    },
    RoomCapacity {
        room_id: RoomId,
        date: NaiveDate,
        capacity: u32,
        group_size: u32,
    },
    TeacherAbsent {
        teacher_id: TeacherId,
        date: NaiveDate,
    },
    Holiday {
        date: NaiveDate,
    },
    LunchOverlap {
        group_id: GroupId,
        date: NaiveDate,
        lesson: TimeSlot,
    },
    DailyLimit {
        resource: Resource,
        date: NaiveDate,
        count: usize,
        max: u32,
    },
    ConsecutiveChain {
        resource: Resource,
        date: NaiveDate,
        length: usize,
        max: u32,
    },
    TransitionBuffer {
        resource: Resource,
        date: NaiveDate,
        from_building: String,
        to_building: String,
        gap: Minute,
        min_gap: Minute,
    },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::TeacherOverlap { teacher_id, date, first, second } => {
                write!(f, "teacher {teacher_id} double-booked on {date}: {first} and {second}")
            }
            ViolationKind::GroupOverlap { group_id, date, first, second } => {
                write!(f, "group {group_id} double-booked on {date}: {first} and {second}")
            }
            ViolationKind::RoomOverlap { room_id, date, first, second } => {
                write!(f, "room {room_id} double-booked on {date}: {first} and {second}")
            }
            ViolationKind::BookingConflict { resource, date, lesson, booking } => {
                write!(f, "{resource} lesson {lesson} on {date} clashes with booking {booking}")
            }
            ViolationKind::RoomCapacity { room_id, date, capacity, group_size } => write!(
                f,
                "room {room_id} on {date} seats {capacity} but the group has {group_size}"
            ),
            ViolationKind::TeacherAbsent { teacher_id, date } => {
                write!(f, "teacher {teacher_id} is absent on {date}")
            }
            ViolationKind::Holiday { date } => write!(f, "{date} is a holiday"),
            ViolationKind::LunchOverlap { group_id, date, lesson } => {
                write!(f, "group {group_id} lesson {lesson} on {date} overlaps lunch")
            }
            ViolationKind::DailyLimit { resource, date, count, max } => {
                write!(f, "{resource} has {count} lessons on {date}, max is {max}")
            }
            ViolationKind::ConsecutiveChain { resource, date, length, max } => write!(
                f,
                "{resource} has {length} consecutive lessons on {date}, max is {max}"
            ),
            ViolationKind::TransitionBuffer {
                resource,
                date,
                from_building,
                to_building,
                gap,
                min_gap,
            } => write!(
                f,
                "{resource} moves from building {from_building} to {to_building} on {date} \
                 with {gap} min, needs {min_gap}"
            ),
        }
    }
}

/// A hard-constraint violation and the plan indices of the lessons involved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    #[serde(flatten)]
    pub kind: ViolationKind,
    pub lessons: Vec<usize>,
}

impl Violation {
    fn new(kind: ViolationKind, lessons: Vec<usize>) -> Self {
        Self { kind, lessons }
    }

    #[inline]
    pub fn involves(&self, lesson: usize) -> bool {
        self.lessons.contains(&lesson)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

/// Lists every hard-constraint violation of `plan`.
pub fn validate(plan: &[LessonInstance], ctx: &Context) -> Vec<Violation> {
    let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (i, lesson) in plan.iter().enumerate() {
        by_date.entry(lesson.date).or_default().push(i);
    }
    by_date
        .into_iter()
        .flat_map(|(date, lessons)| validate_day(plan, date, &lessons, ctx))
        .collect()
}

#[inline]
pub fn is_feasible(plan: &[LessonInstance], ctx: &Context) -> bool {
    validate(plan, ctx).is_empty()
}

/// Violations among the lessons held on `date`.
pub fn validate_date(plan: &[LessonInstance], date: NaiveDate, ctx: &Context) -> Vec<Violation> {
    let lessons: Vec<usize> = plan
        .iter()
        .enumerate()
        .filter(|(_, lesson)| lesson.date == date)
        .map(|(i, _)| i)
        .collect();
    validate_day(plan, date, &lessons, ctx)
}

/// Splits slots (sorted by start) into runs where each lesson starts at most
/// `max_gap` minutes after the run's latest end.
pub fn chain_runs(slots: &[TimeSlot], max_gap: Minute) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let Some(first) = slots.first() else {
        return runs;
    };
    let mut start = 0;
    let mut run_end = first.end;
    for (i, slot) in slots.iter().enumerate().skip(1) {
        if slot.start <= run_end + max_gap {
            run_end = run_end.max(slot.end);
        } else {
            runs.push(start..i);
            start = i;
            run_end = slot.end;
        }
    }
    runs.push(start..slots.len());
    runs
}

pub fn longest_chain(slots: &[TimeSlot], max_gap: Minute) -> usize {
    chain_runs(slots, max_gap)
        .into_iter()
        .map(|run| run.len())
        .max()
        .unwrap_or(0)
}

fn validate_day(
    plan: &[LessonInstance],
    date: NaiveDate,
    lessons: &[usize],
    ctx: &Context,
) -> Vec<Violation> {
    let config = ctx.config;
    let mut out = Vec::new();

    for &i in lessons {
        let lesson = &plan[i];
        let slot = lesson.slot();
        if config.is_holiday(date) {
            out.push(Violation::new(ViolationKind::Holiday { date }, vec![i]));
        }
        if ctx.is_absent(lesson.teacher_id, date) {
            out.push(Violation::new(
                ViolationKind::TeacherAbsent {
                    teacher_id: lesson.teacher_id,
                    date,
                },
                vec![i],
            ));
        }
        if config.overlaps_lunch(slot) {
            out.push(Violation::new(
                ViolationKind::LunchOverlap {
                    group_id: lesson.group_id,
                    date,
                    lesson: slot,
                },
                vec![i],
            ));
        }
        if let Some(room_id) = lesson.room_id {
            let capacity = ctx.room(room_id).map(|r| r.capacity).or(lesson.room_capacity);
            let group_size = lesson.group_size.unwrap_or(0);
            if let Some(capacity) = capacity.filter(|c| *c < group_size) {
                out.push(Violation::new(
                    ViolationKind::RoomCapacity {
                        room_id,
                        date,
                        capacity,
                        group_size,
                    },
                    vec![i],
                ));
            }
        }
        for booking in ctx
            .bookings
            .iter()
            .filter(|b| b.date == date && b.slot().overlaps(&slot))
        {
            for resource in lesson.resources() {
                if booking.resources().any(|r| r == resource) {
                    out.push(Violation::new(
                        ViolationKind::BookingConflict {
                            resource,
                            date,
                            lesson: slot,
                            booking: booking.slot(),
                        },
                        vec![i],
                    ));
                }
            }
        }
    }

    let mut by_resource: BTreeMap<Resource, Vec<usize>> = BTreeMap::new();
    for &i in lessons {
        for resource in plan[i].resources() {
            by_resource.entry(resource).or_default().push(i);
        }
    }

    for (resource, mut list) in by_resource {
        list.sort_by_key(|&i| (plan[i].start_time, plan[i].end_time, i));
        check_overlaps(plan, resource, date, &list, &mut out);
        if matches!(resource, Resource::Room(_)) {
            continue;
        }

        if let Some(max) = config.max_lessons_per_day {
            if list.len() > max as usize {
                out.push(Violation::new(
                    ViolationKind::DailyLimit {
                        resource,
                        date,
                        count: list.len(),
                        max,
                    },
                    list.clone(),
                ));
            }
        }

        let slots: Vec<TimeSlot> = list.iter().map(|&i| plan[i].slot()).collect();
        for run in chain_runs(&slots, config.min_break_minutes) {
            if run.len() > config.max_consecutive as usize {
                out.push(Violation::new(
                    ViolationKind::ConsecutiveChain {
                        resource,
                        date,
                        length: run.len(),
                        max: config.max_consecutive,
                    },
                    list[run].to_vec(),
                ));
            }
        }

        for pair in list.windows(2) {
            let (a, b) = (&plan[pair[0]], &plan[pair[1]]);
            let (Some(from), Some(to)) = (ctx.building(a.room_id), ctx.building(b.room_id)) else {
                continue;
            };
            let gap = b.start_time.saturating_sub(a.end_time);
            if from != to && gap < config.min_break_minutes {
                out.push(Violation::new(
                    ViolationKind::TransitionBuffer {
                        resource,
                        date,
                        from_building: from.to_string(),
                        to_building: to.to_string(),
                        gap,
                        min_gap: config.min_break_minutes,
                    },
                    pair.to_vec(),
                ));
            }
        }
    }

    out
}

fn check_overlaps(
    plan: &[LessonInstance],
    resource: Resource,
    date: NaiveDate,
    sorted: &[usize],
    out: &mut Vec<Violation>,
) {
    for (pos, &a) in sorted.iter().enumerate() {
        for &b in &sorted[pos + 1..] {
            let (first, second) = (plan[a].slot(), plan[b].slot());
            if second.start >= first.end {
                break;
            }
            let kind = match resource {
                Resource::Teacher(teacher_id) => ViolationKind::TeacherOverlap {
                    teacher_id,
                    date,
                    first,
                    second,
                },
                Resource::Group(group_id) => ViolationKind::GroupOverlap {
                    group_id,
                    date,
                    first,
                    second,
                },
                Resource::Room(room_id) => ViolationKind::RoomOverlap {
                    room_id,
                    date,
                    first,
                    second,
                },
            };
            out.push(Violation::new(kind, vec![a, b]));
        }
    }
}

/// Violations of one date not involving a set of lessons, captured before
/// those lessons are moved within that date.
///
/// A move is clean when, afterwards, no violation on the date involves the
/// moved lessons and no other violation appeared.
#[derive(Debug, Clone)]
pub struct MoveCheck {
    date: NaiveDate,
    lessons: Vec<usize>,
    background: usize,
}

impl MoveCheck {
    pub fn new(
        plan: &[LessonInstance],
        date: NaiveDate,
        lessons: Vec<usize>,
        ctx: &Context,
    ) -> Self {
        let background = validate_date(plan, date, ctx)
            .iter()
            .filter(|v| !lessons.iter().any(|&l| v.involves(l)))
            .count();
        Self {
            date,
            lessons,
            background,
        }
    }

    pub fn accepts(&self, plan: &[LessonInstance], ctx: &Context) -> bool {
        let violations = validate_date(plan, self.date, ctx);
        let touching = violations
            .iter()
            .filter(|v| self.lessons.iter().any(|&l| v.involves(l)))
            .count();
        touching == 0 && violations.len() <= self.background
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Absence, ExistingBooking};
    use crate::solver::testkit::*;

    #[test]
    fn test_clean_plan_is_feasible() {
        let fx = Fixture::new();
        let plan = vec![
            lesson(1, 1, 2, (9, 0), (9, 45), Some(1)),
            lesson(1, 2, 2, (9, 55), (10, 40), Some(1)),
            lesson(2, 1, 2, (9, 55), (10, 40), Some(2)),
        ];
        assert!(validate(&plan, &fx.ctx()).is_empty());
    }

    #[test]
    fn test_teacher_overlap_reported_once() {
        let fx = Fixture::new();
        let plan = vec![
            lesson(1, 7, 2, (9, 0), (9, 45), None),
            lesson(2, 7, 2, (9, 0), (9, 45), None),
        ];
        let violations = validate(&plan, &fx.ctx());
        assert_eq!(violations.len(), 1);
        assert!(matches!(
            violations[0].kind,
            ViolationKind::TeacherOverlap { teacher_id: 7, .. }
        ));
        assert_eq!(violations[0].lessons, vec![0, 1]);
    }

    #[test]
    fn test_room_and_group_overlap() {
        let fx = Fixture::new();
        let plan = vec![
            lesson(1, 1, 2, (9, 0), (9, 45), Some(1)),
            lesson(1, 2, 2, (9, 30), (10, 15), Some(1)),
        ];
        let violations = validate(&plan, &fx.ctx());
        assert!(violations.iter().any(|v| matches!(v.kind, ViolationKind::GroupOverlap { .. })));
        assert!(
            violations
                .iter()
                .any(|v| matches!(v.kind, ViolationKind::RoomOverlap { room_id: 1, .. }))
        );
    }

    #[test]
    fn test_capacity_absence_holiday_lunch() {
        let mut fx = Fixture::new();
        fx.config.holidays = vec![day(3)];
        fx.config.lunch = Some(TimeSlot::new(12 * 60, 13 * 60));
        fx.absences.push(Absence {
            teacher_id: 5,
            start_date: day(2),
            end_date: day(2),
        });
        let mut big = lesson(1, 1, 2, (9, 0), (9, 45), Some(3));
        big.group_size = Some(100);
        let plan = vec![
            big,
            lesson(2, 5, 2, (9, 0), (9, 45), None),
            lesson(3, 3, 3, (9, 0), (9, 45), None),
            lesson(4, 4, 2, (12, 0), (12, 45), None),
        ];
        let kinds: Vec<_> = validate(&plan, &fx.ctx()).into_iter().map(|v| v.kind).collect();
        assert!(
            kinds
                .iter()
                .any(|k| matches!(k, ViolationKind::RoomCapacity { group_size: 100, .. }))
        );
        assert!(
            kinds
                .iter()
                .any(|k| matches!(k, ViolationKind::TeacherAbsent { teacher_id: 5, .. }))
        );
        assert!(kinds.iter().any(|k| matches!(k, ViolationKind::Holiday { .. })));
        assert!(kinds.iter().any(|k| matches!(k, ViolationKind::LunchOverlap { group_id: 4, .. })));
        assert_eq!(kinds.len(), 4);
    }

    #[test]
    fn test_booking_conflict() {
        let mut fx = Fixture::new();
        fx.bookings.push(ExistingBooking {
            date: day(2),
            start_time: 9 * 60 + 30,
            end_time: 10 * 60 + 30,
            teacher_id: None,
            group_id: None,
            room_id: Some(2),
        });
        let plan = vec![lesson(1, 1, 2, (9, 0), (9, 45), Some(2))];
        let violations = validate(&plan, &fx.ctx());
        assert_eq!(violations.len(), 1);
        assert!(matches!(
            violations[0].kind,
            ViolationKind::BookingConflict {
                resource: Resource::Room(2),
                ..
            }
        ));
    }

    #[test]
    fn test_daily_limit_and_chain() {
        let mut fx = Fixture::new();
        fx.config.max_lessons_per_day = Some(2);
        fx.config.max_consecutive = 2;
        let plan = vec![
            lesson(1, 1, 2, (9, 0), (9, 45), None),
            lesson(1, 2, 2, (9, 55), (10, 40), None),
            lesson(1, 3, 2, (10, 50), (11, 35), None),
        ];
        let violations = validate(&plan, &fx.ctx());
        assert!(violations.iter().any(|v| matches!(
            v.kind,
            ViolationKind::DailyLimit {
                resource: Resource::Group(1),
                count: 3,
                ..
            }
        )));
        assert!(violations.iter().any(|v| matches!(
            v.kind,
            ViolationKind::ConsecutiveChain {
                resource: Resource::Group(1),
                length: 3,
                ..
            }
        )));
    }

    #[test]
    fn test_building_change_needs_buffer() {
        let mut fx = Fixture::new();
        fx.config.min_break_minutes = 15;
        // room 1 in building A, room 4 in building B
        let plan = vec![
            lesson(1, 1, 2, (9, 0), (9, 45), Some(1)),
            lesson(1, 2, 2, (9, 55), (10, 40), Some(4)),
        ];
        let violations = validate(&plan, &fx.ctx());
        assert!(violations.iter().any(|v| matches!(
            &v.kind,
            ViolationKind::TransitionBuffer { gap: 10, min_gap: 15, .. }
        )));
    }

    #[test]
    fn test_chain_runs_split_on_long_gap() {
        let slots = [
            TimeSlot::new(540, 585),
            TimeSlot::new(595, 640),
            TimeSlot::new(700, 745),
        ];
        assert_eq!(chain_runs(&slots, 10), vec![0..2, 2..3]);
        assert_eq!(longest_chain(&slots, 60), 3);
        assert_eq!(longest_chain(&[], 10), 0);
    }

    #[test]
    fn test_move_check_detects_new_conflict() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let mut plan = vec![
            lesson(1, 1, 2, (9, 0), (9, 45), None),
            lesson(1, 2, 2, (10, 50), (11, 35), None),
        ];
        let check = MoveCheck::new(&plan, day(2), vec![1], &ctx);
        plan[1].set_slot(TimeSlot::new(540, 585));
        assert!(!check.accepts(&plan, &ctx));
        plan[1].set_slot(TimeSlot::new(595, 640));
        assert!(check.accepts(&plan, &ctx));
    }

    #[test]
    fn test_violation_json_is_tagged() {
        let violation = Violation::new(ViolationKind::Holiday { date: day(2) }, vec![0]);
        let json = serde_json::to_value(&violation).unwrap();
        assert_eq!(json["kind"], "holiday");
        assert_eq!(json["date"], "2024-09-02");
        assert_eq!(json["lessons"][0], 0);
    }
}
