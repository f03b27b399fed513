//! Greedy seed construction.
//!
//! Each demand is spread over a rotating subset of weekdays and placed slot
//! by slot into the first positions that pass the basic conflict checks.
//! An [`Occupancy`] value owned by the pass tracks what is already taken.
//! Two deterministic sub-passes follow: day redistribution and per-day
//! compaction.

use chrono::{Datelike, IsoWeek, NaiveDate, Weekday};
use log::{debug, trace};
use std::collections::{BTreeMap, HashMap};

use crate::data::{Demand, GroupId, LessonInstance, Resource, Room, TimeSlot, UnderFill};
use crate::solver::Context;
use crate::solver::grid::{TimeSlotGrid, weeks_in_range};
use crate::solver::occupancy::Occupancy;
use crate::solver::rooms::pick_room;
use crate::solver::validator::longest_chain;

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// The seed plan and how far it fell short of the demand.
#[derive(Debug, Clone)]
pub struct Draft {
    pub lessons: Vec<LessonInstance>,
    pub under_fill: Vec<UnderFill>,
}

/// Where a lesson can go at a candidate slot.
#[derive(Debug, Clone, Copy)]
enum RoomChoice<'a> {
    /// The run has no room inventory; lessons stay unroomed.
    NoInventory,
    Room(&'a Room),
}

impl<'a> RoomChoice<'a> {
    fn room(self) -> Option<&'a Room> {
        match self {
            RoomChoice::NoInventory => None,
            RoomChoice::Room(room) => Some(room),
        }
    }
}

/// Picks `min(weekly, len)` weekdays spread across `candidates`, starting at
/// the rotating `pointer` so consecutive demands favour different days.
pub fn spread_days(candidates: &[Weekday], weekly: u32, pointer: usize) -> Vec<Weekday> {
    let n = candidates.len();
    if n == 0 || weekly == 0 {
        return Vec::new();
    }
    let k = (weekly as usize).min(n);
    let mut picked: Vec<usize> = (0..k).map(|i| (pointer + i * n / k) % n).collect();
    picked.sort_unstable();
    picked.dedup();
    picked.into_iter().map(|i| candidates[i]).collect()
}

pub fn build_draft(ctx: &Context, grid: &TimeSlotGrid, demands: &[Demand]) -> Draft {
    let config = ctx.config;
    let mut occupancy = Occupancy::seeded(ctx.bookings);
    let mut lessons: Vec<LessonInstance> = Vec::new();
    let weeks = weeks_in_range(config.start_date, config.end_date);
    let working_days: Vec<Weekday> = ALL_DAYS
        .into_iter()
        .filter(|d| !config.exclude_weekends || !matches!(d, Weekday::Sat | Weekday::Sun))
        .collect();

    let mut expected: BTreeMap<GroupId, u32> = BTreeMap::new();
    let mut placed: BTreeMap<GroupId, u32> = BTreeMap::new();
    let mut pointer = 0usize;

    for demand in demands {
        let weekly = demand.weekly_lesson_count;
        if weekly == 0 {
            continue;
        }
        let required = weekly.saturating_mul(weeks);
        let group_expected = expected.entry(demand.group_id).or_default();
        *group_expected = group_expected.saturating_add(required);

        let candidates: Vec<Weekday> = match config.restriction_for(&demand.subject) {
            Some(r) if !r.preferred_days.is_empty() => working_days
                .iter()
                .copied()
                .filter(|d| r.preferred_days.contains(d))
                .collect(),
            _ => working_days.clone(),
        };
        let days = spread_days(&candidates, weekly, pointer);
        pointer += 1;
        if days.is_empty() {
            debug!(
                "No eligible weekday for subject '{}' of group {}",
                demand.subject, demand.group_id
            );
            continue;
        }
        let per_day = weekly.div_ceil(days.len() as u32);
        let preferred_types = config.demand_room_types(demand);

        let mut count = 0u32;
        let mut per_week: HashMap<IsoWeek, u32> = HashMap::new();
        for date in grid.dates() {
            if count >= required {
                break;
            }
            if config.is_holiday(date) || !days.contains(&date.weekday()) {
                continue;
            }
            let week = per_week.entry(date.iso_week()).or_default();
            let slots = grid.slots(date);
            let mut today = 0u32;
            for position in 0..slots.len() {
                if today >= per_day || *week >= weekly || count >= required {
                    break;
                }
                let prototype = LessonInstance::for_demand(demand, date, slots[position]);
                let Some(choice) =
                    place_at(ctx, &occupancy, &prototype, slots, position, preferred_types)
                else {
                    continue;
                };
                let mut lesson = prototype;
                lesson.assign_room(choice.room());
                occupancy.reserve_lesson(&lesson);
                trace!(
                    "Placed {} for group {} on {} at {}",
                    lesson.subject,
                    lesson.group_id,
                    date,
                    lesson.slot()
                );
                lessons.push(lesson);
                today += 1;
                *week += 1;
                count += 1;
            }
        }
        let group_placed = placed.entry(demand.group_id).or_default();
        *group_placed = group_placed.saturating_add(count);
    }

    let moved = redistribute_days(ctx, grid, &mut lessons, &mut occupancy);
    let compacted = compact_days(ctx, grid, &mut lessons, &mut occupancy);
    debug!(
        "Draft placed {} lessons; redistributed {}, compacted {}",
        lessons.len(),
        moved,
        compacted
    );

    let under_fill = expected
        .into_iter()
        .filter_map(|(group_id, expected)| {
            let placed = placed.get(&group_id).copied().unwrap_or(0);
            (placed < expected).then_some(UnderFill {
                group_id,
                expected,
                placed,
            })
        })
        .collect();

    Draft {
        lessons,
        under_fill,
    }
}

/// Checks whether `lesson` (not reserved in `occupancy`) can take
/// `slots[position]` on its date, returning the room it would get.
fn place_at<'a>(
    ctx: &Context<'a>,
    occupancy: &Occupancy,
    lesson: &LessonInstance,
    slots: &[TimeSlot],
    position: usize,
    preferred_types: &[String],
) -> Option<RoomChoice<'a>> {
    let config = ctx.config;
    let date = lesson.date;
    let slot = slots[position];
    let teacher = Resource::Teacher(lesson.teacher_id);
    let group = Resource::Group(lesson.group_id);

    if config.is_holiday(date) || ctx.is_absent(lesson.teacher_id, date) {
        return None;
    }
    if !occupancy.is_free(teacher, date, slot) || !occupancy.is_free(group, date, slot) {
        return None;
    }
    if config.overlaps_lunch(slot) {
        return None;
    }
    if let Some(restriction) = config.restriction_for(&lesson.subject) {
        if !restriction.preferred_days.is_empty()
            && !restriction.preferred_days.contains(&date.weekday())
        {
            return None;
        }
        if restriction.no_first_lesson && position == 0 {
            return None;
        }
        if restriction.no_last_lesson && position + 1 == slots.len() {
            return None;
        }
    }
    for resource in [teacher, group] {
        let day = occupancy.day(resource, date);
        if let Some(max) = config.max_lessons_per_day {
            if day.len() >= max as usize {
                return None;
            }
        }
        let mut with_candidate: Vec<TimeSlot> = day.to_vec();
        with_candidate.push(slot);
        with_candidate.sort();
        if longest_chain(&with_candidate, config.break_duration) > config.max_consecutive as usize {
            return None;
        }
    }

    if ctx.rooms.is_empty() {
        return Some(RoomChoice::NoInventory);
    }
    let group_size = lesson.group_size.unwrap_or(0);
    pick_room(ctx.rooms, occupancy, date, slot, group_size, preferred_types).map(RoomChoice::Room)
}

/// Moves lessons off days where a group has several lessons onto days of the
/// same week where it has none, when that is conflict-free.
fn redistribute_days(
    ctx: &Context,
    grid: &TimeSlotGrid,
    lessons: &mut [LessonInstance],
    occupancy: &mut Occupancy,
) -> usize {
    let config = ctx.config;
    let mut week_dates: BTreeMap<IsoWeek, Vec<NaiveDate>> = BTreeMap::new();
    for date in grid.dates().filter(|d| !config.is_holiday(*d)) {
        week_dates.entry(date.iso_week()).or_default().push(date);
    }

    let mut by_group_week: BTreeMap<(GroupId, IsoWeek), BTreeMap<NaiveDate, Vec<usize>>> =
        BTreeMap::new();
    for (i, lesson) in lessons.iter().enumerate() {
        by_group_week
            .entry((lesson.group_id, lesson.date.iso_week()))
            .or_default()
            .entry(lesson.date)
            .or_default()
            .push(i);
    }

    let mut moved = 0;
    for ((_, week), mut by_date) in by_group_week {
        let mut empty_days: Vec<NaiveDate> = week_dates
            .get(&week)
            .map(|dates| {
                dates
                    .iter()
                    .copied()
                    .filter(|d| !by_date.contains_key(d))
                    .collect()
            })
            .unwrap_or_default();
        let busy_days: Vec<NaiveDate> = by_date.keys().copied().collect();

        for busy in busy_days {
            loop {
                let Some(day_lessons) = by_date.get_mut(&busy) else {
                    break;
                };
                if day_lessons.len() < 2 || empty_days.is_empty() {
                    break;
                }
                day_lessons.sort_by_key(|&i| lessons[i].start_time);
                let Some(idx) = day_lessons.pop() else {
                    break;
                };

                occupancy.release_lesson(&lessons[idx]);
                match relocate_to_any_day(ctx, grid, occupancy, &lessons[idx], &empty_days) {
                    Some(relocated) => {
                        occupancy.reserve_lesson(&relocated);
                        let target = relocated.date;
                        lessons[idx] = relocated;
                        empty_days.retain(|d| *d != target);
                        by_date.insert(target, vec![idx]);
                        moved += 1;
                    }
                    None => {
                        occupancy.reserve_lesson(&lessons[idx]);
                        by_date.entry(busy).or_default().push(idx);
                        break;
                    }
                }
            }
        }
    }
    moved
}

fn relocate_to_any_day(
    ctx: &Context,
    grid: &TimeSlotGrid,
    occupancy: &Occupancy,
    lesson: &LessonInstance,
    days: &[NaiveDate],
) -> Option<LessonInstance> {
    let preferred_types = ctx.room_types_for(lesson);
    for &date in days {
        let slots = grid.slots(date);
        for position in 0..slots.len() {
            let mut candidate = lesson.clone();
            candidate.date = date;
            candidate.set_slot(slots[position]);
            if let Some(choice) =
                place_at(ctx, occupancy, &candidate, slots, position, preferred_types)
            {
                candidate.assign_room(choice.room());
                return Some(candidate);
            }
        }
    }
    None
}

/// Within each group-day, pulls lessons into the earliest free slots while
/// keeping their order. The room is re-picked whenever the slot changes.
fn compact_days(
    ctx: &Context,
    grid: &TimeSlotGrid,
    lessons: &mut [LessonInstance],
    occupancy: &mut Occupancy,
) -> usize {
    let mut by_group_day: BTreeMap<(GroupId, NaiveDate), Vec<usize>> = BTreeMap::new();
    for (i, lesson) in lessons.iter().enumerate() {
        by_group_day
            .entry((lesson.group_id, lesson.date))
            .or_default()
            .push(i);
    }

    let mut changed = 0;
    for ((_, date), mut indices) in by_group_day {
        indices.sort_by_key(|&i| lessons[i].start_time);
        let slots = grid.slots(date);
        let mut cursor = 0usize;
        for idx in indices {
            let current = lessons[idx].slot();
            let preferred_types = ctx.room_types_for(&lessons[idx]);
            occupancy.release_lesson(&lessons[idx]);

            let mut chosen: Option<(usize, LessonInstance)> = None;
            for position in cursor..slots.len() {
                let slot = slots[position];
                if slot.start >= current.start {
                    break;
                }
                let mut candidate = lessons[idx].clone();
                candidate.set_slot(slot);
                if let Some(choice) =
                    place_at(ctx, occupancy, &candidate, slots, position, preferred_types)
                {
                    candidate.assign_room(choice.room());
                    chosen = Some((position, candidate));
                    break;
                }
            }

            match chosen {
                Some((position, candidate)) => {
                    lessons[idx] = candidate;
                    cursor = position + 1;
                    changed += 1;
                }
                None => {
                    cursor = slots
                        .iter()
                        .position(|s| s.start >= current.end)
                        .unwrap_or(slots.len());
                }
            }
            occupancy.reserve_lesson(&lessons[idx]);
        }
    }
    changed
}
