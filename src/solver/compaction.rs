//! Deterministic post-processing of the optimized plan.
//!
//! Both passes work on a copy and hand it back only when the whole copy
//! still validates clean; otherwise the pass is discarded.

use chrono::NaiveDate;
use log::debug;
use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::data::{GroupId, LessonInstance, TimeSlot};
use crate::solver::Context;
use crate::solver::grid::TimeSlotGrid;
use crate::solver::rooms::ranked_rooms;
use crate::solver::validator::{MoveCheck, is_feasible};

fn group_days(plan: &[LessonInstance]) -> BTreeMap<(GroupId, NaiveDate), Vec<usize>> {
    let mut days: BTreeMap<(GroupId, NaiveDate), Vec<usize>> = BTreeMap::new();
    for (i, lesson) in plan.iter().enumerate() {
        days.entry((lesson.group_id, lesson.date)).or_default().push(i);
    }
    days
}

fn sorted_by_start(plan: &[LessonInstance], lessons: &[usize]) -> Vec<usize> {
    let mut sorted = lessons.to_vec();
    sorted.sort_by_key(|&i| (plan[i].start_time, plan[i].end_time, i));
    sorted
}

/// Number of windows among `lessons`, which share one group and date.
fn windows_among(plan: &[LessonInstance], lessons: &[usize], config: &EngineConfig) -> usize {
    sorted_by_start(plan, lessons)
        .windows(2)
        .filter(|pair| {
            let gap = plan[pair[1]].start_time.saturating_sub(plan[pair[0]].end_time);
            config.is_window(gap)
        })
        .count()
}

/// Moves lesson `idx` to `slot`, keeping its room when possible and otherwise
/// trying the other fitting rooms. Restores the lesson when nothing is accepted.
fn try_place<F>(
    plan: &mut [LessonInstance],
    idx: usize,
    slot: TimeSlot,
    ctx: &Context,
    accept: F,
) -> bool
where
    F: Fn(&[LessonInstance]) -> bool,
{
    let original = plan[idx].clone();
    plan[idx].set_slot(slot);
    if accept(plan) {
        return true;
    }
    if !ctx.rooms.is_empty() {
        let group_size = original.group_size.unwrap_or(0);
        let rooms = ranked_rooms(ctx.rooms, group_size, ctx.room_types_for(&original));
        for room in rooms.into_iter().filter(|r| Some(r.id) != original.room_id) {
            plan[idx].assign_room(Some(room));
            if accept(plan) {
                return true;
            }
        }
    }
    plan[idx] = original;
    false
}

/// Per group-day, pulls each lesson into the earliest clean slot at or after
/// the end of the previous one.
pub fn compact(
    plan: &[LessonInstance],
    ctx: &Context,
    grid: &TimeSlotGrid,
) -> Option<Vec<LessonInstance>> {
    let mut work = plan.to_vec();
    let mut moved = 0;

    for ((_, date), lessons) in group_days(plan) {
        let slots = grid.slots(date);
        let mut floor = 0;
        for idx in sorted_by_start(&work, &lessons) {
            let current_start = work[idx].start_time;
            let check = MoveCheck::new(&work, date, vec![idx], ctx);
            for &slot in slots
                .iter()
                .filter(|s| s.start >= floor && s.start < current_start)
            {
                if try_place(&mut work, idx, slot, ctx, |p| check.accepts(p, ctx)) {
                    moved += 1;
                    break;
                }
            }
            floor = work[idx].end_time;
        }
    }

    if is_feasible(&work, ctx) {
        debug!("Compaction moved {moved} lessons");
        Some(work)
    } else {
        debug!("Compaction discarded: result does not validate");
        None
    }
}

/// Per group-day with at least three lessons, closes windows by relocating the
/// lesson after a gap, or by swapping it with its predecessor.
pub fn minimize_windows(
    plan: &[LessonInstance],
    ctx: &Context,
    grid: &TimeSlotGrid,
) -> Option<Vec<LessonInstance>> {
    let config = ctx.config;
    let mut work = plan.to_vec();
    let mut closed = 0;

    for ((_, date), lessons) in group_days(plan) {
        if lessons.len() < 3 {
            continue;
        }
        let slots = grid.slots(date);
        loop {
            let before = windows_among(&work, &lessons, config);
            if before == 0 {
                break;
            }
            let sorted = sorted_by_start(&work, &lessons);
            let accept = |p: &[LessonInstance], check: &MoveCheck| {
                check.accepts(p, ctx) && windows_among(p, &lessons, config) < before
            };

            let mut improved = false;
            for k in 1..sorted.len() {
                let (prev, cur) = (sorted[k - 1], sorted[k]);
                let prev_slot = work[prev].slot();
                let cur_slot = work[cur].slot();
                if !config.is_window(cur_slot.start.saturating_sub(prev_slot.end)) {
                    continue;
                }

                // pull the lesson back against its predecessor
                let check = MoveCheck::new(&work, date, vec![cur], ctx);
                if let Some(&slot) = slots
                    .iter()
                    .find(|s| s.start >= prev_slot.end && s.start < cur_slot.start)
                {
                    if try_place(&mut work, cur, slot, ctx, |p| accept(p, &check)) {
                        improved = true;
                        break;
                    }
                }

                // a trailing lesson may also go before the first one
                if k + 1 == sorted.len() {
                    let first_start = work[sorted[0]].start_time;
                    if let Some(&slot) = slots.iter().rev().find(|s| s.end <= first_start) {
                        if try_place(&mut work, cur, slot, ctx, |p| accept(p, &check)) {
                            improved = true;
                            break;
                        }
                    }
                }

                // swap with the predecessor: it takes the slot after the one it leaves
                if let Some(&next) = slots.iter().find(|s| s.start >= prev_slot.end) {
                    let pair_check = MoveCheck::new(&work, date, vec![prev, cur], ctx);
                    let (saved_prev, saved_cur) = (work[prev].clone(), work[cur].clone());
                    work[cur].set_slot(prev_slot);
                    work[prev].set_slot(next);
                    if accept(&work, &pair_check) {
                        improved = true;
                        break;
                    }
                    work[prev] = saved_prev;
                    work[cur] = saved_cur;
                }
            }

            if !improved {
                break;
            }
            closed += 1;
        }
    }

    if is_feasible(&work, ctx) {
        debug!("Window minimization closed {closed} windows");
        Some(work)
    } else {
        debug!("Window minimization discarded: result does not validate");
        None
    }
}
