//! One-shot greedy repair of the seed plan.
//!
//! Offending lessons are visited in plan order. Each first tries another room
//! at the same time, then every slot of the same date with any fitting room.
//! Dates never change and lessons are never dropped; a lesson without a clean
//! position is left in place and reported.

use log::{debug, warn};
use std::collections::BTreeSet;

use crate::data::{LessonInstance, Room};
use crate::solver::Context;
use crate::solver::grid::TimeSlotGrid;
use crate::solver::rooms::ranked_rooms;
use crate::solver::validator::{MoveCheck, validate, validate_date};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairOutcome {
    pub repaired: usize,
    /// Plan indices of lessons still violating after repair.
    pub unrepaired: Vec<usize>,
}

pub fn repair(plan: &mut [LessonInstance], ctx: &Context, grid: &TimeSlotGrid) -> RepairOutcome {
    let offenders: BTreeSet<usize> = validate(plan, ctx)
        .into_iter()
        .flat_map(|v| v.lessons)
        .collect();
    let mut outcome = RepairOutcome::default();

    for idx in offenders {
        let still_offending = validate_date(plan, plan[idx].date, ctx)
            .iter()
            .any(|v| v.involves(idx));
        if !still_offending {
            continue;
        }
        if relocate(plan, idx, ctx, grid) {
            outcome.repaired += 1;
        } else {
            warn!(
                "Could not repair {} for group {} on {} at {}",
                plan[idx].subject,
                plan[idx].group_id,
                plan[idx].date,
                plan[idx].slot()
            );
            outcome.unrepaired.push(idx);
        }
    }

    debug!(
        "Repair fixed {} lessons, {} left",
        outcome.repaired,
        outcome.unrepaired.len()
    );
    outcome
}

/// Room candidates for a lesson in preference order; a single `None` when the
/// run has no room inventory.
fn room_candidates<'a>(ctx: &Context<'a>, lesson: &LessonInstance) -> Vec<Option<&'a Room>> {
    if ctx.rooms.is_empty() {
        return vec![None];
    }
    let group_size = lesson.group_size.unwrap_or(0);
    ranked_rooms(ctx.rooms, group_size, ctx.room_types_for(lesson))
        .into_iter()
        .map(Some)
        .collect()
}

fn relocate(plan: &mut [LessonInstance], idx: usize, ctx: &Context, grid: &TimeSlotGrid) -> bool {
    let original = plan[idx].clone();
    let check = MoveCheck::new(plan, original.date, vec![idx], ctx);
    let rooms = room_candidates(ctx, &original);

    for room in rooms.iter().filter(|r| r.map(|r| r.id) != original.room_id) {
        plan[idx].assign_room(*room);
        if check.accepts(plan, ctx) {
            return true;
        }
    }

    for &slot in grid.slots(original.date) {
        plan[idx].set_slot(slot);
        for room in &rooms {
            plan[idx].assign_room(*room);
            if check.accepts(plan, ctx) {
                return true;
            }
        }
    }

    plan[idx] = original;
    false
}
