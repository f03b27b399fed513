//! The timetable engine.
//!
//! A run goes draft, repair, local search, compaction, window minimization
//! and finally aggregation into recurring templates. Everything works on an
//! in-memory snapshot borrowed from the [`GenerationRequest`].

pub mod aggregate;
pub mod compaction;
pub mod draft;
pub mod grid;
pub mod occupancy;
pub mod repair;
pub mod rooms;
pub mod scorer;
pub mod search;
pub mod validator;

#[cfg(test)]
pub(crate) mod testkit;

use chrono::NaiveDate;
use itertools::Itertools;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::data::{
    Absence, Diagnostics, ExistingBooking, GenerationRequest, GenerationResult, LessonInstance,
    Room, RoomId, TeacherId,
};
use crate::error::{ConfigError, EngineError};
use aggregate::{Aggregation, aggregate};
use compaction::{compact, minimize_windows};
use draft::{Draft, build_draft};
use grid::TimeSlotGrid;
use repair::repair;
use scorer::{NoPreferences, PreferenceTerm, Scorer, confidence};
use search::{RandomMoves, SearchLimits, optimize};
use validator::validate;

/// Read-only snapshot shared by every stage of one run.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    pub config: &'a EngineConfig,
    pub rooms: &'a [Room],
    pub bookings: &'a [ExistingBooking],
    pub absences: &'a [Absence],
    room_index: HashMap<RoomId, usize>,
}

impl<'a> Context<'a> {
    pub fn new(
        config: &'a EngineConfig,
        rooms: &'a [Room],
        bookings: &'a [ExistingBooking],
        absences: &'a [Absence],
    ) -> Self {
        let room_index = rooms.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
        Self {
            config,
            rooms,
            bookings,
            absences,
            room_index,
        }
    }

    pub fn from_request(request: &'a GenerationRequest) -> Self {
        Self::new(
            &request.config,
            &request.rooms,
            &request.bookings,
            &request.absences,
        )
    }

    pub fn room(&self, id: RoomId) -> Option<&'a Room> {
        let rooms: &'a [Room] = self.rooms;
        self.room_index.get(&id).and_then(|&i| rooms.get(i))
    }

    /// Building of an assigned room. `None` for unroomed lessons, unknown
    /// rooms and rooms without a building.
    pub fn building(&self, room: Option<RoomId>) -> Option<&'a str> {
        self.room(room?)
            .map(|r| r.building.as_str())
            .filter(|b| !b.is_empty())
    }

    pub fn is_absent(&self, teacher: TeacherId, date: NaiveDate) -> bool {
        self.absences
            .iter()
            .any(|a| a.teacher_id == teacher && a.covers(date))
    }

    pub fn room_types_for(&self, lesson: &LessonInstance) -> &'a [String] {
        let config: &'a EngineConfig = self.config;
        config.preferred_room_types(&lesson.subject, lesson.category.as_deref())
    }
}

/// Runs the whole pipeline with default preferences and no cancellation.
pub fn solve(request: &GenerationRequest) -> Result<GenerationResult, EngineError> {
    solve_with(request, &NoPreferences, None)
}

/// Like [`solve`], stopping the local search early once `cancel` is set.
pub fn solve_with_cancel(
    request: &GenerationRequest,
    cancel: Option<&AtomicBool>,
) -> Result<GenerationResult, EngineError> {
    solve_with(request, &NoPreferences, cancel)
}

pub fn solve_with(
    request: &GenerationRequest,
    preferences: &dyn PreferenceTerm,
    cancel: Option<&AtomicBool>,
) -> Result<GenerationResult, EngineError> {
    let started = Instant::now();
    let config = &request.config;

    config.validate()?;
    if let Some(id) = request.rooms.iter().map(|r| r.id).duplicates().next() {
        return Err(ConfigError::DuplicateRoom(id).into());
    }
    let grid = TimeSlotGrid::build(config);
    if grid.is_empty() {
        return Err(ConfigError::NoWorkingDays.into());
    }

    info!(
        "Generating timetable for {} demands over {} days ({} to {}) with {} rooms, {} bookings \
         and {} absences",
        request.demands.len(),
        grid.len(),
        config.start_date,
        config.end_date,
        request.rooms.len(),
        request.bookings.len(),
        request.absences.len()
    );
    let ctx = Context::from_request(request);

    let Draft {
        lessons: mut plan,
        under_fill,
    } = build_draft(&ctx, &grid, &request.demands);
    info!(
        "Draft placed {} lessons, {} groups under-filled",
        plan.len(),
        under_fill.len()
    );

    let mut unrepaired = Vec::new();
    let seed_violations = validate(&plan, &ctx).len();
    if seed_violations > 0 {
        info!("Draft has {seed_violations} violations, repairing");
        let outcome = repair(&mut plan, &ctx, &grid);
        info!(
            "Repair moved {} lessons, {} violations remain",
            outcome.repaired,
            validate(&plan, &ctx).len()
        );
        unrepaired = outcome.unrepaired.iter().map(|&i| plan[i].clone()).collect();
    }

    let seed = config.seed.unwrap_or_else(rand::random);
    let scorer = Scorer::with_preferences(&ctx, preferences);
    let mut moves = RandomMoves::seeded(seed);
    let limits = SearchLimits {
        max_iterations: config.max_iterations,
        time_budget: config.time_budget(),
        cancel,
    };
    debug!("Local search seed {seed}");
    let outcome = optimize(plan, &ctx, &grid, &scorer, &mut moves, &limits);
    let mut plan = outcome.plan;

    let compaction_applied = match compact(&plan, &ctx, &grid) {
        Some(compacted) => {
            plan = compacted;
            true
        }
        None => false,
    };
    let window_minimization_applied = match minimize_windows(&plan, &ctx, &grid) {
        Some(tightened) => {
            plan = tightened;
            true
        }
        None => false,
    };
    info!(
        "Post-passes: compaction {compaction_applied}, \
         window minimization {window_minimization_applied}"
    );

    let violations = validate(&plan, &ctx);
    if !violations.is_empty() {
        warn!(
            "Returning a plan with {} hard violations; it must not be persisted as is",
            violations.len()
        );
    }
    let score = scorer.score(&plan);
    let unmet_soft_constraints = scorer.unmet_soft_constraints(&plan);
    let Aggregation { templates, singles } = aggregate(&plan);

    let elapsed = started.elapsed();
    info!(
        "Generated {} lessons as {} templates and {} singles in {:.2?}, cost {:.3}",
        plan.len(),
        templates.len(),
        singles.len(),
        elapsed,
        score.total
    );

    Ok(GenerationResult {
        lessons: plan,
        templates,
        singles,
        diagnostics: Diagnostics {
            iterations: outcome.iterations,
            accepted_moves: outcome.accepted,
            seed,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            total_cost: score.total,
            score: score.breakdown,
            confidence: confidence(score.total),
            violations,
            under_fill,
            unrepaired,
            compaction_applied,
            window_minimization_applied,
            unmet_soft_constraints,
        },
    })
}
