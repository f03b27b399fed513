//! Feasibility-gated hill climbing.
//!
//! Each iteration clones the incumbent, applies one move from a
//! [`MoveGenerator`], validates and scores the candidate, and keeps it only
//! when it is strictly better. A feasible incumbent is only ever replaced by
//! a feasible candidate with lower cost; an infeasible incumbent (residuals
//! left by repair) is replaced by any candidate with fewer violations.
//!
//! The loop stops at the iteration cap, the time budget or an external
//! cancellation flag, whichever comes first, and always returns the best plan.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::data::{LessonInstance, RoomId, TimeSlot};
use crate::solver::Context;
use crate::solver::grid::TimeSlotGrid;
use crate::solver::scorer::{Score, Scorer};
use crate::solver::validator::validate;

/// A single perturbation of a plan, addressed by plan index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Move {
    /// Move a lesson to another slot on the same date.
    Relocate { lesson: usize, slot: TimeSlot },
    /// Put a lesson into another room.
    ChangeRoom { lesson: usize, room: RoomId },
    /// Exchange date, time and room of two lessons.
    Swap { first: usize, second: usize },
}

impl Move {
    pub fn apply(&self, plan: &mut [LessonInstance], ctx: &Context) {
        match *self {
            Move::Relocate { lesson, slot } => plan[lesson].set_slot(slot),
            Move::ChangeRoom { lesson, room } => plan[lesson].assign_room(ctx.room(room)),
            Move::Swap { first, second } => {
                let (a, b) = (plan[first].clone(), plan[second].clone());
                place_like(&mut plan[first], &b);
                place_like(&mut plan[second], &a);
            }
        }
    }
}

fn place_like(lesson: &mut LessonInstance, other: &LessonInstance) {
    lesson.date = other.date;
    lesson.set_slot(other.slot());
    lesson.room_id = other.room_id;
    lesson.room_type = other.room_type.clone();
    lesson.room_capacity = other.room_capacity;
}

/// Source of candidate moves. Returning `None` skips the iteration.
pub trait MoveGenerator {
    fn next_move(
        &mut self,
        plan: &[LessonInstance],
        grid: &TimeSlotGrid,
        ctx: &Context,
    ) -> Option<Move>;
}

/// Uniformly random moves from a seedable RNG.
pub struct RandomMoves<R: Rng> {
    rng: R,
}

impl<R: Rng> RandomMoves<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomMoves<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> MoveGenerator for RandomMoves<R> {
    fn next_move(
        &mut self,
        plan: &[LessonInstance],
        grid: &TimeSlotGrid,
        ctx: &Context,
    ) -> Option<Move> {
        if plan.is_empty() {
            return None;
        }
        let lesson = self.rng.random_range(0..plan.len());
        match self.rng.random_range(0..3u8) {
            0 => {
                let current = plan[lesson].slot();
                let others: Vec<TimeSlot> = grid
                    .slots(plan[lesson].date)
                    .iter()
                    .copied()
                    .filter(|s| *s != current)
                    .collect();
                let slot = *others.choose(&mut self.rng)?;
                Some(Move::Relocate { lesson, slot })
            }
            1 => {
                let current = plan[lesson].room_id;
                let others: Vec<RoomId> = ctx
                    .rooms
                    .iter()
                    .map(|r| r.id)
                    .filter(|id| Some(*id) != current)
                    .collect();
                let room = *others.choose(&mut self.rng)?;
                Some(Move::ChangeRoom { lesson, room })
            }
            _ => {
                if plan.len() < 2 {
                    return None;
                }
                let second = self.rng.random_range(0..plan.len() - 1);
                let second = if second >= lesson { second + 1 } else { second };
                Some(Move::Swap {
                    first: lesson,
                    second,
                })
            }
        }
    }
}

/// Termination contract of one optimization run.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits<'a> {
    pub max_iterations: u32,
    pub time_budget: Duration,
    pub cancel: Option<&'a AtomicBool>,
}

impl SearchLimits<'_> {
    fn should_stop(&self, deadline: Option<Instant>) -> bool {
        deadline.is_some_and(|d| Instant::now() >= d)
            || self.cancel.is_some_and(|c| c.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub plan: Vec<LessonInstance>,
    pub score: Score,
    pub violations: usize,
    pub iterations: u32,
    pub accepted: u32,
    /// Best total cost after each iteration that ended with a feasible
    /// incumbent. Iterations spent reducing violations are not recorded.
    pub best_costs: Vec<f64>,
    pub elapsed: Duration,
}

pub fn optimize<G: MoveGenerator>(
    plan: Vec<LessonInstance>,
    ctx: &Context,
    grid: &TimeSlotGrid,
    scorer: &Scorer,
    moves: &mut G,
    limits: &SearchLimits,
) -> SearchOutcome {
    let started = Instant::now();
    // an unrepresentable deadline means the iteration cap alone applies
    let deadline = started.checked_add(limits.time_budget);

    let mut best = plan;
    let mut best_violations = validate(&best, ctx).len();
    let mut best_score = scorer.score(&best);
    let mut best_costs = Vec::with_capacity((limits.max_iterations as usize).min(4096));
    let mut iterations = 0u32;
    let mut accepted = 0u32;

    debug!(
        "Local search starts at cost {:.3} with {} violations",
        best_score.total, best_violations
    );

    while iterations < limits.max_iterations {
        if limits.should_stop(deadline) {
            break;
        }
        iterations += 1;

        if let Some(mv) = moves.next_move(&best, grid, ctx) {
            let mut candidate = best.clone();
            mv.apply(&mut candidate, ctx);
            let violations = validate(&candidate, ctx).len();

            let improved = if best_violations == 0 {
                violations == 0 && {
                    let score = scorer.score(&candidate);
                    let better = score.total < best_score.total;
                    if better {
                        best_score = score;
                    }
                    better
                }
            } else if violations < best_violations {
                best_score = scorer.score(&candidate);
                true
            } else {
                false
            };

            if improved {
                best = candidate;
                best_violations = violations;
                accepted += 1;
            }
        }
        if best_violations == 0 {
            best_costs.push(best_score.total);
        }
    }

    let elapsed = started.elapsed();
    info!(
        "Local search ran {} iterations in {:.2?}, accepted {}, best cost {:.3}",
        iterations, elapsed, accepted, best_score.total
    );

    SearchOutcome {
        plan: best,
        score: best_score,
        violations: best_violations,
        iterations,
        accepted,
        best_costs,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::testkit::*;
    use std::collections::VecDeque;

    /// Replays a fixed list of moves.
    struct Scripted(VecDeque<Move>);

    impl MoveGenerator for Scripted {
        fn next_move(
            &mut self,
            _: &[LessonInstance],
            _: &TimeSlotGrid,
            _: &Context,
        ) -> Option<Move> {
            self.0.pop_front()
        }
    }

    fn limits(max_iterations: u32) -> SearchLimits<'static> {
        SearchLimits {
            max_iterations,
            time_budget: Duration::from_secs(10),
            cancel: None,
        }
    }

    #[test]
    fn test_improving_move_is_kept() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let grid = TimeSlotGrid::build(&fx.config);
        let scorer = Scorer::new(&ctx);
        let plan = vec![
            lesson(1, 1, 2, (9, 0), (9, 45), Some(1)),
            lesson(1, 2, 2, (11, 45), (12, 30), Some(1)),
        ];
        let mut moves = Scripted(VecDeque::from([Move::Relocate {
            lesson: 1,
            slot: TimeSlot::new(hm(9, 55), hm(10, 40)),
        }]));
        let outcome = optimize(plan, &ctx, &grid, &scorer, &mut moves, &limits(5));
        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.plan[1].start_time, hm(9, 55));
        assert_eq!(outcome.score.total, 0.0);
        assert_eq!(outcome.iterations, 5);
    }

    #[test]
    fn test_infeasible_candidate_is_discarded() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let grid = TimeSlotGrid::build(&fx.config);
        let scorer = Scorer::new(&ctx);
        let plan = vec![
            lesson(1, 1, 2, (9, 0), (9, 45), Some(1)),
            lesson(1, 2, 2, (11, 45), (12, 30), Some(1)),
        ];
        // closes the window but double-books group 1
        let mut moves = Scripted(VecDeque::from([Move::Relocate {
            lesson: 1,
            slot: TimeSlot::new(hm(9, 0), hm(9, 45)),
        }]));
        let outcome = optimize(plan.clone(), &ctx, &grid, &scorer, &mut moves, &limits(1));
        assert_eq!(outcome.accepted, 0);
        assert_eq!(outcome.plan, plan);
    }

    #[test]
    fn test_best_cost_never_increases() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let grid = TimeSlotGrid::build(&fx.config);
        let scorer = Scorer::new(&ctx);
        let plan = vec![
            lesson(1, 1, 2, (9, 0), (9, 45), Some(1)),
            lesson(1, 2, 2, (11, 45), (12, 30), Some(4)),
            lesson(2, 3, 3, (9, 0), (9, 45), Some(2)),
            lesson(2, 4, 3, (11, 45), (12, 30), Some(2)),
        ];
        let start_cost = scorer.score(&plan).total;
        let mut moves = RandomMoves::seeded(11);
        let outcome = optimize(plan, &ctx, &grid, &scorer, &mut moves, &limits(400));
        assert_eq!(outcome.best_costs.len(), 400);
        assert!(outcome.best_costs.windows(2).all(|w| w[1] <= w[0]));
        assert!(outcome.score.total <= start_cost);
        assert_eq!(outcome.violations, 0);
        assert!(validate(&outcome.plan, &ctx).is_empty());
    }

    #[test]
    fn test_same_seed_same_result() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let grid = TimeSlotGrid::build(&fx.config);
        let scorer = Scorer::new(&ctx);
        let plan = vec![
            lesson(1, 1, 2, (9, 0), (9, 45), Some(1)),
            lesson(1, 2, 2, (11, 45), (12, 30), Some(1)),
            lesson(2, 1, 3, (10, 50), (11, 35), Some(3)),
        ];
        let run = |seed| {
            let mut moves = RandomMoves::seeded(seed);
            optimize(plan.clone(), &ctx, &grid, &scorer, &mut moves, &limits(200)).plan
        };
        assert_eq!(run(3), run(3));
    }

    #[test]
    fn test_cancellation_returns_incumbent() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let grid = TimeSlotGrid::build(&fx.config);
        let scorer = Scorer::new(&ctx);
        let plan = vec![lesson(1, 1, 2, (9, 0), (9, 45), Some(1))];
        let cancel = AtomicBool::new(true);
        let limits = SearchLimits {
            max_iterations: 100,
            time_budget: Duration::from_secs(10),
            cancel: Some(&cancel),
        };
        let mut moves = RandomMoves::seeded(1);
        let outcome = optimize(plan.clone(), &ctx, &grid, &scorer, &mut moves, &limits);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.plan, plan);
    }

    #[test]
    fn test_swap_exchanges_placement() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let mut plan = vec![
            lesson(1, 1, 2, (9, 0), (9, 45), Some(1)),
            lesson(2, 2, 3, (10, 50), (11, 35), Some(3)),
        ];
        Move::Swap {
            first: 0,
            second: 1,
        }
        .apply(&mut plan, &ctx);
        assert_eq!(plan[0].date, day(3));
        assert_eq!(plan[0].start_time, hm(10, 50));
        assert_eq!(plan[0].room_id, Some(3));
        assert_eq!(plan[1].date, day(2));
        assert_eq!(plan[1].group_id, 2);
        assert_eq!(plan[1].room_id, Some(1));
    }

    #[test]
    fn test_infeasible_incumbent_accepts_fewer_violations() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let grid = TimeSlotGrid::build(&fx.config);
        let scorer = Scorer::new(&ctx);
        let plan = vec![
            lesson(1, 1, 2, (9, 0), (9, 45), Some(1)),
            lesson(2, 1, 2, (9, 0), (9, 45), Some(2)),
        ];
        let mut moves = Scripted(VecDeque::from([Move::Relocate {
            lesson: 1,
            slot: TimeSlot::new(hm(9, 55), hm(10, 40)),
        }]));
        let outcome = optimize(plan, &ctx, &grid, &scorer, &mut moves, &limits(1));
        assert_eq!(outcome.violations, 0);
        assert_eq!(outcome.accepted, 1);
    }

    #[test]
    fn test_cost_trace_starts_at_first_feasible_incumbent() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let grid = TimeSlotGrid::build(&fx.config);
        let scorer = Scorer::new(&ctx);
        // teacher 1 double-booked at 09:00; the clean plan pays for a long window
        let plan = vec![
            lesson(1, 1, 2, (9, 0), (9, 45), Some(1)),
            lesson(2, 1, 2, (9, 0), (9, 45), Some(2)),
        ];
        assert_eq!(scorer.score(&plan).total, 0.0);
        let mut moves = Scripted(VecDeque::from([
            Move::ChangeRoom { lesson: 0, room: 3 },
            Move::Relocate {
                lesson: 1,
                slot: TimeSlot::new(hm(11, 45), hm(12, 30)),
            },
        ]));
        let outcome = optimize(plan, &ctx, &grid, &scorer, &mut moves, &limits(3));
        assert_eq!(outcome.violations, 0);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.score.total, 2.0);
        assert_eq!(outcome.best_costs, vec![2.0, 2.0]);
        assert!(outcome.best_costs.windows(2).all(|w| w[1] <= w[0]));
    }
}
