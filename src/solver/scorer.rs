//! Soft objective.
//!
//! Lower is better. Terms:
//! - windows: idle gaps per teacher-day and group-day, 1 up to an hour, 2 beyond
//! - fairness: per teacher, variance of daily lesson counts over their mean
//! - heavyLate: heavy subjects starting at or after the late threshold
//! - transitions: building changes between consecutive lessons, doubled when
//!   the gap is below the minimum break
//! - harmony: building changes between consecutive lessons of a group
//! - preferences: pluggable, zero by default
//!
//! The score only ranks plans; feasibility is decided by the validator.

use chrono::NaiveDate;
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::data::{LessonInstance, Minute, UnmetSoftConstraint, hhmm};
use crate::solver::Context;

const LONG_WINDOW_MINUTES: Minute = 60;
const CONFIDENCE_SCALE: f64 = 100.0;

/// Unweighted value of each soft term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub windows: f64,
    pub fairness: f64,
    pub heavy_late: f64,
    pub transitions: f64,
    pub harmony: f64,
    pub preferences: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub total: f64,
    pub breakdown: ScoreBreakdown,
}

/// Extension point for caller-specific preferences.
pub trait PreferenceTerm {
    fn penalty(&self, plan: &[LessonInstance], ctx: &Context) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreferences;

impl PreferenceTerm for NoPreferences {
    fn penalty(&self, _plan: &[LessonInstance], _ctx: &Context) -> f64 {
        0.0
    }
}

static NO_PREFERENCES: NoPreferences = NoPreferences;

/// Advisory confidence in a plan, approaching 1 as the cost approaches 0.
pub fn confidence(total_cost: f64) -> f64 {
    (-total_cost.max(0.0) / CONFIDENCE_SCALE).exp()
}

pub struct Scorer<'a> {
    ctx: &'a Context<'a>,
    preferences: &'a dyn PreferenceTerm,
}

impl<'a> Scorer<'a> {
    pub fn new(ctx: &'a Context<'a>) -> Self {
        Self {
            ctx,
            preferences: &NO_PREFERENCES,
        }
    }

    pub fn with_preferences(ctx: &'a Context<'a>, preferences: &'a dyn PreferenceTerm) -> Self {
        Self { ctx, preferences }
    }

    pub fn score(&self, plan: &[LessonInstance]) -> Score {
        self.evaluate(plan, None)
    }

    /// Human-readable description of every soft penalty in the plan.
    pub fn unmet_soft_constraints(&self, plan: &[LessonInstance]) -> Vec<UnmetSoftConstraint> {
        let mut notes = Vec::new();
        self.evaluate(plan, Some(&mut notes));
        notes
    }

    fn evaluate(
        &self,
        plan: &[LessonInstance],
        mut notes: Option<&mut Vec<UnmetSoftConstraint>>,
    ) -> Score {
        let config = self.ctx.config;
        let mut breakdown = ScoreBreakdown::default();

        let teacher_days = day_sequences(plan, |l| l.teacher_id);
        let group_days = day_sequences(plan, |l| l.group_id);

        for (who, days) in [("Teacher", &teacher_days), ("Group", &group_days)] {
            for ((id, date), lessons) in days {
                for (a, b) in lessons.iter().tuple_windows() {
                    let gap = b.start_time.saturating_sub(a.end_time);
                    if config.is_window(gap) {
                        breakdown.windows += if gap > LONG_WINDOW_MINUTES { 2.0 } else { 1.0 };
                        note(&mut notes, "Windows", || {
                            format!(
                                "{who} {id} waits {gap} min on {date} between {} and {}.",
                                hhmm::format(a.end_time),
                                hhmm::format(b.start_time)
                            )
                        });
                    }

                    let (Some(from), Some(to)) =
                        (self.ctx.building(a.room_id), self.ctx.building(b.room_id))
                    else {
                        continue;
                    };
                    if from == to {
                        continue;
                    }
                    breakdown.transitions += if gap < config.min_break_minutes { 2.0 } else { 1.0 };
                    if who == "Group" {
                        breakdown.harmony += 1.0;
                    }
                    note(&mut notes, "Building Change", || {
                        format!(
                            "{who} {id} moves from building {from} to {to} on {date} at {}.",
                            hhmm::format(b.start_time)
                        )
                    });
                }
            }
        }

        for (teacher, days) in &teacher_days
            .iter()
            .chunk_by(|((teacher, _), _)| *teacher)
        {
            let counts: Vec<f64> = days.map(|(_, lessons)| lessons.len() as f64).collect();
            let mean = counts.iter().sum::<f64>() / counts.len() as f64;
            if mean > 0.0 {
                let variance =
                    counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / counts.len() as f64;
                breakdown.fairness += variance / mean;
                if variance > 0.0 {
                    note(&mut notes, "Fairness", || {
                        format!(
                            "Teacher {teacher} has an uneven daily load (variance {variance:.2})."
                        )
                    });
                }
            }
        }

        for lesson in plan {
            if lesson.start_time >= config.heavy_late_after && config.is_heavy(&lesson.subject) {
                breakdown.heavy_late += 1.0;
                note(&mut notes, "Heavy Subject Late", || {
                    format!(
                        "{} for group {} starts at {} on {}.",
                        lesson.subject,
                        lesson.group_id,
                        hhmm::format(lesson.start_time),
                        lesson.date
                    )
                });
            }
        }

        breakdown.preferences = self.preferences.penalty(plan, self.ctx);

        let weights = &config.weights;
        let total = weights.windows * breakdown.windows
            + weights.fairness * breakdown.fairness
            + weights.heavy_late * breakdown.heavy_late
            + weights.transitions * breakdown.transitions
            + weights.harmony * breakdown.harmony
            + weights.preferences * breakdown.preferences;

        Score { total, breakdown }
    }
}

fn note(
    notes: &mut Option<&mut Vec<UnmetSoftConstraint>>,
    constraint_type: &str,
    description: impl FnOnce() -> String,
) {
    if let Some(notes) = notes.as_deref_mut() {
        notes.push(UnmetSoftConstraint {
            constraint_type: constraint_type.to_string(),
            description: description(),
        });
    }
}

/// Lessons per (owner, date), each day sorted by start time.
fn day_sequences<F>(
    plan: &[LessonInstance],
    owner: F,
) -> BTreeMap<(u32, NaiveDate), Vec<&LessonInstance>>
where
    F: Fn(&LessonInstance) -> u32,
{
    let mut days: BTreeMap<(u32, NaiveDate), Vec<&LessonInstance>> = BTreeMap::new();
    for lesson in plan {
        days.entry((owner(lesson), lesson.date)).or_default().push(lesson);
    }
    for lessons in days.values_mut() {
        lessons.sort_by_key(|l| (l.start_time, l.end_time));
    }
    days
}
