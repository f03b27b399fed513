//! Folds the final lesson list into recurring templates and one-off singles.

use chrono::{Datelike, Days, NaiveDate};
use itertools::Itertools;
use log::debug;
use std::collections::BTreeMap;

use crate::data::{
    GroupId, LessonInstance, Minute, RecurringTemplate, Repeat, SingleOccurrence, StudyPlanId,
    TeacherId,
};

type LessonKey = (GroupId, TeacherId, StudyPlanId, String, Minute, Minute);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub templates: Vec<RecurringTemplate>,
    pub singles: Vec<SingleOccurrence>,
}

/// Cadence of sorted, distinct dates.
///
/// Weekly when every gap is a whole number of weeks and at least one gap is
/// exactly a week; biweekly when every gap is a whole number of fortnights.
pub fn classify_cadence(dates: &[NaiveDate]) -> Option<Repeat> {
    let gaps: Vec<i64> = dates
        .iter()
        .tuple_windows()
        .map(|(a, b)| (*b - *a).num_days())
        .collect();
    if gaps.is_empty() || gaps.iter().any(|&g| g <= 0 || g % 7 != 0) {
        return None;
    }
    if gaps.contains(&7) {
        Some(Repeat::Weekly)
    } else if gaps.iter().all(|g| g % 14 == 0) {
        Some(Repeat::Biweekly)
    } else {
        None
    }
}

/// Dates the cadence implies between the first and last date that are missing.
fn missing_dates(dates: &[NaiveDate], repeat: Repeat) -> Vec<NaiveDate> {
    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
        return Vec::new();
    };
    let step = Days::new(repeat.step_days());
    let mut missing = Vec::new();
    let mut cursor = first.checked_add_days(step);
    while let Some(date) = cursor {
        if date >= last {
            break;
        }
        if dates.binary_search(&date).is_err() {
            missing.push(date);
        }
        cursor = date.checked_add_days(step);
    }
    missing
}

pub fn aggregate(lessons: &[LessonInstance]) -> Aggregation {
    let mut by_key: BTreeMap<LessonKey, Vec<&LessonInstance>> = BTreeMap::new();
    for lesson in lessons {
        let key = (
            lesson.group_id,
            lesson.teacher_id,
            lesson.study_plan_id,
            lesson.subject.clone(),
            lesson.start_time,
            lesson.end_time,
        );
        by_key.entry(key).or_default().push(lesson);
    }

    let mut result = Aggregation::default();
    for (_, mut instances) in by_key {
        instances.sort_by_key(|l| l.date);

        // one instance per date; a second lesson on the same date stays a single
        let mut distinct: Vec<&LessonInstance> = Vec::with_capacity(instances.len());
        for lesson in instances {
            if distinct.last().is_some_and(|last| last.date == lesson.date) {
                result.singles.push(lesson.into());
            } else {
                distinct.push(lesson);
            }
        }

        match fold(&distinct) {
            Some(template) => result.templates.push(template),
            None => result.singles.extend(distinct.into_iter().map(SingleOccurrence::from)),
        }
    }

    debug!(
        "Aggregated {} lessons into {} templates and {} singles",
        lessons.len(),
        result.templates.len(),
        result.singles.len()
    );
    result
}

fn fold(instances: &[&LessonInstance]) -> Option<RecurringTemplate> {
    let (first, last) = (instances.first()?, instances.last()?);
    if instances.len() < 2 || instances.iter().any(|l| l.date.weekday() != first.date.weekday()) {
        return None;
    }
    let dates: Vec<NaiveDate> = instances.iter().map(|l| l.date).collect();
    let repeat = classify_cadence(&dates)?;
    let excluded_dates = missing_dates(&dates, repeat);
    if excluded_dates.len() > dates.len() {
        return None;
    }
    let room_id = first
        .room_id
        .filter(|room| instances.iter().all(|l| l.room_id == Some(*room)));

    Some(RecurringTemplate {
        group_id: first.group_id,
        teacher_id: first.teacher_id,
        study_plan_id: first.study_plan_id,
        subject: first.subject.clone(),
        start_time: first.start_time,
        end_time: first.end_time,
        day_of_week: first.date.weekday(),
        start_date: first.date,
        end_date: last.date,
        repeat,
        excluded_dates,
        room_id,
    })
}
