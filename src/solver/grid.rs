use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::data::{Minute, TimeSlot};

/// Cuts a working window into lessons of `lesson` minutes separated by `gap` minutes.
/// A trailing remainder shorter than a lesson is dropped.
pub fn day_slots(window: TimeSlot, lesson: Minute, gap: Minute) -> Vec<TimeSlot> {
    let mut slots = Vec::new();
    if lesson == 0 {
        return slots;
    }
    let mut cursor = window.start;
    while cursor + lesson <= window.end {
        slots.push(TimeSlot::new(cursor, cursor + lesson));
        cursor += lesson + gap;
    }
    slots
}

/// Number of (possibly partial) weeks covered by an inclusive date range.
pub fn weeks_in_range(start: NaiveDate, end: NaiveDate) -> u32 {
    let days = (end - start).num_days() + 1;
    if days <= 0 {
        return 0;
    }
    (days as u32).div_ceil(7)
}

/// Candidate slots for every eligible date of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSlotGrid {
    days: BTreeMap<NaiveDate, Vec<TimeSlot>>,
    /// Slot list of a regular day, also used for dates outside the grid.
    template: Vec<TimeSlot>,
}

impl TimeSlotGrid {
    pub fn build(config: &EngineConfig) -> Self {
        let template = day_slots(
            config.working_hours,
            config.lesson_duration,
            config.break_duration,
        );
        let mut days = BTreeMap::new();
        let mut cursor = Some(config.start_date);
        while let Some(date) = cursor {
            if date > config.end_date {
                break;
            }
            if config.is_working_day(date) {
                days.insert(date, template.clone());
            }
            cursor = date.checked_add_days(Days::new(1));
        }
        Self { days, template }
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.keys().copied()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.days.contains_key(&date)
    }

    pub fn slots(&self, date: NaiveDate) -> &[TimeSlot] {
        self.days
            .get(&date)
            .map(Vec::as_slice)
            .unwrap_or(&self.template)
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }
}
