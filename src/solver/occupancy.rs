use chrono::NaiveDate;
use std::collections::HashMap;

use crate::data::{ExistingBooking, LessonInstance, Resource, TimeSlot};

/// Busy intervals per resource and date, scoped to one build pass.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    busy: HashMap<(Resource, NaiveDate), Vec<TimeSlot>>,
}

impl Occupancy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupancy pre-filled with committed bookings.
    pub fn seeded(bookings: &[ExistingBooking]) -> Self {
        let mut occupancy = Self::new();
        for booking in bookings {
            for resource in booking.resources() {
                occupancy.reserve(resource, booking.date, booking.slot());
            }
        }
        occupancy
    }

    pub fn is_free(&self, resource: Resource, date: NaiveDate, slot: TimeSlot) -> bool {
        self.day(resource, date).iter().all(|busy| !busy.overlaps(&slot))
    }

    pub fn day(&self, resource: Resource, date: NaiveDate) -> &[TimeSlot] {
        self.busy
            .get(&(resource, date))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn reserve(&mut self, resource: Resource, date: NaiveDate, slot: TimeSlot) {
        self.busy.entry((resource, date)).or_default().push(slot);
    }

    /// Drops one reservation equal to `slot`, if present.
    pub fn release(&mut self, resource: Resource, date: NaiveDate, slot: TimeSlot) {
        if let Some(slots) = self.busy.get_mut(&(resource, date)) {
            if let Some(pos) = slots.iter().position(|s| *s == slot) {
                slots.swap_remove(pos);
            }
        }
    }

    pub fn reserve_lesson(&mut self, lesson: &LessonInstance) {
        for resource in lesson.resources() {
            self.reserve(resource, lesson.date, lesson.slot());
        }
    }

    pub fn release_lesson(&mut self, lesson: &LessonInstance) {
        for resource in lesson.resources() {
            self.release(resource, lesson.date, lesson.slot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
    }

    #[test]
    fn test_reserve_and_release() {
        let mut occ = Occupancy::new();
        let slot = TimeSlot::new(540, 585);
        occ.reserve(Resource::Teacher(1), date(), slot);
        assert!(!occ.is_free(Resource::Teacher(1), date(), TimeSlot::new(560, 600)));
        assert!(occ.is_free(Resource::Teacher(1), date(), TimeSlot::new(585, 630)));
        assert!(occ.is_free(Resource::Teacher(2), date(), slot));

        occ.release(Resource::Teacher(1), date(), slot);
        assert!(occ.is_free(Resource::Teacher(1), date(), slot));
    }

    #[test]
    fn test_seeded_blocks_every_booked_resource() {
        let booking = ExistingBooking {
            date: date(),
            start_time: 600,
            end_time: 690,
            teacher_id: Some(4),
            group_id: None,
            room_id: Some(9),
        };
        let occ = Occupancy::seeded(&[booking]);
        let slot = TimeSlot::new(650, 695);
        assert!(!occ.is_free(Resource::Teacher(4), date(), slot));
        assert!(!occ.is_free(Resource::Room(9), date(), slot));
        assert!(occ.is_free(Resource::Group(4), date(), slot));
    }
}
