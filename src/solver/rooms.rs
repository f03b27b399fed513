//! Room selection.
//!
//! A room is scored by `3 * type_match + 2 * size_fit`, where `type_match`
//! is 1 when the room type is one the subject category prefers and
//! `size_fit = group_size / capacity` rewards rooms that are not oversized.
//! Only rooms that can seat the group are considered.

use chrono::NaiveDate;
use std::cmp::Ordering;

use crate::data::{Resource, Room, TimeSlot};
use crate::solver::occupancy::Occupancy;

const TYPE_MATCH_WEIGHT: f64 = 3.0;
const SIZE_FIT_WEIGHT: f64 = 2.0;

#[inline]
pub fn fits(room: &Room, group_size: u32) -> bool {
    room.capacity >= group_size
}

pub fn room_score(room: &Room, group_size: u32, preferred_types: &[String]) -> f64 {
    let type_match = preferred_types
        .iter()
        .any(|t| t.eq_ignore_ascii_case(&room.room_type));
    let size_fit = if room.capacity == 0 {
        0.0
    } else {
        (group_size as f64 / room.capacity as f64).min(1.0)
    };
    TYPE_MATCH_WEIGHT * f64::from(u8::from(type_match)) + SIZE_FIT_WEIGHT * size_fit
}

/// Capacity-fitting rooms, best score first. Ties keep inventory order.
pub fn ranked_rooms<'a>(
    rooms: &'a [Room],
    group_size: u32,
    preferred_types: &[String],
) -> Vec<&'a Room> {
    let mut scored: Vec<(f64, &Room)> = rooms
        .iter()
        .filter(|room| fits(room, group_size))
        .map(|room| (room_score(room, group_size, preferred_types), room))
        .collect();
    // stable: equal scores stay in input order
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().map(|(_, room)| room).collect()
}

/// Best capacity-fitting room that is free at `date` / `slot`.
pub fn pick_room<'a>(
    rooms: &'a [Room],
    occupancy: &Occupancy,
    date: NaiveDate,
    slot: TimeSlot,
    group_size: u32,
    preferred_types: &[String],
) -> Option<&'a Room> {
    ranked_rooms(rooms, group_size, preferred_types)
        .into_iter()
        .find(|room| occupancy.is_free(Resource::Room(room.id), date, slot))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: u32, capacity: u32, room_type: &str) -> Room {
        Room {
            id,
            capacity,
            room_type: room_type.into(),
            building: "A".into(),
        }
    }

    #[test]
    fn test_type_match_beats_size_fit() {
        let rooms = vec![room(1, 25, "classroom"), room(2, 60, "lab")];
        let preferred = vec!["lab".to_string()];
        let ranked = ranked_rooms(&rooms, 24, &preferred);
        assert_eq!(ranked[0].id, 2);
    }

    #[test]
    fn test_tight_room_preferred_without_type_match() {
        let rooms = vec![room(1, 120, "hall"), room(2, 30, "classroom")];
        let ranked = ranked_rooms(&rooms, 28, &[]);
        assert_eq!(ranked.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_too_small_rooms_are_excluded() {
        let rooms = vec![room(1, 10, "classroom")];
        assert!(ranked_rooms(&rooms, 11, &[]).is_empty());
    }

    #[test]
    fn test_ties_keep_input_order() {
        let rooms = vec![room(7, 30, "classroom"), room(3, 30, "classroom")];
        let ranked = ranked_rooms(&rooms, 20, &[]);
        assert_eq!(ranked[0].id, 7);
    }

    #[test]
    fn test_pick_room_skips_busy() {
        let rooms = vec![room(1, 30, "classroom"), room(2, 40, "classroom")];
        let date = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        let slot = TimeSlot::new(540, 585);
        let mut occ = Occupancy::new();
        occ.reserve(Resource::Room(1), date, slot);
        let picked = pick_room(&rooms, &occ, date, slot, 25, &[]).unwrap();
        assert_eq!(picked.id, 2);
    }
}
