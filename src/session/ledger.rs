//! The set ledger: every completed set, rest interval and drink logged during
//! one session, keyed by stable slot id.

use std::collections::HashMap;

use chrono::{DateTime, Local};

use crate::models::{DrinkRecord, RestInterval, RestKind, SetRecord, SlotId};

// A set completed sooner than the planned rest plus this floor/ceiling on
// per-rep execution time is flagged as suspiciously fast. Empirical, tunable.
const SECONDS_PER_REP: i64 = 2;
const MIN_EXECUTION_SECONDS: i64 = 10;
const MAX_EXECUTION_SECONDS: i64 = 30;

/// Result of appending a set.
#[derive(Debug, Clone, Copy)]
pub struct Recorded {
    /// Positional 1-based number of the new set within its slot.
    pub set_number: u32,
    /// True when the wall-clock gap since the previous set of this slot was
    /// implausibly short. Never set for the first set of a slot.
    pub too_fast: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SetLedger {
    sets: HashMap<SlotId, Vec<SetRecord>>,
    rests: Vec<RestInterval>,
    drinks: Vec<DrinkRecord>,
    active_seconds: HashMap<SlotId, u64>,
    last_set_at: HashMap<SlotId, DateTime<Local>>,
}

impl SetLedger {
    pub fn new() -> Self {
        SetLedger::default()
    }

    /// Append a set to a slot's ordered list.
    pub fn record_set(
        &mut self,
        slot: SlotId,
        reps: u32,
        weight_kg: f32,
        target_reps: u32,
        rest_between_sets: u32,
        now: DateTime<Local>,
    ) -> Recorded {
        let too_fast = match self.last_set_at.get(&slot) {
            Some(prev) => {
                let gap = (now - *prev).num_seconds();
                let execution =
                    (reps as i64 * SECONDS_PER_REP).clamp(MIN_EXECUTION_SECONDS, MAX_EXECUTION_SECONDS);
                gap < rest_between_sets as i64 + execution
            }
            None => false,
        };

        let records = self.sets.entry(slot).or_default();
        records.push(SetRecord {
            reps,
            weight_kg,
            target_reps,
            completed_at: now,
        });
        self.last_set_at.insert(slot, now);

        Recorded {
            set_number: records.len() as u32,
            too_fast,
        }
    }

    /// Replace the record at `set_index` (0-based) wholesale, preserving its
    /// original timestamp and target. Returns false for an out-of-range index.
    pub fn edit_set(&mut self, slot: SlotId, set_index: usize, reps: u32, weight_kg: f32) -> bool {
        match self.sets.get_mut(&slot).and_then(|s| s.get_mut(set_index)) {
            Some(record) => {
                record.reps = reps;
                record.weight_kg = weight_kg;
                true
            }
            None => false,
        }
    }

    /// Remove the record at `set_index`. Later records shift down one
    /// position; set numbers are positional, so no renumbering is stored.
    pub fn delete_set(&mut self, slot: SlotId, set_index: usize) -> bool {
        match self.sets.get_mut(&slot) {
            Some(records) if set_index < records.len() => {
                records.remove(set_index);
                true
            }
            _ => false,
        }
    }

    pub fn record_rest(
        &mut self,
        slot: SlotId,
        set_number: Option<u32>,
        rest_seconds: u32,
        kind: RestKind,
        now: DateTime<Local>,
    ) {
        self.rests.push(RestInterval {
            slot,
            set_number,
            rest_seconds,
            kind,
            recorded_at: now,
        });
    }

    pub fn record_drink(&mut self, milliliters: u32, now: DateTime<Local>) {
        self.drinks.push(DrinkRecord {
            milliliters,
            recorded_at: now,
        });
    }

    pub fn add_active_seconds(&mut self, slot: SlotId, seconds: u64) {
        *self.active_seconds.entry(slot).or_insert(0) += seconds;
    }

    pub fn sets_for(&self, slot: SlotId) -> &[SetRecord] {
        self.sets.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_count(&self, slot: SlotId) -> u32 {
        self.sets_for(slot).len() as u32
    }

    pub fn rests(&self) -> &[RestInterval] {
        &self.rests
    }

    pub fn drinks(&self) -> &[DrinkRecord] {
        &self.drinks
    }

    pub fn active_seconds(&self, slot: SlotId) -> u64 {
        self.active_seconds.get(&slot).copied().unwrap_or(0)
    }

    pub fn last_set_at(&self, slot: SlotId) -> Option<DateTime<Local>> {
        self.last_set_at.get(&slot).copied()
    }
}

/// Whether `weight_kg` beats the best weight known for `exercise`.
///
/// `known_max_kg` is the in-session cache seeded from the all-time record
/// lookup (falling back to the max across previously fetched historical
/// sets). An exercise with no known history treats any positive weight as a
/// new record.
pub fn is_personal_record(
    known_max_kg: &HashMap<String, f32>,
    exercise: &str,
    weight_kg: f32,
) -> bool {
    if weight_kg <= 0.0 {
        return false;
    }
    match known_max_kg.get(exercise) {
        Some(&max) => weight_kg > max,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Local> {
        Local::now()
    }

    #[test]
    fn set_numbers_are_sequential_per_slot() {
        let mut ledger = SetLedger::new();
        let a = SlotId::new();
        let b = SlotId::new();
        let now = t0();

        // Interleave recordings across two slots.
        assert_eq!(ledger.record_set(a, 10, 50.0, 10, 90, now).set_number, 1);
        assert_eq!(ledger.record_set(b, 8, 30.0, 8, 60, now).set_number, 1);
        assert_eq!(ledger.record_set(a, 10, 50.0, 10, 90, now).set_number, 2);
        assert_eq!(ledger.record_set(a, 9, 50.0, 10, 90, now).set_number, 3);
        assert_eq!(ledger.record_set(b, 8, 30.0, 8, 60, now).set_number, 2);

        assert_eq!(ledger.set_count(a), 3);
        assert_eq!(ledger.set_count(b), 2);
    }

    #[test]
    fn first_set_is_never_flagged_fast() {
        let mut ledger = SetLedger::new();
        let slot = SlotId::new();
        assert!(!ledger.record_set(slot, 10, 50.0, 10, 600, t0()).too_fast);
    }

    #[test]
    fn second_set_five_seconds_later_is_flagged() {
        let mut ledger = SetLedger::new();
        let slot = SlotId::new();
        let start = t0();

        ledger.record_set(slot, 10, 20.0, 10, 90, start);
        // 5s gap against a 90s planned rest + 20s execution minimum.
        let rec = ledger.record_set(slot, 10, 20.0, 10, 90, start + Duration::seconds(5));
        assert!(rec.too_fast);
    }

    #[test]
    fn unhurried_set_is_not_flagged() {
        let mut ledger = SetLedger::new();
        let slot = SlotId::new();
        let start = t0();

        ledger.record_set(slot, 10, 20.0, 10, 90, start);
        let rec = ledger.record_set(slot, 10, 20.0, 10, 90, start + Duration::seconds(115));
        assert!(!rec.too_fast);
    }

    #[test]
    fn execution_time_clamps_at_bounds() {
        let mut ledger = SetLedger::new();
        let slot = SlotId::new();
        let start = t0();

        // 1 rep would give 2s, clamped up to 10s: a 65s gap on 60s rest is fast.
        ledger.record_set(slot, 1, 100.0, 1, 60, start);
        let rec = ledger.record_set(slot, 1, 100.0, 1, 60, start + Duration::seconds(65));
        assert!(rec.too_fast);

        // 30 reps would give 60s, clamped down to 30s: a 95s gap is fine.
        let mut ledger = SetLedger::new();
        ledger.record_set(slot, 30, 20.0, 30, 60, start);
        let rec = ledger.record_set(slot, 30, 20.0, 30, 60, start + Duration::seconds(95));
        assert!(!rec.too_fast);
    }

    #[test]
    fn edit_replaces_in_place_and_preserves_timestamp() {
        let mut ledger = SetLedger::new();
        let slot = SlotId::new();
        let start = t0();

        ledger.record_set(slot, 8, 40.0, 10, 90, start);
        assert!(ledger.edit_set(slot, 0, 10, 42.5));

        let record = &ledger.sets_for(slot)[0];
        assert_eq!(record.reps, 10);
        assert_eq!(record.weight_kg, 42.5);
        assert_eq!(record.target_reps, 10);
        assert_eq!(record.completed_at, start);
    }

    #[test]
    fn edit_and_delete_out_of_range_are_noops() {
        let mut ledger = SetLedger::new();
        let slot = SlotId::new();
        ledger.record_set(slot, 8, 40.0, 10, 90, t0());

        assert!(!ledger.edit_set(slot, 5, 10, 42.5));
        assert!(!ledger.delete_set(slot, 5));
        assert!(!ledger.delete_set(SlotId::new(), 0));
        assert_eq!(ledger.set_count(slot), 1);
    }

    #[test]
    fn delete_shifts_later_records_down() {
        let mut ledger = SetLedger::new();
        let slot = SlotId::new();
        let now = t0();
        for reps in [10, 9, 8] {
            ledger.record_set(slot, reps, 50.0, 10, 90, now);
        }

        assert!(ledger.delete_set(slot, 0));
        let remaining: Vec<u32> = ledger.sets_for(slot).iter().map(|s| s.reps).collect();
        assert_eq!(remaining, vec![9, 8]);
    }

    #[test]
    fn accuracy_and_target_fields() {
        let hit = SetRecord {
            reps: 8,
            weight_kg: 50.0,
            target_reps: 10,
            completed_at: t0(),
        };
        assert_eq!(hit.accuracy_percent(), 80);
        assert!(!hit.met_target());
        assert!(hit.differs_from_target());

        let untargeted = SetRecord {
            reps: 3,
            weight_kg: 50.0,
            target_reps: 0,
            completed_at: t0(),
        };
        assert_eq!(untargeted.accuracy_percent(), 100);
        assert!(untargeted.met_target());
        assert!(!untargeted.differs_from_target());
    }

    #[test]
    fn personal_record_check() {
        let mut known = HashMap::new();
        known.insert("bench press".to_string(), 80.0);

        assert!(is_personal_record(&known, "bench press", 82.5));
        assert!(!is_personal_record(&known, "bench press", 80.0));
        assert!(!is_personal_record(&known, "bench press", 0.0));
        assert!(!is_personal_record(&known, "bench press", -5.0));
        // No history at all: any positive weight is a first record.
        assert!(is_personal_record(&known, "deadlift", 60.0));
    }
}
