//! The session phase machine.
//!
//! One `Session` owns everything a running workout mutates: the exercise
//! slots, the phase, the timers, the set ledger and the in-session record
//! cache. All mutation goes through the methods below, driven by user
//! actions and one-second ticks from the event loop; the machine itself
//! never awaits anything. Anything asynchronous (media lookups, suggestion
//! hints, persistence) is requested through an [`Effect`] and patched back
//! in later via the `apply_*` methods.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::models::{
    MediaRefs, MediaState, Outcome, PlanExercise, RestKind, SessionSummary, SlotId, TimedStep,
    WorkoutPlan,
};

use super::ledger::{self, SetLedger};
use super::summary;
use super::timer::{Countdown, Elapsed};

/// Mutually-exclusive session mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Warmup,
    Active,
    Resting,
    Transitioning,
    Challenge,
    Stretch,
    Complete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Warmup => "warmup",
            Phase::Active => "active",
            Phase::Resting => "resting",
            Phase::Transitioning => "transitioning",
            Phase::Challenge => "challenge",
            Phase::Stretch => "stretch",
            Phase::Complete => "complete",
        };
        write!(f, "{}", s)
    }
}

/// One exercise position in the session list.
///
/// A removed slot stays in the list so its logged sets keep counting; it is
/// skipped for display and progression.
#[derive(Debug, Clone)]
pub struct ExerciseSlot {
    pub id: SlotId,
    pub plan: PlanExercise,
    pub removed: bool,
}

/// Side effects the driver must carry out. The machine only describes them.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Audible countdown cue at N seconds remaining.
    Cue(u32),
    PhaseChanged(Phase),
    WarmupStep {
        index: usize,
        name: String,
        seconds: u32,
    },
    StretchStep {
        index: usize,
        name: String,
        seconds: u32,
    },
    FetchMedia {
        slot: SlotId,
        exercise: String,
    },
    SuggestRest {
        slot: SlotId,
        accuracy_percent: u32,
        planned_rest: u32,
    },
    SuggestWeight {
        slot: SlotId,
        exercise: String,
    },
    SetRecorded {
        slot: SlotId,
        set_number: u32,
        is_pr: bool,
        too_fast: bool,
    },
    RestLogged {
        kind: RestKind,
        rest_seconds: u32,
    },
    ChallengeOffered {
        exercise: String,
    },
    /// Terminal: the summary is ready for the persistence sink.
    Finished(Box<SessionSummary>),
}

/// Durations used when the plan does not override them.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub default_rest_between_sets: u32,
    /// Between-exercise countdown when the plan entry has no `rest_after`.
    pub transition_seconds: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            default_rest_between_sets: 90,
            transition_seconds: 7,
        }
    }
}

pub struct Session {
    pub id: String,
    pub(crate) plan: WorkoutPlan,
    pub(crate) slots: Vec<ExerciseSlot>,
    pub(crate) started_at: DateTime<Local>,
    config: SessionConfig,

    phase: Phase,
    paused: bool,
    pub(crate) outcome: Option<Outcome>,
    pub(crate) elapsed: Elapsed,
    pub(crate) ledger: SetLedger,

    current: usize,
    warmup_index: usize,
    stretch_index: usize,
    challenge_offered: bool,

    /// The single live countdown; its meaning follows the phase. Replacing
    /// it is how a new run supersedes the previous one.
    countdown: Option<Countdown>,

    /// Wall-clock anchor of the rest/transition in progress. Pausing does
    /// not touch it: measured rest is real time since the last set.
    rest_started_at: Option<DateTime<Local>>,
    entered_exercise_at: Option<DateTime<Local>>,

    /// Best known weight per exercise name, seeded from history at start and
    /// raised as new records land during the session.
    known_max_kg: HashMap<String, f32>,

    // Display enrichments, patched in by the driver when lookups resolve.
    pub media: HashMap<SlotId, MediaState>,
    pub rest_hint: Option<u32>,
    pub weight_hint: Option<f32>,
}

impl Session {
    pub fn start(
        plan: WorkoutPlan,
        known_max_kg: HashMap<String, f32>,
        config: SessionConfig,
        now: DateTime<Local>,
    ) -> (Self, Vec<Effect>) {
        let slots = plan
            .exercises
            .iter()
            .map(|e| ExerciseSlot {
                id: SlotId::new(),
                plan: e.clone(),
                removed: false,
            })
            .collect();

        let mut session = Session {
            id: Uuid::new_v4().to_string(),
            plan,
            slots,
            started_at: now,
            config,
            phase: Phase::Warmup,
            paused: false,
            outcome: None,
            elapsed: Elapsed::new(),
            ledger: SetLedger::new(),
            current: 0,
            warmup_index: 0,
            stretch_index: 0,
            challenge_offered: false,
            countdown: None,
            rest_started_at: None,
            entered_exercise_at: None,
            known_max_kg,
            media: HashMap::new(),
            rest_hint: None,
            weight_hint: None,
        };

        let mut fx = Vec::new();
        if session.plan.warmup.is_empty() {
            fx.extend(session.finish_warmup(now));
        } else {
            fx.push(Effect::PhaseChanged(Phase::Warmup));
            fx.extend(session.begin_warmup_step(now));
        }
        (session, fx)
    }

    //
    // Accessors
    //

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed.seconds()
    }

    pub fn countdown_remaining(&self) -> Option<u32> {
        self.countdown
            .as_ref()
            .filter(|c| c.is_running())
            .map(|c| c.remaining())
    }

    pub fn slots(&self) -> &[ExerciseSlot] {
        &self.slots
    }

    pub fn ledger(&self) -> &SetLedger {
        &self.ledger
    }

    pub fn current_slot(&self) -> Option<&ExerciseSlot> {
        self.slots.get(self.current).filter(|s| !s.removed)
    }

    pub fn current_warmup_step(&self) -> Option<&TimedStep> {
        (self.phase == Phase::Warmup)
            .then(|| self.plan.warmup.get(self.warmup_index))
            .flatten()
    }

    pub fn current_stretch_step(&self) -> Option<&TimedStep> {
        (self.phase == Phase::Stretch)
            .then(|| self.plan.stretch.get(self.stretch_index))
            .flatten()
    }

    /// Indices of the slots still part of the session, in display order.
    pub fn visible_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.removed)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn known_max_kg(&self, exercise: &str) -> Option<f32> {
        self.known_max_kg.get(exercise).copied()
    }

    //
    // Clock
    //

    /// Advance all timers one second. Phase transitions triggered by a
    /// countdown reaching zero happen here; while paused the timers are
    /// frozen, so none can fire.
    pub fn tick(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        if self.outcome.is_some() {
            return Vec::new();
        }

        self.elapsed.tick();

        let Some(countdown) = self.countdown.as_mut() else {
            return Vec::new();
        };
        let outcome = countdown.tick();

        let mut fx: Vec<Effect> = outcome.cues.into_iter().map(Effect::Cue).collect();
        if outcome.completed {
            fx.extend(self.on_countdown_complete(now));
        }
        fx
    }

    /// Pause freezes the elapsed clock and the live countdown in place. The
    /// phase does not change, and explicit actions (skip, quit) keep working.
    pub fn pause(&mut self) {
        if self.outcome.is_some() || self.paused {
            return;
        }
        self.paused = true;
        self.elapsed.pause();
        if let Some(c) = self.countdown.as_mut() {
            c.pause();
        }
    }

    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        self.elapsed.resume();
        if let Some(c) = self.countdown.as_mut() {
            c.resume();
        }
    }

    //
    // User actions
    //

    /// Log a completed set for the current exercise and move to the phase
    /// that follows it (rest, transition, challenge offer or stretch).
    pub fn complete_set(&mut self, reps: u32, weight_kg: f32, now: DateTime<Local>) -> Vec<Effect> {
        if self.outcome.is_some() || self.phase != Phase::Active {
            return Vec::new();
        }
        let Some(slot) = self.current_slot() else {
            return Vec::new();
        };

        let slot_id = slot.id;
        let name = slot.plan.name.clone();
        let target_sets = slot.plan.sets;
        let upcoming = self.ledger.set_count(slot_id) + 1;
        let target_reps = slot.plan.target_reps_for(upcoming);
        let rest_between = slot
            .plan
            .rest_between_sets
            .unwrap_or(self.config.default_rest_between_sets);
        let rest_after = slot.plan.rest_after;

        let recorded =
            self.ledger
                .record_set(slot_id, reps, weight_kg, target_reps, rest_between, now);

        let is_pr = ledger::is_personal_record(&self.known_max_kg, &name, weight_kg);
        if is_pr {
            self.known_max_kg.insert(name, weight_kg);
        }

        let mut fx = vec![Effect::SetRecorded {
            slot: slot_id,
            set_number: recorded.set_number,
            is_pr,
            too_fast: recorded.too_fast,
        }];

        let accuracy = self.ledger.sets_for(slot_id)[recorded.set_number as usize - 1]
            .accuracy_percent();

        if self.ledger.set_count(slot_id) < target_sets {
            // More sets to go: rest. Superset partners skip the countdown
            // (zero duration), the interval is still measured and logged.
            let rest_secs = if self.in_superset(self.current) {
                0
            } else {
                rest_between
            };
            self.phase = Phase::Resting;
            self.rest_started_at = Some(now);
            self.rest_hint = None;
            fx.push(Effect::PhaseChanged(Phase::Resting));
            fx.push(Effect::SuggestRest {
                slot: slot_id,
                accuracy_percent: accuracy,
                planned_rest: rest_secs,
            });
            if self.start_countdown(rest_secs) {
                fx.extend(self.finish_rest(now));
            }
        } else {
            // Last set of this exercise.
            self.leave_current_exercise(now);
            if let Some(next) = self.next_slot_after(self.current) {
                self.phase = Phase::Transitioning;
                self.rest_started_at = Some(now);
                fx.push(Effect::PhaseChanged(Phase::Transitioning));

                // Pre-resolve the next exercise's media.
                let next_id = self.slots[next].id;
                let next_name = self.slots[next].plan.name.clone();
                self.media.insert(next_id, MediaState::Loading);
                fx.push(Effect::FetchMedia {
                    slot: next_id,
                    exercise: next_name,
                });

                let secs = if self.in_superset(self.current) && self.in_superset(next) {
                    0
                } else {
                    rest_after.unwrap_or(self.config.transition_seconds)
                };
                if self.start_countdown(secs) {
                    fx.extend(self.finish_transition(now));
                }
            } else {
                fx.extend(self.after_exercises(now));
            }
        }
        fx
    }

    /// Skip whatever is currently counting down (or the warmup as a whole,
    /// or decline the challenge). No-op in `Active` and after the end.
    pub fn skip_current(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        if self.outcome.is_some() {
            return Vec::new();
        }
        match self.phase {
            Phase::Warmup => {
                if let Some(c) = self.countdown.as_mut() {
                    c.cancel();
                }
                self.finish_warmup(now)
            }
            Phase::Resting => {
                if self.countdown.as_mut().is_some_and(|c| c.skip()) {
                    self.finish_rest(now)
                } else {
                    Vec::new()
                }
            }
            Phase::Transitioning => {
                if self.countdown.as_mut().is_some_and(|c| c.skip()) {
                    self.finish_transition(now)
                } else {
                    Vec::new()
                }
            }
            Phase::Stretch => {
                if self.countdown.as_mut().is_some_and(|c| c.skip()) {
                    self.on_countdown_complete(now)
                } else {
                    Vec::new()
                }
            }
            Phase::Challenge => self.decline_challenge(now),
            Phase::Active | Phase::Complete => Vec::new(),
        }
    }

    /// Skip every remaining stretch step and complete the session.
    pub fn finish_stretches(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        if self.outcome.is_some() || self.phase != Phase::Stretch {
            return Vec::new();
        }
        if let Some(c) = self.countdown.as_mut() {
            c.cancel();
        }
        self.stretch_index = self.plan.stretch.len();
        self.complete_session(now)
    }

    /// Replace the record of an already-performed set. Out-of-range indices
    /// are a no-op, mirrored back as `false`.
    pub fn edit_set(&mut self, slot_index: usize, set_index: usize, reps: u32, weight_kg: f32) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        let Some(slot) = self.slots.get(slot_index) else {
            return false;
        };
        let id = slot.id;
        let name = slot.plan.name.clone();
        let edited = self.ledger.edit_set(id, set_index, reps, weight_kg);
        if edited && ledger::is_personal_record(&self.known_max_kg, &name, weight_kg) {
            self.known_max_kg.insert(name, weight_kg);
        }
        edited
    }

    pub fn delete_set(&mut self, slot_index: usize, set_index: usize) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        match self.slots.get(slot_index) {
            Some(slot) => self.ledger.delete_set(slot.id, set_index),
            None => false,
        }
    }

    /// Make any listed exercise the active one, out of order. An in-flight
    /// rest or transition is measured, logged and ended.
    pub fn jump_to(&mut self, slot_index: usize, now: DateTime<Local>) -> Vec<Effect> {
        if self.outcome.is_some() {
            return Vec::new();
        }
        if !matches!(
            self.phase,
            Phase::Active | Phase::Resting | Phase::Transitioning
        ) {
            return Vec::new();
        }
        let Some(target) = self.slots.get(slot_index) else {
            return Vec::new();
        };
        if target.removed || (slot_index == self.current && self.phase == Phase::Active) {
            return Vec::new();
        }

        let mut fx = self.end_pending_rest(slot_index, now);
        self.countdown = None;
        self.leave_current_exercise(now);
        fx.extend(self.enter_slot(slot_index, now));
        fx
    }

    /// Retire the slot and bring in a fresh one for `replacement` at the same
    /// position. The retired slot's sets stay on the ledger; the new slot
    /// starts with zero sets.
    pub fn swap_exercise(
        &mut self,
        slot_index: usize,
        replacement: PlanExercise,
        now: DateTime<Local>,
    ) -> Option<SlotId> {
        if self.outcome.is_some() {
            return None;
        }
        let slot = self.slots.get(slot_index)?;
        if slot.removed {
            return None;
        }

        // Swapping the exercise being performed restarts its clock; a rest in
        // progress on it is measured and logged before the slot retires.
        let swapping_current =
            slot_index == self.current && matches!(self.phase, Phase::Active | Phase::Resting);
        if swapping_current {
            let _ = self.end_pending_rest(slot_index, now);
            self.countdown = None;
            self.leave_current_exercise(now);
        }

        self.slots[slot_index].removed = true;
        let fresh = ExerciseSlot {
            id: SlotId::new(),
            plan: replacement,
            removed: false,
        };
        let id = fresh.id;
        self.slots.insert(slot_index + 1, fresh);

        if swapping_current {
            self.phase = Phase::Active;
            self.current = slot_index + 1;
            self.entered_exercise_at = Some(now);
            self.weight_hint = None;
        } else if slot_index < self.current {
            self.current += 1;
        }
        Some(id)
    }

    /// Drop an exercise from the session. Dropping the active one advances
    /// to the next remaining exercise, or onward to challenge/stretch.
    pub fn remove_exercise(&mut self, slot_index: usize, now: DateTime<Local>) -> Vec<Effect> {
        if self.outcome.is_some() {
            return Vec::new();
        }
        let Some(slot) = self.slots.get(slot_index) else {
            return Vec::new();
        };
        if slot.removed {
            return Vec::new();
        }

        let dropping_current = slot_index == self.current
            && matches!(
                self.phase,
                Phase::Active | Phase::Resting | Phase::Transitioning
            );

        let mut fx = Vec::new();
        if dropping_current {
            // Log the rest in progress while the slot is still listed.
            if self.phase == Phase::Resting {
                fx.extend(self.end_pending_rest(slot_index, now));
            }
            self.rest_started_at = None;
            self.countdown = None;
            self.leave_current_exercise(now);
        }

        self.slots[slot_index].removed = true;
        if !dropping_current {
            return fx;
        }

        if let Some(next) = self.next_slot_after(slot_index) {
            fx.extend(self.enter_slot(next, now));
        } else {
            fx.extend(self.after_exercises(now));
        }
        fx
    }

    /// Take the once-only challenge exercise: it joins the list and becomes
    /// active immediately.
    pub fn accept_challenge(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        if self.outcome.is_some() || self.phase != Phase::Challenge {
            return Vec::new();
        }
        let Some(extra) = self.plan.challenge.clone() else {
            return self.begin_stretch(now);
        };
        self.slots.push(ExerciseSlot {
            id: SlotId::new(),
            plan: extra,
            removed: false,
        });
        let index = self.slots.len() - 1;
        self.enter_slot(index, now)
    }

    pub fn decline_challenge(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        if self.outcome.is_some() || self.phase != Phase::Challenge {
            return Vec::new();
        }
        self.begin_stretch(now)
    }

    pub fn log_drink(&mut self, milliliters: u32, now: DateTime<Local>) {
        if self.outcome.is_none() {
            self.ledger.record_drink(milliliters, now);
        }
    }

    /// End the session early from any phase. Terminal; produces a partial
    /// summary tagged with the reason.
    pub fn quit(&mut self, reason: &str, now: DateTime<Local>) -> Vec<Effect> {
        if self.outcome.is_some() {
            return Vec::new();
        }
        if let Some(c) = self.countdown.as_mut() {
            c.cancel();
        }
        self.countdown = None;
        self.leave_current_exercise(now);
        self.outcome = Some(Outcome::Quit {
            reason: reason.to_string(),
        });
        vec![Effect::Finished(Box::new(summary::build(self)))]
    }

    //
    // Enrichment patches (fire-and-forget results landing later)
    //

    pub fn apply_media(&mut self, slot: SlotId, refs: Option<MediaRefs>) {
        if let Some(state) = self.media.get_mut(&slot) {
            *state = match refs {
                Some(r) => MediaState::Loaded(r),
                None => MediaState::Failed,
            };
        }
    }

    pub fn apply_rest_hint(&mut self, slot: SlotId, seconds: u32) {
        if self.phase == Phase::Resting && self.current_slot().is_some_and(|s| s.id == slot) {
            self.rest_hint = Some(seconds);
        }
    }

    pub fn apply_weight_hint(&mut self, slot: SlotId, weight_kg: f32) {
        if self.phase == Phase::Active && self.current_slot().is_some_and(|s| s.id == slot) {
            self.weight_hint = Some(weight_kg);
        }
    }

    //
    // Internal transitions
    //

    fn start_countdown(&mut self, seconds: u32) -> bool {
        let (mut countdown, done) = Countdown::start(seconds);
        if self.paused {
            countdown.pause();
        }
        self.countdown = Some(countdown);
        done
    }

    fn on_countdown_complete(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        match self.phase {
            Phase::Warmup => {
                self.warmup_index += 1;
                if self.warmup_index >= self.plan.warmup.len() {
                    self.finish_warmup(now)
                } else {
                    self.begin_warmup_step(now)
                }
            }
            Phase::Resting => self.finish_rest(now),
            Phase::Transitioning => self.finish_transition(now),
            Phase::Stretch => {
                self.stretch_index += 1;
                if self.stretch_index >= self.plan.stretch.len() {
                    self.complete_session(now)
                } else {
                    self.begin_stretch_step(now)
                }
            }
            Phase::Active | Phase::Challenge | Phase::Complete => Vec::new(),
        }
    }

    fn begin_warmup_step(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        let mut fx = Vec::new();
        while let Some(step) = self.plan.warmup.get(self.warmup_index) {
            fx.push(Effect::WarmupStep {
                index: self.warmup_index,
                name: step.name.clone(),
                seconds: step.seconds,
            });
            if !self.start_countdown(step.seconds) {
                return fx;
            }
            // Zero-length step: fall through to the next one.
            self.warmup_index += 1;
        }
        fx.extend(self.finish_warmup(now));
        fx
    }

    fn finish_warmup(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        self.countdown = None;
        match self.next_slot_from(0) {
            Some(first) => self.enter_slot(first, now),
            None => self.begin_stretch(now),
        }
    }

    fn enter_slot(&mut self, slot_index: usize, now: DateTime<Local>) -> Vec<Effect> {
        self.current = slot_index;
        self.phase = Phase::Active;
        self.entered_exercise_at = Some(now);
        self.weight_hint = None;

        let id = self.slots[slot_index].id;
        let name = self.slots[slot_index].plan.name.clone();

        let mut fx = vec![Effect::PhaseChanged(Phase::Active)];
        if matches!(
            self.media.get(&id),
            None | Some(MediaState::Idle) | Some(MediaState::Failed)
        ) {
            self.media.insert(id, MediaState::Loading);
            fx.push(Effect::FetchMedia {
                slot: id,
                exercise: name.clone(),
            });
        }
        fx.push(Effect::SuggestWeight { slot: id, exercise: name });
        fx
    }

    fn finish_rest(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        self.countdown = None;
        let Some(slot) = self.current_slot() else {
            return Vec::new();
        };
        let id = slot.id;
        let set_number = self.ledger.set_count(id);
        let actual = self.measured_rest(now);
        self.ledger
            .record_rest(id, Some(set_number), actual, RestKind::BetweenSets, now);
        self.rest_started_at = None;
        self.rest_hint = None;
        self.phase = Phase::Active;
        vec![
            Effect::RestLogged {
                kind: RestKind::BetweenSets,
                rest_seconds: actual,
            },
            Effect::PhaseChanged(Phase::Active),
        ]
    }

    /// What follows the last exercise: the once-only challenge offer if the
    /// plan has one, otherwise the stretch phase.
    fn after_exercises(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        if let Some(challenge) = self.plan.challenge.as_ref().filter(|_| !self.challenge_offered) {
            let name = challenge.name.clone();
            self.challenge_offered = true;
            self.phase = Phase::Challenge;
            self.countdown = None;
            vec![
                Effect::PhaseChanged(Phase::Challenge),
                Effect::ChallengeOffered { exercise: name },
            ]
        } else {
            self.begin_stretch(now)
        }
    }

    fn finish_transition(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        self.countdown = None;
        let Some(next) = self.next_slot_after(self.current) else {
            // The upcoming exercise disappeared mid-transition.
            return self.after_exercises(now);
        };
        let actual = self.measured_rest(now);
        let id = self.slots[next].id;
        self.ledger
            .record_rest(id, None, actual, RestKind::BetweenExercises, now);
        self.rest_started_at = None;

        let mut fx = vec![Effect::RestLogged {
            kind: RestKind::BetweenExercises,
            rest_seconds: actual,
        }];
        fx.extend(self.enter_slot(next, now));
        fx
    }

    fn begin_stretch(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        self.countdown = None;
        if self.plan.stretch.is_empty() {
            return self.complete_session(now);
        }
        self.phase = Phase::Stretch;
        self.stretch_index = 0;
        let mut fx = vec![Effect::PhaseChanged(Phase::Stretch)];
        fx.extend(self.begin_stretch_step(now));
        fx
    }

    fn begin_stretch_step(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        let mut fx = Vec::new();
        while let Some(step) = self.plan.stretch.get(self.stretch_index) {
            fx.push(Effect::StretchStep {
                index: self.stretch_index,
                name: step.name.clone(),
                seconds: step.seconds,
            });
            if !self.start_countdown(step.seconds) {
                return fx;
            }
            self.stretch_index += 1;
        }
        fx.extend(self.complete_session(now));
        fx
    }

    fn complete_session(&mut self, now: DateTime<Local>) -> Vec<Effect> {
        self.countdown = None;
        self.leave_current_exercise(now);
        self.phase = Phase::Complete;
        self.outcome = Some(Outcome::Completed);
        vec![
            Effect::PhaseChanged(Phase::Complete),
            Effect::Finished(Box::new(summary::build(self))),
        ]
    }

    /// Fold wall-clock time on the current exercise into its accumulator.
    fn leave_current_exercise(&mut self, now: DateTime<Local>) {
        if let (Some(entered), Some(slot)) = (self.entered_exercise_at.take(), self.slots.get(self.current))
        {
            let seconds = (now - entered).num_seconds().max(0) as u64;
            self.ledger.add_active_seconds(slot.id, seconds);
        }
    }

    /// Log the rest/transition in progress, if any, attributing an
    /// inter-exercise rest to the slot being entered.
    fn end_pending_rest(&mut self, entering: usize, now: DateTime<Local>) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.rest_started_at.is_none() {
            return fx;
        }
        let actual = self.measured_rest(now);
        match self.phase {
            Phase::Resting => {
                if let Some(slot) = self.current_slot() {
                    let id = slot.id;
                    let set_number = self.ledger.set_count(id);
                    self.ledger
                        .record_rest(id, Some(set_number), actual, RestKind::BetweenSets, now);
                    fx.push(Effect::RestLogged {
                        kind: RestKind::BetweenSets,
                        rest_seconds: actual,
                    });
                }
            }
            Phase::Transitioning => {
                let id = self.slots[entering].id;
                self.ledger
                    .record_rest(id, None, actual, RestKind::BetweenExercises, now);
                fx.push(Effect::RestLogged {
                    kind: RestKind::BetweenExercises,
                    rest_seconds: actual,
                });
            }
            _ => {}
        }
        self.rest_started_at = None;
        fx
    }

    fn measured_rest(&self, now: DateTime<Local>) -> u32 {
        self.rest_started_at
            .map(|t| (now - t).num_seconds().max(0) as u32)
            .unwrap_or(0)
    }

    fn next_slot_from(&self, start: usize) -> Option<usize> {
        (start..self.slots.len()).find(|&i| !self.slots[i].removed)
    }

    fn next_slot_after(&self, index: usize) -> Option<usize> {
        self.next_slot_from(index + 1)
    }

    /// True when the slot shares a superset group with an adjacent listed
    /// slot; supersets run back-to-back, so their rest countdown is skipped.
    fn in_superset(&self, index: usize) -> bool {
        let Some(group) = self.slots.get(index).and_then(|s| s.plan.superset) else {
            return false;
        };
        let visible = self.visible_slots();
        let Some(pos) = visible.iter().position(|&i| i == index) else {
            return false;
        };
        let neighbor_matches = |i: Option<&usize>| {
            i.and_then(|&i| self.slots[i].plan.superset) == Some(group)
        };
        neighbor_matches(pos.checked_sub(1).and_then(|p| visible.get(p)))
            || neighbor_matches(visible.get(pos + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn exercise(name: &str, sets: u32, reps: u32, rest: u32) -> PlanExercise {
        PlanExercise {
            name: name.to_string(),
            sets,
            reps: vec![reps],
            target_weight_kg: None,
            rest_between_sets: Some(rest),
            rest_after: None,
            superset: None,
        }
    }

    fn plan(exercises: Vec<PlanExercise>, stretch: Vec<TimedStep>) -> WorkoutPlan {
        WorkoutPlan {
            name: "test plan".to_string(),
            description: None,
            warmup: Vec::new(),
            exercises,
            challenge: None,
            stretch,
        }
    }

    fn stretch_step(seconds: u32) -> TimedStep {
        TimedStep {
            name: "hamstring hold".to_string(),
            seconds,
        }
    }

    fn summary_of(fx: &[Effect]) -> Option<&SessionSummary> {
        fx.iter().find_map(|e| match e {
            Effect::Finished(s) => Some(s.as_ref()),
            _ => None,
        })
    }

    #[test]
    fn full_session_one_exercise() {
        // Scenario: 1 exercise, 2 sets of 10 target, 60s rest.
        let now = Local::now();
        let p = plan(vec![exercise("squat", 2, 10, 60)], vec![stretch_step(30)]);
        let (mut s, fx) = Session::start(p, HashMap::new(), SessionConfig::default(), now);
        assert_eq!(s.phase(), Phase::Active);
        assert!(fx.iter().any(|e| matches!(e, Effect::FetchMedia { .. })));

        // Set 1 → resting with a 60s countdown.
        let fx = s.complete_set(10, 20.0, now + Duration::seconds(30));
        assert_eq!(s.phase(), Phase::Resting);
        assert_eq!(s.countdown_remaining(), Some(60));
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::SetRecorded { set_number: 1, .. }
        )));

        // Skip rest → back to active, rest interval measured by wall clock.
        let fx = s.skip_current(now + Duration::seconds(45));
        assert_eq!(s.phase(), Phase::Active);
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::RestLogged {
                kind: RestKind::BetweenSets,
                rest_seconds: 15
            }
        )));

        // Set 2 is the last of the last exercise → straight to stretch.
        s.complete_set(9, 20.0, now + Duration::seconds(90));
        assert_eq!(s.phase(), Phase::Stretch);

        // Skip all stretches → complete, with the summary attached.
        let fx = s.finish_stretches(now + Duration::seconds(100));
        assert_eq!(s.phase(), Phase::Complete);
        let summary = summary_of(&fx).expect("summary");
        assert_eq!(summary.total_completed_sets, 2);
        assert_eq!(summary.total_reps, 19);
        assert_eq!(summary.total_volume_kg, 380.0);
        assert!(summary.completed);
    }

    #[test]
    fn quit_mid_session_produces_partial_summary() {
        let now = Local::now();
        let p = plan(
            vec![
                exercise("squat", 3, 10, 60),
                exercise("bench press", 3, 10, 60),
                exercise("row", 3, 10, 60),
            ],
            Vec::new(),
        );
        let (mut s, _) = Session::start(p, HashMap::new(), SessionConfig::default(), now);

        s.complete_set(10, 60.0, now + Duration::seconds(40));
        let fx = s.quit("too_tired", now + Duration::seconds(60));

        let summary = summary_of(&fx).expect("summary");
        assert!(!summary.completed);
        assert_eq!(summary.quit_reason.as_deref(), Some("too_tired"));
        assert_eq!(summary.exercises_touched, 1);
        assert_eq!(summary.progress_percentage, 33);
    }

    #[test]
    fn complete_is_terminal() {
        let now = Local::now();
        let p = plan(vec![exercise("squat", 1, 10, 60)], Vec::new());
        let (mut s, _) = Session::start(p, HashMap::new(), SessionConfig::default(), now);

        let fx = s.complete_set(10, 20.0, now);
        assert_eq!(s.phase(), Phase::Complete);
        assert!(summary_of(&fx).is_some());

        // Every further action is a no-op.
        assert!(s.complete_set(10, 20.0, now).is_empty());
        assert!(s.tick(now).is_empty());
        assert!(s.skip_current(now).is_empty());
        assert!(s.quit("again", now).is_empty());
        assert_eq!(s.phase(), Phase::Complete);
    }

    #[test]
    fn pause_freezes_elapsed_and_countdown() {
        let now = Local::now();
        let p = plan(vec![exercise("squat", 2, 10, 60)], Vec::new());
        let (mut s, _) = Session::start(p, HashMap::new(), SessionConfig::default(), now);

        for _ in 0..10 {
            s.tick(now);
        }
        assert_eq!(s.elapsed_seconds(), 10);

        s.complete_set(10, 20.0, now);
        s.pause();
        for _ in 0..30 {
            s.tick(now);
        }
        // Nothing moved while paused; the rest timer cannot complete.
        assert_eq!(s.elapsed_seconds(), 10);
        assert_eq!(s.countdown_remaining(), Some(60));
        assert_eq!(s.phase(), Phase::Resting);

        s.resume();
        for _ in 0..5 {
            s.tick(now);
        }
        assert_eq!(s.elapsed_seconds(), 15);
        assert_eq!(s.countdown_remaining(), Some(55));
    }

    #[test]
    fn explicit_skip_works_while_paused() {
        let now = Local::now();
        let p = plan(vec![exercise("squat", 2, 10, 60)], Vec::new());
        let (mut s, _) = Session::start(p, HashMap::new(), SessionConfig::default(), now);

        s.complete_set(10, 20.0, now);
        s.pause();
        let fx = s.skip_current(now + Duration::seconds(5));
        assert_eq!(s.phase(), Phase::Active);
        assert!(fx.iter().any(|e| matches!(e, Effect::RestLogged { .. })));
    }

    #[test]
    fn rest_countdown_drives_transition_back_to_active() {
        let now = Local::now();
        let p = plan(vec![exercise("squat", 2, 10, 3)], Vec::new());
        let (mut s, _) = Session::start(p, HashMap::new(), SessionConfig::default(), now);

        s.complete_set(10, 20.0, now);
        assert_eq!(s.phase(), Phase::Resting);

        s.tick(now + Duration::seconds(1));
        s.tick(now + Duration::seconds(2));
        let fx = s.tick(now + Duration::seconds(3));
        assert_eq!(s.phase(), Phase::Active);
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::RestLogged {
                kind: RestKind::BetweenSets,
                rest_seconds: 3
            }
        )));
    }

    #[test]
    fn transition_between_exercises() {
        let now = Local::now();
        let p = plan(
            vec![exercise("squat", 1, 10, 60), exercise("bench press", 1, 10, 60)],
            Vec::new(),
        );
        let (mut s, _) = Session::start(p, HashMap::new(), SessionConfig::default(), now);

        let fx = s.complete_set(10, 60.0, now);
        assert_eq!(s.phase(), Phase::Transitioning);
        // Media for the upcoming exercise is prefetched during the transition.
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::FetchMedia { exercise, .. } if exercise == "bench press"
        )));

        let fx = s.skip_current(now + Duration::seconds(4));
        assert_eq!(s.phase(), Phase::Active);
        assert_eq!(s.current_slot().unwrap().plan.name, "bench press");
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::RestLogged {
                kind: RestKind::BetweenExercises,
                rest_seconds: 4
            }
        )));
    }

    #[test]
    fn warmup_steps_run_then_first_exercise_begins() {
        let now = Local::now();
        let mut p = plan(vec![exercise("squat", 1, 10, 60)], Vec::new());
        p.warmup = vec![
            TimedStep {
                name: "jumping jacks".to_string(),
                seconds: 2,
            },
            TimedStep {
                name: "arm circles".to_string(),
                seconds: 1,
            },
        ];
        let (mut s, fx) = Session::start(p, HashMap::new(), SessionConfig::default(), now);
        assert_eq!(s.phase(), Phase::Warmup);
        assert!(fx.iter().any(|e| matches!(e, Effect::WarmupStep { index: 0, .. })));

        s.tick(now);
        let fx = s.tick(now);
        assert!(fx.iter().any(|e| matches!(e, Effect::WarmupStep { index: 1, .. })));
        let fx = s.tick(now);
        assert_eq!(s.phase(), Phase::Active);
        assert!(fx.iter().any(|e| matches!(e, Effect::PhaseChanged(Phase::Active))));
    }

    #[test]
    fn skipping_warmup_goes_straight_to_active() {
        let now = Local::now();
        let mut p = plan(vec![exercise("squat", 1, 10, 60)], Vec::new());
        p.warmup = vec![TimedStep {
            name: "rowing".to_string(),
            seconds: 300,
        }];
        let (mut s, _) = Session::start(p, HashMap::new(), SessionConfig::default(), now);
        assert_eq!(s.phase(), Phase::Warmup);

        s.skip_current(now);
        assert_eq!(s.phase(), Phase::Active);
    }

    #[test]
    fn challenge_is_offered_once_and_declining_reaches_stretch() {
        let now = Local::now();
        let mut p = plan(vec![exercise("squat", 1, 10, 60)], vec![stretch_step(10)]);
        p.challenge = Some(exercise("burpees", 1, 20, 0));
        let (mut s, _) = Session::start(p, HashMap::new(), SessionConfig::default(), now);

        let fx = s.complete_set(10, 60.0, now);
        assert_eq!(s.phase(), Phase::Challenge);
        assert!(fx.iter().any(|e| matches!(e, Effect::ChallengeOffered { .. })));

        s.decline_challenge(now);
        assert_eq!(s.phase(), Phase::Stretch);
    }

    #[test]
    fn accepted_challenge_becomes_the_active_exercise() {
        let now = Local::now();
        let mut p = plan(vec![exercise("squat", 1, 10, 60)], Vec::new());
        p.challenge = Some(exercise("burpees", 1, 20, 0));
        let (mut s, _) = Session::start(p, HashMap::new(), SessionConfig::default(), now);

        s.complete_set(10, 60.0, now);
        s.accept_challenge(now);
        assert_eq!(s.phase(), Phase::Active);
        assert_eq!(s.current_slot().unwrap().plan.name, "burpees");

        // Its last set ends the exercise list; the offer never repeats.
        s.complete_set(20, 0.0, now + Duration::seconds(60));
        assert_eq!(s.phase(), Phase::Complete);
    }

    #[test]
    fn superset_partners_skip_the_rest_countdown() {
        let now = Local::now();
        let mut a = exercise("bench press", 2, 10, 90);
        let mut b = exercise("row", 2, 10, 90);
        a.superset = Some(1);
        b.superset = Some(1);
        let (mut s, _) = Session::start(
            plan(vec![a, b], Vec::new()),
            HashMap::new(),
            SessionConfig::default(),
            now,
        );

        // The rest phase collapses immediately: straight back to Active.
        let fx = s.complete_set(10, 60.0, now);
        assert_eq!(s.phase(), Phase::Active);
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::RestLogged {
                kind: RestKind::BetweenSets,
                ..
            }
        )));
    }

    #[test]
    fn jump_activates_any_exercise_and_logs_interrupted_rest() {
        let now = Local::now();
        let p = plan(
            vec![
                exercise("squat", 3, 10, 60),
                exercise("bench press", 3, 10, 60),
                exercise("row", 3, 10, 60),
            ],
            Vec::new(),
        );
        let (mut s, _) = Session::start(p, HashMap::new(), SessionConfig::default(), now);

        s.complete_set(10, 60.0, now);
        assert_eq!(s.phase(), Phase::Resting);

        let fx = s.jump_to(2, now + Duration::seconds(20));
        assert_eq!(s.phase(), Phase::Active);
        assert_eq!(s.current_slot().unwrap().plan.name, "row");
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::RestLogged {
                kind: RestKind::BetweenSets,
                rest_seconds: 20
            }
        )));
    }

    #[test]
    fn swap_retires_the_slot_and_starts_fresh() {
        let now = Local::now();
        let p = plan(
            vec![exercise("squat", 3, 10, 60), exercise("row", 3, 10, 60)],
            Vec::new(),
        );
        let (mut s, _) = Session::start(p, HashMap::new(), SessionConfig::default(), now);

        s.complete_set(10, 60.0, now);
        s.skip_current(now + Duration::seconds(5));
        let old_id = s.current_slot().unwrap().id;

        let fresh = s
            .swap_exercise(0, exercise("leg press", 3, 12, 60), now + Duration::seconds(10))
            .expect("swap");
        assert_ne!(fresh, old_id);
        assert_eq!(s.current_slot().unwrap().plan.name, "leg press");
        // The new slot starts at zero sets; the old sets stay on the ledger.
        assert_eq!(s.ledger().set_count(fresh), 0);
        assert_eq!(s.ledger().set_count(old_id), 1);
        assert_eq!(s.visible_slots().len(), 2);
    }

    #[test]
    fn dropping_the_last_exercise_moves_on_to_stretch() {
        let now = Local::now();
        let p = plan(vec![exercise("squat", 3, 10, 60)], vec![stretch_step(10)]);
        let (mut s, _) = Session::start(p, HashMap::new(), SessionConfig::default(), now);

        s.remove_exercise(0, now);
        assert_eq!(s.phase(), Phase::Stretch);
    }

    #[test]
    fn set_recorded_against_known_history_detects_pr() {
        let now = Local::now();
        let mut known = HashMap::new();
        known.insert("squat".to_string(), 100.0);
        let p = plan(vec![exercise("squat", 3, 5, 120)], Vec::new());
        let (mut s, _) = Session::start(p, known, SessionConfig::default(), now);

        let fx = s.complete_set(5, 95.0, now);
        assert!(fx.iter().any(|e| matches!(e, Effect::SetRecorded { is_pr: false, .. })));
        s.skip_current(now + Duration::seconds(1));

        let fx = s.complete_set(5, 102.5, now + Duration::seconds(200));
        assert!(fx.iter().any(|e| matches!(e, Effect::SetRecorded { is_pr: true, .. })));
        // The cache was raised: repeating the weight is no longer a record.
        assert_eq!(s.known_max_kg("squat"), Some(102.5));
    }

    #[test]
    fn countdown_cues_surface_during_rest() {
        let now = Local::now();
        let p = plan(vec![exercise("squat", 2, 10, 7)], Vec::new());
        let (mut s, _) = Session::start(p, HashMap::new(), SessionConfig::default(), now);

        s.complete_set(10, 20.0, now);
        let mut cues = Vec::new();
        for i in 1..=7 {
            for e in s.tick(now + Duration::seconds(i)) {
                if let Effect::Cue(c) = e {
                    cues.push(c);
                }
            }
        }
        assert_eq!(cues, vec![5, 3, 2, 1]);
    }
}
