use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of one exercise slot within a session.
///
/// Slots keep their id across reorder and removal; swapping an exercise
/// retires the old slot and mints a new id, so per-slot bookkeeping never
/// needs re-keying by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId(Uuid);

impl SlotId {
    pub fn new() -> Self {
        SlotId(Uuid::new_v4())
    }
}

impl Default for SlotId {
    fn default() -> Self {
        SlotId::new()
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A workout plan as imported from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutPlan {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub warmup: Vec<TimedStep>,
    pub exercises: Vec<PlanExercise>,
    pub challenge: Option<PlanExercise>,
    #[serde(default)]
    pub stretch: Vec<TimedStep>,
}

/// A named, fixed-duration step (warmup movement or stretch hold).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedStep {
    pub name: String,
    pub seconds: u32,
}

/// Immutable target definition for one exercise slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExercise {
    pub name: String,
    pub sets: u32,
    /// Target reps per set. A single entry applies to every set; zero or a
    /// missing entry means untargeted.
    #[serde(default)]
    pub reps: Vec<u32>,
    pub target_weight_kg: Option<f32>,
    pub rest_between_sets: Option<u32>,
    pub rest_after: Option<u32>,
    /// Entries sharing a group number form a superset: the between-sets rest
    /// countdown is skipped for them.
    pub superset: Option<u32>,
}

impl PlanExercise {
    /// Target reps for the 1-based set about to be performed, 0 = untargeted.
    pub fn target_reps_for(&self, set_number: u32) -> u32 {
        match self.reps.len() {
            0 => 0,
            1 => self.reps[0],
            _ => self
                .reps
                .get(set_number.saturating_sub(1) as usize)
                .copied()
                .unwrap_or(0),
        }
    }
}

/// One logged performance of reps at a weight.
///
/// Records are immutable once created; an edit replaces the record wholesale,
/// preserving `completed_at` and `target_reps`. Set numbers are positional
/// (list index + 1) and therefore not stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRecord {
    pub reps: u32,
    pub weight_kg: f32,
    pub target_reps: u32,
    pub completed_at: DateTime<Local>,
}

impl SetRecord {
    pub fn differs_from_target(&self) -> bool {
        self.target_reps > 0 && self.reps != self.target_reps
    }

    pub fn accuracy_percent(&self) -> u32 {
        if self.target_reps == 0 {
            100
        } else {
            (self.reps as f32 / self.target_reps as f32 * 100.0).round() as u32
        }
    }

    pub fn met_target(&self) -> bool {
        self.target_reps == 0 || self.reps >= self.target_reps
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestKind {
    BetweenSets,
    BetweenExercises,
}

impl std::fmt::Display for RestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestKind::BetweenSets => write!(f, "between-sets"),
            RestKind::BetweenExercises => write!(f, "between-exercises"),
        }
    }
}

/// Wall-clock gap between two activity points, logged for analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestInterval {
    pub slot: SlotId,
    /// Absent for inter-exercise rests.
    pub set_number: Option<u32>,
    pub rest_seconds: u32,
    pub kind: RestKind,
    pub recorded_at: DateTime<Local>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrinkRecord {
    pub milliliters: u32,
    pub recorded_at: DateTime<Local>,
}

/// Demo media references for an exercise, resolved out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRefs {
    pub image_url: Option<String>,
    pub video_url: Option<String>,
}

/// Load state the session tracks per slot; the content itself is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MediaState {
    #[default]
    Idle,
    Loading,
    Loaded(MediaRefs),
    Failed,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Completed,
    Quit { reason: String },
}

/// Per-exercise rollup inside a summary.
#[derive(Debug, Clone, Serialize)]
pub struct ExerciseSummary {
    pub name: String,
    pub sets_completed: u32,
    pub total_reps: u32,
    pub avg_weight_kg: f32,
    pub time_seconds: u64,
}

/// Serializable end-of-session payload handed to the persistence sink.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub plan_name: String,
    pub started_at: DateTime<Local>,
    pub duration_seconds: u64,
    pub total_completed_sets: u32,
    pub total_reps: u32,
    pub total_volume_kg: f32,
    pub total_rest_seconds: u32,
    pub avg_rest_seconds: u32,
    pub per_exercise: Vec<ExerciseSummary>,
    pub exercises_touched: u32,
    pub progress_percentage: u32,
    pub completed: bool,
    pub quit_reason: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum OneRMFormula {
    Epley,
    Brzycki,
    Lombardi,
    OConner,
}
