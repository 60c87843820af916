//! Advisory hints computed from session context: a rest-duration nudge after
//! a hard set and a starting-weight proposal from known history.
//!
//! These are enrichments, not rules. The driver runs them fire-and-forget and
//! patches the result into the session display state whenever it arrives; the
//! phase machine never waits for one.

/// Extra rest granted per 20 percentage points short of the rep target.
const EXTRA_REST_STEP_SECONDS: u32 = 15;
/// An advisory never extends the planned rest by more than this.
const MAX_EXTRA_REST_SECONDS: u32 = 60;

/// Rest duration to propose for the upcoming set.
///
/// A set that hit its target keeps the planned rest; falling short earns
/// proportionally more recovery time.
pub fn rest_suggestion(planned_rest: u32, accuracy_percent: u32) -> u32 {
    if accuracy_percent >= 100 {
        return planned_rest;
    }
    let shortfall = 100 - accuracy_percent;
    let extra = (shortfall / 20 + 1) * EXTRA_REST_STEP_SECONDS;
    planned_rest + extra.min(MAX_EXTRA_REST_SECONDS)
}

/// Starting weight to propose when an exercise becomes active.
///
/// The plan's target wins outright; otherwise work at 80% of the best weight
/// on record, rounded down to the nearest 2.5 kg plate increment.
pub fn starting_weight_kg(target_weight_kg: Option<f32>, known_max_kg: Option<f32>) -> Option<f32> {
    if let Some(target) = target_weight_kg {
        return Some(target);
    }
    let max = known_max_kg.filter(|&m| m > 0.0)?;
    let working = max * 0.8;
    Some((working / 2.5).floor() * 2.5)
}
