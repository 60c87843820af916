//! End-of-session aggregation: one pass over the ledger into the
//! serializable payload handed to the persistence sink.

use crate::models::{ExerciseSummary, Outcome, SessionSummary};

use super::machine::Session;

pub fn build(session: &Session) -> SessionSummary {
    let mut total_sets = 0u32;
    let mut total_reps = 0u32;
    let mut total_volume = 0.0f32;
    let mut per_exercise = Vec::new();

    // Retired slots keep contributing to totals: the work was done.
    for slot in session.slots.iter() {
        let sets = session.ledger.sets_for(slot.id);
        if sets.is_empty() {
            continue;
        }
        let reps: u32 = sets.iter().map(|s| s.reps).sum();
        let volume: f32 = sets.iter().map(|s| s.reps as f32 * s.weight_kg).sum();
        let weight_sum: f32 = sets.iter().map(|s| s.weight_kg).sum();

        total_sets += sets.len() as u32;
        total_reps += reps;
        total_volume += volume;

        per_exercise.push(ExerciseSummary {
            name: slot.plan.name.clone(),
            sets_completed: sets.len() as u32,
            total_reps: reps,
            avg_weight_kg: weight_sum / sets.len() as f32,
            time_seconds: session.ledger.active_seconds(slot.id),
        });
    }

    let rests = session.ledger.rests();
    let total_rest: u32 = rests.iter().map(|r| r.rest_seconds).sum();
    let avg_rest = if rests.is_empty() {
        0
    } else {
        (total_rest as f32 / rests.len() as f32).round() as u32
    };

    // Progress counts the exercises still listed; a slot retired by a swap
    // contributes its sets above but not here.
    let listed: Vec<_> = session.slots.iter().filter(|s| !s.removed).collect();
    let touched = listed
        .iter()
        .filter(|s| !session.ledger.sets_for(s.id).is_empty())
        .count() as u32;
    let progress = if listed.is_empty() {
        100
    } else {
        (touched as f32 / listed.len() as f32 * 100.0).round() as u32
    };

    let (completed, quit_reason) = match &session.outcome {
        Some(Outcome::Quit { reason }) => (false, Some(reason.clone())),
        _ => (true, None),
    };

    SessionSummary {
        plan_name: session.plan.name.clone(),
        started_at: session.started_at,
        duration_seconds: session.elapsed.seconds(),
        total_completed_sets: total_sets,
        total_reps,
        total_volume_kg: total_volume,
        total_rest_seconds: total_rest,
        avg_rest_seconds: avg_rest,
        per_exercise,
        exercises_touched: touched,
        progress_percentage: progress,
        completed,
        quit_reason,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Duration, Local};

    use crate::models::{PlanExercise, WorkoutPlan};
    use crate::session::machine::{Session, SessionConfig};

    fn one_exercise_plan() -> WorkoutPlan {
        WorkoutPlan {
            name: "push day".to_string(),
            description: None,
            warmup: Vec::new(),
            exercises: vec![PlanExercise {
                name: "bench press".to_string(),
                sets: 3,
                reps: vec![10],
                target_weight_kg: None,
                rest_between_sets: Some(60),
                rest_after: None,
                superset: None,
            }],
            challenge: None,
            stretch: Vec::new(),
        }
    }

    #[test]
    fn totals_over_recorded_sets() {
        let now = Local::now();
        let (mut s, _) = Session::start(
            one_exercise_plan(),
            HashMap::new(),
            SessionConfig::default(),
            now,
        );

        s.complete_set(10, 50.0, now + Duration::seconds(60));
        s.skip_current(now + Duration::seconds(90));
        s.complete_set(8, 55.0, now + Duration::seconds(200));
        let fx = s.quit("out of time", now + Duration::seconds(230));

        let summary = fx
            .iter()
            .find_map(|e| match e {
                crate::session::Effect::Finished(s) => Some(s.as_ref()),
                _ => None,
            })
            .expect("summary");

        assert_eq!(summary.total_completed_sets, 2);
        assert_eq!(summary.total_reps, 18);
        assert_eq!(summary.total_volume_kg, 10.0 * 50.0 + 8.0 * 55.0);
        assert_eq!(summary.per_exercise.len(), 1);
        assert_eq!(summary.per_exercise[0].avg_weight_kg, 52.5);
        // One between-sets rest of 30s was logged.
        assert_eq!(summary.total_rest_seconds, 30);
        assert_eq!(summary.avg_rest_seconds, 30);
    }

    #[test]
    fn empty_session_has_full_progress_and_zero_rest_average() {
        let now = Local::now();
        let plan = WorkoutPlan {
            name: "empty".to_string(),
            description: None,
            warmup: Vec::new(),
            exercises: Vec::new(),
            challenge: None,
            stretch: Vec::new(),
        };
        let (_, fx) = Session::start(plan, HashMap::new(), SessionConfig::default(), now);

        let summary = fx
            .iter()
            .find_map(|e| match e {
                crate::session::Effect::Finished(s) => Some(s.as_ref()),
                _ => None,
            })
            .expect("summary");
        assert_eq!(summary.progress_percentage, 100);
        assert_eq!(summary.avg_rest_seconds, 0);
        assert!(summary.completed);
    }
}
