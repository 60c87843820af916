//! SQLite persistence: the sink a finished session is handed to, plus the
//! read-only lookups (known maxes, media) consumed while one is running.

use std::collections::HashMap;

use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{MediaRefs, OneRMFormula, SessionSummary};
use crate::session::Session;
use crate::utils::calculate_1rm;

/// What the sink reports back after a save.
#[derive(Debug)]
pub struct SavedLog {
    pub workout_id: String,
    /// Records newly established by this session, for display only.
    pub new_records: Vec<DetectedRecord>,
}

#[derive(Debug)]
pub struct DetectedRecord {
    pub exercise: String,
    pub weight_kg: f32,
    pub reps: u32,
    pub estimated_1rm: f32,
}

/// Persist a finished (or quit) session: the summary row, every set, the
/// rest and drink logs, and any personal records the session established.
pub async fn save_session(
    pool: &SqlitePool,
    session: &Session,
    summary: &SessionSummary,
) -> Result<SavedLog> {
    let mut tx = pool.begin().await?;

    let workout_id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO workout_logs
            (id, plan_name, started_at, duration_seconds, total_sets, total_reps,
             total_volume_kg, total_rest_seconds, avg_rest_seconds,
             progress_percentage, completed, quit_reason)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&workout_id)
    .bind(&summary.plan_name)
    .bind(summary.started_at.to_rfc3339())
    .bind(summary.duration_seconds as i64)
    .bind(summary.total_completed_sets as i64)
    .bind(summary.total_reps as i64)
    .bind(summary.total_volume_kg)
    .bind(summary.total_rest_seconds as i64)
    .bind(summary.avg_rest_seconds as i64)
    .bind(summary.progress_percentage as i64)
    .bind(summary.completed as i32)
    .bind(summary.quit_reason.as_deref())
    .execute(&mut *tx)
    .await?;

    // Slot ids are session-local; logs carry the exercise name.
    let mut names = HashMap::new();
    for slot in session.slots() {
        names.insert(slot.id, slot.plan.name.clone());
    }

    for slot in session.slots() {
        for (i, set) in session.ledger().sets_for(slot.id).iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO set_logs
                    (id, workout_id, exercise_name, set_number, reps, weight_kg,
                     target_reps, completed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&workout_id)
            .bind(&slot.plan.name)
            .bind((i + 1) as i64)
            .bind(set.reps as i64)
            .bind(set.weight_kg)
            .bind(set.target_reps as i64)
            .bind(set.completed_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
    }

    for rest in session.ledger().rests() {
        let name = names.get(&rest.slot).cloned().unwrap_or_default();
        sqlx::query(
            r#"
            INSERT INTO rest_logs
                (id, workout_id, exercise_name, set_number, rest_seconds, kind, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&workout_id)
        .bind(name)
        .bind(rest.set_number.map(|n| n as i64))
        .bind(rest.rest_seconds as i64)
        .bind(rest.kind.to_string())
        .bind(rest.recorded_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    for drink in session.ledger().drinks() {
        sqlx::query(
            "INSERT INTO drink_logs (id, workout_id, milliliters, recorded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&workout_id)
        .bind(drink.milliliters as i64)
        .bind(drink.recorded_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    // Personal-record pass: the best set of each exercise this session,
    // ranked by estimated 1RM, against the stored records.
    let mut new_records = Vec::new();
    for slot in session.slots() {
        let sets = session.ledger().sets_for(slot.id);
        let Some(best) = sets
            .iter()
            .filter(|s| s.weight_kg > 0.0)
            .max_by(|a, b| {
                let a_rm = calculate_1rm(a.weight_kg, a.reps, OneRMFormula::Epley);
                let b_rm = calculate_1rm(b.weight_kg, b.reps, OneRMFormula::Epley);
                a_rm.partial_cmp(&b_rm).unwrap_or(std::cmp::Ordering::Equal)
            })
        else {
            continue;
        };
        let best_1rm = calculate_1rm(best.weight_kg, best.reps, OneRMFormula::Epley);

        let current: Option<f32> = sqlx::query_scalar(
            "SELECT MAX(estimated_1rm) FROM personal_records WHERE exercise_name = ?",
        )
        .bind(&slot.plan.name)
        .fetch_one(&mut *tx)
        .await?;

        if current.map_or(true, |c| best_1rm > c) {
            sqlx::query(
                r#"
                INSERT INTO personal_records
                    (id, exercise_name, weight_kg, reps, estimated_1rm, date)
                VALUES (?, ?, ?, ?, ?, datetime('now'))
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&slot.plan.name)
            .bind(best.weight_kg)
            .bind(best.reps as i64)
            .bind(best_1rm)
            .execute(&mut *tx)
            .await?;

            new_records.push(DetectedRecord {
                exercise: slot.plan.name.clone(),
                weight_kg: best.weight_kg,
                reps: best.reps,
                estimated_1rm: best_1rm,
            });
        }
    }

    tx.commit().await?;

    Ok(SavedLog {
        workout_id,
        new_records,
    })
}

/// Best known weight per exercise, seeded at session start: the all-time
/// record first, otherwise the heaviest historical set on file.
pub async fn known_max_seed(
    pool: &SqlitePool,
    exercise_names: &[String],
) -> Result<HashMap<String, f32>> {
    let mut seed = HashMap::new();
    for name in exercise_names {
        let record: Option<f32> = sqlx::query_scalar(
            "SELECT MAX(weight_kg) FROM personal_records WHERE exercise_name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await?;

        let max = match record {
            Some(w) => Some(w),
            None => {
                sqlx::query_scalar("SELECT MAX(weight_kg) FROM set_logs WHERE exercise_name = ?")
                    .bind(name)
                    .fetch_one(pool)
                    .await?
            }
        };

        if let Some(w) = max {
            seed.insert(name.clone(), w);
        }
    }
    Ok(seed)
}

/// Demo media for an exercise, if any is on file.
pub async fn media_for(pool: &SqlitePool, exercise_name: &str) -> Result<Option<MediaRefs>> {
    let row: Option<(Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT image_url, video_url FROM exercise_media WHERE exercise_name = ?",
    )
    .bind(exercise_name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(image_url, video_url)| MediaRefs {
        image_url,
        video_url,
    }))
}
