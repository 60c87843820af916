use anyhow::Result;
use chrono::NaiveDate;
use colored::Colorize;
use sqlx::{Row, SqlitePool};

use crate::{
    types::{OutputFmt, emit},
    utils::format_seconds,
};

#[derive(serde::Serialize)]
struct LogJson {
    started_at: String,
    plan_name: String,
    duration_seconds: i64,
    total_sets: i64,
    total_reps: i64,
    total_volume_kg: f32,
    progress_percentage: i64,
    completed: bool,
    quit_reason: Option<String>,
}

#[derive(serde::Serialize)]
struct PrJson {
    exercise: String,
    weight_kg: f32,
    reps: i64,
    estimated_1rm: f32,
    date: String,
}

pub async fn handle(cmd: crate::cli::HistoryCmd, pool: &SqlitePool, fmt: OutputFmt) -> Result<()> {
    match cmd {
        crate::cli::HistoryCmd::List { limit } => list(pool, limit, fmt).await,
        crate::cli::HistoryCmd::Show { date } => show(pool, &date).await,
        crate::cli::HistoryCmd::Prs { exercise } => prs(pool, exercise.as_deref(), fmt).await,
    }
}

async fn list(pool: &SqlitePool, limit: u32, fmt: OutputFmt) -> Result<()> {
    let rows = sqlx::query(
        r#"
        SELECT started_at, plan_name, duration_seconds, total_sets, total_reps,
               total_volume_kg, progress_percentage, completed, quit_reason
        FROM   workout_logs
        ORDER  BY started_at DESC
        LIMIT  ?
        "#,
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    let logs: Vec<LogJson> = rows
        .iter()
        .map(|r| LogJson {
            started_at: r.get("started_at"),
            plan_name: r.get("plan_name"),
            duration_seconds: r.get("duration_seconds"),
            total_sets: r.get("total_sets"),
            total_reps: r.get("total_reps"),
            total_volume_kg: r.get("total_volume_kg"),
            progress_percentage: r.get("progress_percentage"),
            completed: r.get::<i64, _>("completed") != 0,
            quit_reason: r.get("quit_reason"),
        })
        .collect();

    emit(fmt, &logs, || {
        if logs.is_empty() {
            println!("{}", "  (no sessions logged)".dimmed());
            return;
        }
        println!("{}", "Sessions:".cyan().bold());
        for l in &logs {
            let state = if l.completed {
                "done".green().to_string()
            } else {
                format!("quit: {}", l.quit_reason.as_deref().unwrap_or("?"))
                    .yellow()
                    .to_string()
            };
            println!(
                " {} • {} — {} sets, {} reps, {:.1}kg | {} | {}",
                l.started_at[..10].to_string().yellow(),
                l.plan_name.bold(),
                l.total_sets,
                l.total_reps,
                l.total_volume_kg,
                format_seconds(l.duration_seconds.max(0) as u64).dimmed(),
                state
            );
        }
    });
    Ok(())
}

async fn show(pool: &SqlitePool, date: &str) -> Result<()> {
    let Ok(parsed) = NaiveDate::parse_from_str(date, "%d-%m-%Y") else {
        println!(
            "{} invalid date `{}` – expected DD-MM-YYYY",
            "error:".red().bold(),
            date
        );
        return Ok(());
    };
    let day = parsed.format("%Y-%m-%d").to_string();

    let sessions = sqlx::query_as::<_, (String, String, i64, i64)>(
        r#"
        SELECT id, plan_name, duration_seconds, total_sets
        FROM   workout_logs
        WHERE  started_at LIKE ? || '%'
        ORDER  BY started_at
        "#,
    )
    .bind(&day)
    .fetch_all(pool)
    .await?;

    if sessions.is_empty() {
        println!("{} no sessions on {}", "error:".red().bold(), date);
        return Ok(());
    }

    for (id, plan_name, duration, total_sets) in sessions {
        println!(
            "{} {} — {} sets ({})",
            "Session:".cyan().bold(),
            plan_name.bold(),
            total_sets,
            format_seconds(duration.max(0) as u64)
        );

        let sets = sqlx::query_as::<_, (String, i64, i64, f32, i64)>(
            r#"
            SELECT exercise_name, set_number, reps, weight_kg, target_reps
            FROM   set_logs
            WHERE  workout_id = ?
            ORDER  BY exercise_name, set_number
            "#,
        )
        .bind(&id)
        .fetch_all(pool)
        .await?;

        let mut last_exercise = String::new();
        for (exercise, set_number, reps, weight, target) in sets {
            if exercise != last_exercise {
                println!("• {}", exercise.bold());
                last_exercise = exercise;
            }
            let miss = if target > 0 && reps < target {
                format!(" ({} target)", target).yellow().to_string()
            } else {
                String::new()
            };
            println!(
                "  {} • {:.1}kg × {}{}",
                format!("{}", set_number).yellow(),
                weight,
                reps,
                miss
            );
        }
        println!();
    }
    Ok(())
}

async fn prs(pool: &SqlitePool, exercise: Option<&str>, fmt: OutputFmt) -> Result<()> {
    let rows = match exercise {
        Some(name) => {
            sqlx::query(
                r#"
                SELECT exercise_name, weight_kg, reps, estimated_1rm, date
                FROM   personal_records
                WHERE  exercise_name = ?
                ORDER  BY date DESC
                "#,
            )
            .bind(name)
            .fetch_all(pool)
            .await?
        }
        // Latest best per exercise.
        None => {
            sqlx::query(
                r#"
                SELECT pr.exercise_name, pr.weight_kg, pr.reps, pr.estimated_1rm, pr.date
                FROM   personal_records pr
                JOIN (
                    SELECT exercise_name, MAX(estimated_1rm) AS best
                    FROM personal_records
                    GROUP BY exercise_name
                ) top ON top.exercise_name = pr.exercise_name AND top.best = pr.estimated_1rm
                ORDER  BY pr.exercise_name
                "#,
            )
            .fetch_all(pool)
            .await?
        }
    };

    let records: Vec<PrJson> = rows
        .iter()
        .map(|r| PrJson {
            exercise: r.get("exercise_name"),
            weight_kg: r.get("weight_kg"),
            reps: r.get("reps"),
            estimated_1rm: r.get("estimated_1rm"),
            date: r.get("date"),
        })
        .collect();

    emit(fmt, &records, || {
        if records.is_empty() {
            println!("{}", "  (no records yet)".dimmed());
            return;
        }
        println!("{}", "Personal records:".cyan().bold());
        for r in &records {
            println!(
                " • {} — {} (1RM: {:.1}kg) {}",
                r.exercise.bold(),
                format!("{:.1}kg × {}", r.weight_kg, r.reps).red().bold(),
                r.estimated_1rm,
                r.date[..10].to_string().dimmed()
            );
        }
    });
    Ok(())
}
