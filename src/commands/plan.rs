use std::{collections::HashSet, fs::read_to_string};

use anyhow::{Context, Result};
use colored::Colorize;
use itertools::Itertools;
use serde::Deserialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::{
    cli::PlanCmd,
    models::{PlanExercise, TimedStep, WorkoutPlan},
    types::{OutputFmt, emit},
};

#[derive(Debug, Deserialize)]
struct PlanToml {
    name: String,
    description: Option<String>,
    warmup: Option<Vec<StepToml>>,
    exercise: Vec<ExerciseToml>,
    challenge: Option<ExerciseToml>,
    stretch: Option<Vec<StepToml>>,
}

#[derive(Debug, Deserialize)]
struct StepToml {
    name: String,
    seconds: u32,
}

#[derive(Debug, Deserialize)]
struct ExerciseToml {
    name: String,
    sets: u32,
    reps: Option<Vec<u32>>,
    target_weight_kg: Option<f32>,
    rest_between_sets: Option<u32>,
    rest_after: Option<u32>,
    superset: Option<u32>,
    image_url: Option<String>,
    video_url: Option<String>,
}

#[derive(serde::Serialize)]
struct PlanJson {
    idx: i64,
    name: String,
    description: String,
    created_at: String,
    exercises: i64,
}

pub async fn handle(cmd: PlanCmd, pool: &SqlitePool, fmt: OutputFmt) -> Result<()> {
    match cmd {
        PlanCmd::Import { files } => {
            if files.is_empty() {
                println!("{} no plan file provided", "warning:".yellow().bold());
            }
            for f in files {
                match import_single_plan(pool, &f).await {
                    Ok(()) => {}
                    Err(e) => {
                        if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
                            if io_err.kind() == std::io::ErrorKind::NotFound {
                                println!(
                                    "{} cannot open file `{}` – file not found",
                                    "error:".red().bold(),
                                    f
                                );
                                continue;
                            }
                        }
                        return Err(e);
                    }
                }
            }
        }

        PlanCmd::List => {
            let rows = sqlx::query(
                r#"
                SELECT ROW_NUMBER() OVER (ORDER BY name) AS idx,
                       id, name,
                       COALESCE(description,'') AS description,
                       created_at
                FROM   plans
                ORDER  BY idx
                "#,
            )
            .fetch_all(pool)
            .await?;

            let mut plans = Vec::<PlanJson>::new();
            for r in &rows {
                let id: String = r.get("id");
                let exercises: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM plan_exercises WHERE plan_id = ? AND is_challenge = 0",
                )
                .bind(&id)
                .fetch_one(pool)
                .await?;

                plans.push(PlanJson {
                    idx: r.get("idx"),
                    name: r.get("name"),
                    description: r.get("description"),
                    created_at: r.get("created_at"),
                    exercises,
                });
            }

            emit(fmt, &plans, || {
                if plans.is_empty() {
                    println!("{}", "  (no plans found)".dimmed());
                    return;
                }
                println!("{}", "Plans:".cyan().bold());
                for p in &plans {
                    let idx = format!("{}", p.idx).yellow();
                    let desc = if p.description.is_empty() {
                        String::new()
                    } else {
                        format!("– {}", p.description).dimmed().to_string()
                    };
                    println!(
                        " {} • {} {} {}",
                        idx,
                        p.name.bold(),
                        desc,
                        format!("({} exercises, added {})", p.exercises, &p.created_at[..10])
                            .dimmed()
                    );
                }
            });
        }

        PlanCmd::Show { plan } => {
            let Some(loaded) = load_plan(pool, &plan).await? else {
                println!("{} no plan matching `{}`", "error:".red().bold(), plan);
                return Ok(());
            };

            println!(
                "{} {} {}",
                "Plan:".cyan().bold(),
                loaded.name.bold(),
                loaded
                    .description
                    .as_deref()
                    .map(|d| format!("– {}", d))
                    .unwrap_or_default()
                    .dimmed()
            );

            if !loaded.warmup.is_empty() {
                println!("\n{}", "Warmup:".cyan().bold());
                for s in &loaded.warmup {
                    println!("  • {} ({}s)", s.name, s.seconds);
                }
            }

            println!("\n{}", "Exercises:".cyan().bold());
            for (i, e) in loaded.exercises.iter().enumerate() {
                let idx = format!("{}", i + 1).yellow();
                let reps = if e.reps.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", e.reps.iter().map(ToString::to_string).join(","))
                };
                let superset = e
                    .superset
                    .map(|g| format!(" [superset {}]", g))
                    .unwrap_or_default();
                println!(
                    " {} • {} — {} sets{}{}",
                    idx,
                    e.name.bold(),
                    e.sets,
                    reps,
                    superset.dimmed()
                );
            }

            if let Some(c) = &loaded.challenge {
                println!("\n{} {} — {} sets", "Challenge:".cyan().bold(), c.name.bold(), c.sets);
            }

            if !loaded.stretch.is_empty() {
                println!("\n{}", "Stretch:".cyan().bold());
                for s in &loaded.stretch {
                    println!("  • {} ({}s)", s.name, s.seconds);
                }
            }
        }

        PlanCmd::Delete { plan } => {
            let Some(id) = resolve_plan_id(pool, &plan).await? else {
                println!("{} no plan matching `{}`", "error:".red().bold(), plan);
                return Ok(());
            };
            let name: String = sqlx::query_scalar("SELECT name FROM plans WHERE id = ?")
                .bind(&id)
                .fetch_one(pool)
                .await?;

            sqlx::query("DELETE FROM plans WHERE id = ?")
                .bind(&id)
                .execute(pool)
                .await?;

            println!("{} deleted plan `{}`", "ok:".green().bold(), name);
        }
    }
    Ok(())
}

pub async fn import_single_plan(pool: &SqlitePool, file: &str) -> Result<()> {
    let toml_str = read_to_string(file).with_context(|| format!("reading `{file}`"))?;
    let plan: PlanToml = toml::from_str(&toml_str).with_context(|| format!("parsing `{file}`"))?;

    // Duplicate exercise names inside one plan break name-keyed history.
    let mut seen = HashSet::new();
    let dup: Vec<&str> = plan
        .exercise
        .iter()
        .map(|e| e.name.as_str())
        .filter(|n| !seen.insert(*n))
        .collect();
    if !dup.is_empty() {
        println!(
            "{} plan `{}` has duplicate exercises: {} – skipped",
            "warning:".yellow().bold(),
            plan.name,
            dup.join(", ")
        );
        return Ok(());
    }

    // Transactional import.
    let mut tx = pool.begin().await?;

    let plan_id = Uuid::new_v4().to_string();
    let res = sqlx::query(
        r#"INSERT INTO plans (id,name,description,created_at)
               VALUES (?1,?2,?3,datetime('now'))"#,
    )
    .bind(&plan_id)
    .bind(&plan.name)
    .bind(plan.description.as_deref())
    .execute(&mut *tx)
    .await;

    if let Err(sqlx::Error::Database(db_err)) = &res {
        if db_err.code() == Some("2067".into()) {
            println!(
                "{} plan `{}` already exists – skipping",
                "warning:".yellow().bold(),
                plan.name
            );
            tx.rollback().await?;
            return Ok(());
        }
    }
    res?;

    for (phase, steps) in [("warmup", &plan.warmup), ("stretch", &plan.stretch)] {
        for (i, step) in steps.iter().flatten().enumerate() {
            sqlx::query(
                r#"INSERT INTO plan_steps (id,plan_id,phase,name,seconds,order_index)
                       VALUES (?1,?2,?3,?4,?5,?6)"#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&plan_id)
            .bind(phase)
            .bind(&step.name)
            .bind(step.seconds as i64)
            .bind(i as i64)
            .execute(&mut *tx)
            .await?;
        }
    }

    let challenge_iter = plan.challenge.iter().map(|c| (true, c));
    for (order_idx, (is_challenge, ex)) in plan
        .exercise
        .iter()
        .map(|e| (false, e))
        .chain(challenge_iter)
        .enumerate()
    {
        let reps_csv = ex
            .reps
            .as_ref()
            .map(|v| v.iter().map(ToString::to_string).join(","));

        sqlx::query(
            r#"INSERT INTO plan_exercises
                 (id,plan_id,name,sets,reps,target_weight_kg,rest_between_sets,
                  rest_after,superset_group,is_challenge,order_index)
               VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&plan_id)
        .bind(&ex.name)
        .bind(ex.sets as i64)
        .bind(reps_csv)
        .bind(ex.target_weight_kg)
        .bind(ex.rest_between_sets.map(|v| v as i64))
        .bind(ex.rest_after.map(|v| v as i64))
        .bind(ex.superset.map(|v| v as i64))
        .bind(is_challenge as i32)
        .bind(order_idx as i64)
        .execute(&mut *tx)
        .await?;

        // Demo media rides along with the plan file.
        if ex.image_url.is_some() || ex.video_url.is_some() {
            sqlx::query(
                r#"INSERT OR REPLACE INTO exercise_media (exercise_name,image_url,video_url)
                       VALUES (?1,?2,?3)"#,
            )
            .bind(&ex.name)
            .bind(ex.image_url.as_deref())
            .bind(ex.video_url.as_deref())
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    println!("{} `{}`", "ok:".green().bold(), plan.name);
    Ok(())
}

/// Resolve a plan given either its `p list` row number or its exact name.
async fn resolve_plan_id(pool: &SqlitePool, ident: &str) -> Result<Option<String>> {
    if let Ok(idx) = ident.parse::<i64>() {
        let id = sqlx::query_scalar(
            r#"
            SELECT id
            FROM (
              SELECT id, ROW_NUMBER() OVER (ORDER BY name) AS rn
              FROM plans
            ) t
            WHERE t.rn = ?
            "#,
        )
        .bind(idx)
        .fetch_optional(pool)
        .await?;
        Ok(id)
    } else {
        let id = sqlx::query_scalar("SELECT id FROM plans WHERE name = ?")
            .bind(ident)
            .fetch_optional(pool)
            .await?;
        Ok(id)
    }
}

/// Load a full plan, ready to drive a session.
pub async fn load_plan(pool: &SqlitePool, ident: &str) -> Result<Option<WorkoutPlan>> {
    let Some(plan_id) = resolve_plan_id(pool, ident).await? else {
        return Ok(None);
    };

    let (name, description): (String, Option<String>) =
        sqlx::query_as("SELECT name, description FROM plans WHERE id = ?")
            .bind(&plan_id)
            .fetch_one(pool)
            .await?;

    let mut warmup = Vec::new();
    let mut stretch = Vec::new();
    let steps = sqlx::query_as::<_, (String, String, i64)>(
        "SELECT phase, name, seconds FROM plan_steps WHERE plan_id = ? ORDER BY phase, order_index",
    )
    .bind(&plan_id)
    .fetch_all(pool)
    .await?;
    for (phase, step_name, seconds) in steps {
        let step = TimedStep {
            name: step_name,
            seconds: seconds as u32,
        };
        match phase.as_str() {
            "warmup" => warmup.push(step),
            _ => stretch.push(step),
        }
    }

    let rows = sqlx::query_as::<
        _,
        (
            String,
            i64,
            Option<String>,
            Option<f32>,
            Option<i64>,
            Option<i64>,
            Option<i64>,
            i64,
        ),
    >(
        r#"
        SELECT name, sets, reps, target_weight_kg, rest_between_sets,
               rest_after, superset_group, is_challenge
        FROM plan_exercises
        WHERE plan_id = ?
        ORDER BY order_index
        "#,
    )
    .bind(&plan_id)
    .fetch_all(pool)
    .await?;

    let mut exercises = Vec::new();
    let mut challenge = None;
    for (ex_name, sets, reps_csv, target_weight, rest_between, rest_after, superset, is_challenge) in
        rows
    {
        let entry = PlanExercise {
            name: ex_name,
            sets: sets as u32,
            reps: reps_csv
                .as_deref()
                .map(|s| s.split(',').filter_map(|v| v.trim().parse().ok()).collect())
                .unwrap_or_default(),
            target_weight_kg: target_weight,
            rest_between_sets: rest_between.map(|v| v as u32),
            rest_after: rest_after.map(|v| v as u32),
            superset: superset.map(|v| v as u32),
        };
        if is_challenge != 0 {
            challenge = Some(entry);
        } else {
            exercises.push(entry);
        }
    }

    Ok(Some(WorkoutPlan {
        name,
        description,
        warmup,
        exercises,
        challenge,
        stretch,
    }))
}
