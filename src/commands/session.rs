use std::collections::HashMap;
use std::io::Write as _;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::Local;
use colored::Colorize;
use sqlx::SqlitePool;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::cli::{SessionCmd, StartArgs};
use crate::commands::plan;
use crate::models::{MediaRefs, MediaState, SessionSummary, SlotId};
use crate::session::{Effect, Phase, Session, suggest};
use crate::storage;
use crate::types::{Config, WeightUnit, best_exercise_suggestion, config_path};
use crate::utils::format_seconds;

pub async fn handle(cmd: SessionCmd, pool: &SqlitePool) -> Result<()> {
    match cmd {
        SessionCmd::Start(args) => run(args, pool).await,
    }
}

/// A resolved enrichment result landing back on the event loop.
enum Patch {
    Media { slot: SlotId, refs: Option<MediaRefs> },
}

/// One line typed at the in-session prompt.
#[derive(Debug, Clone, PartialEq)]
enum Action {
    Set { reps: u32, weight: Option<f32> },
    Edit { exercise: usize, set: usize, reps: u32, weight: f32 },
    Delete { exercise: usize, set: usize },
    Skip,
    Done,
    Jump(String),
    Swap { exercise: usize, name: String },
    Drop(usize),
    Drink(u32),
    Pause,
    Resume,
    Status,
    Yes,
    No,
    Quit(String),
    Help,
}

fn parse_action(input: &str) -> Result<Action, String> {
    let mut parts = input.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Err(String::new());
    };
    let rest: Vec<&str> = parts.collect();

    let num = |s: &str| s.parse::<u32>().map_err(|_| format!("`{}` is not a number", s));
    let weight = |s: &str| {
        s.parse::<f32>()
            .map_err(|_| format!("`{}` is not a weight", s))
    };

    match cmd.to_ascii_lowercase().as_str() {
        "set" => match rest.as_slice() {
            [reps] => Ok(Action::Set {
                reps: num(reps)?,
                weight: None,
            }),
            [reps, w] => Ok(Action::Set {
                reps: num(reps)?,
                weight: Some(weight(w)?),
            }),
            _ => Err("usage: set <reps> [weight]".to_string()),
        },
        "edit" => match rest.as_slice() {
            [ex, set, reps, w] => Ok(Action::Edit {
                exercise: num(ex)? as usize,
                set: num(set)? as usize,
                reps: num(reps)?,
                weight: weight(w)?,
            }),
            _ => Err("usage: edit <exercise> <set> <reps> <weight>".to_string()),
        },
        "del" | "delete" => match rest.as_slice() {
            [ex, set] => Ok(Action::Delete {
                exercise: num(ex)? as usize,
                set: num(set)? as usize,
            }),
            _ => Err("usage: del <exercise> <set>".to_string()),
        },
        "skip" => Ok(Action::Skip),
        "done" => Ok(Action::Done),
        "jump" | "j" => match rest.as_slice() {
            [] => Err("usage: jump <exercise>".to_string()),
            _ => Ok(Action::Jump(rest.join(" "))),
        },
        "swap" => match rest.as_slice() {
            [ex, name @ ..] if !name.is_empty() => Ok(Action::Swap {
                exercise: num(ex)? as usize,
                name: name.join(" "),
            }),
            _ => Err("usage: swap <exercise> <new name>".to_string()),
        },
        "drop" => match rest.as_slice() {
            [ex] => Ok(Action::Drop(num(ex)? as usize)),
            _ => Err("usage: drop <exercise>".to_string()),
        },
        "drink" => match rest.as_slice() {
            [ml] => Ok(Action::Drink(num(ml)?)),
            _ => Err("usage: drink <ml>".to_string()),
        },
        "pause" => Ok(Action::Pause),
        "resume" => Ok(Action::Resume),
        "status" | "st" => Ok(Action::Status),
        "yes" | "y" => Ok(Action::Yes),
        "no" | "n" => Ok(Action::No),
        "quit" | "q" => Ok(Action::Quit(if rest.is_empty() {
            "user_quit".to_string()
        } else {
            rest.join(" ")
        })),
        "help" | "?" => Ok(Action::Help),
        other => Err(format!("unknown command `{}` – try `help`", other)),
    }
}

async fn run(args: StartArgs, pool: &SqlitePool) -> Result<()> {
    let cfg = Config::load(&config_path()?)?;
    let unit = args
        .unit
        .as_deref()
        .and_then(WeightUnit::parse)
        .unwrap_or_else(|| cfg.unit());

    let Some(workout) = plan::load_plan(pool, &args.plan).await? else {
        println!("{} no plan matching `{}`", "error:".red().bold(), args.plan);
        return Ok(());
    };

    // Seed the record cache before the session starts; a failed lookup only
    // costs the PR flags, never the session.
    let mut names: Vec<String> = workout.exercises.iter().map(|e| e.name.clone()).collect();
    if let Some(c) = &workout.challenge {
        names.push(c.name.clone());
    }
    let seed = match storage::known_max_seed(pool, &names).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("history lookup failed: {e}");
            HashMap::new()
        }
    };

    println!(
        "{} {} {}",
        "Session:".cyan().bold(),
        workout.name.bold(),
        format!("(weights in {})", unit.suffix()).dimmed()
    );
    println!("{}", "Exercises:".cyan().bold());
    for (i, e) in workout.exercises.iter().enumerate() {
        let idx = format!("{}", i + 1).yellow();
        let best = seed
            .get(&e.name)
            .map(|&w| format!(" – best {:.1}{}", unit.from_kg(w), unit.suffix()))
            .unwrap_or_default();
        println!(
            " {} • {} — {} sets{}",
            idx,
            e.name.bold(),
            e.sets,
            best.dimmed()
        );
    }
    println!("{}", "(type `help` for session commands)".dimmed());

    let (mut session, fx) = Session::start(workout, seed, cfg.session_config(), Local::now());

    let (patch_tx, mut patch_rx) = mpsc::channel::<Patch>(16);
    let mut finished = apply_effects(&mut session, fx, pool, &patch_tx, unit);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(StdDuration::from_secs(1));
    // The first tick fires immediately; burn it so second one lands at +1s.
    ticker.tick().await;

    while finished.is_none() {
        tokio::select! {
            _ = ticker.tick() => {
                let fx = session.tick(Local::now());
                finished = apply_effects(&mut session, fx, pool, &patch_tx, unit);
                show_countdown(&session);
            }
            line = lines.next_line() => {
                match line? {
                    Some(text) => {
                        let fx = dispatch(&mut session, &text, unit);
                        finished = apply_effects(&mut session, fx, pool, &patch_tx, unit);
                    }
                    // stdin closed under us: end the session, keep the data.
                    None => {
                        let fx = session.quit("terminal_closed", Local::now());
                        finished = apply_effects(&mut session, fx, pool, &patch_tx, unit);
                    }
                }
            }
            Some(patch) = patch_rx.recv() => {
                match patch {
                    Patch::Media { slot, refs } => session.apply_media(slot, refs),
                }
            }
        }
    }

    let Some(summary) = finished else {
        return Ok(());
    };

    // The sink may fail; the user still gets the locally-computed summary.
    let saved = match storage::save_session(pool, &session, &summary).await {
        Ok(saved) => Some(saved),
        Err(e) => {
            tracing::warn!("could not persist session: {e}");
            None
        }
    };
    print_summary(&summary, saved.as_ref(), unit);
    Ok(())
}

/// Map one typed line onto the machine.
fn dispatch(session: &mut Session, input: &str, unit: WeightUnit) -> Vec<Effect> {
    let action = match parse_action(input) {
        Ok(a) => a,
        Err(msg) => {
            if !msg.is_empty() {
                println!("{} {}", "error:".red().bold(), msg);
            }
            return Vec::new();
        }
    };
    let now = Local::now();

    match action {
        Action::Set { reps, weight } => {
            if session.phase() != Phase::Active {
                println!(
                    "{} not in an active exercise (phase: {})",
                    "warning:".yellow().bold(),
                    session.phase()
                );
                return Vec::new();
            }
            let weight_kg = weight.map(|w| unit.to_kg(w)).unwrap_or_else(|| {
                session
                    .weight_hint
                    .or_else(|| session.current_slot().and_then(|s| s.plan.target_weight_kg))
                    .unwrap_or(0.0)
            });
            session.complete_set(reps, weight_kg, now)
        }

        Action::Edit {
            exercise,
            set,
            reps,
            weight,
        } => {
            let Some(slot_index) = resolve_display_index(session, exercise) else {
                println!("{} no exercise at index {}", "warning:".yellow().bold(), exercise);
                return Vec::new();
            };
            if session.edit_set(slot_index, set.saturating_sub(1), reps, unit.to_kg(weight)) {
                println!("{} updated set {}-{}", "ok:".green().bold(), exercise, set);
            } else {
                println!(
                    "{} no set {} for exercise {}",
                    "warning:".yellow().bold(),
                    set,
                    exercise
                );
            }
            Vec::new()
        }

        Action::Delete { exercise, set } => {
            let Some(slot_index) = resolve_display_index(session, exercise) else {
                println!("{} no exercise at index {}", "warning:".yellow().bold(), exercise);
                return Vec::new();
            };
            if session.delete_set(slot_index, set.saturating_sub(1)) {
                println!("{} removed set {}-{}", "ok:".green().bold(), exercise, set);
            } else {
                println!(
                    "{} no set {} for exercise {}",
                    "warning:".yellow().bold(),
                    set,
                    exercise
                );
            }
            Vec::new()
        }

        Action::Skip => session.skip_current(now),

        Action::Done => match session.phase() {
            Phase::Stretch => session.finish_stretches(now),
            _ => session.skip_current(now),
        },

        Action::Jump(target) => {
            let Some(slot_index) = resolve_exercise(session, &target) else {
                return Vec::new();
            };
            session.jump_to(slot_index, now)
        }

        Action::Swap { exercise, name } => {
            let Some(slot_index) = resolve_display_index(session, exercise) else {
                println!("{} no exercise at index {}", "warning:".yellow().bold(), exercise);
                return Vec::new();
            };
            // The replacement inherits the retired slot's targets.
            let mut replacement = session.slots()[slot_index].plan.clone();
            let old_name = std::mem::replace(&mut replacement.name, name.clone());
            match session.swap_exercise(slot_index, replacement, now) {
                Some(_) => {
                    println!(
                        "{} swapped {} with {}",
                        "ok:".green().bold(),
                        old_name.bold(),
                        name.bold()
                    );
                }
                None => println!("{} could not swap exercise {}", "warning:".yellow().bold(), exercise),
            }
            Vec::new()
        }

        Action::Drop(exercise) => {
            let Some(slot_index) = resolve_display_index(session, exercise) else {
                println!("{} no exercise at index {}", "warning:".yellow().bold(), exercise);
                return Vec::new();
            };
            let name = session.slots()[slot_index].plan.name.clone();
            let fx = session.remove_exercise(slot_index, now);
            println!("{} dropped {}", "ok:".green().bold(), name.bold());
            fx
        }

        Action::Drink(ml) => {
            session.log_drink(ml, now);
            println!("{} logged {}ml", "ok:".green().bold(), ml);
            Vec::new()
        }

        Action::Pause => {
            session.pause();
            println!("{} paused – timers frozen", "info:".blue().bold());
            Vec::new()
        }

        Action::Resume => {
            session.resume();
            println!("{} resumed", "info:".blue().bold());
            Vec::new()
        }

        Action::Status => {
            print_status(session, unit);
            Vec::new()
        }

        Action::Yes => session.accept_challenge(now),
        Action::No => session.decline_challenge(now),

        Action::Quit(reason) => session.quit(&reason, now),

        Action::Help => {
            print_help();
            Vec::new()
        }
    }
}

/// 1-based display index → slot list index.
fn resolve_display_index(session: &Session, display: usize) -> Option<usize> {
    session
        .visible_slots()
        .get(display.checked_sub(1)?)
        .copied()
}

/// Index-or-name resolution with a typo suggestion on miss.
fn resolve_exercise(session: &Session, target: &str) -> Option<usize> {
    if let Ok(display) = target.parse::<usize>() {
        let resolved = resolve_display_index(session, display);
        if resolved.is_none() {
            println!("{} no exercise at index {}", "warning:".yellow().bold(), display);
        }
        return resolved;
    }

    let wanted = target.to_ascii_lowercase();
    let visible = session.visible_slots();
    if let Some(&i) = visible
        .iter()
        .find(|&&i| session.slots()[i].plan.name.to_ascii_lowercase() == wanted)
    {
        return Some(i);
    }

    let names: Vec<String> = visible
        .iter()
        .map(|&i| session.slots()[i].plan.name.clone())
        .collect();
    match best_exercise_suggestion(target, &names) {
        Some(s) => println!(
            "{} no exercise named `{}` – did you mean `{}`?",
            "warning:".yellow().bold(),
            target,
            s
        ),
        None => println!("{} no exercise named `{}`", "warning:".yellow().bold(), target),
    }
    None
}

/// Carry out machine effects: prints, async lookups, hint computation.
/// Returns the summary once a `Finished` effect shows up.
fn apply_effects(
    session: &mut Session,
    effects: Vec<Effect>,
    pool: &SqlitePool,
    patch_tx: &mpsc::Sender<Patch>,
    unit: WeightUnit,
) -> Option<Box<SessionSummary>> {
    let mut finished = None;
    for effect in effects {
        match effect {
            Effect::Cue(n) => {
                // Terminal bell as the audio cue.
                print!("\x07");
                let _ = std::io::stdout().flush();
                if n == 1 {
                    println!();
                }
            }

            Effect::PhaseChanged(phase) => match phase {
                Phase::Active => {
                    if let Some(slot) = session.current_slot() {
                        let set_number = session.ledger().set_count(slot.id) + 1;
                        let target = slot.plan.target_reps_for(set_number);
                        let target_txt = if target > 0 {
                            format!(" – target {} reps", target)
                        } else {
                            String::new()
                        };
                        println!(
                            "\n{} {} — set {}/{}{}",
                            "Now:".cyan().bold(),
                            slot.plan.name.bold(),
                            set_number,
                            slot.plan.sets,
                            target_txt.dimmed()
                        );
                    }
                }
                Phase::Resting => println!("{}", "Resting…".cyan()),
                Phase::Transitioning => println!("{}", "Transition…".cyan()),
                Phase::Stretch => println!("\n{}", "Stretch time.".cyan().bold()),
                Phase::Complete => println!("\n{}", "Workout complete!".green().bold()),
                Phase::Warmup | Phase::Challenge => {}
            },

            Effect::WarmupStep { name, seconds, .. } => {
                println!("{} {} ({}s)", "Warmup:".cyan().bold(), name.bold(), seconds);
            }

            Effect::StretchStep { name, seconds, .. } => {
                println!("{} {} ({}s)", "Stretch:".cyan().bold(), name.bold(), seconds);
            }

            Effect::FetchMedia { slot, exercise } => {
                let pool = pool.clone();
                let tx = patch_tx.clone();
                tokio::spawn(async move {
                    let refs = match storage::media_for(&pool, &exercise).await {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!("media lookup failed for `{exercise}`: {e}");
                            None
                        }
                    };
                    let _ = tx.send(Patch::Media { slot, refs }).await;
                });
            }

            Effect::SuggestRest {
                slot,
                accuracy_percent,
                planned_rest,
            } => {
                if planned_rest > 0 {
                    let hint = suggest::rest_suggestion(planned_rest, accuracy_percent);
                    session.apply_rest_hint(slot, hint);
                    if hint > planned_rest {
                        println!(
                            "{}",
                            format!("  hint: consider {}s rest after that set", hint).dimmed()
                        );
                    }
                }
            }

            Effect::SuggestWeight { slot, exercise } => {
                let target = session
                    .slots()
                    .iter()
                    .find(|s| s.id == slot)
                    .and_then(|s| s.plan.target_weight_kg);
                if let Some(kg) = suggest::starting_weight_kg(target, session.known_max_kg(&exercise))
                {
                    session.apply_weight_hint(slot, kg);
                    println!(
                        "{}",
                        format!(
                            "  hint: start around {:.1}{}",
                            unit.from_kg(kg),
                            unit.suffix()
                        )
                        .dimmed()
                    );
                }
            }

            Effect::SetRecorded {
                set_number,
                is_pr,
                too_fast,
                ..
            } => {
                println!("{} logged set {}", "ok:".green().bold(), set_number);
                if is_pr {
                    println!("{} new personal record!", "note:".yellow().bold());
                }
                if too_fast {
                    println!(
                        "{} that set came in suspiciously fast",
                        "warning:".yellow().bold()
                    );
                }
            }

            Effect::RestLogged { rest_seconds, .. } => {
                println!("{}", format!("  rested {}s", rest_seconds).dimmed());
            }

            Effect::ChallengeOffered { exercise } => {
                println!(
                    "\n{} one more? {} — yes / no",
                    "Challenge:".cyan().bold(),
                    exercise.bold()
                );
            }

            Effect::Finished(summary) => finished = Some(summary),
        }
    }
    finished
}

/// Inline countdown line, rewritten in place each second.
fn show_countdown(session: &Session) {
    if session.is_paused() {
        return;
    }
    if let Some(remaining) = session.countdown_remaining() {
        let label = match session.phase() {
            Phase::Warmup => "warmup",
            Phase::Resting => "rest",
            Phase::Transitioning => "next in",
            Phase::Stretch => "stretch",
            _ => return,
        };
        print!("\r  {} {:>3}s   ", label.dimmed(), remaining);
        let _ = std::io::stdout().flush();
    }
}

fn print_status(session: &Session, unit: WeightUnit) {
    println!(
        "{} {} | elapsed {}{}",
        "Status:".cyan().bold(),
        session.phase(),
        format_seconds(session.elapsed_seconds()),
        if session.is_paused() { " (paused)" } else { "" }
    );

    for (display, &i) in session.visible_slots().iter().enumerate() {
        let slot = &session.slots()[i];
        let done = session.ledger().set_count(slot.id);
        let marker = if session.current_slot().is_some_and(|c| c.id == slot.id) {
            "›"
        } else {
            " "
        };
        let media = match session.media.get(&slot.id) {
            Some(MediaState::Loading) => " [media…]",
            Some(MediaState::Loaded(_)) => " [media]",
            Some(MediaState::Failed) => " [no media]",
            _ => "",
        };
        println!(
            " {} {} • {} — {}/{} sets{}",
            marker.cyan(),
            format!("{}", display + 1).yellow(),
            slot.plan.name.bold(),
            done,
            slot.plan.sets,
            media.dimmed()
        );
        for (si, set) in session.ledger().sets_for(slot.id).iter().enumerate() {
            println!(
                "     {} • {:.1}{} × {}",
                format!("{}", si + 1).yellow(),
                unit.from_kg(set.weight_kg),
                unit.suffix(),
                set.reps
            );
        }
    }
}

fn print_help() {
    println!("{}", "Session commands:".cyan().bold());
    for (cmd, desc) in [
        ("set <reps> [weight]", "log a set for the active exercise"),
        ("edit <ex> <set> <reps> <weight>", "fix an already-logged set"),
        ("del <ex> <set>", "remove a logged set"),
        ("skip", "skip warmup / rest / transition / stretch step"),
        ("done", "finish all remaining stretches"),
        ("jump <ex|name>", "make any exercise active"),
        ("swap <ex> <name>", "replace an exercise"),
        ("drop <ex>", "remove an exercise from the session"),
        ("drink <ml>", "log water intake"),
        ("pause / resume", "freeze or unfreeze the timers"),
        ("status", "show the session state"),
        ("quit [reason]", "end the session early"),
    ] {
        println!("  {:<32} {}", cmd.green(), desc);
    }
}

fn print_summary(summary: &SessionSummary, saved: Option<&storage::SavedLog>, unit: WeightUnit) {
    println!(
        "\n{} {} — {} ({})",
        "Summary:".cyan().bold(),
        summary.plan_name.bold(),
        format_seconds(summary.duration_seconds),
        if summary.completed {
            "completed".green().to_string()
        } else {
            format!(
                "quit: {}",
                summary.quit_reason.as_deref().unwrap_or("unknown")
            )
            .yellow()
            .to_string()
        }
    );
    println!(
        "  {} sets, {} reps, {:.1}{} volume",
        summary.total_completed_sets,
        summary.total_reps,
        unit.from_kg(summary.total_volume_kg),
        unit.suffix()
    );
    println!(
        "  rest {}s total, {}s average | progress {}%",
        summary.total_rest_seconds, summary.avg_rest_seconds, summary.progress_percentage
    );

    for ex in &summary.per_exercise {
        println!(
            "  • {} — {} sets, {} reps, avg {:.1}{}, {}",
            ex.name.bold(),
            ex.sets_completed,
            ex.total_reps,
            unit.from_kg(ex.avg_weight_kg),
            unit.suffix(),
            format_seconds(ex.time_seconds).dimmed()
        );
    }

    match saved {
        Some(log) => {
            for record in &log.new_records {
                println!(
                    "{} new record: {} {:.1}{} × {} (1RM {:.1}{})",
                    "note:".yellow().bold(),
                    record.exercise.bold(),
                    unit.from_kg(record.weight_kg),
                    unit.suffix(),
                    record.reps,
                    unit.from_kg(record.estimated_1rm),
                    unit.suffix()
                );
            }
            println!("{} saved (log id: {})", "ok:".green().bold(), log.workout_id);
        }
        None => println!(
            "{} session not saved – totals above are local only",
            "warning:".yellow().bold()
        ),
    }
}
