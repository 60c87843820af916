use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

use crate::session::SessionConfig;

/// Whether listing output goes to a human or a pipe.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum OutputFmt {
    Plain,
    Json,
}

/// Emit `payload` as JSON, or run the pretty printer.
pub fn emit<T: Serialize>(fmt: OutputFmt, payload: &T, pretty: impl FnOnce()) {
    match fmt {
        OutputFmt::Json => match serde_json::to_string_pretty(payload) {
            Ok(s) => println!("{}", s),
            Err(e) => tracing::warn!("could not serialize output: {e}"),
        },
        OutputFmt::Plain => pretty(),
    }
}

pub const LB_PER_KG: f32 = 2.204_622_6;

/// Display unit for weights. Storage is always kilograms; conversion happens
/// only at the presentation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightUnit {
    #[default]
    Kg,
    Lb,
}

impl WeightUnit {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kg" | "kgs" | "kilograms" => Some(WeightUnit::Kg),
            "lb" | "lbs" | "pounds" => Some(WeightUnit::Lb),
            _ => None,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            WeightUnit::Kg => "kg",
            WeightUnit::Lb => "lb",
        }
    }

    /// Kilograms → display value.
    pub fn from_kg(&self, kg: f32) -> f32 {
        match self {
            WeightUnit::Kg => kg,
            WeightUnit::Lb => kg * LB_PER_KG,
        }
    }

    /// User-entered value → kilograms.
    pub fn to_kg(&self, value: f32) -> f32 {
        match self {
            WeightUnit::Kg => value,
            WeightUnit::Lb => value / LB_PER_KG,
        }
    }
}

/// Key/value config persisted as TOML under the user config dir.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub map: BTreeMap<String, String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config `{}`", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config `{}`", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config dir `{}`", parent.display()))?;
        }
        let content = toml::to_string(self)?;
        fs::write(path, content).with_context(|| format!("writing config `{}`", path.display()))
    }

    fn get_u32(&self, key: &str) -> Option<u32> {
        self.map.get(key).and_then(|v| v.parse().ok())
    }

    pub fn unit(&self) -> WeightUnit {
        self.map
            .get("unit")
            .and_then(|v| WeightUnit::parse(v))
            .unwrap_or_default()
    }

    /// Session durations, config keys overriding the built-in defaults.
    pub fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            default_rest_between_sets: self
                .get_u32("default_rest_seconds")
                .unwrap_or(defaults.default_rest_between_sets),
            transition_seconds: self
                .get_u32("transition_seconds")
                .unwrap_or(defaults.transition_seconds),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("liftflow").join("config"))
        .context("Could not determine config directory")
}

/// Return the closest known exercise name for `input`
/// if similarity ≥ 0.80 *and* clearly better than the runner-up.
/// Otherwise return `None` (no suggestion shown).
pub fn best_exercise_suggestion<'a>(input: &str, candidates: &'a [String]) -> Option<&'a str> {
    if candidates.is_empty() {
        return None;
    }

    let inp = input.to_ascii_lowercase();

    // Collect (name, score) pairs.
    let mut scores: Vec<(&'a str, f64)> = candidates
        .iter()
        .map(|c| (c.as_str(), jaro_winkler(&inp, &c.to_ascii_lowercase())))
        .collect();

    // Highest score first.
    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (best, best_score) = scores[0];
    let second_score = scores.get(1).map(|(_, s)| *s).unwrap_or(0.0);

    const MIN_SCORE: f64 = 0.80;
    const GAP: f64 = 0.02;

    if best_score >= MIN_SCORE && best_score - second_score >= GAP {
        Some(best)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversion_is_a_display_transform() {
        let lb = WeightUnit::Lb;
        assert!((lb.from_kg(100.0) - 220.462_26).abs() < 0.001);
        assert!((lb.to_kg(225.0) - 102.058).abs() < 0.01);
        assert_eq!(WeightUnit::Kg.from_kg(60.0), 60.0);
    }

    #[test]
    fn unit_parsing() {
        assert_eq!(WeightUnit::parse("KG"), Some(WeightUnit::Kg));
        assert_eq!(WeightUnit::parse("lbs"), Some(WeightUnit::Lb));
        assert_eq!(WeightUnit::parse("stone"), None);
    }

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("liftflow").join("config");

        let mut cfg = Config::default();
        cfg.map.insert("unit".to_string(), "lb".to_string());
        cfg.map
            .insert("transition_seconds".to_string(), "10".to_string());
        cfg.save(&path).expect("save");

        let loaded = Config::load(&path).expect("load");
        assert_eq!(loaded.unit(), WeightUnit::Lb);
        assert_eq!(loaded.session_config().transition_seconds, 10);
        // Unset keys fall back to the built-in defaults.
        assert_eq!(loaded.session_config().default_rest_between_sets, 90);
    }

    #[test]
    fn missing_config_file_is_empty() {
        let cfg = Config::load(Path::new("/nonexistent/liftflow/config")).expect("load");
        assert!(cfg.map.is_empty());
        assert_eq!(cfg.unit(), WeightUnit::Kg);
    }

    #[test]
    fn suggestion_needs_a_clear_winner() {
        let names = vec![
            "bench press".to_string(),
            "shoulder press".to_string(),
            "deadlift".to_string(),
        ];
        assert_eq!(best_exercise_suggestion("dedlift", &names), Some("deadlift"));
        assert_eq!(best_exercise_suggestion("xyzzy", &names), None);
    }
}
