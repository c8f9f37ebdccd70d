use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Days spent in each mood before the cycle moves on.
pub const MOOD_PERIOD_DAYS: u32 = 7;

/// Fixed mood calendar. Entry `i` covers days `7i+1 ..= 7i+7`, wrapping after the last.
pub const MOOD_CYCLE: [(&str, &[&str]); 7] = [
    ("optimistic", &["early mornings"]),
    ("determined", &["muscle soreness"]),
    ("tired but focused", &["motivation dips"]),
    ("energized", &["balancing work and training"]),
    ("reflective", &["self-doubt", "weather"]),
    ("confident", &["nothing specific"]),
    ("grateful", &["the long journey"]),
];

pub fn mood_index(day: u32) -> usize {
    ((day.max(1) - 1) / MOOD_PERIOD_DAYS) as usize % MOOD_CYCLE.len()
}

/// Who the persona is. Static for the run.
#[derive(Debug, Clone)]
pub struct PersonaIdentity {
    pub name: String,
    pub description: String,
    pub challenge_length_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoodContext {
    pub mood: String,
    pub struggles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaState {
    pub day: u32,
    pub total_distance: u32,
    pub mood: String,
    pub struggles: Vec<String>,
}

/// On-disk checkpoint. Mood is derived, so only the counters are kept.
#[derive(Debug, Serialize, Deserialize)]
struct PersonaCheckpoint {
    day: u32,
    total_distance: u32,
}

impl PersonaState {
    pub fn seed() -> Self {
        Self::at(1, 0)
    }

    pub fn at(day: u32, total_distance: u32) -> Self {
        let day = day.max(1);
        let (mood, struggles) = MOOD_CYCLE[mood_index(day)];
        Self {
            day,
            total_distance,
            mood: mood.to_string(),
            struggles: struggles.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Move to the next day after a successful publish.
    pub fn advance(&self, distance_delta: u32) -> Self {
        Self::at(
            self.day.saturating_add(1),
            self.total_distance.saturating_add(distance_delta),
        )
    }

    pub fn mood_context(&self) -> MoodContext {
        MoodContext {
            mood: self.mood.clone(),
            struggles: self.struggles.clone(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "day {} | {} km | mood '{}' | struggles: {}",
            self.day,
            self.total_distance,
            self.mood,
            self.struggles.join(", ")
        )
    }

    pub fn load_checkpoint(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let checkpoint_err = |reason: String| ConfigError::Checkpoint {
            path: path.display().to_string(),
            reason,
        };
        let raw = fs::read_to_string(path).map_err(|e| checkpoint_err(e.to_string()))?;
        let checkpoint: PersonaCheckpoint =
            toml::from_str(&raw).map_err(|e| checkpoint_err(e.to_string()))?;
        Ok(Some(Self::at(checkpoint.day, checkpoint.total_distance)))
    }

    pub fn save_checkpoint(&self, path: &Path) -> anyhow::Result<()> {
        let checkpoint = PersonaCheckpoint {
            day: self.day,
            total_distance: self.total_distance,
        };
        fs::write(path, toml::to_string_pretty(&checkpoint)?)?;
        Ok(())
    }
}
