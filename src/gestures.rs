// src/gestures.rs - Gesture tables, loaded per emotion category
//
// A gesture is a weighted, ordered sequence of tokens alternating numeric
// delays (seconds) and named-position references. Tables are immutable at
// runtime; only the playback mutual-exclusion flag (owned by the
// scheduler) changes.

use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum GestureToken {
    /// Pause for this many seconds.
    Delay(f64),
    /// Move to this named position.
    Position(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawToken {
    Delay(f64),
    Position(String),
}

#[derive(Debug, Clone, Deserialize)]
struct RawGesture {
    id: String,
    #[serde(default = "default_weight")]
    weight: f64,
    tokens: Vec<RawToken>,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gesture {
    pub id: String,
    pub weight: f64,
    pub tokens: Vec<GestureToken>,
}

impl Gesture {
    fn from_raw(raw: RawGesture) -> Self {
        let tokens = raw
            .tokens
            .into_iter()
            .map(|t| match t {
                RawToken::Delay(seconds) => GestureToken::Delay(seconds),
                RawToken::Position(name) => GestureToken::Position(name),
            })
            .collect();
        Self {
            id: raw.id,
            weight: raw.weight.max(0.0),
            tokens,
        }
    }
}

/// Per-emotion-category gesture tables.
#[derive(Debug, Default)]
pub struct GestureLibrary {
    categories: HashMap<String, Vec<Gesture>>,
}

impl GestureLibrary {
    pub fn load(path: &Path) -> Result<Self, crate::error::HostError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("gesture file {:?} not found, starting empty", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let raw: HashMap<String, Vec<RawGesture>> = serde_json::from_str(&content)?;
        let categories: HashMap<String, Vec<Gesture>> = raw
            .into_iter()
            .map(|(category, list)| {
                (category, list.into_iter().map(Gesture::from_raw).collect())
            })
            .collect();
        let total: usize = categories.values().map(Vec::len).sum();
        tracing::info!(
            "loaded {} gestures across {} categories",
            total,
            categories.len()
        );
        Ok(Self { categories })
    }

    pub fn category(&self, name: &str) -> Option<&[Gesture]> {
        self.categories.get(name).map(Vec::as_slice)
    }

    pub fn get(&self, category: &str, id: &str) -> Option<&Gesture> {
        self.categories.get(category)?.iter().find(|g| g.id == id)
    }

    /// Weighted random pick from a category; `None` when the category is
    /// unknown, empty, or has zero total weight.
    pub fn pick<R: Rng>(&self, category: &str, rng: &mut R) -> Option<&Gesture> {
        let gestures = self.categories.get(category)?;
        let total: f64 = gestures.iter().map(|g| g.weight).sum();
        if total <= 0.0 {
            return None;
        }
        let mut roll = rng.random_range(0.0..total);
        for gesture in gestures {
            if roll < gesture.weight {
                return Some(gesture);
            }
            roll -= gesture.weight;
        }
        gestures.last()
    }
}
