// src/positions.rs - Named position store (JSON)
//
// A named position binds a pose vector to per-channel speeds. The store
// merges a base file with any number of auxiliary files at load time;
// later files extend or override by name. Writes persist immediately.

use crate::kinematics::{CHANNEL_COUNT, Pose};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawPosition {
    angles: Vec<Option<f64>>,
    speeds: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedPosition {
    pub angles: Pose,
    pub speeds: Vec<f64>,
}

impl NamedPosition {
    fn from_raw(raw: RawPosition) -> Self {
        let mut speeds = raw.speeds;
        speeds.truncate(CHANNEL_COUNT);
        speeds.resize(CHANNEL_COUNT, 0.0);
        Self {
            angles: Pose::from_vec(raw.angles),
            speeds,
        }
    }

    fn to_raw(&self) -> RawPosition {
        RawPosition {
            angles: self.angles.as_slice().to_vec(),
            speeds: self.speeds.clone(),
        }
    }
}

#[derive(Debug)]
pub struct PositionStore {
    base_path: PathBuf,
    positions: HashMap<String, NamedPosition>,
}

impl PositionStore {
    /// Loads the base file, then merges each auxiliary file on top of it.
    /// Missing files are tolerated with a warning so a fresh install
    /// starts empty instead of failing.
    pub fn load(base: &Path, extras: &[PathBuf]) -> Result<Self, crate::error::HostError> {
        let mut positions = HashMap::new();
        let mut merged = 0;
        for (index, path) in std::iter::once(&base.to_path_buf()).chain(extras).enumerate() {
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let raw: HashMap<String, RawPosition> = serde_json::from_str(&content)?;
                    merged += raw.len();
                    for (name, position) in raw {
                        positions.insert(name, NamedPosition::from_raw(position));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if index == 0 {
                        tracing::warn!("position file {:?} not found, starting empty", path);
                    } else {
                        tracing::warn!("auxiliary position file {:?} not found, skipped", path);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!(
            "loaded {} named positions ({} entries merged)",
            positions.len(),
            merged
        );
        Ok(Self {
            base_path: base.to_path_buf(),
            positions,
        })
    }

    pub fn empty(base: &Path) -> Self {
        Self {
            base_path: base.to_path_buf(),
            positions: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&NamedPosition> {
        self.positions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Inserts (or overwrites) and persists the whole store immediately.
    pub fn add(
        &mut self,
        name: &str,
        position: NamedPosition,
    ) -> Result<(), crate::error::HostError> {
        self.positions.insert(name.to_string(), position);
        self.persist()
    }

    fn persist(&self) -> Result<(), crate::error::HostError> {
        let raw: HashMap<&str, RawPosition> = self
            .positions
            .iter()
            .map(|(name, p)| (name.as_str(), p.to_raw()))
            .collect();
        let content = serde_json::to_string_pretty(&raw)?;
        std::fs::write(&self.base_path, content)?;
        tracing::debug!("persisted {} positions to {:?}", raw.len(), self.base_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::Channel;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn later_files_override_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_file(
            &dir,
            "base.json",
            r#"{"wave": {"angles": [1.0], "speeds": [5.0]},
                "rest": {"angles": [0.0], "speeds": [1.0]}}"#,
        );
        let extra = write_file(
            &dir,
            "extra.json",
            r#"{"wave": {"angles": [9.0], "speeds": [7.0]},
                "bow": {"angles": [2.0], "speeds": [3.0]}}"#,
        );
        let store = PositionStore::load(&base, &[extra]).unwrap();
        assert_eq!(store.len(), 3);
        let wave = store.get("wave").unwrap();
        assert_eq!(wave.angles.value(Channel::Head), Some(9.0));
        assert!(store.get("bow").is_some());
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn short_vectors_are_right_padded() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_file(
            &dir,
            "base.json",
            r#"{"short": {"angles": [1.0, null, 3.0], "speeds": [4.0]}}"#,
        );
        let store = PositionStore::load(&base, &[]).unwrap();
        let short = store.get("short").unwrap();
        assert_eq!(short.angles.len(), CHANNEL_COUNT);
        assert_eq!(short.angles.value(Channel::Shoulder), None);
        assert_eq!(short.angles.value(Channel::Torso), Some(3.0));
        assert_eq!(short.speeds.len(), CHANNEL_COUNT);
        assert_eq!(short.speeds[0], 4.0);
        assert_eq!(short.speeds[1], 0.0);
    }

    #[test]
    fn add_persists_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("positions.json");
        let mut store = PositionStore::empty(&base);
        store
            .add(
                "hands_up",
                NamedPosition {
                    angles: Pose::from_vec(vec![None, None, Some(45.0)]),
                    speeds: vec![10.0; CHANNEL_COUNT],
                },
            )
            .unwrap();

        let reloaded = PositionStore::load(&base, &[]).unwrap();
        assert_eq!(
            reloaded.get("hands_up").unwrap().angles.value(Channel::Torso),
            Some(45.0)
        );
    }

    #[test]
    fn missing_base_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::load(&dir.path().join("nope.json"), &[]).unwrap();
        assert!(store.is_empty());
    }
}
