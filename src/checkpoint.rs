use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::api_client::ApiResult;
use crate::error::Result;

/// Completed per-slug results, checkpointed to disk so an interrupted batch
/// loses at most the last few offices. The map is a `BTreeMap` so snapshots
/// serialize with slugs sorted and identical state always produces an
/// identical file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProgressState {
    pub completed: BTreeMap<String, ApiResult>,
}

impl ProgressState {
    /// Loads the previous checkpoint if one exists. A missing or unreadable
    /// file starts a fresh batch; resuming is an optimization, never a
    /// requirement.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!("No checkpoint found. Starting fresh.");
            return ProgressState::default();
        }
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to read checkpoint {:?}: {}. Starting fresh.", path, e);
                return ProgressState::default();
            }
        };
        match serde_json::from_str::<ProgressState>(&content) {
            Ok(state) => {
                info!(
                    "Resumed previous session: {} offices already fetched.",
                    state.completed.len()
                );
                state
            }
            Err(e) => {
                error!("Failed to parse checkpoint {:?}: {}. Starting fresh.", path, e);
                ProgressState::default()
            }
        }
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.completed.contains_key(slug)
    }

    pub fn insert(&mut self, result: ApiResult) {
        self.completed.insert(result.slug.clone(), result);
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Writes the snapshot to `path`: sibling temp file first, then renamed
    /// into place, so a reader never observes a torn checkpoint. Each save
    /// fully replaces the previous one. Write failures go to the caller.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = tmp_path(path);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Removes the checkpoint after a completed run, so the next batch does
    /// not silently resume from finished state.
    pub fn clear(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
