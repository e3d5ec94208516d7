//! Challenge definitions and the read-only catalog that serves them.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use hacksim_types::error::{HackError, Result};
use hacksim_vfs::{FilesystemSnapshot, VirtualFilesystem};
use serde::{Deserialize, Serialize};

use crate::objective::Objective;

/// A static mission definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Score awarded on first completion.
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub hints: Vec<String>,
    /// Directory path -> ordered child names.
    #[serde(default)]
    pub initial_files: BTreeMap<String, Vec<String>>,
    /// File path -> initial text.
    #[serde(default)]
    pub initial_file_contents: BTreeMap<String, String>,
    #[serde(default, rename = "objective")]
    pub objectives: Vec<Objective>,
}

impl Challenge {
    /// Build the file system a fresh attempt starts from.
    pub fn initial_vfs(&self) -> Result<VirtualFilesystem> {
        VirtualFilesystem::from_snapshot(FilesystemSnapshot {
            entries: self.initial_files.clone(),
            contents: self.initial_file_contents.clone(),
        })
    }

    /// Check ids, rules and the initial file system.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(HackError::Config("challenge id must not be empty".to_string()));
        }
        if self.objectives.is_empty() {
            return Err(HackError::Config(format!(
                "challenge {} has no objectives",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        for objective in &self.objectives {
            if !seen.insert(objective.id.as_str()) {
                return Err(HackError::Config(format!(
                    "challenge {}: duplicate objective id {}",
                    self.id, objective.id
                )));
            }
            objective.rule.validate().map_err(|e| {
                HackError::Config(format!("challenge {}/{}: {e}", self.id, objective.id))
            })?;
        }
        self.initial_vfs().map_err(|e| {
            HackError::Config(format!("challenge {}: bad initial files: {e}", self.id))
        })?;
        Ok(())
    }
}

/// Read-only source of challenge definitions.
pub trait ChallengeCatalog: Send + Sync {
    /// Look up a challenge by id.
    fn get(&self, challenge_id: &str) -> Result<Option<Arc<Challenge>>>;
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    challenge: Vec<Challenge>,
}

/// Catalog held entirely in memory, typically loaded from TOML.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    challenges: BTreeMap<String, Arc<Challenge>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validated challenge. Ids must be unique.
    pub fn insert(&mut self, challenge: Challenge) -> Result<()> {
        challenge.validate()?;
        if self.challenges.contains_key(&challenge.id) {
            return Err(HackError::Config(format!(
                "duplicate challenge id {}",
                challenge.id
            )));
        }
        self.challenges
            .insert(challenge.id.clone(), Arc::new(challenge));
        Ok(())
    }

    /// Parse a catalog from TOML `[[challenge]]` tables.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(text)?;
        let mut catalog = Self::new();
        for challenge in file.challenge {
            catalog.insert(challenge)?;
        }
        Ok(catalog)
    }

    /// Load a catalog file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&text)?;
        log::info!(
            "Loaded {} challenges from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Challenge ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.challenges.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

impl ChallengeCatalog for MemoryCatalog {
    fn get(&self, challenge_id: &str) -> Result<Option<Arc<Challenge>>> {
        Ok(self.challenges.get(challenge_id).cloned())
    }
}
