//! File-backed sender rule store.
//!
//! Maps a sender (email address or display name) to a triage rule. The whole
//! mapping lives in memory; every `set` rewrites the backing JSON document
//! before returning, so a successful `set` means the rule is on disk.
//!
//! A missing or unreadable file loads as an empty store. The next `set`
//! recreates it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// Triage directive attached to a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageRule {
    AlwaysImportant,
    AlwaysArchive,
    AlwaysTrash,
    Promotional,
}

impl TriageRule {
    /// Every rule, in declaration order.
    pub const ALL: [TriageRule; 4] = [
        Self::AlwaysImportant,
        Self::AlwaysArchive,
        Self::AlwaysTrash,
        Self::Promotional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlwaysImportant => "always_important",
            Self::AlwaysArchive => "always_archive",
            Self::AlwaysTrash => "always_trash",
            Self::Promotional => "promotional",
        }
    }
}

impl fmt::Display for TriageRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the known rule names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rule '{0}' (expected one of: always_important, always_archive, always_trash, promotional)")]
pub struct UnknownRule(pub String);

impl FromStr for TriageRule {
    type Err = UnknownRule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|rule| rule.as_str() == normalized)
            .ok_or_else(|| UnknownRule(s.to_string()))
    }
}

/// Persistent sender → rule mapping.
pub struct RuleStore {
    path: PathBuf,
    rules: RwLock<BTreeMap<String, TriageRule>>,
    /// Serializes writers across the read-modify-write of the backing file.
    write_lock: Mutex<()>,
}

impl RuleStore {
    /// Load the store from `path`. Never fails: a missing or corrupt file
    /// yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let rules = read_rules(&path);
        info!(path = %path.display(), count = rules.len(), "Rule store loaded");
        Self {
            path,
            rules: RwLock::new(rules),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rule for `sender`, if any.
    pub fn get(&self, sender: &str) -> Option<TriageRule> {
        self.snapshot_guard().get(sender).copied()
    }

    /// Save `rule` for `sender`, replacing any previous rule, and persist the
    /// whole store before returning.
    pub fn set(&self, sender: &str, rule: TriageRule) -> Result<(), StoreError> {
        let _writer = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut next = self.snapshot_guard().clone();
        let previous = next.insert(sender.to_string(), rule);
        write_rules(&self.path, &next)?;

        *self.rules.write().unwrap_or_else(|e| e.into_inner()) = next;
        debug!(sender = %sender, rule = %rule, previous = ?previous, "Rule saved");
        Ok(())
    }

    /// All rules, ordered by sender.
    pub fn list_all(&self) -> BTreeMap<String, TriageRule> {
        self.snapshot_guard().clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot_guard().is_empty()
    }

    fn snapshot_guard(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, TriageRule>> {
        self.rules.read().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_rules(path: &Path) -> BTreeMap<String, TriageRule> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Rule file unreadable, starting empty");
            return BTreeMap::new();
        }
    };

    let entries: BTreeMap<String, String> = match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Rule file is malformed, starting empty");
            return BTreeMap::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|(sender, name)| match name.parse::<TriageRule>() {
            Ok(rule) => Some((sender, rule)),
            Err(e) => {
                warn!(sender = %sender, error = %e, "Skipping rule entry");
                None
            }
        })
        .collect()
}

fn write_rules(path: &Path, rules: &BTreeMap<String, TriageRule>) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(rules)?;
    let write_err = |source: std::io::Error| StoreError::Write {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, json).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}
