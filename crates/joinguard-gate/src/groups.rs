//! Known groups
//!
//! Every group the bot has seen traffic from, for operator listing and
//! broadcast targeting. Not part of the verification state machine.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use joinguard_common::{GroupId, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::store::{read_snapshot, write_snapshot};

/// Metadata about a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub id: GroupId,
    pub title: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Registry of known groups with optional JSON persistence
pub struct GroupRegistry {
    groups: DashMap<GroupId, GroupInfo>,
    path: Option<PathBuf>,
}

impl GroupRegistry {
    /// Volatile registry
    pub fn in_memory() -> Self {
        Self {
            groups: DashMap::new(),
            path: None,
        }
    }

    /// Load the registry persisted at `path`, if any
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let groups = DashMap::new();
        for info in read_snapshot::<GroupInfo>(&path).await? {
            groups.insert(info.id, info);
        }
        info!(path = %path.display(), count = groups.len(), "loaded group registry");
        Ok(Self {
            groups,
            path: Some(path),
        })
    }

    /// Record activity in a group. Returns true if the group is new or
    /// its title changed, i.e. the registry should be persisted.
    pub fn observe(&self, id: GroupId, title: &str, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        self.groups
            .entry(id)
            .and_modify(|info| {
                if info.title != title {
                    info.title = title.to_string();
                    changed = true;
                }
                info.last_seen = now;
            })
            .or_insert_with(|| {
                debug!(group = %id, title, "new group");
                changed = true;
                GroupInfo {
                    id,
                    title: title.to_string(),
                    first_seen: now,
                    last_seen: now,
                }
            });
        changed
    }

    /// Drop a group, e.g. after the bot was removed from it
    pub fn forget(&self, id: GroupId) -> Option<GroupInfo> {
        self.groups.remove(&id).map(|(_, info)| info)
    }

    pub fn get(&self, id: GroupId) -> Option<GroupInfo> {
        self.groups.get(&id).map(|g| g.clone())
    }

    pub fn contains(&self, id: GroupId) -> bool {
        self.groups.contains_key(&id)
    }

    /// All groups, sorted by title then id
    pub fn list(&self) -> Vec<GroupInfo> {
        let mut groups: Vec<GroupInfo> = self.groups.iter().map(|g| g.clone()).collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the registry to its file; no-op for volatile registries
    pub async fn persist(&self) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => write_snapshot(path, &self.list()).await,
            None => Ok(()),
        }
    }
}
