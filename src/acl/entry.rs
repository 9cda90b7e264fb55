//! Channel access entries and the per-channel ordered list holding them.

use crate::casemap::irc_to_lower;
use crate::flags::Bitmask;
use crate::state::{EntityId, Metadata};
use std::collections::{BTreeMap, HashMap};

/// Who an entry applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccessTarget {
    /// A registered account or group.
    Entity(EntityId),
    /// A `nick!user@host` pattern, possibly with wildcards.
    Host(String),
}

impl AccessTarget {
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            AccessTarget::Entity(id) => Some(*id),
            AccessTarget::Host(_) => None,
        }
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            AccessTarget::Host(mask) => Some(mask),
            AccessTarget::Entity(_) => None,
        }
    }

    fn key(&self) -> AccessKey {
        match self {
            AccessTarget::Entity(id) => AccessKey::Entity(*id),
            AccessTarget::Host(mask) => AccessKey::Host(irc_to_lower(mask)),
        }
    }
}

/// Exact-match identity of an entry within one channel. Masks compare
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AccessKey {
    Entity(EntityId),
    Host(String),
}

/// One access entry (chanacs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChanAcs {
    pub target: AccessTarget,
    pub level: Bitmask,
    /// When the level last changed.
    pub tmodified: i64,
    /// Account name of whoever last changed the entry.
    pub setter: Option<String>,
    pub metadata: Metadata,
}

impl ChanAcs {
    pub fn new(target: AccessTarget, level: Bitmask, tmodified: i64) -> Self {
        Self {
            target,
            level,
            tmodified,
            setter: None,
            metadata: Metadata::new(),
        }
    }
}

/// Ordered access list of one channel.
///
/// Iteration is insertion order. That order is what the database writer
/// walks and what the hostmask first-match rule relies on, so it is part
/// of the contract. At most one entry exists per key.
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    entries: BTreeMap<u64, ChanAcs>,
    by_key: HashMap<AccessKey, u64>,
    next_seq: u64,
}

impl AccessList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChanAcs> {
        self.entries.values()
    }

    pub fn get(&self, target: &AccessTarget) -> Option<&ChanAcs> {
        let seq = self.by_key.get(&target.key())?;
        self.entries.get(seq)
    }

    pub(crate) fn get_mut(&mut self, target: &AccessTarget) -> Option<&mut ChanAcs> {
        let seq = self.by_key.get(&target.key())?;
        self.entries.get_mut(seq)
    }

    /// Append an entry. Returns it back if its key is already present.
    pub(crate) fn push(&mut self, entry: ChanAcs) -> Result<(), ChanAcs> {
        let key = entry.target.key();
        if self.by_key.contains_key(&key) {
            return Err(entry);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_key.insert(key, seq);
        self.entries.insert(seq, entry);
        Ok(())
    }

    pub(crate) fn remove(&mut self, target: &AccessTarget) -> Option<ChanAcs> {
        let seq = self.by_key.remove(&target.key())?;
        self.entries.remove(&seq)
    }

    /// Entity entries in list order.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &ChanAcs)> {
        self.entries
            .values()
            .filter_map(|e| e.target.entity().map(|id| (id, e)))
    }

    /// Hostmask entries in list order.
    pub fn hosts(&self) -> impl Iterator<Item = (&str, &ChanAcs)> {
        self.entries
            .values()
            .filter_map(|e| e.target.host().map(|m| (m, e)))
    }

    /// Targets of all entries, in list order.
    pub(crate) fn targets(&self) -> Vec<AccessTarget> {
        self.entries.values().map(|e| e.target.clone()).collect()
    }
}
