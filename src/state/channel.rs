//! Registered channels.

use super::{EntityId, Metadata};
use crate::acl::AccessList;
use crate::casemap::irc_to_lower;
use crate::error::AclError;
use std::collections::{BTreeMap, HashMap};

/// Stable handle for a registered channel. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u32);

/// Mode lock. `on`/`off` are protocol mode bitmasks, opaque to services.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mlock {
    pub on: u32,
    pub off: u32,
    pub limit: u32,
    pub key: Option<String>,
}

/// A registered channel and its access list.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    /// Designated founder. Holds full access whether or not it has an
    /// entry of its own.
    pub founder: Option<EntityId>,
    pub registered: i64,
    pub used: i64,
    /// `MC_*` option flags.
    pub flags: u32,
    pub mlock: Mlock,
    pub metadata: Metadata,
    pub access: AccessList,
}

impl Channel {
    pub fn new(name: &str, registered: i64) -> Self {
        Self {
            name: name.to_string(),
            founder: None,
            registered,
            used: registered,
            flags: 0,
            mlock: Mlock::default(),
            metadata: Metadata::new(),
            access: AccessList::new(),
        }
    }
}

/// Table of registered channels, iterated in registration order.
#[derive(Debug, Default)]
pub struct Channels {
    by_id: BTreeMap<ChannelId, Channel>,
    by_name: HashMap<String, ChannelId>,
    next_id: u32,
}

impl Channels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: Channel) -> Result<ChannelId, AclError> {
        let key = irc_to_lower(&channel.name);
        if self.by_name.contains_key(&key) {
            return Err(AclError::ChannelExists(channel.name));
        }
        let id = ChannelId(self.next_id);
        self.next_id += 1;
        self.by_name.insert(key, id);
        self.by_id.insert(id, channel);
        Ok(id)
    }

    pub fn remove(&mut self, id: ChannelId) -> Option<Channel> {
        let channel = self.by_id.remove(&id)?;
        self.by_name.remove(&irc_to_lower(&channel.name));
        Some(channel)
    }

    pub fn find(&self, name: &str) -> Option<ChannelId> {
        self.by_name.get(&irc_to_lower(name)).copied()
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.by_id.get_mut(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Channel> {
        self.find(name).and_then(|id| self.by_id.get(&id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &Channel)> {
        self.by_id.iter().map(|(id, c)| (*id, c))
    }

    pub fn ids(&self) -> Vec<ChannelId> {
        self.by_id.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
