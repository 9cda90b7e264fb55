//! Entry store operations: grant, revoke, lookup and enumeration.
//!
//! An entry exists only while its level is non-zero. Every path that can
//! bring a level to zero deletes the entry in the same call, and the
//! entity reverse index is updated alongside the channel list.

use super::{AccessTarget, ChanAcs};
use crate::error::AclError;
use crate::flags::codec::{bitmask_to_flags, change_to_flags};
use crate::flags::{Bitmask, CA_NONE};
use crate::state::{ChannelId, EntityId, ServiceState, check_word, now};
use tracing::debug;

/// Who is performing a change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    /// Recorded as the entry's setter.
    pub setter: Option<String>,
    /// Ignore the per-channel entry cap.
    pub bypass_limit: bool,
}

impl Actor {
    /// A regular user acting through a channel command.
    pub fn user(name: &str) -> Self {
        Self {
            setter: Some(name.to_string()),
            bypass_limit: false,
        }
    }

    /// A services operator using override.
    pub fn operator(name: &str) -> Self {
        Self {
            setter: Some(name.to_string()),
            bypass_limit: true,
        }
    }

    /// Services itself (registration, founder transfer, repairs).
    pub fn system() -> Self {
        Self {
            setter: None,
            bypass_limit: true,
        }
    }
}

/// Outcome of [`ServiceState::add_or_merge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessChange {
    Created(ChanAcs),
    Modified { entry: ChanAcs, old_level: Bitmask },
    /// The level dropped to zero and the entry was deleted.
    Removed(ChanAcs),
    /// Nothing changed. Carries the existing entry, if any.
    Unchanged(Option<ChanAcs>),
}

impl AccessChange {
    /// The entry as it exists after the change.
    pub fn entry(&self) -> Option<&ChanAcs> {
        match self {
            AccessChange::Created(e)
            | AccessChange::Modified { entry: e, .. }
            | AccessChange::Unchanged(Some(e)) => Some(e),
            AccessChange::Removed(_) | AccessChange::Unchanged(None) => None,
        }
    }

    /// Level after the change; zero if no entry remains.
    pub fn level(&self) -> Bitmask {
        self.entry().map_or(CA_NONE, |e| e.level)
    }
}

impl ServiceState {
    pub(crate) fn channel_id(&self, name: &str) -> Result<ChannelId, AclError> {
        self.channels
            .find(name)
            .ok_or_else(|| AclError::NoSuchChannel(name.to_string()))
    }

    fn check_target(&self, target: &AccessTarget) -> Result<(), AclError> {
        match target {
            AccessTarget::Entity(id) if self.entities.get(*id).is_none() => {
                Err(AclError::NoSuchEntity(format!("#{}", id.0)))
            }
            AccessTarget::Host(mask) if !crate::casemap::is_valid_hostmask(mask) => {
                Err(AclError::InvalidTarget(mask.clone()))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn link(&mut self, entity: EntityId, channel: ChannelId) {
        self.reverse.entry(entity).or_default().insert(channel);
    }

    pub(crate) fn unlink(&mut self, entity: EntityId, channel: ChannelId) {
        if let Some(set) = self.reverse.get_mut(&entity) {
            set.remove(&channel);
            if set.is_empty() {
                self.reverse.remove(&entity);
            }
        }
    }

    /// Grant `add` and revoke `remove` for `target` on `channel`.
    ///
    /// An existing entry becomes `(level | add) & !remove`; if that is zero
    /// the entry is deleted. Without an entry, one is created with
    /// `add & !remove` unless that is zero. Creating an entry on a channel
    /// already holding `maxchanacs` entries fails with
    /// [`AclError::TooManyEntries`] unless the actor bypasses the cap;
    /// changing an existing entry is always allowed.
    pub fn add_or_merge(
        &mut self,
        channel: &str,
        target: &AccessTarget,
        add: Bitmask,
        remove: Bitmask,
        actor: &Actor,
    ) -> Result<AccessChange, AclError> {
        let cid = self.channel_id(channel)?;
        self.check_target(target)?;
        if let Some(setter) = &actor.setter {
            check_word("setter", setter)?;
        }

        let add = add & self.flags.ca_all();
        let limit = self.settings.maxchanacs;
        let ts = now();
        let chan = self
            .channels
            .get_mut(cid)
            .ok_or_else(|| AclError::NoSuchChannel(channel.to_string()))?;

        let change = match chan.access.get(target).map(|e| e.level) {
            Some(old) => {
                let new = (old | add) & !remove;
                if new == old {
                    AccessChange::Unchanged(chan.access.get(target).cloned())
                } else if new == CA_NONE {
                    match chan.access.remove(target) {
                        Some(entry) => AccessChange::Removed(entry),
                        None => AccessChange::Unchanged(None),
                    }
                } else {
                    match chan.access.get_mut(target) {
                        Some(entry) => {
                            entry.level = new;
                            entry.tmodified = ts;
                            entry.setter = actor.setter.clone();
                            AccessChange::Modified {
                                entry: entry.clone(),
                                old_level: old,
                            }
                        }
                        None => AccessChange::Unchanged(None),
                    }
                }
            }
            None => {
                let level = add & !remove;
                if level == CA_NONE {
                    AccessChange::Unchanged(None)
                } else {
                    if limit > 0 && chan.access.len() >= limit && !actor.bypass_limit {
                        return Err(AclError::TooManyEntries {
                            channel: chan.name.clone(),
                            limit,
                        });
                    }
                    let mut entry = ChanAcs::new(target.clone(), level, ts);
                    entry.setter = actor.setter.clone();
                    chan.access
                        .push(entry.clone())
                        .map_err(|e| AclError::InvalidTarget(format!("{:?}", e.target)))?;
                    AccessChange::Created(entry)
                }
            }
        };

        let chan_name = chan.name.clone();
        let who = self.target_name(target).to_string();
        match &change {
            AccessChange::Created(entry) => {
                if let Some(id) = target.entity() {
                    self.link(id, cid);
                }
                debug!(
                    channel = %chan_name,
                    target = %who,
                    flags = %bitmask_to_flags(&self.flags, entry.level),
                    "Access entry created"
                );
                self.notify_changed(&chan_name, entry, CA_NONE);
            }
            AccessChange::Modified { entry, old_level } => {
                debug!(
                    channel = %chan_name,
                    target = %who,
                    change = %change_to_flags(&self.flags, entry.level & !old_level, old_level & !entry.level),
                    "Access entry modified"
                );
                self.notify_changed(&chan_name, entry, *old_level);
            }
            AccessChange::Removed(entry) => {
                if let Some(id) = target.entity() {
                    self.unlink(id, cid);
                }
                debug!(channel = %chan_name, target = %who, "Access entry removed");
                self.notify_removed(&chan_name, entry);
            }
            AccessChange::Unchanged(_) => {}
        }
        Ok(change)
    }

    /// Exact lookup of the entry for `target`. Masks are not expanded.
    pub fn find(&self, channel: &str, target: &AccessTarget) -> Option<&ChanAcs> {
        self.channels.by_name(channel)?.access.get(target)
    }

    /// Exact lookup restricted to entries whose level intersects
    /// `required`. A zero `required` matches any entry.
    pub fn find_by_mask(
        &self,
        channel: &str,
        target: &AccessTarget,
        required: Bitmask,
    ) -> Option<&ChanAcs> {
        self.find(channel, target)
            .filter(|e| required == CA_NONE || e.level & required != 0)
    }

    /// Delete the entry for `target`. Returns the deleted entry, or `None`
    /// if there was none.
    pub fn remove(
        &mut self,
        channel: &str,
        target: &AccessTarget,
    ) -> Result<Option<ChanAcs>, AclError> {
        let cid = self.channel_id(channel)?;
        let Some(chan) = self.channels.get_mut(cid) else {
            return Ok(None);
        };
        let Some(entry) = chan.access.remove(target) else {
            return Ok(None);
        };
        let chan_name = chan.name.clone();
        if let Some(id) = target.entity() {
            self.unlink(id, cid);
        }
        debug!(channel = %chan_name, target = %self.target_name(target), "Access entry deleted");
        self.notify_removed(&chan_name, &entry);
        Ok(Some(entry))
    }

    /// All entries of `channel` in insertion order. Empty for unknown
    /// channels.
    pub fn entries<'a>(&'a self, channel: &str) -> impl Iterator<Item = &'a ChanAcs> + 'a {
        self.channels
            .by_name(channel)
            .into_iter()
            .flat_map(|c| c.access.iter())
    }

    /// Names of channels on which `entity` has a direct entry.
    pub fn channels_of(&self, entity: EntityId) -> Vec<&str> {
        self.reverse
            .get(&entity)
            .into_iter()
            .flatten()
            .filter_map(|cid| self.channels.get(*cid))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Set or clear (`value == None`) a metadata key on an entry.
    pub fn set_entry_metadata(
        &mut self,
        channel: &str,
        target: &AccessTarget,
        key: &str,
        value: Option<&str>,
    ) -> Result<(), AclError> {
        check_word("metadata key", key)?;
        let cid = self.channel_id(channel)?;
        let entry = self
            .channels
            .get_mut(cid)
            .and_then(|c| c.access.get_mut(target))
            .ok_or_else(|| AclError::NoSuchEntity(format!("{target:?}")))?;
        match value {
            Some(v) => {
                entry.metadata.insert(key.to_string(), v.to_string());
            }
            None => {
                entry.metadata.remove(key);
            }
        }
        Ok(())
    }

    /// Insert an entry read from the database. No cap, no observers.
    ///
    /// A second row for the same key is folded into the first; returns
    /// `false` in that case.
    pub(crate) fn load_entry(&mut self, cid: ChannelId, entry: ChanAcs) -> bool {
        let Some(chan) = self.channels.get_mut(cid) else {
            return false;
        };
        let entity = entry.target.entity();
        match chan.access.push(entry) {
            Ok(()) => {
                if let Some(id) = entity {
                    self.link(id, cid);
                }
                true
            }
            Err(dup) => {
                if let Some(existing) = chan.access.get_mut(&dup.target) {
                    existing.level |= dup.level;
                    existing.tmodified = existing.tmodified.max(dup.tmodified);
                }
                false
            }
        }
    }
}
