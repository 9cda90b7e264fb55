//! Operations touching many entries at once: clearing a list, founder
//! transfer, repair after a flag was unregistered, and dropping accounts
//! or channels.

use super::{AccessTarget, Actor};
use crate::error::AclError;
use crate::flags::{Bitmask, CA_NONE};
use crate::state::{Channel, ChannelId, EntityId, ServiceState};
use tracing::{debug, info, warn};

/// What [`ServiceState::repair`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Entries that carried bits no longer in the flag table.
    pub stripped: usize,
    /// Entries deleted because nothing valid was left, or because their
    /// entity no longer exists.
    pub deleted: usize,
    /// Channels whose founder designation had to be recomputed.
    pub founders_restored: usize,
}

impl std::ops::AddAssign for RepairReport {
    fn add_assign(&mut self, rhs: Self) {
        self.stripped += rhs.stripped;
        self.deleted += rhs.deleted;
        self.founders_restored += rhs.founders_restored;
    }
}

/// What [`ServiceState::drop_entity`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropReport {
    pub entries_removed: usize,
    /// `(channel, new founder)` pairs.
    pub transferred: Vec<(String, String)>,
    pub channels_dropped: Vec<String>,
}

impl ServiceState {
    /// Delete every entry that does not carry the founder bit. AKICK
    /// entries survive when `keep_akicks` is set. Returns the number of
    /// deleted entries.
    pub fn clear_access(&mut self, channel: &str, keep_akicks: bool) -> Result<usize, AclError> {
        let cid = self.channel_id(channel)?;
        let founder = self.flags.founder();
        let akick = self.flags.akick();

        let doomed: Vec<AccessTarget> = self
            .channels
            .get(cid)
            .map(|c| {
                c.access
                    .iter()
                    .filter(|e| e.level & founder == 0)
                    .filter(|e| !(keep_akicks && e.level & akick != 0))
                    .map(|e| e.target.clone())
                    .collect()
            })
            .unwrap_or_default();

        for target in &doomed {
            self.remove(channel, target)?;
        }
        info!(channel = %channel, removed = doomed.len(), "Access list cleared");
        Ok(doomed.len())
    }

    /// Make `to` the founder of `channel`.
    ///
    /// Every other entity loses the founder bit, `to` is designated and
    /// receives founder and acl-change regardless of the entry cap.
    pub fn transfer_founder(&mut self, channel: &str, to: EntityId) -> Result<(), AclError> {
        let cid = self.channel_id(channel)?;
        if self.entities.get(to).is_none() {
            return Err(AclError::NoSuchEntity(format!("#{}", to.0)));
        }
        let founder = self.flags.founder();

        let holders: Vec<AccessTarget> = self
            .channels
            .get(cid)
            .map(|c| {
                c.access
                    .entities()
                    .filter(|(id, e)| *id != to && e.level & founder != 0)
                    .map(|(id, _)| AccessTarget::Entity(id))
                    .collect()
            })
            .unwrap_or_default();
        for target in &holders {
            self.add_or_merge(channel, target, CA_NONE, founder, &Actor::system())?;
        }

        if let Some(chan) = self.channels.get_mut(cid) {
            chan.founder = Some(to);
        }
        let grant = founder | self.flags.acl_change();
        self.add_or_merge(channel, &AccessTarget::Entity(to), grant, CA_NONE, &Actor::system())?;
        info!(
            channel = %channel,
            founder = %self.entities.name_of(to).unwrap_or("?"),
            "Founder transferred"
        );
        Ok(())
    }

    /// Bring one channel's list back in line with the flag table and the
    /// entity table.
    pub fn repair(&mut self, channel: &str) -> Result<RepairReport, AclError> {
        let cid = self.channel_id(channel)?;
        Ok(self.repair_channel(cid))
    }

    /// [`repair`](Self::repair) for every channel.
    pub fn repair_all(&mut self) -> RepairReport {
        let mut total = RepairReport::default();
        for cid in self.channels.ids() {
            total += self.repair_channel(cid);
        }
        total
    }

    fn repair_channel(&mut self, cid: ChannelId) -> RepairReport {
        let mut report = RepairReport::default();
        let valid = self.flags.ca_all();
        let founder_bit = self.flags.founder();

        let Some(chan) = self.channels.get_mut(cid) else {
            return report;
        };
        let mut removed = Vec::new();
        for target in chan.access.targets() {
            let dangling = target
                .entity()
                .is_some_and(|id| self.entities.get(id).is_none());
            let Some(entry) = chan.access.get_mut(&target) else {
                continue;
            };
            if entry.level & !valid != 0 {
                entry.level &= valid;
                report.stripped += 1;
            }
            if dangling || entry.level == CA_NONE {
                if let Some(gone) = chan.access.remove(&target) {
                    removed.push(gone);
                }
                report.deleted += 1;
            }
        }

        let founder_ok = chan
            .founder
            .is_some_and(|id| self.entities.get(id).is_some());
        if !founder_ok {
            let next = chan
                .access
                .entities()
                .find(|(_, e)| e.level & founder_bit != 0)
                .map(|(id, _)| id);
            if next.is_some() || chan.founder.is_some() {
                chan.founder = next;
                report.founders_restored += 1;
            }
        }

        let chan_name = chan.name.clone();
        for entry in &removed {
            if let Some(id) = entry.target.entity() {
                self.unlink(id, cid);
            }
            self.notify_removed(&chan_name, entry);
        }
        if report != RepairReport::default() {
            debug!(channel = %chan_name, ?report, "Access list repaired");
        }
        report
    }

    /// First entity entry eligible to inherit a channel: a co-founder,
    /// otherwise one holding every successor bit.
    fn successor(&self, chan: &Channel, leaving: EntityId) -> Option<EntityId> {
        let founder: Bitmask = self.flags.founder();
        let wanted = self.flags.successor_mask();
        let mut fallback = None;
        for (id, e) in chan.access.entities() {
            if id == leaving {
                continue;
            }
            if e.level & founder != 0 {
                return Some(id);
            }
            if fallback.is_none() && wanted != CA_NONE && e.level & wanted == wanted {
                fallback = Some(id);
            }
        }
        fallback
    }

    /// Remove an account or group and everything that refers to it.
    ///
    /// Channels it founded pass to a successor or are dropped when there
    /// is none.
    pub fn drop_entity(&mut self, entity: EntityId) -> Result<DropReport, AclError> {
        let name = self
            .entities
            .name_of(entity)
            .ok_or_else(|| AclError::NoSuchEntity(format!("#{}", entity.0)))?
            .to_string();
        let mut report = DropReport::default();

        let founded: Vec<ChannelId> = self
            .channels
            .iter()
            .filter(|(_, c)| c.founder == Some(entity))
            .map(|(id, _)| id)
            .collect();
        for cid in founded {
            let Some(chan) = self.channels.get(cid) else {
                continue;
            };
            let chan_name = chan.name.clone();
            match self.successor(chan, entity) {
                Some(next) => {
                    self.transfer_founder(&chan_name, next)?;
                    let next_name = self.entities.name_of(next).unwrap_or("?").to_string();
                    report.transferred.push((chan_name, next_name));
                }
                None => {
                    self.drop_channel(&chan_name)?;
                    report.channels_dropped.push(chan_name);
                }
            }
        }

        let on: Vec<ChannelId> = self
            .reverse
            .get(&entity)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        let target = AccessTarget::Entity(entity);
        for cid in on {
            let Some(chan_name) = self.channels.get(cid).map(|c| c.name.clone()) else {
                continue;
            };
            if self.remove(&chan_name, &target)?.is_some() {
                report.entries_removed += 1;
            }
        }

        self.reverse.remove(&entity);
        self.entities.remove(entity);
        info!(
            entity = %name,
            entries = report.entries_removed,
            transferred = report.transferred.len(),
            dropped = report.channels_dropped.len(),
            "Entity dropped"
        );
        Ok(report)
    }

    /// Drop a channel registration and all of its entries.
    pub fn drop_channel(&mut self, channel: &str) -> Result<Channel, AclError> {
        let cid = self.channel_id(channel)?;
        let chan = self
            .channels
            .remove(cid)
            .ok_or_else(|| AclError::NoSuchChannel(channel.to_string()))?;
        for (id, _) in chan.access.entities() {
            self.unlink(id, cid);
        }
        if chan.founder.is_none() && !chan.access.is_empty() {
            warn!(channel = %chan.name, "Dropped channel had no founder");
        }
        info!(channel = %chan.name, entries = chan.access.len(), "Channel dropped");
        self.notify_dropped(&chan.name);
        Ok(chan)
    }
}
