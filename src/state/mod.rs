//! Service state.
//!
//! [`ServiceState`] owns everything the services persist: the flag table,
//! accounts and groups, registered channels with their access lists, and
//! the reverse index from entity to the channels it has entries on. The
//! daemon keeps exactly one, behind a single mutex; every query and
//! mutation goes through it, so no caller ever sees a half-applied change.

mod channel;
mod entity;
mod observer;

pub use channel::{Channel, ChannelId, Channels, Mlock};
pub use entity::{Account, Entities, Entity, EntityId, Group, GroupMember, RegisteredNick};
pub use observer::{AclObserver, LogNotifier, Notifier};

use crate::acl::{AccessTarget, Actor, ChanAcs, Templates};
use crate::error::AclError;
use crate::flags::{Bitmask, FlagRegistry};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Key/value metadata attached to entities, channels and entries.
/// Sorted by key so saved rows are deterministic.
pub type Metadata = BTreeMap<String, String>;

/// Reject values that cannot be stored as a single database word.
pub(crate) fn check_word(field: &'static str, value: &str) -> Result<(), AclError> {
    if crate::db::row::is_word(value) {
        Ok(())
    } else {
        Err(AclError::InvalidValue {
            field,
            value: value.to_string(),
        })
    }
}

/// Current unix time in seconds.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Tunables of the access registry.
#[derive(Debug, Clone, Default)]
pub struct AclSettings {
    /// Maximum entries per channel. Zero means unlimited.
    pub maxchanacs: usize,
    /// Network-wide template levels.
    pub templates: Templates,
    /// Honour the per-channel limitflags option in
    /// [`ServiceState::allow_flags`].
    pub limitflags: bool,
}

/// Central state container.
pub struct ServiceState {
    /// Privilege flag table. Frozen once startup registration is done.
    pub flags: FlagRegistry,

    /// All accounts and groups.
    pub entities: Entities,

    /// All registered channels.
    pub channels: Channels,

    /// Channels on which each entity has an entry.
    pub(crate) reverse: HashMap<EntityId, BTreeSet<ChannelId>>,

    pub settings: AclSettings,

    observers: Vec<Arc<dyn AclObserver>>,
}

impl ServiceState {
    pub fn new(flags: FlagRegistry, settings: AclSettings) -> Self {
        Self {
            flags,
            entities: Entities::new(),
            channels: Channels::new(),
            reverse: HashMap::new(),
            settings,
            observers: Vec::new(),
        }
    }

    /// Register an observer for access list changes.
    pub fn add_observer(&mut self, observer: Arc<dyn AclObserver>) {
        self.observers.push(observer);
    }

    pub(crate) fn notify_changed(&self, channel: &str, entry: &ChanAcs, old_level: Bitmask) {
        for obs in &self.observers {
            obs.on_entry_changed(channel, entry, old_level);
        }
    }

    pub(crate) fn notify_removed(&self, channel: &str, entry: &ChanAcs) {
        for obs in &self.observers {
            obs.on_entry_removed(channel, entry);
        }
    }

    pub(crate) fn notify_dropped(&self, channel: &str) {
        for obs in &self.observers {
            obs.on_channel_dropped(channel);
        }
    }

    /// Register a new account.
    pub fn register_account(
        &mut self,
        name: &str,
        pass: &str,
        email: &str,
    ) -> Result<EntityId, AclError> {
        check_word("account name", name)?;
        check_word("password", pass)?;
        check_word("email", email)?;
        let ts = now();
        let id = self.entities.insert(Entity::Account(Account {
            name: name.to_string(),
            pass: pass.to_string(),
            email: email.to_string(),
            registered: ts,
            last_login: ts,
            flags: 0,
            language: None,
            nicks: Vec::new(),
            metadata: Metadata::new(),
        }))?;
        debug!(account = %name, "Account registered");
        Ok(id)
    }

    /// Register a new group. Group names conventionally start with `!`.
    pub fn register_group(&mut self, name: &str) -> Result<EntityId, AclError> {
        check_word("group name", name)?;
        let id = self.entities.insert(Entity::Group(Group {
            name: name.to_string(),
            registered: now(),
            flags: 0,
            members: Vec::new(),
            metadata: Metadata::new(),
        }))?;
        debug!(group = %name, "Group registered");
        Ok(id)
    }

    /// Add `member` to `group`, or replace its group flags if it is
    /// already a member.
    pub fn set_group_member(
        &mut self,
        group: EntityId,
        member: EntityId,
        flags: u32,
    ) -> Result<(), AclError> {
        if self.entities.get(member).is_none() {
            return Err(AclError::NoSuchEntity(format!("#{}", member.0)));
        }
        let grp = self
            .entities
            .group_mut(group)
            .ok_or_else(|| AclError::NoSuchEntity(format!("#{}", group.0)))?;
        match grp.members.iter_mut().find(|m| m.entity == member) {
            Some(m) => m.flags = flags,
            None => grp.members.push(GroupMember {
                entity: member,
                flags,
            }),
        }
        Ok(())
    }

    /// Register a channel to `founder`.
    ///
    /// The founder is designated on the channel and also receives an entry
    /// carrying every default flag plus `founder`.
    pub fn register_channel(&mut self, name: &str, founder: EntityId) -> Result<ChannelId, AclError> {
        check_word("channel name", name)?;
        let founder_name = self
            .entities
            .name_of(founder)
            .ok_or_else(|| AclError::NoSuchEntity(format!("#{}", founder.0)))?
            .to_string();

        let mut channel = Channel::new(name, now());
        channel.founder = Some(founder);
        let id = self.channels.insert(channel)?;

        let level = self.flags.ca_all_enable() | self.flags.founder();
        self.add_or_merge(
            name,
            &AccessTarget::Entity(founder),
            level,
            0,
            &Actor::system(),
        )?;
        debug!(channel = %name, founder = %founder_name, "Channel registered");
        Ok(id)
    }

    /// Resolve a command argument to an access target.
    ///
    /// Registered account and group names win; anything else must be a
    /// well-formed `nick!user@host` mask.
    pub fn resolve_target(&self, arg: &str) -> Result<AccessTarget, AclError> {
        if let Some(id) = self.entities.find(arg) {
            return Ok(AccessTarget::Entity(id));
        }
        if crate::casemap::is_valid_hostmask(arg) {
            return Ok(AccessTarget::Host(arg.to_string()));
        }
        Err(AclError::InvalidTarget(arg.to_string()))
    }

    /// Display form of a target: entity name or the mask itself.
    pub fn target_name<'a>(&'a self, target: &'a AccessTarget) -> &'a str {
        match target {
            AccessTarget::Entity(id) => self.entities.name_of(*id).unwrap_or("?"),
            AccessTarget::Host(mask) => mask,
        }
    }

    /// Update a channel's last-used time.
    pub fn touch_used(&mut self, channel: &str) -> Result<(), AclError> {
        let id = self
            .channels
            .find(channel)
            .ok_or_else(|| AclError::NoSuchChannel(channel.to_string()))?;
        if let Some(chan) = self.channels.get_mut(id) {
            chan.used = now();
        }
        Ok(())
    }

    /// Total number of access entries across all channels.
    pub fn chanacs_count(&self) -> usize {
        self.channels.iter().map(|(_, c)| c.access.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ServiceState {
        ServiceState::new(FlagRegistry::with_core_flags(), AclSettings::default())
    }

    #[test]
    fn register_channel_grants_founder_entry() {
        let mut st = state();
        let alice = st.register_account("alice", "hash", "a@example.com").unwrap();
        st.register_channel("#rust", alice).unwrap();

        let chan = st.channels.by_name("#RUST").unwrap();
        assert_eq!(chan.founder, Some(alice));
        let entry = chan.access.get(&AccessTarget::Entity(alice)).unwrap();
        assert_ne!(entry.level & st.flags.founder(), 0);
        assert_eq!(entry.level & st.flags.akick(), 0);
        assert_eq!(st.chanacs_count(), 1);
    }

    #[test]
    fn registration_rejects_unstorable_words() {
        let mut st = state();
        assert!(matches!(
            st.register_account("bob", "hash", ""),
            Err(AclError::InvalidValue { field: "email", .. })
        ));
        assert!(matches!(
            st.register_account("bob smith", "hash", "b@example.com"),
            Err(AclError::InvalidValue { field: "account name", .. })
        ));
        assert!(st.register_group("!two words").is_err());
        assert!(st.entities.is_empty());

        let bob = st.register_account("bob", "hash", "b@example.com").unwrap();
        assert!(st.register_channel("#a b", bob).is_err());
        assert!(crate::db::render(&st).is_ok());
    }

    #[test]
    fn register_channel_twice_fails() {
        let mut st = state();
        let alice = st.register_account("alice", "hash", "a@example.com").unwrap();
        st.register_channel("#rust", alice).unwrap();
        assert_eq!(
            st.register_channel("#Rust", alice),
            Err(AclError::ChannelExists("#Rust".into()))
        );
    }

    #[test]
    fn resolve_target_prefers_entities() {
        let mut st = state();
        let alice = st.register_account("alice", "hash", "a@example.com").unwrap();
        assert_eq!(st.resolve_target("ALICE"), Ok(AccessTarget::Entity(alice)));
        assert_eq!(
            st.resolve_target("*!*@example.org"),
            Ok(AccessTarget::Host("*!*@example.org".into()))
        );
        assert!(matches!(
            st.resolve_target("nobody"),
            Err(AclError::InvalidTarget(_))
        ));
    }

    #[test]
    fn group_membership_is_replaced() {
        let mut st = state();
        let alice = st.register_account("alice", "hash", "a@example.com").unwrap();
        let staff = st.register_group("!staff").unwrap();
        st.set_group_member(staff, alice, 0).unwrap();
        st.set_group_member(staff, alice, crate::flags::gflags::GA_CHANACS)
            .unwrap();
        let group = st.entities.group(staff).unwrap();
        assert_eq!(group.members.len(), 1);
        assert!(group.grants_chanacs_to(alice));
    }
}
