//! Access query engine.
//!
//! Answers "what may this identity do on this channel". The result is the
//! union of:
//!
//! 1. the identity's own entry,
//! 2. entries of groups the identity inherits channel access from,
//! 3. hostmask entries matching any of the identity's masks,
//! 4. full access if the identity is a founder.
//!
//! Entries carrying the AKICK bit never contribute. Bans are answered
//! separately by [`ServiceState::is_banned`].

use super::ChanAcs;
use crate::casemap::wildcard_match;
use crate::flags::gflags::MC_LIMITFLAGS;
use crate::flags::{Bitmask, CA_NONE};
use crate::state::{Channel, EntityId, ServiceState};

/// Everything the engine knows about whoever is asking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Account the user is logged in to.
    pub account: Option<EntityId>,
    /// `nick!user@host` forms the user is seen as (real host, cloak, IP).
    pub masks: Vec<String>,
}

impl Identity {
    pub fn account(id: EntityId) -> Self {
        Self {
            account: Some(id),
            masks: Vec::new(),
        }
    }

    pub fn anonymous(mask: &str) -> Self {
        Self {
            account: None,
            masks: vec![mask.to_string()],
        }
    }

    pub fn with_mask(mut self, mask: &str) -> Self {
        self.masks.push(mask.to_string());
        self
    }

    fn matches_host(&self, pattern: &str) -> bool {
        self.masks.iter().any(|m| wildcard_match(pattern, m))
    }
}

/// Source of live user information. Implemented by the protocol layer.
pub trait IdentityOracle {
    /// Account name the network user `uid` is logged in to.
    fn account_of(&self, uid: &str) -> Option<String>;

    /// Masks the network user `uid` is visible as.
    fn masks_of(&self, uid: &str) -> Vec<String>;
}

impl ServiceState {
    /// Build an [`Identity`] for a network user.
    pub fn identify(&self, oracle: &dyn IdentityOracle, uid: &str) -> Identity {
        Identity {
            account: oracle.account_of(uid).and_then(|name| self.entities.find(&name)),
            masks: oracle.masks_of(uid),
        }
    }

    /// Bits granted to `entity` through its own entry and its channel
    /// access groups. AKICK entries are skipped.
    fn entity_level(&self, chan: &Channel, entity: EntityId) -> Bitmask {
        let akick = self.flags.akick();
        let granting = |e: &&ChanAcs| e.level & akick == 0;

        let direct = chan
            .access
            .get(&crate::acl::AccessTarget::Entity(entity))
            .filter(granting)
            .map_or(CA_NONE, |e| e.level);

        self.entities
            .chanacs_groups_of(entity)
            .filter_map(|g| chan.access.get(&crate::acl::AccessTarget::Entity(g)))
            .filter(granting)
            .fold(direct, |acc, e| acc | e.level)
    }

    /// Effective access of `who` on `channel`. Zero for unknown channels.
    pub fn effective_flags(&self, channel: &str, who: &Identity) -> Bitmask {
        let Some(chan) = self.channels.by_name(channel) else {
            return CA_NONE;
        };
        let akick = self.flags.akick();
        let mut level = CA_NONE;

        if let Some(id) = who.account {
            let account = self.entities.account(id);
            let waiting = account.is_some_and(|a| a.is_waiting_auth());
            if !waiting {
                let own = self.entity_level(chan, id);
                level |= own;
                if chan.founder == Some(id) || own & self.flags.founder() != 0 {
                    level |= self.flags.full_access();
                }
            }
        }

        if !who.masks.is_empty() {
            level |= chan
                .access
                .hosts()
                .filter(|(mask, e)| e.level & akick == 0 && who.matches_host(mask))
                .fold(CA_NONE, |acc, (_, e)| acc | e.level);
        }

        level & !akick
    }

    /// Whether `who` holds every bit of `required` on `channel`.
    pub fn has_flag(&self, channel: &str, who: &Identity, required: Bitmask) -> bool {
        self.effective_flags(channel, who) & required == required
    }

    /// The AKICK entry that applies to `who`, if any.
    ///
    /// The identity's own account entry is checked first, then hostmask
    /// entries in insertion order; the first match wins.
    pub fn is_banned(&self, channel: &str, who: &Identity) -> Option<&ChanAcs> {
        let chan = self.channels.by_name(channel)?;
        let akick = self.flags.akick();

        if let Some(id) = who.account {
            let direct = chan
                .access
                .get(&crate::acl::AccessTarget::Entity(id))
                .filter(|e| e.level & akick != 0);
            if direct.is_some() {
                return direct;
            }
        }

        chan.access
            .hosts()
            .find(|(mask, e)| e.level & akick != 0 && who.matches_host(mask))
            .map(|(_, e)| e)
    }

    /// Like [`is_banned`](Self::is_banned), but an identity holding the
    /// `exempt` flag is never kicked.
    pub fn akick_applies(&self, channel: &str, who: &Identity) -> Option<&ChanAcs> {
        let exempt = self.flags.lookup_name(crate::flags::names::EXEMPT);
        if exempt != CA_NONE && self.has_flag(channel, who, exempt) {
            return None;
        }
        self.is_banned(channel, who)
    }

    /// [`FlagRegistry::allow_flags`](crate::flags::FlagRegistry::allow_flags)
    /// for `channel`, clamped when the channel has the limitflags option
    /// and the network enables it.
    pub fn allow_flags(&self, channel: &str, theirs: Bitmask) -> Bitmask {
        let limit = self.settings.limitflags
            && self
                .channels
                .by_name(channel)
                .is_some_and(|c| c.flags & MC_LIMITFLAGS != 0);
        self.flags.allow_flags(theirs, limit)
    }

    /// Bits `who` may grant or revoke on `channel`.
    ///
    /// Founders may change anything. Other holders of `acl-change` are
    /// limited by [`allow_flags`](Self::allow_flags); everyone else may
    /// change nothing.
    pub fn grantable_flags(&self, channel: &str, who: &Identity) -> Bitmask {
        let level = self.effective_flags(channel, who);
        let founder = self.flags.founder();
        let designated = self
            .channels
            .by_name(channel)
            .is_some_and(|c| c.founder.is_some() && c.founder == who.account);
        if designated || (founder != CA_NONE && level & founder != CA_NONE) {
            return self.flags.ca_all();
        }
        if level & self.flags.acl_change() == CA_NONE {
            return CA_NONE;
        }
        self.allow_flags(channel, level)
    }

    /// Effective access of the network user `uid`.
    pub fn user_flags(&self, channel: &str, oracle: &dyn IdentityOracle, uid: &str) -> Bitmask {
        self.effective_flags(channel, &self.identify(oracle, uid))
    }
}
