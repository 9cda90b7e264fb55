//! Accounts and groups.
//!
//! Both live in one namespace: an access entry naming `alice` must resolve
//! to exactly one thing, whether `alice` is an account or a group. Names are
//! keyed by their RFC 1459 lowercase form; iteration follows registration
//! order so saved databases keep a stable row order.

use super::Metadata;
use crate::casemap::irc_to_lower;
use crate::error::AclError;
use crate::flags::gflags::{GA_CHANACS, MU_WAITAUTH};
use std::collections::{BTreeMap, HashMap};

/// Stable handle for an account or group. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u32);

/// A nickname grouped to an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredNick {
    pub nick: String,
    pub registered: i64,
    pub last_seen: i64,
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    /// Password hash as produced by the crypto provider. Opaque here.
    pub pass: String,
    pub email: String,
    pub registered: i64,
    pub last_login: i64,
    /// `MU_*` option flags.
    pub flags: u32,
    pub language: Option<String>,
    pub nicks: Vec<RegisteredNick>,
    pub metadata: Metadata,
}

impl Account {
    /// Still waiting for e-mail verification. Such accounts keep only their
    /// AKICK bits when access is computed.
    pub fn is_waiting_auth(&self) -> bool {
        self.flags & MU_WAITAUTH != 0
    }
}

/// A group member and its `GA_*` privileges inside the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMember {
    pub entity: EntityId,
    pub flags: u32,
}

/// A registered group of accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub registered: i64,
    /// `MG_*` option flags.
    pub flags: u32,
    pub members: Vec<GroupMember>,
    pub metadata: Metadata,
}

impl Group {
    /// Whether `entity` inherits this group's channel access.
    pub fn grants_chanacs_to(&self, entity: EntityId) -> bool {
        self.members
            .iter()
            .any(|m| m.entity == entity && m.flags & GA_CHANACS != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Account(Account),
    Group(Group),
}

impl Entity {
    pub fn name(&self) -> &str {
        match self {
            Entity::Account(a) => &a.name,
            Entity::Group(g) => &g.name,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Entity::Account(a) => &a.metadata,
            Entity::Group(g) => &g.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        match self {
            Entity::Account(a) => &mut a.metadata,
            Entity::Group(g) => &mut g.metadata,
        }
    }

    pub fn as_account(&self) -> Option<&Account> {
        match self {
            Entity::Account(a) => Some(a),
            Entity::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Entity::Group(g) => Some(g),
            Entity::Account(_) => None,
        }
    }
}

/// Table of all accounts and groups.
#[derive(Debug, Default)]
pub struct Entities {
    by_id: BTreeMap<EntityId, Entity>,
    by_name: HashMap<String, EntityId>,
    next_id: u32,
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entity. Fails if the name is already taken.
    pub fn insert(&mut self, entity: Entity) -> Result<EntityId, AclError> {
        let key = irc_to_lower(entity.name());
        if self.by_name.contains_key(&key) {
            return Err(AclError::EntityExists(entity.name().to_string()));
        }
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.by_name.insert(key, id);
        self.by_id.insert(id, entity);
        Ok(id)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.by_id.remove(&id)?;
        self.by_name.remove(&irc_to_lower(entity.name()));
        // drop dangling memberships
        for other in self.by_id.values_mut() {
            if let Entity::Group(g) = other {
                g.members.retain(|m| m.entity != id);
            }
        }
        Some(entity)
    }

    pub fn find(&self, name: &str) -> Option<EntityId> {
        self.by_name.get(&irc_to_lower(name)).copied()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.by_id.get_mut(&id)
    }

    pub fn name_of(&self, id: EntityId) -> Option<&str> {
        self.by_id.get(&id).map(Entity::name)
    }

    pub fn account(&self, id: EntityId) -> Option<&Account> {
        self.by_id.get(&id).and_then(Entity::as_account)
    }

    pub fn account_mut(&mut self, id: EntityId) -> Option<&mut Account> {
        match self.by_id.get_mut(&id) {
            Some(Entity::Account(a)) => Some(a),
            _ => None,
        }
    }

    pub fn group(&self, id: EntityId) -> Option<&Group> {
        self.by_id.get(&id).and_then(Entity::as_group)
    }

    pub fn group_mut(&mut self, id: EntityId) -> Option<&mut Group> {
        match self.by_id.get_mut(&id) {
            Some(Entity::Group(g)) => Some(g),
            _ => None,
        }
    }

    /// Accounts in registration order.
    pub fn accounts(&self) -> impl Iterator<Item = (EntityId, &Account)> {
        self.by_id
            .iter()
            .filter_map(|(id, e)| e.as_account().map(|a| (*id, a)))
    }

    /// Groups in registration order.
    pub fn groups(&self) -> impl Iterator<Item = (EntityId, &Group)> {
        self.by_id
            .iter()
            .filter_map(|(id, e)| e.as_group().map(|g| (*id, g)))
    }

    /// Groups through which `entity` inherits channel access.
    pub fn chanacs_groups_of(&self, entity: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.groups()
            .filter(move |(_, g)| g.grants_chanacs_to(entity))
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str) -> Entity {
        Entity::Account(Account {
            name: name.to_string(),
            pass: "x".into(),
            email: "x@example.com".into(),
            registered: 1,
            last_login: 1,
            flags: 0,
            language: None,
            nicks: Vec::new(),
            metadata: Metadata::new(),
        })
    }

    #[test]
    fn names_are_case_insensitive() {
        let mut ents = Entities::new();
        let id = ents.insert(account("Alice[m]")).unwrap();
        assert_eq!(ents.find("alice{M}"), Some(id));
        assert_eq!(
            ents.insert(account("ALICE[m]")),
            Err(AclError::EntityExists("ALICE[m]".into()))
        );
    }

    #[test]
    fn ids_follow_registration_order() {
        let mut ents = Entities::new();
        let b = ents.insert(account("bob")).unwrap();
        let a = ents.insert(account("alice")).unwrap();
        let order: Vec<_> = ents.accounts().map(|(id, _)| id).collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn removing_account_drops_memberships() {
        let mut ents = Entities::new();
        let alice = ents.insert(account("alice")).unwrap();
        let group = ents
            .insert(Entity::Group(Group {
                name: "!staff".into(),
                registered: 1,
                flags: 0,
                members: vec![GroupMember {
                    entity: alice,
                    flags: GA_CHANACS,
                }],
                metadata: Metadata::new(),
            }))
            .unwrap();
        assert_eq!(ents.chanacs_groups_of(alice).collect::<Vec<_>>(), vec![group]);
        ents.remove(alice);
        assert!(ents.group(group).unwrap().members.is_empty());
        assert_eq!(ents.find("alice"), None);
    }
}
