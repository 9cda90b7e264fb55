//! Shared helpers for integration tests.

#![allow(dead_code)]

use slircd_services::acl::{AccessTarget, Actor};
use slircd_services::flags::codec::flags_to_bitmask;
use slircd_services::state::{AclSettings, Channel};
use slircd_services::{Bitmask, EntityId, FlagRegistry, ServiceState};

/// Flag table from the worked example: `v`, `o`, `f` (founder) plus the
/// reserved AKICK bit.
pub fn small_registry() -> FlagRegistry {
    let mut reg = FlagRegistry::new();
    reg.associate('v', 0, true, "voice").expect("voice");
    reg.associate('o', 0, true, "op").expect("op");
    reg.associate('f', 0, false, "founder").expect("founder");
    reg.freeze();
    reg
}

/// State with an empty, founderless channel `#test`.
pub fn state_with_channel(reg: FlagRegistry, maxchanacs: usize) -> ServiceState {
    let mut st = ServiceState::new(
        reg,
        AclSettings {
            maxchanacs,
            ..Default::default()
        },
    );
    st.channels
        .insert(Channel::new("#test", 1_700_000_000))
        .expect("channel");
    st
}

pub fn account(st: &mut ServiceState, name: &str) -> EntityId {
    st.register_account(name, "hash", &format!("{name}@example.com"))
        .expect("account")
}

pub fn mask(st: &ServiceState, flags: &str) -> Bitmask {
    flags_to_bitmask(&st.flags, flags, 0)
}

/// Grant `flags` to `who` on `#test` as a regular user.
pub fn grant(
    st: &mut ServiceState,
    who: EntityId,
    flags: &str,
) -> Result<slircd_services::AccessChange, slircd_services::AclError> {
    let add = mask(st, flags);
    st.add_or_merge("#test", &AccessTarget::Entity(who), add, 0, &Actor::user("tester"))
}

/// Revoke `flags` from `who` on `#test`.
pub fn revoke(
    st: &mut ServiceState,
    who: EntityId,
    flags: &str,
) -> Result<slircd_services::AccessChange, slircd_services::AclError> {
    let remove = mask(st, flags);
    st.add_or_merge("#test", &AccessTarget::Entity(who), 0, remove, &Actor::user("tester"))
}
