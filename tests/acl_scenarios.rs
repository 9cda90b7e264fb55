mod common;

use common::{account, grant, mask, revoke, small_registry, state_with_channel};
use slircd_services::acl::{AccessTarget, Actor, Identity};
use slircd_services::{AclError, FlagRegistry, ServiceState};

#[test]
fn test_worked_example() -> anyhow::Result<()> {
    let mut st = state_with_channel(small_registry(), 2);
    assert_eq!(st.flags.lookup('v'), 0x1);
    assert_eq!(st.flags.lookup('o'), 0x2);
    assert_eq!(st.flags.lookup('f'), 0x4);
    assert_eq!(st.flags.akick(), 0x8000_0000);

    let a = account(&mut st, "alice");
    let b = account(&mut st, "bob");
    let c = account(&mut st, "carol");

    // 1. +ov to A
    grant(&mut st, a, "+ov")?;
    assert_eq!(st.effective_flags("#test", &Identity::account(a)), 0x3);

    // 2. +f to B fills the channel
    grant(&mut st, b, "+f")?;
    assert_eq!(st.entries("#test").count(), 2);

    // 3. a third entity is over the cap
    let err = grant(&mut st, c, "+o").unwrap_err();
    assert!(matches!(err, AclError::TooManyEntries { limit: 2, .. }));
    assert!(st.find("#test", &AccessTarget::Entity(c)).is_none());

    // 4. -v from A
    revoke(&mut st, a, "-v")?;
    assert_eq!(st.effective_flags("#test", &Identity::account(a)), 0x2);

    // 5. -o from A deletes the entry
    revoke(&mut st, a, "-o")?;
    assert!(st.find("#test", &AccessTarget::Entity(a)).is_none());
    assert_eq!(st.entries("#test").count(), 1);
    Ok(())
}

#[test]
fn test_merge_is_idempotent() -> anyhow::Result<()> {
    let mut st = state_with_channel(FlagRegistry::with_core_flags(), 0);
    let a = account(&mut st, "alice");

    let once = grant(&mut st, a, "+votA")?.level();
    let twice = grant(&mut st, a, "+votA")?.level();
    assert_eq!(once, twice);
    assert_eq!(st.find("#test", &AccessTarget::Entity(a)).map(|e| e.level), Some(once));
    Ok(())
}

#[test]
fn test_clearing_every_bit_deletes() -> anyhow::Result<()> {
    let mut st = state_with_channel(FlagRegistry::with_core_flags(), 0);
    let a = account(&mut st, "alice");
    grant(&mut st, a, "+vo")?;

    let full = st.flags.ca_all();
    st.add_or_merge("#test", &AccessTarget::Entity(a), 0, full, &Actor::system())?;
    assert!(st.find("#test", &AccessTarget::Entity(a)).is_none());
    assert!(st.channels_of(a).is_empty());
    Ok(())
}

#[test]
fn test_cap_allows_merges() -> anyhow::Result<()> {
    const CAP: usize = 5;
    let mut st = state_with_channel(FlagRegistry::with_core_flags(), CAP);
    let ids: Vec<_> = (0..=CAP).map(|i| account(&mut st, &format!("user{i}"))).collect();

    for id in &ids[..CAP] {
        grant(&mut st, *id, "+v")?;
    }
    assert!(matches!(
        grant(&mut st, ids[CAP], "+v"),
        Err(AclError::TooManyEntries { limit: CAP, .. })
    ));
    grant(&mut st, ids[0], "+o")?;
    assert_eq!(st.entries("#test").count(), CAP);
    Ok(())
}

#[test]
fn test_founder_override() -> anyhow::Result<()> {
    let mut st = ServiceState::new(FlagRegistry::with_core_flags(), Default::default());
    let owner = account(&mut st, "owner");
    st.register_channel("#test", owner)?;
    let full = st.flags.full_access();
    let who = Identity::account(owner);

    assert_eq!(st.effective_flags("#test", &who), full);

    // strip the entry down to a single bit
    let target = AccessTarget::Entity(owner);
    let keep = st.flags.lookup('v');
    st.add_or_merge("#test", &target, keep, !keep, &Actor::system())?;
    assert_eq!(st.effective_flags("#test", &who), full);

    // and remove it entirely
    st.remove("#test", &target)?;
    assert_eq!(st.effective_flags("#test", &who), full);
    assert!(st.has_flag("#test", &who, st.flags.acl_change()));
    Ok(())
}

#[test]
fn test_akick_entry_grants_nothing() -> anyhow::Result<()> {
    let mut st = state_with_channel(FlagRegistry::with_core_flags(), 0);
    let eve = account(&mut st, "eve");
    grant(&mut st, eve, "+bvoO")?;

    let who = Identity::account(eve);
    assert_eq!(st.effective_flags("#test", &who), 0);
    for slot in st.flags.iter().filter(|s| s.flag != 'b') {
        assert!(!st.has_flag("#test", &who, slot.value), "flag {}", slot.flag);
    }
    assert!(st.is_banned("#test", &who).is_some());
    Ok(())
}

#[test]
fn test_hostmask_and_group_access() -> anyhow::Result<()> {
    let mut st = state_with_channel(FlagRegistry::with_core_flags(), 0);
    let alice = account(&mut st, "alice");
    let staff = st.register_group("!staff")?;
    st.set_group_member(staff, alice, slircd_services::flags::gflags::GA_CHANACS)?;

    let t = mask(&st, "+t");
    let v = mask(&st, "+v");
    st.add_or_merge("#test", &AccessTarget::Entity(staff), t, 0, &Actor::system())?;
    st.add_or_merge(
        "#test",
        &AccessTarget::Host("*!*@*.staff.example".into()),
        v,
        0,
        &Actor::system(),
    )?;

    let who = Identity::account(alice).with_mask("alice!a@laptop.staff.example");
    assert_eq!(st.effective_flags("#test", &who), t | v);
    assert_eq!(
        st.effective_flags("#test", &Identity::anonymous("bob!b@laptop.staff.example")),
        v
    );
    Ok(())
}
