//! Serializes a [`ServiceState`] into database rows.
//!
//! Row order: version, flag set, accounts (each with its nicks and
//! metadata), groups, group memberships, channels (each followed by its
//! entries in list order and then its metadata), end marker. Loading the
//! output and writing it again yields the same bytes.

use super::handlers::CURRENT_DBV;
use super::row::{RowError, RowWriter};
use crate::flags::codec::bitmask_to_flags;
use crate::flags::gflags::{GA_FLAGS_TABLE, MC_FLAGS, MG_FLAGS, MU_FLAGS, gflags_tostr};
use crate::state::{Metadata, ServiceState};

fn write_metadata(
    w: &mut RowWriter,
    tag: &str,
    owner: &str,
    metadata: &Metadata,
) -> Result<(), RowError> {
    for (key, value) in metadata {
        w.start_row(tag)?;
        w.write_word(owner)?;
        w.write_word(key)?;
        w.write_str(value)?;
        w.commit_row()?;
    }
    Ok(())
}

/// Render the whole state as database text.
pub fn render(state: &ServiceState) -> Result<String, RowError> {
    let mut w = RowWriter::new();

    w.start_row("DBV")?;
    w.write_uint(u64::from(CURRENT_DBV))?;
    w.commit_row()?;

    w.start_row("CF")?;
    w.write_word(&bitmask_to_flags(&state.flags, state.flags.ca_all()))?;
    w.commit_row()?;

    let mut accounts = 0u64;
    for (_, acct) in state.entities.accounts() {
        w.start_row("MU")?;
        w.write_word(&acct.name)?;
        w.write_word(&acct.pass)?;
        w.write_word(&acct.email)?;
        w.write_time(acct.registered)?;
        w.write_time(acct.last_login)?;
        w.write_word(&gflags_tostr(MU_FLAGS, acct.flags))?;
        w.write_word(acct.language.as_deref().unwrap_or("default"))?;
        w.commit_row()?;

        for nick in &acct.nicks {
            w.start_row("MN")?;
            w.write_word(&acct.name)?;
            w.write_word(&nick.nick)?;
            w.write_time(nick.registered)?;
            w.write_time(nick.last_seen)?;
            w.commit_row()?;
        }
        write_metadata(&mut w, "MDU", &acct.name, &acct.metadata)?;
        accounts += 1;
    }

    let mut groups = 0u64;
    for (_, group) in state.entities.groups() {
        w.start_row("GRP")?;
        w.write_word(&group.name)?;
        w.write_time(group.registered)?;
        w.write_word(&gflags_tostr(MG_FLAGS, group.flags))?;
        w.commit_row()?;
        write_metadata(&mut w, "MDG", &group.name, &group.metadata)?;
        groups += 1;
    }
    // memberships go after every group so members may themselves be groups
    for (_, group) in state.entities.groups() {
        for member in &group.members {
            let Some(member_name) = state.entities.name_of(member.entity) else {
                continue;
            };
            w.start_row("GACL")?;
            w.write_word(&group.name)?;
            w.write_word(member_name)?;
            w.write_word(&gflags_tostr(GA_FLAGS_TABLE, member.flags))?;
            w.commit_row()?;
        }
    }

    let mut channels = 0u64;
    let mut chanacs = 0u64;
    for (_, chan) in state.channels.iter() {
        w.start_row("MC")?;
        w.write_word(&chan.name)?;
        w.write_word(
            chan.founder
                .and_then(|id| state.entities.name_of(id))
                .unwrap_or("*"),
        )?;
        w.write_time(chan.registered)?;
        w.write_time(chan.used)?;
        w.write_word(&gflags_tostr(MC_FLAGS, chan.flags))?;
        w.write_uint(u64::from(chan.mlock.on))?;
        w.write_uint(u64::from(chan.mlock.off))?;
        w.write_uint(u64::from(chan.mlock.limit))?;
        w.write_word(chan.mlock.key.as_deref().unwrap_or("*"))?;
        w.commit_row()?;

        for entry in chan.access.iter() {
            let target = state.target_name(&entry.target);
            w.start_row("CA")?;
            w.write_word(&chan.name)?;
            w.write_word(target)?;
            w.write_word(&bitmask_to_flags(&state.flags, entry.level))?;
            w.write_time(entry.tmodified)?;
            if let Some(setter) = &entry.setter {
                w.write_word(setter)?;
            }
            w.commit_row()?;
            write_metadata(
                &mut w,
                "MDA",
                &format!("{}:{}", chan.name, target),
                &entry.metadata,
            )?;
            chanacs += 1;
        }

        write_metadata(&mut w, "MDC", &chan.name, &chan.metadata)?;
        channels += 1;
    }

    w.start_row("DE")?;
    w.write_uint(accounts)?;
    w.write_uint(channels)?;
    w.write_uint(chanacs)?;
    w.write_uint(groups)?;
    w.commit_row()?;

    w.finish()
}
