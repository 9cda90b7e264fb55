//! Row handlers for loading.
//!
//! Every row tag maps to one handler. The table is open: a feature that
//! persists its own rows registers a handler for its tag before the
//! database is loaded.

use super::LoadReport;
use super::row::{RowError, RowReader};
use crate::acl::{AccessTarget, ChanAcs};
use crate::casemap::is_valid_hostmask;
use crate::flags::codec::flags_to_bitmask;
use crate::flags::gflags::{
    GA_FLAGS_TABLE, GFlag, MC_FLAGS, MG_FLAGS, MU_FLAGS, gflags_fromstr_lossy,
};
use crate::flags::{CA_NONE, is_flag_char};
use crate::state::{
    Account, Channel, ChannelId, Entity, EntityId, Group, Metadata, RegisteredNick, ServiceState,
};
use std::collections::HashMap;
use tracing::warn;

/// Schema version written by this build.
pub const CURRENT_DBV: u32 = 8;

/// Counts announced by the `DE` end marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub accounts: u64,
    pub channels: u64,
    pub chanacs: u64,
    /// Absent in files written before groups existed.
    pub groups: Option<u64>,
}

/// Mutable state threaded through a load.
pub struct LoadContext<'a> {
    pub state: &'a mut ServiceState,
    /// Schema version announced by the `DBV` row.
    pub dbv: u32,
    /// Line being processed, for diagnostics.
    pub line: usize,
    pub report: LoadReport,
    pub trailer: Option<Trailer>,
}

impl<'a> LoadContext<'a> {
    pub fn new(state: &'a mut ServiceState) -> Self {
        Self {
            state,
            dbv: CURRENT_DBV,
            line: 0,
            report: LoadReport::default(),
            trailer: None,
        }
    }

    fn entity(&self, name: &str) -> Result<EntityId, RowError> {
        self.state.entities.find(name).ok_or_else(|| RowError::Unresolved {
            kind: "entity",
            name: name.to_string(),
        })
    }

    fn channel(&self, name: &str) -> Result<ChannelId, RowError> {
        self.state.channels.find(name).ok_or_else(|| RowError::Unresolved {
            kind: "channel",
            name: name.to_string(),
        })
    }

    fn target(&self, word: &str) -> Result<AccessTarget, RowError> {
        if let Some(id) = self.state.entities.find(word) {
            return Ok(AccessTarget::Entity(id));
        }
        if is_valid_hostmask(word) {
            return Ok(AccessTarget::Host(word.to_string()));
        }
        Err(RowError::Unresolved {
            kind: "entity",
            name: word.to_string(),
        })
    }

    /// Parse an option flag word, warning about characters this build
    /// does not know. Schema versions before 8 stored the raw number.
    fn option_flags(&self, table: &[GFlag], word: &str, field: &'static str) -> Result<u32, RowError> {
        if self.dbv < 8 {
            return word.parse().map_err(|_| RowError::InvalidNumber {
                field,
                value: word.to_string(),
            });
        }
        let (flags, clean) = gflags_fromstr_lossy(table, word);
        if !clean {
            warn!(line = self.line, field, value = %word, "Unknown option flags dropped");
        }
        Ok(flags)
    }
}

/// Loader for one row tag.
pub type RowHandler = fn(&mut LoadContext<'_>, &mut RowReader<'_>) -> Result<(), RowError>;

/// Tag to handler mapping.
#[derive(Clone)]
pub struct HandlerTable {
    handlers: HashMap<&'static str, RowHandler>,
}

impl HandlerTable {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Handlers for every row this build writes.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.register("CF", load_cf);
        table.register("MU", load_mu);
        table.register("MN", load_mn);
        table.register("MDU", load_mdu);
        table.register("GRP", load_grp);
        table.register("GACL", load_gacl);
        table.register("MDG", load_mdg);
        table.register("MC", load_mc);
        table.register("CA", load_ca);
        table.register("MDA", load_mda);
        table.register("MDC", load_mdc);
        table.register("DE", load_de);
        table
    }

    /// Install `handler` for `tag`, returning the one it replaces.
    pub fn register(&mut self, tag: &'static str, handler: RowHandler) -> Option<RowHandler> {
        self.handlers.insert(tag, handler)
    }

    pub fn get(&self, tag: &str) -> Option<RowHandler> {
        self.handlers.get(tag).copied()
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.handlers.keys().collect();
        tags.sort();
        f.debug_struct("HandlerTable").field("tags", &tags).finish()
    }
}

/// `CF <+flags>`: flag set in use when the file was written.
fn load_cf(ctx: &mut LoadContext<'_>, row: &mut RowReader<'_>) -> Result<(), RowError> {
    let saved = row.read_word("flags")?;
    let reg = &ctx.state.flags;

    let lost: String = saved
        .chars()
        .filter(|&c| is_flag_char(c) && reg.lookup(c) == CA_NONE)
        .collect();
    let made_up: String = reg
        .iter()
        .map(|s| s.flag)
        .filter(|c| !saved.contains(*c))
        .collect();

    if !lost.is_empty() {
        warn!(flags = %lost, "Saved access flags are no longer registered and will be lost");
    }
    if !made_up.is_empty() {
        warn!(flags = %made_up, "Registered access flags missing from the database");
    }
    Ok(())
}

/// `MU <name> <pass> <email> <registered> <lastlogin> <+flags> <language>`
fn load_mu(ctx: &mut LoadContext<'_>, row: &mut RowReader<'_>) -> Result<(), RowError> {
    let name = row.read_word("name")?;
    let pass = row.read_word("pass")?;
    let email = row.read_word("email")?;
    let registered = row.read_time("registered")?;
    let last_login = row.read_time("lastlogin")?;
    let flags = ctx.option_flags(MU_FLAGS, row.read_word("flags")?, "flags")?;
    let language = match row.try_word() {
        None | Some("default") => None,
        Some(lang) => Some(lang.to_string()),
    };

    ctx.state
        .entities
        .insert(Entity::Account(Account {
            name: name.to_string(),
            pass: pass.to_string(),
            email: email.to_string(),
            registered,
            last_login,
            flags,
            language,
            nicks: Vec::new(),
            metadata: Metadata::new(),
        }))
        .map_err(|_| RowError::Duplicate {
            kind: "account",
            name: name.to_string(),
        })?;
    ctx.report.accounts += 1;
    Ok(())
}

/// `MN <account> <nick> <registered> <lastseen>`
fn load_mn(ctx: &mut LoadContext<'_>, row: &mut RowReader<'_>) -> Result<(), RowError> {
    let owner = row.read_word("account")?;
    let nick = row.read_word("nick")?;
    let registered = row.read_time("registered")?;
    let last_seen = row.read_time("lastseen")?;
    let id = ctx.entity(owner)?;
    let account = ctx
        .state
        .entities
        .account_mut(id)
        .ok_or_else(|| RowError::Unresolved {
            kind: "account",
            name: owner.to_string(),
        })?;
    account.nicks.push(RegisteredNick {
        nick: nick.to_string(),
        registered,
        last_seen,
    });
    Ok(())
}

fn load_entity_metadata(
    ctx: &mut LoadContext<'_>,
    row: &mut RowReader<'_>,
    want_group: bool,
) -> Result<(), RowError> {
    let owner = row.read_word("name")?;
    let key = row.read_word("key")?;
    let value = row.read_str("value")?;
    let id = ctx.entity(owner)?;
    let entity = ctx
        .state
        .entities
        .get_mut(id)
        .filter(|e| matches!(e, Entity::Group(_)) == want_group)
        .ok_or_else(|| RowError::Unresolved {
            kind: if want_group { "group" } else { "account" },
            name: owner.to_string(),
        })?;
    entity.metadata_mut().insert(key.to_string(), value);
    Ok(())
}

/// `MDU <account> <key> <value...>`
fn load_mdu(ctx: &mut LoadContext<'_>, row: &mut RowReader<'_>) -> Result<(), RowError> {
    load_entity_metadata(ctx, row, false)
}

/// `MDG <group> <key> <value...>`
fn load_mdg(ctx: &mut LoadContext<'_>, row: &mut RowReader<'_>) -> Result<(), RowError> {
    load_entity_metadata(ctx, row, true)
}

/// `GRP <name> <registered> <+flags>`
fn load_grp(ctx: &mut LoadContext<'_>, row: &mut RowReader<'_>) -> Result<(), RowError> {
    let name = row.read_word("name")?;
    let registered = row.read_time("registered")?;
    let flags = ctx.option_flags(MG_FLAGS, row.read_word("flags")?, "flags")?;
    ctx.state
        .entities
        .insert(Entity::Group(Group {
            name: name.to_string(),
            registered,
            flags,
            members: Vec::new(),
            metadata: Metadata::new(),
        }))
        .map_err(|_| RowError::Duplicate {
            kind: "group",
            name: name.to_string(),
        })?;
    ctx.report.groups += 1;
    Ok(())
}

/// `GACL <group> <entity> <+flags>`
fn load_gacl(ctx: &mut LoadContext<'_>, row: &mut RowReader<'_>) -> Result<(), RowError> {
    let group_name = row.read_word("group")?;
    let member_name = row.read_word("entity")?;
    let (flags, clean) = gflags_fromstr_lossy(GA_FLAGS_TABLE, row.read_word("flags")?);
    if !clean {
        warn!(line = ctx.line, group = %group_name, "Unknown group access flags dropped");
    }
    let group = ctx.entity(group_name)?;
    let member = ctx.entity(member_name)?;
    ctx.state
        .set_group_member(group, member, flags)
        .map_err(|_| RowError::Unresolved {
            kind: "group",
            name: group_name.to_string(),
        })
}

/// `MC <name> <founder> <registered> <used> <+flags> <mlock_on> <mlock_off>
/// <mlock_limit> <mlock_key>`. Versions before 8 have no founder field.
fn load_mc(ctx: &mut LoadContext<'_>, row: &mut RowReader<'_>) -> Result<(), RowError> {
    let name = row.read_word("name")?;
    let founder_word = if ctx.dbv >= 8 {
        Some(row.read_word("founder")?)
    } else {
        None
    };
    let registered = row.read_time("registered")?;
    let used = row.read_time("used")?;
    let flags = ctx.option_flags(MC_FLAGS, row.read_word("flags")?, "flags")?;

    let mut chan = Channel::new(name, registered);
    chan.used = used;
    chan.flags = flags;
    chan.mlock.on = row.read_u32("mlock_on")?;
    chan.mlock.off = row.read_u32("mlock_off")?;
    chan.mlock.limit = row.read_u32("mlock_limit")?;
    chan.mlock.key = match row.read_word("mlock_key")? {
        "*" => None,
        key => Some(key.to_string()),
    };
    chan.founder = match founder_word {
        None | Some("*") => None,
        Some(founder) => {
            let id = ctx.state.entities.find(founder);
            if id.is_none() {
                warn!(line = ctx.line, channel = %name, founder = %founder, "Founder not registered");
            }
            id
        }
    };

    ctx.state
        .channels
        .insert(chan)
        .map_err(|_| RowError::Duplicate {
            kind: "channel",
            name: name.to_string(),
        })?;
    ctx.report.channels += 1;
    Ok(())
}

/// `CA <channel> <entity-or-host> <+flags> <tmodified> [setter]`
fn load_ca(ctx: &mut LoadContext<'_>, row: &mut RowReader<'_>) -> Result<(), RowError> {
    let chan_name = row.read_word("channel")?;
    let target_word = row.read_word("target")?;
    let flags = row.read_word("flags")?;
    let tmodified = row.read_time("tmodified")?;
    let setter = row.try_word().map(str::to_string);

    let cid = ctx.channel(chan_name)?;
    let target = ctx.target(target_word)?;
    let level = flags_to_bitmask(&ctx.state.flags, flags, CA_NONE);
    if level == CA_NONE {
        warn!(line = ctx.line, channel = %chan_name, target = %target_word, "Entry has no known flags, dropped");
        return Ok(());
    }

    let mut entry = ChanAcs::new(target, level, tmodified);
    entry.setter = setter;
    if ctx.state.load_entry(cid, entry) {
        ctx.report.chanacs += 1;
    } else {
        warn!(line = ctx.line, channel = %chan_name, target = %target_word, "Duplicate entry merged");
    }
    Ok(())
}

/// `MDA <channel>:<entity-or-host> <key> <value...>`
fn load_mda(ctx: &mut LoadContext<'_>, row: &mut RowReader<'_>) -> Result<(), RowError> {
    let owner = row.read_word("entry")?;
    let key = row.read_word("key")?;
    let value = row.read_str("value")?;
    let (chan_name, target_word) = owner.split_once(':').ok_or(RowError::MissingField("target"))?;

    let cid = ctx.channel(chan_name)?;
    let target = ctx.target(target_word)?;
    let entry = ctx
        .state
        .channels
        .get_mut(cid)
        .and_then(|c| c.access.get_mut(&target))
        .ok_or_else(|| RowError::Unresolved {
            kind: "entry",
            name: owner.to_string(),
        })?;
    entry.metadata.insert(key.to_string(), value);
    Ok(())
}

/// `MDC <channel> <key> <value...>`
fn load_mdc(ctx: &mut LoadContext<'_>, row: &mut RowReader<'_>) -> Result<(), RowError> {
    let chan_name = row.read_word("channel")?;
    let key = row.read_word("key")?;
    let value = row.read_str("value")?;
    let cid = ctx.channel(chan_name)?;
    if let Some(chan) = ctx.state.channels.get_mut(cid) {
        chan.metadata.insert(key.to_string(), value);
    }
    Ok(())
}

/// `DE <accounts> <channels> <chanacs> <groups>`
fn load_de(ctx: &mut LoadContext<'_>, row: &mut RowReader<'_>) -> Result<(), RowError> {
    ctx.trailer = Some(Trailer {
        accounts: row.read_uint("accounts")?,
        channels: row.read_uint("channels")?,
        chanacs: row.read_uint("chanacs")?,
        groups: row.try_word().and_then(|w| w.parse().ok()),
    });
    Ok(())
}
