//! slircd-services - Straylight IRC Services core
//!
//! The channel access registry (flag table, flag string codec, per-channel
//! access lists, access queries) and the flat-file database it persists
//! to. Protocol linking and the command layer sit on top of this crate.

pub mod acl;
pub mod casemap;
pub mod config;
pub mod db;
pub mod error;
pub mod flags;
pub mod persist;
pub mod state;

pub use acl::{AccessChange, AccessTarget, Actor, ChanAcs, Identity, IdentityOracle};
pub use error::{AclError, FlagError};
pub use flags::{Bitmask, FlagRegistry};
pub use state::{EntityId, ServiceState};
