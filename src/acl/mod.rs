//! Channel access control lists.
//!
//! Entries live in their channel's [`AccessList`]; the operations here are
//! methods on [`ServiceState`](crate::state::ServiceState) because most of
//! them need the flag table, the entity table and the reverse index at the
//! same time.

mod bulk;
mod entry;
mod query;
mod store;
mod template;

pub use bulk::{DropReport, RepairReport};
pub use entry::{AccessList, AccessTarget, ChanAcs};
pub use query::{Identity, IdentityOracle};
pub use store::{AccessChange, Actor};
pub use template::{TEMPLATES_KEY, Templates};
