//! Observer hooks for access list changes.
//!
//! The registry itself never talks to the network. Anything that has to
//! react to an access change (AKICK enforcement, auto-op on grant, audit
//! logging) registers an [`AclObserver`] on the
//! [`ServiceState`](super::ServiceState) and is called after each
//! successful mutation, with the new state already visible.

use crate::acl::ChanAcs;
use crate::flags::Bitmask;
use tracing::warn;

/// Trait for observing access list changes.
///
/// Called on the thread that performed the mutation while the state is
/// still held, so implementations must not block.
pub trait AclObserver: Send + Sync {
    /// An entry was created or its level changed. `old_level` is zero for
    /// a new entry.
    fn on_entry_changed(&self, channel: &str, entry: &ChanAcs, old_level: Bitmask);

    /// An entry was deleted, either explicitly or because its level
    /// dropped to zero.
    fn on_entry_removed(&self, channel: &str, entry: &ChanAcs);

    /// A channel registration was dropped with all of its entries.
    fn on_channel_dropped(&self, _channel: &str) {}
}

/// Operator-visible notices (wallops) for conditions that need a human.
pub trait Notifier: Send + Sync {
    fn wallops(&self, text: &str);
}

/// Notifier used when no uplink is attached: notices only reach the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn wallops(&self, text: &str) {
        warn!(target: "wallops", "{text}");
    }
}
