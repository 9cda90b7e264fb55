//! Template levels (VOP, HOP, AOP, SOP and channel-defined ones).
//!
//! A template is just a named mask. The query engine never looks at them;
//! they exist so commands can grant "AOP" instead of a flag string and so
//! listings can show a name next to an entry whose level equals one.

use super::Actor;
use crate::casemap::irc_eq;
use crate::error::AclError;
use crate::flags::codec::{bitmask_to_flags, flags_to_bitmask};
use crate::flags::{Bitmask, CA_NONE, FlagRegistry};
use crate::state::ServiceState;

/// Channel metadata key holding channel-defined templates.
pub const TEMPLATES_KEY: &str = "private:templates";

/// Ordered set of named templates. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Templates(Vec<(String, Bitmask)>);

impl Templates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or redefine `name`. Redefinition keeps the original position.
    pub fn insert(&mut self, name: &str, mask: Bitmask) {
        match self.0.iter_mut().find(|(n, _)| irc_eq(n, name)) {
            Some(slot) => slot.1 = mask,
            None => self.0.push((name.to_string(), mask)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Bitmask> {
        let idx = self.0.iter().position(|(n, _)| irc_eq(n, name))?;
        Some(self.0.remove(idx).1)
    }

    pub fn get(&self, name: &str) -> Option<Bitmask> {
        self.0.iter().find(|(n, _)| irc_eq(n, name)).map(|(_, m)| *m)
    }

    /// First template whose mask is exactly `mask`.
    pub fn name_of(&self, mask: Bitmask) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, m)| *m == mask)
            .map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Bitmask)> {
        self.0.iter().map(|(n, m)| (n.as_str(), *m))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the `NAME=+flags NAME2=+flags` metadata form. Malformed words
    /// are skipped.
    pub fn parse(reg: &FlagRegistry, value: &str) -> Self {
        let mut out = Self::new();
        for word in value.split_whitespace() {
            let Some((name, flags)) = word.split_once('=') else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            out.insert(name, flags_to_bitmask(reg, flags, CA_NONE));
        }
        out
    }

    /// Inverse of [`parse`](Self::parse).
    pub fn render(&self, reg: &FlagRegistry) -> String {
        self.0
            .iter()
            .map(|(n, m)| format!("{n}={}", bitmask_to_flags(reg, *m)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl ServiceState {
    /// Templates defined on `channel` itself.
    pub fn channel_templates(&self, channel: &str) -> Templates {
        self.channels
            .by_name(channel)
            .and_then(|c| c.metadata.get(TEMPLATES_KEY))
            .map(|v| Templates::parse(&self.flags, v))
            .unwrap_or_default()
    }

    /// Mask of template `name`: the channel's own definition first, then
    /// the network-wide one.
    pub fn template_flags(&self, channel: &str, name: &str) -> Option<Bitmask> {
        self.channel_templates(channel)
            .get(name)
            .or_else(|| self.settings.templates.get(name))
    }

    /// Name of the template whose mask equals `mask`, if any.
    pub fn template_name(&self, channel: &str, mask: Bitmask) -> Option<String> {
        if mask == CA_NONE {
            return None;
        }
        let local = self.channel_templates(channel);
        local
            .name_of(mask)
            .or_else(|| self.settings.templates.name_of(mask))
            .map(str::to_string)
    }

    /// Define (`Some`) or delete (`None`) a channel template.
    ///
    /// The mask is sanitized so mutually restricted flags cannot coexist.
    /// Returns the stored mask.
    pub fn set_channel_template(
        &mut self,
        channel: &str,
        name: &str,
        mask: Option<Bitmask>,
    ) -> Result<Option<Bitmask>, AclError> {
        let cid = self.channel_id(channel)?;
        let mut templates = self.channel_templates(channel);
        let stored = match mask {
            Some(m) => {
                let m = self.flags.sanitize_level(m);
                templates.insert(name, m);
                Some(m)
            }
            None => {
                templates.remove(name);
                None
            }
        };
        let rendered = templates.render(&self.flags);
        if let Some(chan) = self.channels.get_mut(cid) {
            if templates.is_empty() {
                chan.metadata.remove(TEMPLATES_KEY);
            } else {
                chan.metadata.insert(TEMPLATES_KEY.to_string(), rendered);
            }
        }
        Ok(stored)
    }

    /// Grant exactly the level of template `name` (replacing the current
    /// level) to `target`.
    pub fn apply_template(
        &mut self,
        channel: &str,
        target: &super::AccessTarget,
        name: &str,
        actor: &Actor,
    ) -> Result<super::AccessChange, AclError> {
        let mask = self
            .template_flags(channel, name)
            .ok_or_else(|| AclError::NoSuchTemplate(name.to_string()))?;
        self.add_or_merge(channel, target, mask, !mask, actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::AccessTarget;
    use crate::state::AclSettings;

    fn setup() -> ServiceState {
        let reg = FlagRegistry::with_core_flags();
        let mut templates = Templates::new();
        templates.insert("VOP", flags_to_bitmask(&reg, "+AV", 0));
        templates.insert("AOP", flags_to_bitmask(&reg, "+AOehiortv", 0));
        let mut st = ServiceState::new(
            reg,
            AclSettings {
                templates,
                ..Default::default()
            },
        );
        let owner = st.register_account("owner", "h", "o@example.com").unwrap();
        st.register_channel("#chan", owner).unwrap();
        st
    }

    #[test]
    fn parse_and_render() {
        let reg = FlagRegistry::with_core_flags();
        let t = Templates::parse(&reg, "MEMBER=+Vv junk =+o OPS=+oO");
        assert_eq!(t.len(), 2);
        assert_eq!(t.get("member"), Some(reg.lookup('V') | reg.lookup('v')));
        assert_eq!(t.render(&reg), "MEMBER=+Vv OPS=+Oo");
    }

    #[test]
    fn channel_templates_shadow_global() {
        let mut st = setup();
        let global_vop = st.template_flags("#chan", "vop").unwrap();
        let v = st.flags.lookup('v');
        st.set_channel_template("#chan", "VOP", Some(v)).unwrap();
        assert_eq!(st.template_flags("#chan", "VOP"), Some(v));
        assert_eq!(st.template_name("#chan", v).as_deref(), Some("VOP"));
        assert_eq!(st.template_name("#chan", global_vop).as_deref(), Some("VOP"));

        st.set_channel_template("#chan", "VOP", None).unwrap();
        assert_eq!(st.template_flags("#chan", "VOP"), Some(global_vop));
        assert!(!st.channels.by_name("#chan").unwrap().metadata.contains_key(TEMPLATES_KEY));
    }

    #[test]
    fn apply_template_replaces_level() {
        let mut st = setup();
        let alice = st.register_account("alice", "h", "a@example.com").unwrap();
        let target = AccessTarget::Entity(alice);
        let s = st.flags.lookup('s');
        st.add_or_merge("#chan", &target, s, 0, &Actor::system()).unwrap();
        let change = st.apply_template("#chan", &target, "aop", &Actor::system()).unwrap();
        assert_eq!(Some(change.level()), st.template_flags("#chan", "AOP"));
        assert!(matches!(
            st.apply_template("#chan", &target, "nope", &Actor::system()),
            Err(AclError::NoSuchTemplate(_))
        ));
    }
}
