//! Channel registration and access list configuration.

use crate::acl::Templates;
use crate::flags::codec::flags_to_bitmask;
use crate::flags::{CA_NONE, FlagRegistry};
use crate::state::AclSettings;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Channel service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChanServConfig {
    /// Maximum access entries per channel (default: 0, unlimited).
    #[serde(default)]
    pub maxchanacs: usize,
    /// Network-wide template levels as flag strings.
    #[serde(default = "default_templates")]
    pub templates: BTreeMap<String, String>,
    /// Let channels restrict what non-founders may grant (default: false).
    #[serde(default)]
    pub use_limitflags: bool,
}

impl Default for ChanServConfig {
    fn default() -> Self {
        Self {
            maxchanacs: 0,
            templates: default_templates(),
            use_limitflags: false,
        }
    }
}

fn default_templates() -> BTreeMap<String, String> {
    [
        ("VOP", "+AV"),
        ("HOP", "+AHehitrv"),
        ("AOP", "+AOehiortv"),
        ("SOP", "+AOaefhiorstv"),
    ]
    .into_iter()
    .map(|(name, flags)| (name.to_string(), flags.to_string()))
    .collect()
}

impl ChanServConfig {
    /// Resolve template flag strings against the finished flag table.
    /// Templates that resolve to nothing are left out.
    pub fn templates(&self, reg: &FlagRegistry) -> Templates {
        let mut out = Templates::new();
        for (name, flags) in &self.templates {
            let mask = reg.sanitize_level(flags_to_bitmask(reg, flags, CA_NONE));
            if mask != CA_NONE {
                out.insert(name, mask);
            }
        }
        out
    }

    pub fn acl_settings(&self, reg: &FlagRegistry) -> AclSettings {
        AclSettings {
            maxchanacs: self.maxchanacs,
            templates: self.templates(reg),
            limitflags: self.use_limitflags,
        }
    }
}
