//! `syft.pub.yaml` policy file model, plus legacy `syftperm.yaml`
//! migration.

use crate::error::{RpcError, RpcResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// One permission tier. Ordered so that `PartialOrd` reflects the
/// hierarchy closure (`admin ⇒ write ⇒ create ⇒ read`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Read,
    Create,
    Write,
    Admin,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Read, Tier::Create, Tier::Write, Tier::Admin];
}

/// Which principals hold which tier, directly as declared by one rule
/// (before hierarchy closure is applied).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessMap {
    #[serde(default)]
    pub read: BTreeSet<String>,
    #[serde(default)]
    pub create: BTreeSet<String>,
    #[serde(default)]
    pub write: BTreeSet<String>,
    #[serde(default)]
    pub admin: BTreeSet<String>,
}

impl AccessMap {
    pub fn principals_for(&self, tier: Tier) -> &BTreeSet<String> {
        match tier {
            Tier::Read => &self.read,
            Tier::Create => &self.create,
            Tier::Write => &self.write,
            Tier::Admin => &self.admin,
        }
    }

    fn principals_for_mut(&mut self, tier: Tier) -> &mut BTreeSet<String> {
        match tier {
            Tier::Read => &mut self.read,
            Tier::Create => &mut self.create,
            Tier::Write => &mut self.write,
            Tier::Admin => &mut self.admin,
        }
    }

    pub fn grants(&self, tier: Tier, principal: &str) -> bool {
        let set = self.principals_for(tier);
        set.contains(principal) || set.contains("*")
    }
}

/// One rule within a policy file: a glob pattern, the access it grants,
/// and whether it grants or revokes it. `syft.pub.yaml`'s published
/// schema omits an explicit `allow` field on each rule; we default it to
/// `true` and accept it as an optional extension, tolerating unknown
/// fields rather than rejecting the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub pattern: String,
    #[serde(default)]
    pub access: AccessMap,
    #[serde(default = "default_allow")]
    pub allow: bool,
}

fn default_allow() -> bool {
    true
}

/// The parsed contents of one `syft.pub.yaml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    /// When true, this level's rules are the last ones consulted; no
    /// ancestor policy above it contributes.
    #[serde(default)]
    pub terminal: bool,

    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl Policy {
    pub fn parse_yaml(raw: &str) -> RpcResult<Self> {
        serde_yaml::from_str(raw).map_err(RpcError::from)
    }

    /// Parse a legacy `syftperm.yaml` file and convert it into a
    /// `Policy`, one `PolicyRule` per legacy entry. Legacy files carry no
    /// terminal flag; they never terminate ascent on their own.
    pub fn parse_legacy_yaml(raw: &str) -> RpcResult<Self> {
        let legacy: LegacyPermFile = serde_yaml::from_str(raw).map_err(RpcError::from)?;
        let rules = legacy
            .permissions
            .into_iter()
            .map(LegacyPermEntry::into_rule)
            .collect();
        Ok(Policy {
            terminal: false,
            rules,
        })
    }

    /// Load either file kind by filename convention: `syft.pub.yaml` is
    /// parsed natively, `syftperm.yaml` is migrated.
    pub fn load(path: &Path, raw: &str) -> RpcResult<Self> {
        let is_legacy = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n == "syftperm.yaml")
            .unwrap_or(false);
        let result = if is_legacy {
            Self::parse_legacy_yaml(raw)
        } else {
            Self::parse_yaml(raw)
        };
        result.map_err(|e| RpcError::MalformedPolicy {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct LegacyPermFile {
    #[serde(default)]
    permissions: Vec<LegacyPermEntry>,
}

#[derive(Debug, Deserialize)]
struct LegacyPermEntry {
    pattern: String,
    user: Vec<String>,
    permissions: Vec<Tier>,
}

impl LegacyPermEntry {
    fn into_rule(self) -> PolicyRule {
        let mut access = AccessMap::default();
        for tier in self.permissions {
            access.principals_for_mut(tier).extend(self.user.iter().cloned());
        }
        PolicyRule {
            pattern: self.pattern,
            access,
            allow: true,
        }
    }
}
