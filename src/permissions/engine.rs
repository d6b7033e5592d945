//! The permission computation algorithm.
//!
//! For a path, ascend from its directory up to the datasites root,
//! collecting `syft.pub.yaml` (or legacy `syftperm.yaml`) files along the
//! way. Find the deepest level marked `terminal`; discard every ancestor
//! policy above it. Evaluate the surviving policies root-to-leaf, in
//! declared rule order, with last-match-wins per tier. Close the result
//! under the tier hierarchy, then apply the owner override.

use super::glob::glob_matches;
use super::policy::{Policy, Tier};
use crate::error::RpcResult;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The tiers granted to one principal at one path, after hierarchy
/// closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComputedPermission {
    pub read: bool,
    pub create: bool,
    pub write: bool,
    pub admin: bool,
}

impl ComputedPermission {
    pub fn allows(&self, tier: Tier) -> bool {
        match tier {
            Tier::Read => self.read,
            Tier::Create => self.create,
            Tier::Write => self.write,
            Tier::Admin => self.admin,
        }
    }

    /// Close the set of directly granted tiers under the hierarchy:
    /// admin implies write, write implies create, create implies read.
    fn close(mut self) -> Self {
        if self.admin {
            self.write = true;
        }
        if self.write {
            self.create = true;
        }
        if self.create {
            self.read = true;
        }
        self
    }
}

const POLICY_FILENAME: &str = "syft.pub.yaml";
const LEGACY_POLICY_FILENAME: &str = "syftperm.yaml";

struct CachedPolicy {
    modified: SystemTime,
    policy: Policy,
}

/// Computes effective permissions by reading policy files from the
/// filesystem, with a cache so repeated checks against an unmodified
/// policy file don't re-parse YAML on every call.
pub struct PermissionsEngine {
    cache: DashMap<PathBuf, CachedPolicy>,
    auto_convert_legacy: bool,
}

impl PermissionsEngine {
    /// `auto_convert_legacy` controls whether `syftperm.yaml` files are
    /// consulted at all; passed explicitly at construction rather than
    /// toggled through global state, since one engine instance answers
    /// checks for every app under the same workspace.
    pub fn new(auto_convert_legacy: bool) -> Self {
        Self {
            cache: DashMap::new(),
            auto_convert_legacy,
        }
    }

    /// Compute the permission `principal` has at `path`, where `path` is
    /// an absolute path under `datasites_root`.
    pub fn compute(
        &self,
        datasites_root: &Path,
        path: &Path,
        principal: &str,
    ) -> RpcResult<ComputedPermission> {
        let levels = self.collect_levels(datasites_root, path)?;
        let contributing = discard_above_terminal(levels);

        let mut direct = ComputedPermission::default();
        for level in &contributing {
            for rule in &level.policy.rules {
                if glob_matches(&rule.pattern, &level.relative_to_target) {
                    for tier in Tier::ALL {
                        if rule.access.grants(tier, principal) {
                            set_tier(&mut direct, tier, rule.allow);
                        }
                    }
                }
            }
        }

        let mut computed = direct.close();

        if is_owner(datasites_root, path, principal) {
            computed.admin = true;
            computed = computed.close();
        }

        Ok(computed)
    }

    /// Ascend from `path`'s containing directory to `datasites_root`,
    /// loading any policy file found at each level, root-first.
    fn collect_levels(&self, datasites_root: &Path, path: &Path) -> RpcResult<Vec<Level>> {
        let start = if path.is_dir() {
            path
        } else {
            path.parent().unwrap_or(path)
        };

        let mut dirs: Vec<PathBuf> = start
            .ancestors()
            .take_while(|dir| dir.starts_with(datasites_root))
            .map(|dir| dir.to_path_buf())
            .collect();
        if !dirs.iter().any(|d| d == datasites_root) {
            dirs.push(datasites_root.to_path_buf());
        }
        dirs.reverse(); // root-to-leaf order

        let mut levels = Vec::with_capacity(dirs.len());
        for dir in dirs {
            if let Some(policy) = self.load_policy_at(&dir)? {
                let relative_to_target = path
                    .strip_prefix(&dir)
                    .unwrap_or(path)
                    .to_string_lossy()
                    .replace('\\', "/");
                levels.push(Level {
                    policy,
                    relative_to_target,
                });
            }
        }
        Ok(levels)
    }

    fn load_policy_at(&self, dir: &Path) -> RpcResult<Option<Policy>> {
        let native = dir.join(POLICY_FILENAME);
        if let Some(policy) = self.load_cached(&native)? {
            return Ok(Some(policy));
        }
        if self.auto_convert_legacy {
            let legacy = dir.join(LEGACY_POLICY_FILENAME);
            if let Some(policy) = self.load_cached(&legacy)? {
                return Ok(Some(policy));
            }
        }
        Ok(None)
    }

    fn load_cached(&self, path: &Path) -> RpcResult<Option<Policy>> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(crate::error::RpcError::Io {
                    source: e,
                    path: Some(path.to_path_buf()),
                })
            }
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        if let Some(cached) = self.cache.get(path) {
            if cached.modified == modified {
                return Ok(Some(cached.policy.clone()));
            }
        }

        let raw = std::fs::read_to_string(path).map_err(|e| crate::error::RpcError::Io {
            source: e,
            path: Some(path.to_path_buf()),
        })?;
        let policy = Policy::load(path, &raw)?;
        self.cache.insert(
            path.to_path_buf(),
            CachedPolicy {
                modified,
                policy: policy.clone(),
            },
        );
        Ok(Some(policy))
    }
}

struct Level {
    policy: Policy,
    relative_to_target: String,
}

/// Keep only the deepest terminal level and whatever is below it; if no
/// level is terminal, keep all of them.
fn discard_above_terminal(levels: Vec<Level>) -> Vec<Level> {
    match levels.iter().rposition(|l| l.policy.terminal) {
        Some(idx) => levels.into_iter().skip(idx).collect(),
        None => levels,
    }
}

fn set_tier(perm: &mut ComputedPermission, tier: Tier, allow: bool) {
    match tier {
        Tier::Read => perm.read = allow,
        Tier::Create => perm.create = allow,
        Tier::Write => perm.write = allow,
        Tier::Admin => perm.admin = allow,
    }
}

/// A principal owns every path whose first component under
/// `datasites_root` is their own datasite name.
fn is_owner(datasites_root: &Path, path: &Path, principal: &str) -> bool {
    path.strip_prefix(datasites_root)
        .ok()
        .and_then(|rel| rel.components().next())
        .map(|c| c.as_os_str().to_string_lossy() == principal)
        .unwrap_or(false)
}
