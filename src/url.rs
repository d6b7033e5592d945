//! `syft://` URL parsing and the absolute/relative path model.
//!
//! A [`SyftUrl`] addresses one RPC endpoint of one app on one datasite:
//! `syft://<datasite>/app_data/<app>/rpc/<endpoint...>`. Parsing is done
//! once at construction; reconstruction via [`SyftUrl::to_string`] is
//! byte-exact.

use crate::error::{RpcError, RpcResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^syft://(?P<site>[^/]+)/app_data/(?P<app>[^/]+)/rpc/(?P<endpoint>.+)$")
        .expect("static regex is valid")
});

/// A parsed `syft://` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyftUrl {
    datasite: String,
    app: String,
    endpoint: String,
}

impl SyftUrl {
    /// Parse a `syft://` URL. Fails with [`RpcError::MalformedUrl`] if the
    /// input does not match the `syft://<site>/app_data/<app>/rpc/<endpoint>` shape.
    pub fn parse(raw: &str) -> RpcResult<Self> {
        let caps = URL_RE
            .captures(raw)
            .ok_or_else(|| RpcError::MalformedUrl(raw.to_string()))?;
        Ok(Self {
            datasite: caps["site"].to_string(),
            app: caps["app"].to_string(),
            endpoint: caps["endpoint"].to_string(),
        })
    }

    /// Construct directly from parts (e.g. when building a URL to send a
    /// request to, rather than parsing one from text).
    pub fn new(datasite: impl Into<String>, app: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            datasite: datasite.into(),
            app: app.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn datasite(&self) -> &str {
        &self.datasite
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    /// The endpoint suffix, which may embed further `/` separators.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Directory the request/response/rejection files for this endpoint
    /// live under, given a workspace root:
    /// `<workspace>/datasites/<site>/app_data/<app>/rpc/<endpoint>/`.
    pub fn to_local_dir(&self, workspace_root: &Path) -> PathBuf {
        workspace_root
            .join("datasites")
            .join(&self.datasite)
            .join("app_data")
            .join(&self.app)
            .join("rpc")
            .join(&self.endpoint)
    }

    /// Path to this app's RPC subtree root (where `syft.pub.yaml` and
    /// `rpc.schema.json` live), without the endpoint suffix.
    pub fn app_rpc_root(&self, workspace_root: &Path) -> PathBuf {
        workspace_root
            .join("datasites")
            .join(&self.datasite)
            .join("app_data")
            .join(&self.app)
            .join("rpc")
    }
}

impl fmt::Display for SyftUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "syft://{}/app_data/{}/rpc/{}",
            self.datasite, self.app, self.endpoint
        )
    }
}

/// A path relative to the datasites root (`<workspace>/datasites/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelativePath(PathBuf);

/// A path rooted at the workspace base.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbsolutePath(PathBuf);

impl RelativePath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn components(&self) -> Vec<String> {
        self.0
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect()
    }

    pub fn to_absolute(&self, datasites_root: &Path) -> AbsolutePath {
        AbsolutePath(datasites_root.join(&self.0))
    }

    /// The datasite owning this path, i.e. the first path component.
    pub fn owning_datasite(&self) -> Option<String> {
        self.components().into_iter().next()
    }
}

impl AbsolutePath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// True iff `self` is `other` or a descendant of `other`: `other`'s
    /// component sequence is a prefix of `self`'s.
    pub fn is_subpath_of(&self, other: &AbsolutePath) -> bool {
        let mut self_components = self.0.components();
        for other_component in other.0.components() {
            match self_components.next() {
                Some(c) if c == other_component => continue,
                _ => return false,
            }
        }
        true
    }
}
