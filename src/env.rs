//! Host path resolution.
//!
//! Every file the crate reads lives under one of three roots: the proc
//! filesystem, the etc directory, or the filesystem root. Each root can be
//! redirected, which is how containers sample the host and how tests point
//! the samplers at fixture trees. Lookup order per root:
//!
//! 1. the explicit override map held by [`HostPaths`]
//! 2. the root's environment variable (`HOST_PROC`, `HOST_ETC`, `HOST_ROOT`)
//! 3. the built-in default (`/proc`, `/etc`, `/`)

use ahash::AHashMap as HashMap;
use std::path::PathBuf;

/// Logical root a path is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostRoot {
    Proc,
    Etc,
    Root,
}

impl HostRoot {
    /// Environment variable consulted when no override is set.
    pub fn env_key(self) -> &'static str {
        match self {
            HostRoot::Proc => "HOST_PROC",
            HostRoot::Etc => "HOST_ETC",
            HostRoot::Root => "HOST_ROOT",
        }
    }

    /// Path used when neither override nor environment is set.
    pub fn default_path(self) -> &'static str {
        match self {
            HostRoot::Proc => "/proc",
            HostRoot::Etc => "/etc",
            HostRoot::Root => "/",
        }
    }
}

/// Per-instance root overrides, superseding the environment.
pub type EnvMap = HashMap<HostRoot, String>;

/// Resolves logical file names to filesystem paths.
#[derive(Debug, Clone, Default)]
pub struct HostPaths {
    overrides: EnvMap,
}

impl HostPaths {
    pub fn new(overrides: EnvMap) -> Self {
        Self { overrides }
    }

    /// Builder-style override for a single root. Empty values are ignored.
    pub fn with_root(mut self, root: HostRoot, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.overrides.insert(root, value);
        }
        self
    }

    /// Returns the base directory for `root` after applying overrides.
    pub fn base(&self, root: HostRoot) -> PathBuf {
        if let Some(v) = self.overrides.get(&root).filter(|v| !v.is_empty()) {
            return PathBuf::from(v);
        }
        match std::env::var(root.env_key()) {
            Ok(v) if !v.is_empty() => PathBuf::from(v),
            _ => PathBuf::from(root.default_path()),
        }
    }

    /// Joins `segments` onto the resolved base of `root`.
    pub fn resolve(&self, root: HostRoot, segments: &[&str]) -> PathBuf {
        let mut path = self.base(root);
        for seg in segments {
            path.push(seg);
        }
        path
    }

    pub fn proc(&self, segments: &[&str]) -> PathBuf {
        self.resolve(HostRoot::Proc, segments)
    }

    pub fn etc(&self, segments: &[&str]) -> PathBuf {
        self.resolve(HostRoot::Etc, segments)
    }

    pub fn root(&self, segments: &[&str]) -> PathBuf {
        self.resolve(HostRoot::Root, segments)
    }
}
