use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// `(project_name, branch_name, path_hash)` — uniquely identifies a tenant even
/// across git worktrees of the same repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantKey {
    pub project_name: String,
    pub branch_name: String,
    pub path_hash: String,
}

impl TenantKey {
    pub fn new(project_name: &str, branch_name: &str, absolute_path: &Path) -> Result<Self, TenantError> {
        validate_project_name(project_name)?;
        validate_branch_name(branch_name)?;

        Ok(Self {
            project_name: project_name.to_string(),
            branch_name: branch_name.to_string(),
            path_hash: path_hash(absolute_path),
        })
    }
}

/// First 16 lowercase hex chars of SHA-256 over the normalized absolute path.
///
/// Normalization: backslashes become forward slashes, a trailing slash is
/// trimmed, then the UTF-8 bytes are hashed. `path_hash("/a/b/") ==
/// path_hash("/a/b") == path_hash("\\a\\b")`.
pub fn path_hash(absolute_path: &Path) -> String {
    let raw = absolute_path.to_string_lossy().replace('\\', "/");
    let trimmed = raw.strip_suffix('/').unwrap_or(&raw);

    let mut hasher = Sha256::new();
    hasher.update(trimmed.as_bytes());
    let digest = hasher.finalize();

    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

pub fn is_valid_project_name(value: &str) -> bool {
    project_name_regex_ok(value)
}

fn project_name_regex_ok(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn validate_project_name(value: &str) -> Result<(), TenantError> {
    if project_name_regex_ok(value) {
        Ok(())
    } else {
        Err(TenantError::InvalidTenant {
            field: "project_name".to_string(),
            reason: "must match ^[a-z][a-z0-9-]*$".to_string(),
        })
    }
}

fn validate_branch_name(value: &str) -> Result<(), TenantError> {
    if value.is_empty()
        || value.starts_with('/')
        || value.ends_with('/')
        || value.ends_with(".lock")
        || value.contains("..")
        || value.contains("//")
        || value.contains(['~', '^', ':', '?', '*', '[', '\\', ' '])
        || value.chars().any(|c| c.is_ascii_control())
    {
        return Err(TenantError::InvalidTenant {
            field: "branch_name".to_string(),
            reason: "does not satisfy git branch naming rules".to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("tenant context already initialized")]
    AlreadyInitialized,
    #[error("invalid tenant field `{field}`: {reason}")]
    InvalidTenant { field: String, reason: String },
    #[error("requested tenant does not match the active tenant")]
    TenantMismatch,
}

/// Binds the engine to one `(project, branch, path)` triple for the lifetime of
/// an activation. Background tasks obtain this via [`current`], a task-local
/// ambient accessor populated once at `activate_project` time (§9: ambient
/// tenant context for background tasks).
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub key: TenantKey,
    pub absolute_path: PathBuf,
}

impl TenantContext {
    pub fn activate(
        project_name: &str,
        branch_name: &str,
        absolute_path: &Path,
    ) -> Result<Self, TenantError> {
        let key = TenantKey::new(project_name, branch_name, absolute_path)?;
        Ok(Self {
            key,
            absolute_path: absolute_path.to_path_buf(),
        })
    }

    pub fn project_name(&self) -> &str {
        &self.key.project_name
    }

    pub fn branch_name(&self) -> &str {
        &self.key.branch_name
    }

    pub fn path_hash(&self) -> &str {
        &self.key.path_hash
    }

    /// Rejects cross-tenant requests. Every storage/retrieval operation checks
    /// this before touching the store.
    pub fn check(&self, requested: &TenantKey) -> Result<(), TenantError> {
        if &self.key == requested {
            Ok(())
        } else {
            Err(TenantError::TenantMismatch)
        }
    }
}

static ACTIVE: OnceLock<std::sync::RwLock<Option<TenantContext>>> = OnceLock::new();

fn slot() -> &'static std::sync::RwLock<Option<TenantContext>> {
    ACTIVE.get_or_init(|| std::sync::RwLock::new(None))
}

/// Sets the process-wide ambient tenant context. Only `activate_project`
/// should call this. Background tasks spawned after activation observe it
/// through [`current`].
pub fn set_current(ctx: TenantContext) {
    *slot().write().expect("tenant context lock poisoned") = Some(ctx);
}

pub fn current() -> Option<TenantContext> {
    slot().read().expect("tenant context lock poisoned").clone()
}
