//! Owner-only storage for API keys and the local chat cache.
//!
//! Both hold user data (credentials, message history), so directories are
//! created 0700 and files land 0600 before they become visible under their
//! final name.

use std::path::{Path, PathBuf};

pub fn home_dir() -> anyhow::Result<PathBuf> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| anyhow::anyhow!("HOME environment variable is not set"))
}

/// Create `dir` (and parents) if needed and restrict it to the owner.
pub fn ensure_private_dir(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| anyhow::anyhow!("failed to create {}: {e}", dir.display()))?;
    restrict(dir, 0o700)
}

/// Replace `path` with `contents`.
///
/// The data goes to a sibling temp file that is locked down first and then
/// renamed over the target, so a crash mid-write leaves the previous cache
/// entry or key intact.
pub fn write_private(path: &Path, contents: &str) -> anyhow::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", tmp.display()))?;
    if let Err(e) = restrict(&tmp, 0o600) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)
        .map_err(|e| anyhow::anyhow!("failed to replace {}: {e}", path.display()))
}

#[cfg(unix)]
fn restrict(path: &Path, mode: u32) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| anyhow::anyhow!("failed to restrict {} to {mode:o}: {e}", path.display()))
}

#[cfg(not(unix))]
fn restrict(_path: &Path, _mode: u32) -> anyhow::Result<()> {
    Ok(())
}
