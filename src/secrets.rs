use crate::fs_util::{ensure_private_dir, home_dir, write_private};
use std::path::{Path, PathBuf};

fn state_dir() -> PathBuf {
    if let Ok(path) = std::env::var("BOTCHAT_CONFIG") {
        if let Some(parent) = PathBuf::from(path).parent() {
            return parent.to_path_buf();
        }
    }
    home_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".botchat")
}

fn provider_key_path(state_dir: &Path, provider: &str) -> anyhow::Result<PathBuf> {
    let provider = provider.trim().to_ascii_lowercase();
    if !matches!(provider.as_str(), "anthropic" | "openai") {
        anyhow::bail!("unsupported completion provider: {provider}");
    }
    Ok(state_dir.join("keys").join(format!("{provider}.key")))
}

/// Write a completion API key with owner-only permissions.
pub fn write_key_to(state_dir: &Path, provider: &str, api_key: &str) -> anyhow::Result<PathBuf> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        anyhow::bail!("API key cannot be empty");
    }

    let path = provider_key_path(state_dir, provider)?;
    if let Some(dir) = path.parent() {
        ensure_private_dir(dir)?;
    }
    write_private(&path, api_key)?;
    Ok(path)
}

pub fn read_key_from(state_dir: &Path, provider: &str) -> Option<String> {
    let path = provider_key_path(state_dir, provider).ok()?;
    let value = std::fs::read_to_string(path).ok()?;
    Some(value.trim().to_string()).filter(|v| !v.is_empty())
}

/// Store a key under ~/.botchat/keys/{provider}.key.
pub fn store_api_key(provider: &str, api_key: &str) -> anyhow::Result<PathBuf> {
    write_key_to(&state_dir(), provider, api_key)
}

pub fn load_api_key(provider: &str) -> Option<String> {
    read_key_from(&state_dir(), provider)
}
