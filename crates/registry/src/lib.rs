//! Model registry: an append-only JSON ledger of `RegistryEntry`
//! rows, exclusively writer-locked with `fs2` advisory file locks so
//! concurrent writers serialize and readers never observe a torn file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use milton_core::RegistryEntry;

pub struct ModelRegistry {
    path: PathBuf,
}

impl ModelRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Shared-lock read of the full ledger.
    pub async fn list(&self) -> Result<Vec<RegistryEntry>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_locked(&path)).await?
    }

    /// Appends `entry` under an exclusive lock. If `entry.active`, every
    /// other row's `active` flag is cleared first; same for `last_good`.
    /// Neither flip touches the other flag, so flipping `active` preserves
    /// whatever `last_good` value the prior active row carried.
    pub async fn append(&self, entry: RegistryEntry) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let (file, mut entries) = open_and_read_exclusive(&path)?;
            if entry.active {
                for existing in entries.iter_mut() {
                    existing.active = false;
                }
            }
            if entry.last_good {
                for existing in entries.iter_mut() {
                    existing.last_good = false;
                }
            }
            entries.push(entry);
            write_locked(file, &path, &entries)
        })
        .await?
    }

    /// Marks `version` as the sole active entry, leaving every entry's
    /// `last_good` flag untouched.
    pub async fn set_active(&self, version: &str) -> Result<()> {
        let path = self.path.clone();
        let version = version.to_string();
        tokio::task::spawn_blocking(move || {
            let (file, mut entries) = open_and_read_exclusive(&path)?;
            if !entries.iter().any(|e| e.version == version) {
                anyhow::bail!("no registry entry for version {version}");
            }
            for entry in entries.iter_mut() {
                entry.active = entry.version == version;
            }
            write_locked(file, &path, &entries)
        })
        .await?
    }

    /// Marks `version` as the sole last-known-good entry.
    pub async fn set_last_good(&self, version: &str) -> Result<()> {
        let path = self.path.clone();
        let version = version.to_string();
        tokio::task::spawn_blocking(move || {
            let (file, mut entries) = open_and_read_exclusive(&path)?;
            if !entries.iter().any(|e| e.version == version) {
                anyhow::bail!("no registry entry for version {version}");
            }
            for entry in entries.iter_mut() {
                entry.last_good = entry.version == version;
            }
            write_locked(file, &path, &entries)
        })
        .await?
    }
}

fn read_locked(path: &Path) -> Result<Vec<RegistryEntry>> {
    let Ok(mut file) = File::open(path) else {
        return Ok(Vec::new());
    };
    file.lock_shared().context("acquiring shared registry lock")?;
    let mut raw = String::new();
    file.read_to_string(&mut raw)?;
    file.unlock()?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&raw)?)
}

fn open_and_read_exclusive(path: &Path) -> Result<(File, Vec<RegistryEntry>)> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)?;
    file.lock_exclusive().context("acquiring exclusive registry lock")?;

    let mut raw = String::new();
    file.read_to_string(&mut raw)?;
    let entries = if raw.trim().is_empty() { Vec::new() } else { serde_json::from_str(&raw)? };
    Ok((file, entries))
}

fn write_locked(mut file: File, path: &Path, entries: &[RegistryEntry]) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&serde_json::to_vec_pretty(entries)?)?;
        tmp.flush()?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    file.unlock()?;
    file.flush().ok();
    Ok(())
}
