use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Result;
use sha2::{Digest, Sha256};

/// Recursively lists every regular file under `root`, returning paths
/// relative to `root` using forward slashes so the listing is stable
/// across platforms.
pub fn list_regular_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(root, &path, out)?;
        } else if file_type.is_file() {
            out.push(path.strip_prefix(root)?.to_path_buf());
        }
    }
    Ok(())
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// `hex  relpath` one line per file, sorted by relpath.
pub fn render_sha256sums(entries: &[(PathBuf, String)]) -> String {
    let mut sorted: Vec<&(PathBuf, String)> = entries.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted.iter().map(|(relpath, digest)| format!("{digest}  {}\n", relpath.to_string_lossy())).collect()
}

/// Parses a `SHA256SUMS` file's content into `(relpath, digest)` pairs.
pub fn parse_sha256sums(content: &str) -> Vec<(PathBuf, String)> {
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(2, "  ");
            let digest = parts.next()?.trim();
            let relpath = parts.next()?.trim();
            if digest.is_empty() || relpath.is_empty() {
                return None;
            }
            Some((PathBuf::from(relpath), digest.to_string()))
        })
        .collect()
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}
