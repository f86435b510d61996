use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use milton_core::{BundleManifest, RegistryEntry};
use serde_json::Value;
use tar::{Archive, Builder};

use crate::checksums::{list_regular_files, render_sha256sums, sha256_file};

const SHA256SUMS_NAME: &str = "SHA256SUMS";
const MANIFEST_NAME: &str = "manifest.json";
const REGISTRY_ENTRY_NAME: &str = "registry_entry.json";
const BENCHMARK_SUMMARY_NAME: &str = "benchmark_summary.json";

pub struct BundleInputs<'a> {
    pub model_dir: &'a Path,
    pub version: String,
    pub registry_entry: &'a RegistryEntry,
    pub benchmark_summary: &'a Value,
}

/// Builds a bundle tarball under `bundles_root` and returns its path.
/// Synchronous and filesystem-heavy by design; callers running inside an
/// async context should dispatch this to a blocking worker.
pub fn create_bundle(inputs: BundleInputs, bundles_root: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
    fs::create_dir_all(bundles_root)?;

    let staging = bundles_root.join(format!(".staging-{}", uuid_like(now)));
    fs::create_dir_all(&staging)?;
    let cleanup = scopeguard(&staging);

    let model_dest = staging.join("model_dir");
    copy_dir_recursive(inputs.model_dir, &model_dest)?;

    let model_files = list_regular_files(&model_dest)?;
    let total_bytes: u64 = model_files.iter().map(|relpath| fs::metadata(model_dest.join(relpath)).map(|m| m.len()).unwrap_or(0)).sum();

    let bundle_id = format!("bundle_{}_{}", inputs.version, now.format("%Y%m%d_%H%M%S"));
    let manifest = BundleManifest {
        bundle_id: bundle_id.clone(),
        version: inputs.version.clone(),
        created_at: now,
        file_count: model_files.len(),
        total_bytes,
        checksum_algo: "sha256".to_string(),
    };

    fs::write(staging.join(MANIFEST_NAME), serde_json::to_vec_pretty(&manifest)?)?;
    fs::write(staging.join(REGISTRY_ENTRY_NAME), serde_json::to_vec_pretty(inputs.registry_entry)?)?;
    fs::write(staging.join(BENCHMARK_SUMMARY_NAME), serde_json::to_vec_pretty(inputs.benchmark_summary)?)?;

    let all_files = list_regular_files(&staging)?;
    let checksums: Vec<(PathBuf, String)> =
        all_files.iter().map(|relpath| sha256_file(&staging.join(relpath)).map(|digest| (relpath.clone(), digest))).collect::<Result<_>>()?;
    let sha256sums = render_sha256sums(&checksums);
    fs::write(staging.join(SHA256SUMS_NAME), &sha256sums)?;

    let bundle_path = bundles_root.join(format!("milton_edge_bundle_{}_{}.tar.gz", inputs.version, now.format("%Y%m%d_%H%M%S")));
    write_tarball(&staging, &checksums, &bundle_path)?;

    drop(cleanup);
    Ok(bundle_path)
}

/// Writes `bundle_path` as a gzip tarball whose member order matches
/// `checksums` (SHA256SUMS order), with `SHA256SUMS` itself appended last.
fn write_tarball(staging: &Path, checksums: &[(PathBuf, String)], bundle_path: &Path) -> Result<()> {
    let file = fs::File::create(bundle_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    let mut sorted: Vec<&(PathBuf, String)> = checksums.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    for (relpath, _) in &sorted {
        builder.append_path_with_name(staging.join(relpath), relpath)?;
    }
    builder.append_path_with_name(staging.join(SHA256SUMS_NAME), SHA256SUMS_NAME)?;

    builder.into_inner()?.finish()?;
    Ok(())
}

/// Streams the tar header index and extracts only `manifest.json`'s bytes,
/// never expanding the rest of the archive to disk.
pub fn extract_manifest(bundle_path: &Path) -> Result<BundleManifest> {
    let file = fs::File::open(bundle_path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_string_lossy() == MANIFEST_NAME {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            return Ok(serde_json::from_slice(&buf)?);
        }
    }
    anyhow::bail!("bundle {} has no manifest.json entry", bundle_path.display())
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src).with_context(|| format!("reading model dir {}", src.display()))? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            fs::copy(&path, &dest_path)?;
        }
    }
    Ok(())
}

fn uuid_like(now: DateTime<Utc>) -> String {
    format!("{}", now.timestamp_nanos_opt().unwrap_or_default())
}

struct StagingCleanup<'a> {
    path: &'a Path,
}

impl Drop for StagingCleanup<'_> {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(self.path);
    }
}

fn scopeguard(path: &Path) -> StagingCleanup<'_> {
    StagingCleanup { path }
}

#[cfg(test)]
mod tests {
    use super::*;
    use milton_core::{MetricResult, RegistryEntry};
    use std::collections::HashMap;

    fn registry_entry() -> RegistryEntry {
        RegistryEntry {
            version: "v1.2.3".to_string(),
            base_model: "base".to_string(),
            distilled_from: None,
            quantization: None,
            model_path: "models/v1.2.3".to_string(),
            timestamp: Utc::now(),
            metrics: HashMap::from([("ttft_ms_mean".to_string(), MetricResult::ok(12.0, "ms"))]),
            active: false,
            last_good: false,
            commit_hash: None,
        }
    }

    fn sample_model_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), r#"{"hidden_size": 768}"#).unwrap();
        fs::write(dir.path().join("tokenizer.json"), "{}").unwrap();
        fs::write(dir.path().join("model.safetensors"), vec![0u8; 128]).unwrap();
        dir
    }

    #[test]
    fn bundle_round_trips_through_extract_manifest() {
        let model_dir = sample_model_dir();
        let bundles_root = tempfile::tempdir().unwrap();
        let entry = registry_entry();
        let summary = serde_json::json!({"cove_pass_rate": 0.95});

        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let inputs = BundleInputs { model_dir: model_dir.path(), version: "v1.2.3".to_string(), registry_entry: &entry, benchmark_summary: &summary };
        let bundle_path = create_bundle(inputs, bundles_root.path(), now).unwrap();

        assert!(bundle_path.exists());
        let manifest = extract_manifest(&bundle_path).unwrap();
        assert_eq!(manifest.version, "v1.2.3");
        assert_eq!(manifest.file_count, 3);
    }

    #[test]
    fn checksums_cover_every_file_except_themselves() {
        let model_dir = sample_model_dir();
        let bundles_root = tempfile::tempdir().unwrap();
        let entry = registry_entry();
        let summary = serde_json::json!({});
        let now = DateTime::from_timestamp(1_700_000_100, 0).unwrap();

        let inputs = BundleInputs { model_dir: model_dir.path(), version: "v1.2.3".to_string(), registry_entry: &entry, benchmark_summary: &summary };
        let bundle_path = create_bundle(inputs, bundles_root.path(), now).unwrap();

        let file = fs::File::open(&bundle_path).unwrap();
        let decoder = GzDecoder::new(file);
        let mut archive = Archive::new(decoder);
        let mut names: Vec<String> = archive.entries().unwrap().map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string()).collect();
        names.sort();

        assert!(names.contains(&"SHA256SUMS".to_string()));
        assert!(names.contains(&"manifest.json".to_string()));
        assert!(names.contains(&"model_dir/config.json".to_string()));
    }

    #[test]
    fn staging_directory_is_cleaned_up_after_packaging() {
        let model_dir = sample_model_dir();
        let bundles_root = tempfile::tempdir().unwrap();
        let entry = registry_entry();
        let summary = serde_json::json!({});
        let now = DateTime::from_timestamp(1_700_000_200, 0).unwrap();

        let inputs = BundleInputs { model_dir: model_dir.path(), version: "v1.2.3".to_string(), registry_entry: &entry, benchmark_summary: &summary };
        create_bundle(inputs, bundles_root.path(), now).unwrap();

        let leftovers: Vec<_> = fs::read_dir(bundles_root.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
