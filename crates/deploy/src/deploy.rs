use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use milton_core::{DeploymentRecord, DeploymentStatus, MiltonError};
use milton_packager::extract_manifest;

use crate::history::{prev_companion, DeploymentHistory};
use crate::load_test;

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub dry_run: bool,
    pub verify_checksums: bool,
    pub run_load_test: bool,
    /// If the target already exists, move it aside to `<target>.prev`
    /// instead of failing, moving the existing install aside.
    pub replace: bool,
}

pub struct DeploymentManager {
    history: DeploymentHistory,
}

impl DeploymentManager {
    pub fn new(history_root: impl Into<PathBuf>) -> Self {
        Self { history: DeploymentHistory::new(history_root) }
    }

    pub async fn deploy(&self, bundle_path: &Path, target: &Path, opts: &DeployOptions, now: DateTime<Utc>) -> Result<DeploymentRecord, MiltonError> {
        if !tokio::fs::try_exists(bundle_path).await.unwrap_or(false) {
            return Err(MiltonError::ValidationError(format!("bundle {} does not exist", bundle_path.display())));
        }
        let manifest = extract_manifest(bundle_path).map_err(|e| MiltonError::BundleMalformed(e.to_string()))?;
        if manifest.version.is_empty() {
            return Err(MiltonError::BundleMalformed("manifest is missing a version".to_string()));
        }

        let deployment_id = DeploymentRecord::make_id(&manifest.version, now);
        let scratch = target.parent().unwrap_or_else(|| Path::new(".")).join(format!(".scratch-{deployment_id}"));

        if let Err(err) = extract_bundle(bundle_path, &scratch).await {
            let _ = tokio::fs::remove_dir_all(&scratch).await;
            return Err(MiltonError::BundleMalformed(err.to_string()));
        }

        let model_dir = scratch.join("model_dir");

        if opts.verify_checksums {
            if let Err((path, expected, actual)) = verify_checksums(&scratch).await {
                let _ = tokio::fs::remove_dir_all(&scratch).await;
                return Err(MiltonError::ChecksumMismatch { path, expected, actual });
            }
        }

        if opts.run_load_test {
            if let Err(reason) = load_test::run(&model_dir).await {
                let _ = tokio::fs::remove_dir_all(&scratch).await;
                return Err(MiltonError::LoadTestFailed(reason));
            }
        }

        if opts.dry_run {
            let _ = tokio::fs::remove_dir_all(&scratch).await;
            let record = DeploymentRecord {
                deployment_id,
                bundle_id: manifest.bundle_id,
                version: manifest.version,
                target_path: target.to_string_lossy().to_string(),
                status: DeploymentStatus::DryRun,
                checksum_verified: opts.verify_checksums,
                load_test_passed: opts.run_load_test,
                error: None,
                timestamp: now,
                reason: None,
            };
            self.history.append(&record).await.map_err(|e| MiltonError::InternalError(e.to_string()))?;
            return Ok(record);
        }

        if tokio::fs::try_exists(target).await.unwrap_or(false) {
            if !opts.replace {
                let _ = tokio::fs::remove_dir_all(&scratch).await;
                return Err(MiltonError::DeploymentExists(target.to_string_lossy().to_string()));
            }
            let prev_path = prev_companion(target.to_str().unwrap_or_default());
            let _ = tokio::fs::remove_dir_all(&prev_path).await;
            tokio::fs::rename(target, &prev_path).await.map_err(MiltonError::IoError)?;
        }
        tokio::fs::rename(&scratch, target).await.map_err(MiltonError::IoError)?;

        let record = DeploymentRecord {
            deployment_id,
            bundle_id: manifest.bundle_id,
            version: manifest.version,
            target_path: target.to_string_lossy().to_string(),
            status: DeploymentStatus::Success,
            checksum_verified: opts.verify_checksums,
            load_test_passed: opts.run_load_test,
            error: None,
            timestamp: now,
            reason: None,
        };
        self.history.append(&record).await.map_err(|e| MiltonError::InternalError(e.to_string()))?;
        Ok(record)
    }

    /// Swaps the most recent successful deployment's target with its
    /// `.prev` companion. A missing companion is treated as "no candidate"
    /// rather than searching further back in history.
    pub async fn rollback(&self, now: DateTime<Utc>) -> Result<DeploymentRecord, MiltonError> {
        let candidate = self.history.most_recent_rollback_candidate().await.map_err(|e| MiltonError::InternalError(e.to_string()))?;
        let candidate = candidate.ok_or(MiltonError::NoCandidate)?;

        let target = PathBuf::from(&candidate.target_path);
        let prev_path = prev_companion(&candidate.target_path);
        let tmp_path = target.with_file_name(format!(
            "{}.rollback-tmp",
            target.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
        ));

        tokio::fs::rename(&target, &tmp_path).await.map_err(MiltonError::IoError)?;
        tokio::fs::rename(&prev_path, &target).await.map_err(MiltonError::IoError)?;
        tokio::fs::rename(&tmp_path, &prev_path).await.map_err(MiltonError::IoError)?;

        let deployment_id = DeploymentRecord::make_id(&candidate.version, now);
        let record = DeploymentRecord {
            deployment_id,
            bundle_id: candidate.bundle_id,
            version: candidate.version,
            target_path: candidate.target_path,
            status: DeploymentStatus::Success,
            checksum_verified: candidate.checksum_verified,
            load_test_passed: candidate.load_test_passed,
            error: None,
            timestamp: now,
            reason: Some("rollback".to_string()),
        };
        self.history.append(&record).await.map_err(|e| MiltonError::InternalError(e.to_string()))?;
        Ok(record)
    }
}

async fn extract_bundle(bundle_path: &Path, scratch: &Path) -> anyhow::Result<()> {
    let bundle_path = bundle_path.to_path_buf();
    let scratch = scratch.to_path_buf();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        std::fs::create_dir_all(&scratch)?;
        let file = std::fs::File::open(&bundle_path)?;
        let decoder = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(decoder);
        archive.unpack(&scratch)?;
        Ok(())
    })
    .await?
}

/// Re-verifies every entry listed in the extracted `SHA256SUMS` against the
/// on-disk bytes. Returns the first mismatch found.
async fn verify_checksums(scratch: &Path) -> Result<(), (String, String, String)> {
    let sums_path = scratch.join("SHA256SUMS");
    let content = tokio::fs::read_to_string(&sums_path).await.map_err(|e| (sums_path.display().to_string(), "readable".to_string(), e.to_string()))?;
    let entries = milton_packager::checksums::parse_sha256sums(&content);

    for (relpath, expected) in entries {
        let path = scratch.join(&relpath);
        let actual = milton_packager::checksums::sha256_file(&path).map_err(|e| (relpath.display().to_string(), expected.clone(), e.to_string()))?;
        if actual != expected {
            return Err((relpath.display().to_string(), expected, actual));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use milton_core::{MetricResult, RegistryEntry};
    use milton_packager::{create_bundle, BundleInputs};
    use std::collections::HashMap;

    fn registry_entry() -> RegistryEntry {
        RegistryEntry {
            version: "v1.0.0".to_string(),
            base_model: "base".to_string(),
            distilled_from: None,
            quantization: None,
            model_path: "models/v1.0.0".to_string(),
            timestamp: Utc::now(),
            metrics: HashMap::from([("ttft_ms_mean".to_string(), MetricResult::ok(12.0, "ms"))]),
            active: false,
            last_good: false,
            commit_hash: None,
        }
    }

    fn build_bundle(bundles_root: &Path, model_dir: &Path, version: &str, now: DateTime<Utc>) -> PathBuf {
        std::fs::write(model_dir.join("config.json"), format!(r#"{{"version_marker": "{version}"}}"#)).unwrap();
        std::fs::write(model_dir.join("tokenizer.json"), "{}").unwrap();
        std::fs::write(model_dir.join("model.safetensors"), vec![1u8; 64]).unwrap();

        let entry = registry_entry();
        let summary = serde_json::json!({});
        let inputs = BundleInputs { model_dir, version: version.to_string(), registry_entry: &entry, benchmark_summary: &summary };
        create_bundle(inputs, bundles_root, now).unwrap()
    }

    #[tokio::test]
    async fn deploy_happy_path_installs_target_and_records_success() {
        let model_dir = tempfile::tempdir().unwrap();
        let bundles_root = tempfile::tempdir().unwrap();
        let history_root = tempfile::tempdir().unwrap();
        let targets_root = tempfile::tempdir().unwrap();

        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let bundle_path = build_bundle(bundles_root.path(), model_dir.path(), "v1.0.0", now);

        let manager = DeploymentManager::new(history_root.path());
        let target = targets_root.path().join("current");
        let opts = DeployOptions { dry_run: false, verify_checksums: true, run_load_test: true, replace: false };

        let record = manager.deploy(&bundle_path, &target, &opts, now).await.unwrap();
        assert_eq!(record.status, DeploymentStatus::Success);
        assert!(record.checksum_verified);
        assert!(record.load_test_passed);
        assert!(target.exists());
    }

    #[tokio::test]
    async fn checksum_mismatch_aborts_and_leaves_no_target() {
        let model_dir = tempfile::tempdir().unwrap();
        let bundles_root = tempfile::tempdir().unwrap();
        let history_root = tempfile::tempdir().unwrap();
        let targets_root = tempfile::tempdir().unwrap();

        let now = DateTime::from_timestamp(1_700_000_100, 0).unwrap();
        let bundle_path = build_bundle(bundles_root.path(), model_dir.path(), "v1.0.1", now);

        // Unpack the valid bundle, tamper with one file's bytes so it no
        // longer matches the recorded SHA256SUMS, then repackage as a plain
        // tarball (same members, same SHA256SUMS, mismatched content) to
        // simulate post-bundle tampering.
        let unpacked = tempfile::tempdir().unwrap();
        {
            let file = std::fs::File::open(&bundle_path).unwrap();
            let decoder = flate2::read::GzDecoder::new(file);
            let mut archive = tar::Archive::new(decoder);
            archive.unpack(unpacked.path()).unwrap();
        }
        let weight_path = unpacked.path().join("model_dir").join("model.safetensors");
        let mut bytes = std::fs::read(&weight_path).unwrap();
        bytes[0] ^= 0xFF;
        std::fs::write(&weight_path, bytes).unwrap();

        let corrupt_bundle_path = bundles_root.path().join("corrupt.tar.gz");
        repack(unpacked.path(), &corrupt_bundle_path);

        let manager = DeploymentManager::new(history_root.path());
        let target = targets_root.path().join("current");
        let opts = DeployOptions { dry_run: false, verify_checksums: true, run_load_test: false, replace: false };

        let result = manager.deploy(&corrupt_bundle_path, &target, &opts, now).await;
        assert!(matches!(result, Err(MiltonError::ChecksumMismatch { .. })));
        assert!(!target.exists());
    }

    /// Repacks every regular file under `root` into a flat tarball at
    /// `dest`, members in directory-walk order (order doesn't matter for
    /// checksum verification).
    fn repack(root: &Path, dest: &Path) {
        let file = std::fs::File::create(dest).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for relpath in milton_packager::checksums::list_regular_files(root).unwrap() {
            builder.append_path_with_name(root.join(&relpath), &relpath).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[tokio::test]
    async fn dry_run_never_installs() {
        let model_dir = tempfile::tempdir().unwrap();
        let bundles_root = tempfile::tempdir().unwrap();
        let history_root = tempfile::tempdir().unwrap();
        let targets_root = tempfile::tempdir().unwrap();

        let now = DateTime::from_timestamp(1_700_000_200, 0).unwrap();
        let bundle_path = build_bundle(bundles_root.path(), model_dir.path(), "v1.0.2", now);

        let manager = DeploymentManager::new(history_root.path());
        let target = targets_root.path().join("current");
        let opts = DeployOptions { dry_run: true, verify_checksums: true, run_load_test: true, replace: false };

        let record = manager.deploy(&bundle_path, &target, &opts, now).await.unwrap();
        assert_eq!(record.status, DeploymentStatus::DryRun);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn rollback_after_replace_swaps_target_with_prev() {
        let model_dir_a = tempfile::tempdir().unwrap();
        let model_dir_b = tempfile::tempdir().unwrap();
        let bundles_root = tempfile::tempdir().unwrap();
        let history_root = tempfile::tempdir().unwrap();
        let targets_root = tempfile::tempdir().unwrap();

        let t1 = DateTime::from_timestamp(1_700_000_300, 0).unwrap();
        let t2 = DateTime::from_timestamp(1_700_000_400, 0).unwrap();
        let bundle_a = build_bundle(bundles_root.path(), model_dir_a.path(), "v1.0.0", t1);
        let bundle_b = build_bundle(bundles_root.path(), model_dir_b.path(), "v2.0.0", t2);

        let manager = DeploymentManager::new(history_root.path());
        let target = targets_root.path().join("current");
        let opts = DeployOptions { dry_run: false, verify_checksums: true, run_load_test: true, replace: true };

        let first = manager.deploy(&bundle_a, &target, &opts, t1).await.unwrap();
        let second = manager.deploy(&bundle_b, &target, &opts, t2).await.unwrap();
        assert_eq!(first.version, "v1.0.0");
        assert_eq!(second.version, "v2.0.0");

        let t3 = DateTime::from_timestamp(1_700_000_500, 0).unwrap();
        let rollback_record = manager.rollback(t3).await.unwrap();
        assert_eq!(rollback_record.reason.as_deref(), Some("rollback"));

        // after rollback, target should contain v1's model dir again
        let config = tokio::fs::read_to_string(target.join("model_dir").join("config.json")).await.unwrap();
        assert!(config.contains("v1.0.0"));
    }

    #[tokio::test]
    async fn rollback_without_prev_companion_is_no_candidate() {
        let history_root = tempfile::tempdir().unwrap();
        let manager = DeploymentManager::new(history_root.path());
        let now = DateTime::from_timestamp(1_700_000_600, 0).unwrap();
        let result = manager.rollback(now).await;
        assert!(matches!(result, Err(MiltonError::NoCandidate)));
    }
}
