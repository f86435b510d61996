use std::path::Path;

use anyhow::Result;

const TOKENIZER_CANDIDATES: &[&str] = &["tokenizer.json", "tokenizer.model", "spm.model"];
const WEIGHT_SUFFIXES: &[&str] = &[".safetensors", ".bin", ".gguf"];

/// Confirms presence and JSON validity of `config.json`, a tokenizer file,
/// and at least one weight file matching a known suffix.
/// Returns `Ok(())` on pass, `Err` with a human-readable reason otherwise.
pub async fn run(model_dir: &Path) -> Result<(), String> {
    let config_path = model_dir.join("config.json");
    let config_body = tokio::fs::read_to_string(&config_path).await.map_err(|e| format!("config.json missing or unreadable: {e}"))?;
    serde_json::from_str::<serde_json::Value>(&config_body).map_err(|e| format!("config.json is not valid JSON: {e}"))?;

    let has_tokenizer = TOKENIZER_CANDIDATES.iter().any(|name| model_dir.join(name).exists());
    if !has_tokenizer {
        return Err(format!("no tokenizer file found among {TOKENIZER_CANDIDATES:?}"));
    }

    let has_weights = find_weight_file(model_dir).await;
    if !has_weights {
        return Err(format!("no weight file found with suffix in {WEIGHT_SUFFIXES:?}"));
    }

    Ok(())
}

async fn find_weight_file(model_dir: &Path) -> bool {
    let mut entries = match tokio::fs::read_dir(model_dir).await {
        Ok(entries) => entries,
        Err(_) => return false,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if WEIGHT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_valid_model(dir: &Path) {
        tokio::fs::write(dir.join("config.json"), r#"{"hidden_size": 4096}"#).await.unwrap();
        tokio::fs::write(dir.join("tokenizer.json"), "{}").await.unwrap();
        tokio::fs::write(dir.join("model.safetensors"), vec![0u8; 16]).await.unwrap();
    }

    #[tokio::test]
    async fn passes_with_config_tokenizer_and_weights() {
        let dir = tempfile::tempdir().unwrap();
        write_valid_model(dir.path()).await;
        assert!(run(dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn fails_without_config_json() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("tokenizer.json"), "{}").await.unwrap();
        tokio::fs::write(dir.path().join("model.safetensors"), vec![0u8; 16]).await.unwrap();
        let result = run(dir.path()).await;
        assert!(result.unwrap_err().contains("config.json"));
    }

    #[tokio::test]
    async fn fails_on_malformed_config_json() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("config.json"), "not json").await.unwrap();
        tokio::fs::write(dir.path().join("tokenizer.json"), "{}").await.unwrap();
        tokio::fs::write(dir.path().join("model.safetensors"), vec![0u8; 16]).await.unwrap();
        let result = run(dir.path()).await;
        assert!(result.unwrap_err().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn fails_without_any_weight_file() {
        let dir = tempfile::tempdir().unwrap();
        write_valid_model(dir.path()).await;
        tokio::fs::remove_file(dir.path().join("model.safetensors")).await.unwrap();
        let result = run(dir.path()).await;
        assert!(result.unwrap_err().contains("weight file"));
    }
}
