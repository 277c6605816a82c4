use std::path::PathBuf;

use normative_core::knowledge_base::split_path_list;

use crate::error::AppError;

/// Server configuration loaded explicitly from environment variables.
///
/// Engine tuning (mode, API key, limits, retries) lives in `EngineConfig`; this only
/// covers where the knowledge base comes from.
#[derive(Debug, Clone)]
pub struct Config {
    /// Knowledge base JSON files, merged in this order.
    pub kb_paths: Vec<PathBuf>,
}

impl Config {
    /// Required:
    /// - `NORMATIVE_KB_PATHS`: comma-separated list of knowledge base JSON files
    pub fn from_env() -> Result<Self, AppError> {
        let raw = std::env::var("NORMATIVE_KB_PATHS").map_err(|_| {
            AppError::Config("NORMATIVE_KB_PATHS environment variable is required".to_string())
        })?;
        Self::from_paths_list(&raw)
    }

    pub fn from_paths_list(raw: &str) -> Result<Self, AppError> {
        let kb_paths = split_path_list(raw);

        if kb_paths.is_empty() {
            return Err(AppError::Config(
                "NORMATIVE_KB_PATHS must list at least one file".to_string(),
            ));
        }

        if let Some(missing) = kb_paths.iter().find(|p| !p.exists()) {
            return Err(AppError::Config(format!(
                "knowledge base file not found: {}",
                missing.display()
            )));
        }

        Ok(Self { kb_paths })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_list() {
        assert!(matches!(Config::from_paths_list(" , "), Err(AppError::Config(_))));
    }

    #[test]
    fn rejects_missing_file() {
        let err = Config::from_paths_list("/nonexistent/normativos.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/normativos.json"));
    }

    #[test]
    fn splits_and_trims_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("normativos.json");
        let b = dir.path().join("normativos_lgpd.json");
        std::fs::write(&a, "[]").unwrap();
        std::fs::write(&b, "[]").unwrap();

        let config = Config::from_paths_list(&format!(" {} , {} ,", a.display(), b.display())).unwrap();
        assert_eq!(config.kb_paths, vec![a, b]);
    }
}
