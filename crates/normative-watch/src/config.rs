use std::path::PathBuf;

use normative_core::knowledge_base::split_path_list;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub kb_paths: Vec<PathBuf>,
    /// Pretty-print each delivered result instead of one JSON object per line.
    pub pretty: bool,
}

impl Config {
    /// Required:
    /// - `NORMATIVE_KB_PATHS`: comma-separated list of knowledge base JSON files
    ///
    /// Optional:
    /// - `NORMATIVE_WATCH_PRETTY` (`1`/`true` to pretty-print output)
    pub fn from_env() -> Result<Self, AppError> {
        let kb_paths = std::env::var("NORMATIVE_KB_PATHS")
            .map(|raw| split_path_list(&raw))
            .map_err(|_| {
                AppError::Config("NORMATIVE_KB_PATHS environment variable is required".to_string())
            })?;
        if kb_paths.is_empty() {
            return Err(AppError::Config(
                "NORMATIVE_KB_PATHS must list at least one file".to_string(),
            ));
        }

        let pretty = std::env::var("NORMATIVE_WATCH_PRETTY")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self { kb_paths, pretty })
    }
}
