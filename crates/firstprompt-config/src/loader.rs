use std::path::{Path, PathBuf};

use firstprompt_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const YAML_FILE: &str = "firstprompt.yml";
const TOML_FILE: &str = "firstprompt.toml";

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            config_dir: PathBuf::from("."),
        }
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Returns true if a config file (YAML or TOML) exists on disk.
    pub fn config_file_exists(&self) -> bool {
        self.config_dir.join(YAML_FILE).exists() || self.config_dir.join(TOML_FILE).exists()
    }

    /// Load `.env`, the config file and environment overrides, then validate.
    pub fn load(&self) -> Result<AppConfig> {
        match dotenvy::from_path(self.config_dir.join(".env")) {
            Ok(()) => debug!("loaded .env from {}", self.config_dir.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!("failed to read .env: {e}"))),
        }

        let mut config = self.load_file()?;
        apply_overrides(&mut config, |key| std::env::var(key).ok());
        validate(&config)?;
        Ok(config)
    }

    pub fn load_file(&self) -> Result<AppConfig> {
        let yaml_path = self.config_dir.join(YAML_FILE);
        let toml_path = self.config_dir.join(TOML_FILE);

        if yaml_path.exists() {
            info!("loading config from {}", yaml_path.display());
            let contents = std::fs::read_to_string(&yaml_path)?;
            serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}")))
        } else if toml_path.exists() {
            info!("loading config from {}", toml_path.display());
            let contents = std::fs::read_to_string(&toml_path)?;
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse TOML config: {e}")))
        } else {
            info!("no config file found, using defaults");
            Ok(AppConfig::default())
        }
    }

    pub fn ensure_dirs(&self, config: &AppConfig) -> Result<()> {
        let dirs = [config.data_dir.clone(), config.data_dir.join("combos")];

        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Environment variables win over values from the config file.
pub fn apply_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(key) = var("GEMINI_API_KEY") {
        config.generation.api_key = Some(key);
    }
    if let Some(model) = var("GEMINI_MODEL") {
        config.generation.model = model;
    }
    if let Some(token) = var("BIGQUERY_ACCESS_TOKEN") {
        config.warehouse.access_token = Some(token);
    }
    if let Some(project) = var("BIGQUERY_PROJECT") {
        config.warehouse.project = project;
    }
    if let Some(dir) = var("FIRSTPROMPT_DATA_DIR") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(path) = var("FIRSTPROMPT_DB_PATH") {
        config.database.path = PathBuf::from(path);
    }
}

pub fn validate(config: &AppConfig) -> Result<()> {
    if config.pipeline.concurrency == 0 {
        return Err(Error::Config("pipeline.concurrency must be at least 1".into()));
    }
    if config.pipeline.max_attempts == 0 {
        return Err(Error::Config("pipeline.max_attempts must be at least 1".into()));
    }
    if config.database.batch_size == 0 {
        return Err(Error::Config("database.batch_size must be at least 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ConfigLoader, apply_overrides, validate};
    use crate::model::AppConfig;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "firstprompt-config-test-{}-{}-{}",
            label,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn load_returns_default_when_no_config_exists() {
        let dir = temp_dir("default");
        fs::create_dir_all(&dir).expect("failed to create temp dir");

        let loader = ConfigLoader::with_dir(&dir);
        let config = loader.load_file().expect("load should succeed");

        assert_eq!(config.pipeline.concurrency, 20);
        assert_eq!(config.pipeline.max_attempts, 1);
        assert_eq!(config.generation.model, "gemini-2.5-pro");
        assert_eq!(config.generation.topics_per_combination, 15);
        assert_eq!(config.generation.prompts_per_topic, 10);
        assert_eq!(config.database.batch_size, 1000);
        assert_eq!(config.data_dir, PathBuf::from("./data"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_prefers_yaml_over_toml_when_both_exist() {
        let dir = temp_dir("yaml-precedence");
        fs::create_dir_all(&dir).expect("failed to create temp dir");

        fs::write(dir.join("firstprompt.yml"), "pipeline:\n  concurrency: 8\n")
            .expect("failed to write yaml config");
        fs::write(dir.join("firstprompt.toml"), "[pipeline]\nconcurrency = 3\n")
            .expect("failed to write toml config");

        let loader = ConfigLoader::with_dir(&dir);
        let config = loader.load_file().expect("load should succeed");

        assert_eq!(config.pipeline.concurrency, 8);
        assert_eq!(config.pipeline.retry_backoff_ms, 500);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_reads_toml_when_yaml_missing() {
        let dir = temp_dir("toml");
        fs::create_dir_all(&dir).expect("failed to create temp dir");

        fs::write(
            dir.join("firstprompt.toml"),
            "data_dir = \"/srv/firstprompt\"\n[generation]\nmodel = \"gemini-2.5-flash\"\nsearch_grounding = false\n",
        )
        .expect("failed to write toml config");

        let loader = ConfigLoader::with_dir(&dir);
        assert!(loader.config_file_exists());
        let config = loader.load_file().expect("load should succeed");

        assert_eq!(config.data_dir, PathBuf::from("/srv/firstprompt"));
        assert_eq!(config.generation.model, "gemini-2.5-flash");
        assert!(!config.generation.search_grounding);
        assert_eq!(config.generation.timeout_secs, 120);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let dir = temp_dir("bad-yaml");
        fs::create_dir_all(&dir).expect("failed to create temp dir");
        fs::write(dir.join("firstprompt.yml"), "pipeline: [unclosed\n")
            .expect("failed to write yaml config");

        let err = ConfigLoader::with_dir(&dir)
            .load_file()
            .expect_err("parse should fail");
        assert!(err.to_string().contains("failed to parse YAML config"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = AppConfig::default();
        let env: HashMap<&str, &str> = HashMap::from([
            ("GEMINI_API_KEY", "secret"),
            ("BIGQUERY_PROJECT", "other-project"),
            ("FIRSTPROMPT_DB_PATH", "/tmp/fp.db"),
            ("GEMINI_MODEL", "   "),
        ]);

        apply_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.generation.api_key.as_deref(), Some("secret"));
        assert_eq!(config.warehouse.project, "other-project");
        assert_eq!(config.database.path, PathBuf::from("/tmp/fp.db"));
        // blank values are ignored
        assert_eq!(config.generation.model, "gemini-2.5-pro");
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = AppConfig::default();
        config.pipeline.concurrency = 0;
        assert!(validate(&config).is_err());

        let mut config = AppConfig::default();
        config.database.batch_size = 0;
        assert!(validate(&config).is_err());

        assert!(validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn ensure_dirs_creates_data_and_combos() {
        let dir = temp_dir("ensure-dirs");
        let config = AppConfig {
            data_dir: dir.join("data"),
            ..AppConfig::default()
        };

        ConfigLoader::with_dir(&dir)
            .ensure_dirs(&config)
            .expect("ensure_dirs should succeed");

        assert!(dir.join("data").exists());
        assert!(dir.join("data").join("combos").exists());

        let _ = fs::remove_dir_all(dir);
    }
}
