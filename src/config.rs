use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Files probed (in order, relative to the working directory) when no
/// explicit config path is given.
pub const CONFIG_CANDIDATES: &[&str] = &[
    "memri-config.toml",
    "memri.config.toml",
    "config/memri-config.toml",
];

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MemriConfig {
    pub capture: CaptureSettings,
    pub ocr: OcrSettings,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub assistant: AssistantConfig,
    /// File the config was read from; `None` when running on defaults.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CaptureSettings {
    pub enabled: bool,
    pub monitor_id: u32,
    pub monitor_ids: Vec<u32>,
    pub interval_ms: u64,
    pub max_interval_ms: u64,
    pub capture_unfocused_windows: bool,
    pub languages: Vec<String>,
    pub window_include: Vec<String>,
    pub window_ignore: Vec<String>,
    pub image_dir: String,
    pub seed_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OcrSettings {
    pub engine: String,
    pub tesseract_bin: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
    /// Captures older than this many days are pruned. `0` disables.
    pub retention_days: u64,
    /// Upper bound on stored captures. `0` disables.
    pub max_captures: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub api_key: Option<String>,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssistantConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub history_limit: usize,
    pub context_captures: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            monitor_id: 0,
            monitor_ids: Vec::new(),
            interval_ms: 2000,
            max_interval_ms: 10_000,
            capture_unfocused_windows: false,
            languages: vec!["en".into()],
            window_include: Vec::new(),
            window_ignore: Vec::new(),
            image_dir: "captures".into(),
            seed_dir: "captures-seed".into(),
        }
    }
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            engine: "tesseract".into(),
            tesseract_bin: "tesseract".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://memri.db".into(),
            retention_days: 0,
            max_captures: 0,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".into(),
            api_key: None,
            log_level: "info,memri::capture=debug".into(),
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com".into(),
            model: "claude-3-5-sonnet-latest".into(),
            max_tokens: 2048,
            history_limit: 15,
            context_captures: 5,
        }
    }
}

impl MemriConfig {
    /// Load config from `explicit` if given, otherwise from the first existing
    /// candidate file, then apply env var overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            anyhow::ensure!(path.exists(), "config file not found: {}", path.display());
            return Self::load_from(path);
        }
        match CONFIG_CANDIDATES.iter().map(Path::new).find(|p| p.exists()) {
            Some(path) => Self::load_from(path),
            None => {
                let mut config = MemriConfig::default();
                config.apply_env_overrides()?;
                Ok(config)
            }
        }
    }

    /// Load from a specific path (defaults when missing), then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            let mut config: MemriConfig =
                toml::from_str(&contents).context("failed to parse config TOML")?;
            config.source = Some(path.to_path_buf());
            config
        } else {
            MemriConfig::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `MEMRI_*` environment overrides. Env always wins over the file.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_u32("MEMRI_MONITOR_ID")? {
            self.capture.monitor_id = v;
        }
        if let Some(list) = env_value("MEMRI_MONITOR_IDS") {
            self.capture.monitor_ids = split_list(&list)
                .iter()
                .map(|s| {
                    s.parse::<u32>()
                        .with_context(|| format!("failed to parse MEMRI_MONITOR_IDS entry {s:?}"))
                })
                .collect::<Result<_>>()?;
        }
        if let Some(v) = env_u64("MEMRI_CAPTURE_INTERVAL_MS")? {
            self.capture.interval_ms = v;
        }
        if let Some(v) = env_u64("MEMRI_CAPTURE_MAX_INTERVAL_MS")? {
            self.capture.max_interval_ms = v;
        }
        if let Some(v) = env_bool("MEMRI_CAPTURE_UNFOCUSED")? {
            self.capture.capture_unfocused_windows = v;
        }
        if let Some(v) = env_bool("MEMRI_DISABLE_CAPTURE")? {
            self.capture.enabled = !v;
        }
        if let Some(v) = env_value("MEMRI_LANGUAGES") {
            self.capture.languages = split_list(&v);
        }
        if let Some(v) = env_value("MEMRI_WINDOW_INCLUDE") {
            self.capture.window_include = split_list(&v);
        }
        if let Some(v) = env_value("MEMRI_WINDOW_IGNORE") {
            self.capture.window_ignore = split_list(&v);
        }
        if let Some(v) = env_value("MEMRI_IMAGE_DIR") {
            self.capture.image_dir = v;
        }
        if let Some(v) = env_value("MEMRI_SEED_CAPTURE_DIR") {
            self.capture.seed_dir = v;
        }
        if let Some(v) = env_value("MEMRI_OCR_ENGINE") {
            self.ocr.engine = v;
        }
        if let Some(v) = env_value("MEMRI_DATABASE_URL") {
            self.storage.database_url = v;
        }
        if let Some(v) = env_u64("MEMRI_RETENTION_DAYS")? {
            self.storage.retention_days = v;
        }
        if let Some(v) = env_u64("MEMRI_MAX_CAPTURES")? {
            self.storage.max_captures = v;
        }
        if let Some(v) = env_value("MEMRI_API_ADDR") {
            self.server.addr = v;
        }
        if let Some(v) = env_value("MEMRI_API_KEY") {
            self.server.api_key = Some(v);
        }
        if let Some(v) = env_value("MEMRI_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Some(v) = env_value("ANTHROPIC_API_KEY") {
            self.assistant.api_key = Some(v);
        }
        Ok(())
    }

    /// Log where the config came from. Called once tracing is installed.
    pub fn log_source(&self) {
        match &self.source {
            Some(path) => info!(path = %path.display(), "loaded config file"),
            None => info!("no config file found, using defaults"),
        }
    }

    /// Resolve `database_url` (`sqlite://path`, `sqlite:path`, or a bare path)
    /// into a filesystem path, expanding `~`.
    pub fn resolved_db_path(&self) -> PathBuf {
        let url = self.storage.database_url.trim();
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        expand_tilde(path)
    }

    pub fn resolved_image_dir(&self) -> PathBuf {
        expand_tilde(&self.capture.image_dir)
    }

    /// Monitor ids the user asked for: `monitor_ids` when set, else `[monitor_id]`.
    pub fn requested_monitors(&self) -> Vec<u32> {
        if self.capture.monitor_ids.is_empty() {
            vec![self.capture.monitor_id]
        } else {
            self.capture.monitor_ids.clone()
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        }
    } else {
        PathBuf::from(path)
    }
}

/// Read an env var, treating unset and whitespace-only values as absent.
fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    env_value(key)
        .map(|v| v.parse::<u32>().with_context(|| format!("failed to parse {key} as u32")))
        .transpose()
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    env_value(key)
        .map(|v| v.parse::<u64>().with_context(|| format!("failed to parse {key} as u64")))
        .transpose()
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match env_value(key) {
        None => Ok(None),
        Some(v) => Ok(Some(parse_bool(key, &v)?)),
    }
}

pub(crate) fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => bail!("invalid boolean for {key}: {other}"),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MemriConfig::default();
        assert_eq!(config.capture.interval_ms, 2000);
        assert_eq!(config.capture.languages, vec!["en".to_string()]);
        assert_eq!(config.server.addr, "127.0.0.1:8080");
        assert_eq!(config.assistant.history_limit, 15);
        assert_eq!(config.ocr.engine, "tesseract");
        assert!(config.capture.enabled);
        assert_eq!(config.resolved_db_path(), PathBuf::from("memri.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[capture]
monitor_ids = [1, 2]
interval_ms = 500
window_ignore = ["1Password"]

[storage]
database_url = "sqlite:/tmp/memri-test.db"
retention_days = 14

[server]
api_key = "secret"
"#;
        let config: MemriConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.capture.monitor_ids, vec![1, 2]);
        assert_eq!(config.capture.interval_ms, 500);
        assert_eq!(config.capture.window_ignore, vec!["1Password".to_string()]);
        assert_eq!(config.storage.retention_days, 14);
        assert_eq!(config.server.api_key.as_deref(), Some("secret"));
        assert_eq!(config.resolved_db_path(), PathBuf::from("/tmp/memri-test.db"));
        // defaults still apply for unset fields
        assert_eq!(config.capture.max_interval_ms, 10_000);
        assert_eq!(config.requested_monitors(), vec![1, 2]);
    }

    #[test]
    fn load_from_records_the_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memri-config.toml");
        std::fs::write(&path, "[capture]\ninterval_ms = 750\n").unwrap();

        let config = MemriConfig::load_from(&path).unwrap();
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
        assert_eq!(config.capture.interval_ms, 750);

        let fallback = MemriConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert!(fallback.source.is_none());
        assert_eq!(fallback.capture.interval_ms, 2000);
    }

    #[test]
    fn requested_monitors_falls_back_to_single_id() {
        let mut config = MemriConfig::default();
        config.capture.monitor_id = 3;
        assert_eq!(config.requested_monitors(), vec![3]);
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert!(parse_bool("K", "YES").unwrap());
        assert!(parse_bool("K", "1").unwrap());
        assert!(!parse_bool("K", "false").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(split_list(" en, ,de ,"), vec!["en".to_string(), "de".to_string()]);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = MemriConfig::default();
        std::env::set_var("MEMRI_MONITOR_IDS", "4, 5");
        std::env::set_var("MEMRI_CAPTURE_UNFOCUSED", "true");
        std::env::set_var("MEMRI_WINDOW_IGNORE", "slack,zoom");
        std::env::set_var("MEMRI_MAX_CAPTURES", "  ");

        config.apply_env_overrides().unwrap();

        assert_eq!(config.capture.monitor_ids, vec![4, 5]);
        assert!(config.capture.capture_unfocused_windows);
        assert_eq!(config.capture.window_ignore, vec!["slack".to_string(), "zoom".to_string()]);
        // whitespace-only values are ignored
        assert_eq!(config.storage.max_captures, 0);

        // Clean up
        std::env::remove_var("MEMRI_MONITOR_IDS");
        std::env::remove_var("MEMRI_CAPTURE_UNFOCUSED");
        std::env::remove_var("MEMRI_WINDOW_IGNORE");
        std::env::remove_var("MEMRI_MAX_CAPTURES");
    }
}
