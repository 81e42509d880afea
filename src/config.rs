use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub relsubs: RelsubsConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Paths and process-wide settings
#[derive(Debug, Clone, Deserialize)]
pub struct RelsubsConfig {
    /// SQLite corpus populated by the crawler (or the `import` binary).
    pub db_path: PathBuf,
    /// Directory that receives generated `.gv` / `.json` artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Persisted lookup cache blob.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Traversal tuning
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_depth")]
    pub default_depth: u32,
    /// Requested depths are clamped to this value.
    #[serde(default = "default_depth_limit")]
    pub depth_limit: u32,
    #[serde(default)]
    pub allow_nsfw: bool,
    #[serde(default = "default_prune_ratio")]
    pub prune_ratio: f64,
    #[serde(default = "default_node_size")]
    pub default_node_size: u32,
    /// Keep at most this many candidates per expansion (seeded sample).
    #[serde(default)]
    pub max_children: Option<usize>,
    #[serde(default)]
    pub sample_seed: u64,
    /// Serve an existing JSON artifact instead of regenerating it.
    #[serde(default = "default_reuse_artifacts")]
    pub reuse_artifacts: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_depth: default_depth(),
            depth_limit: default_depth_limit(),
            allow_nsfw: false,
            prune_ratio: default_prune_ratio(),
            default_node_size: default_node_size(),
            max_children: None,
            sample_seed: 0,
            reuse_artifacts: default_reuse_artifacts(),
        }
    }
}

/// Lookup cache configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// 0 keeps every entry.
    #[serde(default)]
    pub capacity: usize,
    /// Drop cached "not found" entries when the cache is loaded.
    #[serde(default)]
    pub retry_missing: bool,
}

/// Graphviz rendering configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_dot_binary")]
    pub dot_binary: String,
    #[serde(default = "default_render_format")]
    pub format: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            dot_binary: default_dot_binary(),
            format: default_render_format(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_http_host(),
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("cache/lookup_cache.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_depth() -> u32 {
    2
}

fn default_depth_limit() -> u32 {
    3
}

fn default_prune_ratio() -> f64 {
    0.2
}

fn default_node_size() -> u32 {
    10
}

fn default_reuse_artifacts() -> bool {
    true
}

fn default_dot_binary() -> String {
    "dot".to_string()
}

fn default_render_format() -> String {
    "png".to_string()
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    5000
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RELSUBS_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RELSUBS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::from_file(&config_path)
    }

    /// Load and validate a specific config file
    pub fn from_file(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.graph.default_depth == 0 {
            anyhow::bail!("graph.default_depth must be greater than 0");
        }

        if self.graph.depth_limit == 0 {
            anyhow::bail!("graph.depth_limit must be greater than 0");
        }

        if self.graph.default_depth > self.graph.depth_limit {
            anyhow::bail!(
                "graph.default_depth ({}) must not exceed graph.depth_limit ({})",
                self.graph.default_depth,
                self.graph.depth_limit
            );
        }

        if !self.graph.prune_ratio.is_finite() || self.graph.prune_ratio < 0.0 {
            anyhow::bail!("graph.prune_ratio must be a finite, non-negative number");
        }

        if self.graph.default_node_size == 0 {
            anyhow::bail!("graph.default_node_size must be greater than 0");
        }

        if self.graph.max_children == Some(0) {
            anyhow::bail!("graph.max_children must be greater than 0 when set");
        }

        if self.render.format.trim().is_empty() {
            anyhow::bail!("render.format must not be empty");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.relsubs.db_path
    }

    /// Get artifact output directory
    pub fn output_dir(&self) -> &Path {
        &self.relsubs.output_dir
    }

    /// Get persisted lookup cache path
    pub fn cache_path(&self) -> &Path {
        &self.relsubs.cache_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize tests that mutate RELSUBS_CONFIG so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const MINIMAL: &str = r#"
[relsubs]
db_path = "./corpus.db"
"#;

    fn write_config(temp_dir: &TempDir, content: &str) -> PathBuf {
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, MINIMAL);
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.graph.default_depth, 2);
        assert_eq!(config.graph.depth_limit, 3);
        assert!(!config.graph.allow_nsfw);
        assert!((config.graph.prune_ratio - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.graph.default_node_size, 10);
        assert!(config.graph.max_children.is_none());
        assert_eq!(config.cache.capacity, 0);
        assert_eq!(config.render.dot_binary, "dot");
        assert_eq!(config.http_server.port, 5000);
        assert_eq!(config.http_server.host, "127.0.0.1");
        assert_eq!(config.output_dir(), Path::new("static"));
        assert_eq!(config.cache_path(), Path::new("cache/lookup_cache.json"));
    }

    #[test]
    fn test_full_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
[relsubs]
db_path = "./corpus.db"
output_dir = "./out"
cache_path = "./out/cache.json"
log_level = "debug"

[graph]
default_depth = 3
depth_limit = 5
allow_nsfw = true
prune_ratio = 0.5
max_children = 8
sample_seed = 42

[cache]
capacity = 5000
retry_missing = true

[http_server]
enabled = true
port = 8080
"#,
        );
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.relsubs.log_level, "debug");
        assert_eq!(config.graph.default_depth, 3);
        assert_eq!(config.graph.max_children, Some(8));
        assert_eq!(config.graph.sample_seed, 42);
        assert!(config.cache.retry_missing);
        assert_eq!(config.cache.capacity, 5000);
        assert!(config.http_server.enabled);
        assert_eq!(config.http_server.port, 8080);
    }

    #[test]
    fn test_default_depth_above_limit_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            "[relsubs]\ndb_path = \"x.db\"\n[graph]\ndefault_depth = 4\ndepth_limit = 3\n",
        );
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("default_depth"));
    }

    #[test]
    fn test_negative_prune_ratio_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            "[relsubs]\ndb_path = \"x.db\"\n[graph]\nprune_ratio = -1.0\n",
        );
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_zero_max_children_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            "[relsubs]\ndb_path = \"x.db\"\n[graph]\nmax_children = 0\n",
        );
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_config_load_from_env_var() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, MINIMAL);
        let original = std::env::var("RELSUBS_CONFIG").ok();
        std::env::set_var("RELSUBS_CONFIG", &path);
        let config = Config::load();
        std::env::remove_var("RELSUBS_CONFIG");
        if let Some(v) = original {
            std::env::set_var("RELSUBS_CONFIG", v);
        }
        assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
        assert_eq!(config.unwrap().db_path(), Path::new("./corpus.db"));
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("RELSUBS_CONFIG").ok();
        std::env::set_var("RELSUBS_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("RELSUBS_CONFIG");
        if let Some(v) = original {
            std::env::set_var("RELSUBS_CONFIG", v);
        }
    }
}
