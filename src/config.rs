//! Configuration management for bibdocfile using the prefer crate.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::checksum::DEFAULT_EXTERNAL_THRESHOLD;

/// Default database filename.
const DEFAULT_DATABASE_FILENAME: &str = "bibdocfile.db";

/// Default subdirectory holding the document tree.
const FILES_SUBDIR: &str = "files";

/// Resolved application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename, relative to `data_dir`.
    pub database_filename: String,
    /// Explicit database path (overrides data_dir/database_filename).
    pub database_path: Option<PathBuf>,
    /// Root of the document tree.
    pub filedir: PathBuf,
    /// Number of documents per `g<N>` group directory.
    pub files_per_group: i64,
    /// Files at or above this size are hashed with `md5_tool`.
    pub md5_external_threshold: u64,
    /// External MD5 tool looked up in PATH.
    pub md5_tool: Option<String>,
    /// Probability of verifying a checksum before streaming.
    pub md5_check_probability: f64,
    /// Read file lists from the fsinfo cache instead of the directory.
    pub use_fsinfo_cache: bool,
    /// Collapse format aliases such as `.jpg` into `.jpeg`.
    pub strong_format_normalization: bool,
    /// Extra multi-dot extensions to recognize.
    pub additional_known_file_extensions: Vec<String>,
    /// Hand file delivery to the front-end web server.
    pub use_xsendfile: bool,
    /// Honor `Range` requests.
    pub enable_http_range_requests: bool,
    /// Address the file server binds to.
    pub bind: String,
}

impl Default for Settings {
    fn default() -> Self {
        // ~/.local/share/bibdocfile, falling back to the current directory
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bibdocfile");

        Self {
            filedir: data_dir.join(FILES_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_path: None,
            files_per_group: 5000,
            md5_external_threshold: DEFAULT_EXTERNAL_THRESHOLD,
            md5_tool: Some("md5sum".to_string()),
            md5_check_probability: 0.1,
            use_fsinfo_cache: true,
            strong_format_normalization: false,
            additional_known_file_extensions: Vec::new(),
            use_xsendfile: false,
            enable_http_range_requests: true,
            bind: "127.0.0.1:3030".to_string(),
        }
    }
}

impl Settings {
    /// Create settings rooted at a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            filedir: data_dir.join(FILES_SUBDIR),
            data_dir,
            ..Default::default()
        }
    }

    /// Full path to the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(&self.database_filename))
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename or path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filedir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_per_group: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_external_threshold: Option<u64>,
    /// Empty string disables the external tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_check_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_fsinfo_cache: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strong_format_normalization: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_known_file_extensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_xsendfile: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_http_range_requests: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers bibdocfile config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("bibdocfile").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("{}", e);
                        Self::default_with_env()
                    }
                },
                None => Self::default_with_env(),
            },
            Err(_) => Self::default_with_env(),
        }
    }

    /// Default config with environment overrides applied.
    pub fn default_with_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    /// `BIBDOCFILE_FILEDIR` and `BIBDOCFILE_DATABASE` win over the file.
    fn with_env_overrides(mut self) -> Self {
        if let Some(filedir) = env_var("BIBDOCFILE_FILEDIR") {
            self.filedir = Some(filedir);
        }
        if let Some(database) = env_var("BIBDOCFILE_DATABASE") {
            self.database = Some(database);
        }
        self
    }

    /// Directory of the config file, used to resolve relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are joined onto `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
            settings.filedir = settings.data_dir.join(FILES_SUBDIR);
        }
        if let Some(ref database) = self.database {
            if database.contains('/') || database.starts_with('~') {
                settings.database_path = Some(self.resolve_path(database, base_dir));
            } else {
                settings.database_filename = database.clone();
            }
        }
        if let Some(ref filedir) = self.filedir {
            settings.filedir = self.resolve_path(filedir, base_dir);
        }
        if let Some(n) = self.files_per_group.filter(|n| *n > 0) {
            settings.files_per_group = n;
        }
        if let Some(threshold) = self.md5_external_threshold {
            settings.md5_external_threshold = threshold;
        }
        if let Some(ref tool) = self.md5_tool {
            settings.md5_tool = Some(tool.clone()).filter(|t| !t.is_empty());
        }
        if let Some(p) = self.md5_check_probability {
            settings.md5_check_probability = p.clamp(0.0, 1.0);
        }
        if let Some(v) = self.use_fsinfo_cache {
            settings.use_fsinfo_cache = v;
        }
        if let Some(v) = self.strong_format_normalization {
            settings.strong_format_normalization = v;
        }
        if !self.additional_known_file_extensions.is_empty() {
            settings.additional_known_file_extensions = self.additional_known_file_extensions.clone();
        }
        if let Some(v) = self.use_xsendfile {
            settings.use_xsendfile = v;
        }
        if let Some(v) = self.enable_http_range_requests {
            settings.enable_http_range_requests = v;
        }
        if let Some(ref bind) = self.bind {
            settings.bind = bind.clone();
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Load settings, honoring an explicit `--config` path.
/// Returns (Settings, Config) tuple.
pub async fn load_settings(config_path: Option<&Path>) -> (Settings, Config) {
    let config = match config_path {
        Some(path) => Config::load_from_path(path).await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Config::default_with_env()
        }),
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::with_data_dir(PathBuf::from("/srv/library"));
        assert_eq!(settings.filedir, PathBuf::from("/srv/library/files"));
        assert_eq!(settings.database_path(), PathBuf::from("/srv/library/bibdocfile.db"));
        assert_eq!(settings.files_per_group, 5000);
        assert!(settings.use_fsinfo_cache);
    }

    #[tokio::test]
    async fn test_load_toml_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bibdocfile.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "data"
files_per_group = 100
md5_tool = ""
additional_known_file_extensions = ["tar.xz"]
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, &config.base_dir().unwrap());

        assert_eq!(settings.data_dir, dir.path().join("data"));
        assert_eq!(settings.filedir, dir.path().join("data").join("files"));
        assert_eq!(settings.files_per_group, 100);
        assert_eq!(settings.md5_tool, None);
        assert_eq!(settings.additional_known_file_extensions, vec!["tar.xz".to_string()]);
    }

    #[tokio::test]
    async fn test_load_json_and_yaml() {
        let dir = tempdir().unwrap();
        let json = dir.path().join("config.json");
        std::fs::write(&json, r#"{"use_fsinfo_cache": false, "bind": "0.0.0.0:8080"}"#).unwrap();
        let yaml = dir.path().join("config.yaml");
        std::fs::write(&yaml, "use_xsendfile: true\nmd5_check_probability: 2.0\n").unwrap();

        let mut settings = Settings::default();
        let base = dir.path().to_path_buf();
        Config::load_from_path(&json).await.unwrap().apply_to_settings(&mut settings, &base);
        Config::load_from_path(&yaml).await.unwrap().apply_to_settings(&mut settings, &base);

        assert!(!settings.use_fsinfo_cache);
        assert_eq!(settings.bind, "0.0.0.0:8080");
        assert!(settings.use_xsendfile);
        assert_eq!(settings.md5_check_probability, 1.0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "files_per_group = [").unwrap();
        assert!(Config::load_from_path(&path).await.is_err());
    }
}
