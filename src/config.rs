use crate::error::{ErrorContext, GeoCamError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Fixed delay between retries of a failed upload.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 10;

/// Status polling cadence while any UI surface is visible.
pub const DEFAULT_FOREGROUND_POLL_MS: u64 = 1_000;

/// Status polling cadence while every UI surface is hidden.
pub const DEFAULT_BACKGROUND_POLL_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoCamConfig {
    #[serde(rename = "serverUrl")]
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(rename = "queueFile")]
    pub queue_file: Option<PathBuf>,
    #[serde(rename = "photosDir")]
    pub photos_dir: Option<PathBuf>,
    #[serde(rename = "logsDir")]
    pub logs_dir: Option<PathBuf>,
    #[serde(rename = "retryDelaySecs", default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(rename = "foregroundPollMs", default = "default_foreground_poll_ms")]
    pub foreground_poll_ms: u64,
    #[serde(rename = "backgroundPollMs", default = "default_background_poll_ms")]
    pub background_poll_ms: u64,
}

fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

fn default_foreground_poll_ms() -> u64 {
    DEFAULT_FOREGROUND_POLL_MS
}

fn default_background_poll_ms() -> u64 {
    DEFAULT_BACKGROUND_POLL_MS
}

impl Default for GeoCamConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            username: None,
            password: None,
            queue_file: None,
            photos_dir: None,
            logs_dir: None,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            foreground_poll_ms: DEFAULT_FOREGROUND_POLL_MS,
            background_poll_ms: DEFAULT_BACKGROUND_POLL_MS,
        }
    }
}

impl GeoCamConfig {
    /// Inbox endpoint: `{server}/upload/{username}/`, or `{server}/upload/` when
    /// no username is configured.
    pub fn upload_url(&self) -> Result<String, GeoCamError> {
        let server_url = self
            .server_url
            .as_deref()
            .ok_or_else(|| GeoCamError::Config("No server URL configured".to_string()))?;

        let mut base = Url::parse(server_url)
            .map_err(|e| GeoCamError::Config(format!("Invalid server URL '{}': {}", server_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let relative = match self.username.as_deref().filter(|u| !u.is_empty()) {
            Some(username) => format!("upload/{}/", username),
            None => "upload/".to_string(),
        };

        base.join(&relative)
            .map(|url| url.to_string())
            .map_err(|e| GeoCamError::Config(format!("Invalid upload URL: {}", e)))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn foreground_poll_interval(&self) -> Duration {
        Duration::from_millis(self.foreground_poll_ms)
    }

    pub fn background_poll_interval(&self) -> Duration {
        Duration::from_millis(self.background_poll_ms)
    }

    pub fn queue_file_path(&self) -> Result<PathBuf, GeoCamError> {
        match &self.queue_file {
            Some(path) => Ok(path.clone()),
            None => Ok(get_config_dir()?.join("upload_queue.json")),
        }
    }

    pub fn photos_dir_path(&self) -> Result<PathBuf, GeoCamError> {
        match &self.photos_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(get_config_dir()?.join("photos")),
        }
    }

    pub fn logs_dir_path(&self) -> Result<PathBuf, GeoCamError> {
        match &self.logs_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(get_config_dir()?.join("logs")),
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf, GeoCamError> {
    dirs::home_dir()
        .map(|home| home.join(".geocam"))
        .ok_or_else(|| GeoCamError::Config("Could not find home directory".to_string()))
}

pub fn get_config_file_path() -> Result<PathBuf, GeoCamError> {
    Ok(get_config_dir()?.join("config.json"))
}

/// Create `dir` (and parents) owner-only if it does not exist yet.
pub fn ensure_private_dir(dir: &Path) -> Result<(), GeoCamError> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;

        // Set permissions to 700 (read/write/execute for owner only) on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut permissions = fs::metadata(dir)?.permissions();
            permissions.set_mode(0o700);
            fs::set_permissions(dir, permissions)?;
        }
    }
    Ok(())
}

pub fn load_config() -> Result<GeoCamConfig, GeoCamError> {
    load_config_from(&get_config_file_path()?)
}

pub fn load_config_from(config_file: &Path) -> Result<GeoCamConfig, GeoCamError> {
    if !config_file.exists() {
        return Ok(GeoCamConfig::default());
    }

    let content = fs::read_to_string(config_file).context("Failed to read config file")?;
    let config: GeoCamConfig = serde_json::from_str(&content).context("Failed to parse config file")?;
    Ok(config)
}

pub fn save_config(config: &GeoCamConfig) -> Result<(), GeoCamError> {
    save_config_to(config, &get_config_file_path()?)
}

pub fn save_config_to(config: &GeoCamConfig, config_file: &Path) -> Result<(), GeoCamError> {
    if let Some(parent) = config_file.parent() {
        ensure_private_dir(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    fs::write(config_file, content)?;

    // The config carries the inbox password: 600 on Unix systems
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = fs::metadata(config_file)?.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(config_file, permissions)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_upload_url_with_username() {
        let config = GeoCamConfig {
            server_url: Some("https://geocam.example.org/share".to_string()),
            username: Some("field1".to_string()),
            ..Default::default()
        };

        assert_eq!(
            config.upload_url().unwrap(),
            "https://geocam.example.org/share/upload/field1/"
        );
    }

    #[test]
    fn test_upload_url_without_username() {
        let config = GeoCamConfig {
            server_url: Some("http://127.0.0.1:8000/".to_string()),
            ..Default::default()
        };

        assert_eq!(config.upload_url().unwrap(), "http://127.0.0.1:8000/upload/");
    }

    #[test]
    fn test_upload_url_requires_server() {
        let err = GeoCamConfig::default().upload_url().unwrap_err();
        assert!(matches!(err, GeoCamError::Config(_)));

        let config = GeoCamConfig {
            server_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.upload_url(), Err(GeoCamError::Config(_))));
    }

    #[test]
    fn test_missing_config_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.json")).unwrap();

        assert_eq!(config.retry_delay_secs, DEFAULT_RETRY_DELAY_SECS);
        assert_eq!(config.retry_delay(), Duration::from_secs(10));
        assert!(config.server_url.is_none());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"serverUrl":"http://localhost:8000","username":"ops"}"#).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.username.as_deref(), Some("ops"));
        assert_eq!(config.foreground_poll_ms, DEFAULT_FOREGROUND_POLL_MS);
        assert_eq!(config.background_poll_ms, DEFAULT_BACKGROUND_POLL_MS);
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = GeoCamConfig {
            server_url: Some("http://localhost:8000".to_string()),
            password: Some("secret".to_string()),
            retry_delay_secs: 3,
            ..Default::default()
        };

        save_config_to(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();

        assert_eq!(loaded.password.as_deref(), Some("secret"));
        assert_eq!(loaded.retry_delay_secs, 3);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, GeoCamError::Json(_)));
    }
}
