use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::providers::TRANSLATE_URL;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");
const DISABLED_MASTER_KEY: &str = "1";
const HOME_DIR_NAME: &str = ".page-translator";
const LAYER_FILES: [&str; 2] = ["settings.toml", "settings.local.toml"];

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub app_version: String,
    pub port: u16,
    pub default_model: String,
    pub master_key: Option<String>,
    pub api_key: Option<String>,
    pub translate_url: String,
    pub request_timeout: Duration,
    pub concurrency: usize,
    pub max_concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "page-translator".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            port: 8088,
            default_model: "google-translate".to_string(),
            master_key: None,
            api_key: None,
            translate_url: TRANSLATE_URL.to_string(),
            request_timeout: Duration::from_millis(60_000),
            concurrency: 500,
            max_concurrency: 500,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    server: Option<ServerSettings>,
    upstream: Option<UpstreamSettings>,
    batch: Option<BatchSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    app_name: Option<String>,
    port: Option<u16>,
    default_model: Option<String>,
    master_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamSettings {
    api_key: Option<String>,
    url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BatchSettings {
    concurrency: Option<usize>,
    max_concurrency: Option<usize>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let home = home_dir();
    if let Some(home) = &home {
        write_home_defaults(home)?;
    }
    let paths = layer_paths(home.as_deref(), extra_path)?;
    let dotenv = read_dotenv(Path::new(".env"))?;
    load_layers(&paths, |key| {
        std::env::var(key)
            .ok()
            .or_else(|| dotenv.get(key).cloned())
    })
}

fn layer_paths(home: Option<&Path>, extra_path: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut dirs = vec![PathBuf::new()];
    dirs.extend(home.map(Path::to_path_buf));
    let mut paths: Vec<PathBuf> = dirs
        .iter()
        .flat_map(|dir| LAYER_FILES.iter().map(move |name| dir.join(name)))
        .collect();
    if let Some(extra) = extra_path {
        if !extra.is_file() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        paths.push(extra.to_path_buf());
    }
    Ok(paths)
}

/// Embedded defaults, then each existing TOML file in order, then the
/// environment as seen through `env`.
fn load_layers<F>(paths: &[PathBuf], env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings.merge(defaults);
    for path in paths.iter().filter(|path| path.is_file()) {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let parsed: SettingsFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        settings.merge(parsed);
    }
    settings.apply_env(env);
    Ok(settings)
}

fn read_dotenv(path: &Path) -> Result<HashMap<String, String>> {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(err) if err.not_found() => return Ok(HashMap::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    entries
        .collect::<Result<HashMap<_, _>, _>>()
        .with_context(|| format!("failed to parse {}", path.display()))
}

impl Settings {
    /// The bearer key guarding the API, if the gate is enabled.
    pub fn active_master_key(&self) -> Option<&str> {
        self.master_key
            .as_deref()
            .filter(|key| !key.is_empty() && *key != DISABLED_MASTER_KEY)
    }

    pub fn upstream_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow!("GOOGLE_API_KEY is not configured. Please set it in .env file."))
    }

    pub fn effective_concurrency(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.concurrency)
            .min(self.max_concurrency.max(1))
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(server) = incoming.server {
            if let Some(name) = non_empty(server.app_name) {
                self.app_name = name;
            }
            if let Some(port) = server.port {
                self.port = port;
            }
            if let Some(model) = non_empty(server.default_model) {
                self.default_model = model;
            }
            if let Some(key) = non_empty(server.master_key) {
                self.master_key = Some(key);
            }
        }
        if let Some(upstream) = incoming.upstream {
            if let Some(key) = non_empty(upstream.api_key) {
                self.api_key = Some(key);
            }
            if let Some(url) = non_empty(upstream.url) {
                self.translate_url = url;
            }
            if let Some(timeout) = upstream.timeout_ms {
                if timeout > 0 {
                    self.request_timeout = Duration::from_millis(timeout);
                }
            }
        }
        if let Some(batch) = incoming.batch {
            if let Some(concurrency) = batch.concurrency {
                if concurrency > 0 {
                    self.concurrency = concurrency;
                }
            }
            if let Some(max) = batch.max_concurrency {
                if max > 0 {
                    self.max_concurrency = max;
                }
            }
        }
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));
        if let Some(key) = get("GOOGLE_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(key) = get("API_MASTER_KEY") {
            self.master_key = Some(key);
        }
        if let Some(port) = get("PORT")
            .or_else(|| get("NGINX_PORT"))
            .and_then(|value| value.parse().ok())
        {
            self.port = port;
        }
        if let Some(timeout) = get("API_REQUEST_TIMEOUT")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
        {
            self.request_timeout = Duration::from_millis(timeout);
        }
        if let Some(model) = get("DEFAULT_MODEL") {
            self.default_model = model;
        }
        if let Some(url) = get("TRANSLATE_URL") {
            self.translate_url = url;
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn write_home_defaults(dir: &Path) -> Result<()> {
    let path = dir.join(LAYER_FILES[0]);
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create settings directory: {}", dir.display()))?;
    fs::write(&path, DEFAULT_SETTINGS_TOML)
        .with_context(|| format!("failed to write settings: {}", path.display()))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(HOME_DIR_NAME))
}
