//! Configuration loader shared by the console agent and the MCP server
//!
//! Implements single-source priority loading with flag overrides:
//! 1. --config file/dir (highest priority)
//! 2. Current working directory: ./eventdesk.json or ./.eventdesk/config.json
//! 3. Git repository root: <repo_root>/.eventdesk/config.json
//! 4. User config dir: <config_dir>/eventdesk/config.json
//! 5. Environment variables only (no files)
//!
//! Sections missing from a file are filled from the environment. Any
//! string secret may be written as `env:VAR_NAME`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{DataverseConfig, ModelParams, Protocol, ResolvedLlmConfig};
use crate::error::ConfigError;
use crate::script::ScriptLimits;

const CONFIG_FILE: &str = "eventdesk.json";
const CONFIG_DIR: &str = ".eventdesk";
const APP_DIR: &str = "eventdesk";

/// Raw configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub llm: Option<RawLlmConfig>,
    #[serde(default)]
    pub dataverse: Option<RawDataverseConfig>,
    #[serde(default)]
    pub script: ScriptLimits,
    #[serde(default)]
    pub agent: AgentSettings,
}

/// LLM section as written on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLlmConfig {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// API key (can be "env:VAR_NAME")
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub params: ModelParams,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Dataverse section as written on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDataverseConfig {
    pub url: String,
    pub tenant_id: String,
    pub client_id: String,
    /// Client secret (can be "env:VAR_NAME")
    pub client_secret: String,
    pub authority_host: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Settings for the console agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_steps: usize,
    /// Markdown instructions for the code-generation agent
    pub instructions_file: Option<PathBuf>,
    /// Plain-text list of past events used by `import`
    pub events_file: PathBuf,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: 50,
            instructions_file: None,
            events_file: PathBuf::from("past_events.txt"),
        }
    }
}

fn default_protocol() -> String {
    "openai".to_string()
}

/// Fully resolved application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: Option<ResolvedLlmConfig>,
    pub dataverse: Option<DataverseConfig>,
    pub script: ScriptLimits,
    pub agent: AgentSettings,
    /// File the configuration came from, if any
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub fn require_llm(&self) -> Result<&ResolvedLlmConfig> {
        self.llm.as_ref().ok_or_else(|| {
            anyhow!(
                "{}: create {} with an \"llm\" section or set OPENAI_API_KEY",
                ConfigError::NoConfigFound,
                CONFIG_FILE
            )
        })
    }

    pub fn require_dataverse(&self) -> Result<&DataverseConfig> {
        self.dataverse.as_ref().ok_or_else(|| {
            anyhow!(
                "{}: create {} with a \"dataverse\" section or set DATAVERSE_URL, \
                 DATAVERSE_TENANT_ID, DATAVERSE_CLIENT_ID and DATAVERSE_CLIENT_SECRET",
                ConfigError::NoConfigFound,
                CONFIG_FILE
            )
        })
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Configuration loader
pub struct ConfigLoader {
    config_override: Option<PathBuf>,
    api_key_override: Option<String>,
    base_url_override: Option<String>,
    model_override: Option<String>,
    search_dirs: bool,
    env: EnvLookup,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_override: None,
            api_key_override: None,
            base_url_override: None,
            model_override: None,
            search_dirs: true,
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Set config file/directory override
    pub fn with_config_override(mut self, path: PathBuf) -> Self {
        self.config_override = Some(path);
        self
    }

    pub fn with_api_key_override(mut self, api_key: String) -> Self {
        self.api_key_override = Some(api_key);
        self
    }

    pub fn with_base_url_override(mut self, base_url: String) -> Self {
        self.base_url_override = Some(base_url);
        self
    }

    pub fn with_model_override(mut self, model: String) -> Self {
        self.model_override = Some(model);
        self
    }

    /// Replace the environment lookup
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(env);
        self
    }

    /// Skip the directory search and use only the override or the environment
    pub fn without_search(mut self) -> Self {
        self.search_dirs = false;
        self
    }

    /// Load and resolve configuration
    pub async fn load(&self) -> Result<AppConfig> {
        // Step 1: Find and load base configuration
        let (mut raw, source) = if let Some(override_path) = &self.config_override {
            let (raw, path) = self.load_from_path(override_path).await.with_context(|| {
                format!(
                    "Failed to load config from override path: {}",
                    override_path.display()
                )
            })?;
            (raw, Some(path))
        } else if self.search_dirs {
            match self.search().await? {
                Some((raw, path)) => (raw, Some(path)),
                None => (RawConfig::default(), None),
            }
        } else {
            (RawConfig::default(), None)
        };

        if let Some(path) = &source {
            tracing::debug!(path = %path.display(), "Loaded configuration file");
        }

        // Step 2: Fill missing sections from the environment
        if raw.llm.is_none() {
            raw.llm = self.llm_from_env();
        }
        if raw.dataverse.is_none() {
            raw.dataverse = self.dataverse_from_env();
        }

        // Step 3: Apply flag overrides
        if let Some(api_key) = &self.api_key_override {
            match raw.llm.as_mut() {
                Some(llm) => llm.api_key = api_key.clone(),
                None => {
                    raw.llm = Some(RawLlmConfig {
                        protocol: default_protocol(),
                        api_key: api_key.clone(),
                        base_url: None,
                        model: None,
                        params: ModelParams::default(),
                        headers: HashMap::new(),
                    })
                }
            }
        }
        if let Some(llm) = raw.llm.as_mut() {
            if let Some(base_url) = &self.base_url_override {
                llm.base_url = Some(base_url.clone());
            }
            if let Some(model) = &self.model_override {
                llm.model = Some(model.clone());
            }
        }

        // Step 4: Resolve
        self.resolve(raw, source)
    }

    async fn search(&self) -> Result<Option<(RawConfig, PathBuf)>> {
        let cwd = std::env::current_dir()?;
        let mut candidates = vec![cwd.join(CONFIG_FILE), cwd.join(CONFIG_DIR).join("config.json")];

        if let Some(git_root) = find_git_root(&cwd) {
            candidates.push(git_root.join(CONFIG_DIR).join("config.json"));
        }
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join(APP_DIR).join("config.json"));
        }

        for candidate in candidates {
            if candidate.is_file() {
                let raw = self.load_file(&candidate).await?;
                return Ok(Some((raw, candidate)));
            }
        }
        Ok(None)
    }

    fn llm_from_env(&self) -> Option<RawLlmConfig> {
        let api_key = (self.env)("OPENAI_API_KEY")?;
        Some(RawLlmConfig {
            protocol: default_protocol(),
            api_key,
            base_url: (self.env)("OPENAI_BASE_URL"),
            model: (self.env)("OPENAI_MODEL"),
            params: ModelParams::default(),
            headers: HashMap::new(),
        })
    }

    fn dataverse_from_env(&self) -> Option<RawDataverseConfig> {
        Some(RawDataverseConfig {
            url: (self.env)("DATAVERSE_URL")?,
            tenant_id: (self.env)("DATAVERSE_TENANT_ID")?,
            client_id: (self.env)("DATAVERSE_CLIENT_ID")?,
            client_secret: (self.env)("DATAVERSE_CLIENT_SECRET")?,
            authority_host: (self.env)("DATAVERSE_AUTHORITY"),
            timeout_secs: None,
        })
    }

    /// Load configuration from a specific path (file or directory)
    async fn load_from_path(&self, path: &Path) -> Result<(RawConfig, PathBuf)> {
        if path.is_file() {
            Ok((self.load_file(path).await?, path.to_path_buf()))
        } else if path.is_dir() {
            let config_file = path.join("config.json");
            if config_file.exists() {
                Ok((self.load_file(&config_file).await?, config_file))
            } else {
                Err(anyhow!(
                    "No config.json found in directory: {}",
                    path.display()
                ))
            }
        } else {
            Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into())
        }
    }

    async fn load_file(&self, path: &Path) -> Result<RawConfig> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Resolve `env:VAR_NAME` references
    fn resolve_secret(&self, field: &str, value: &str) -> Result<String> {
        match value.strip_prefix("env:") {
            Some(var_name) => (self.env)(var_name).ok_or_else(|| {
                anyhow!(
                    "Environment variable not found for {}: {}",
                    field,
                    var_name
                )
            }),
            None => Ok(value.to_string()),
        }
    }

    fn resolve(&self, raw: RawConfig, source: Option<PathBuf>) -> Result<AppConfig> {
        let llm = match raw.llm {
            Some(llm) => {
                let protocol: Protocol = llm.protocol.parse()?;
                let api_key = self.resolve_secret("llm.api_key", &llm.api_key)?;
                let base_url = llm
                    .base_url
                    .unwrap_or_else(|| protocol.default_base_url().to_string());
                let model = llm
                    .model
                    .unwrap_or_else(|| protocol.default_model().to_string());

                let resolved = ResolvedLlmConfig::new(protocol, base_url, api_key, model)
                    .with_params(llm.params)
                    .with_headers(llm.headers);
                resolved
                    .validate()
                    .context("LLM configuration validation failed")?;
                Some(resolved)
            }
            None => None,
        };

        let dataverse = match raw.dataverse {
            Some(dv) => {
                let mut resolved = DataverseConfig::new(
                    dv.url,
                    self.resolve_secret("dataverse.tenant_id", &dv.tenant_id)?,
                    self.resolve_secret("dataverse.client_id", &dv.client_id)?,
                    self.resolve_secret("dataverse.client_secret", &dv.client_secret)?,
                );
                if let Some(authority) = dv.authority_host {
                    resolved.authority_host = authority;
                }
                if let Some(timeout) = dv.timeout_secs {
                    resolved.timeout_secs = timeout;
                }
                resolved
                    .validate()
                    .context("Dataverse configuration validation failed")?;
                Some(resolved)
            }
            None => None,
        };

        Ok(AppConfig {
            llm,
            dataverse,
            script: raw.script,
            agent: raw.agent,
            source,
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn find_git_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_full_file() {
        let file = write_config(
            r#"{
                "llm": { "api_key": "env:TEST_OPENAI_KEY", "params": { "max_tokens": 4096 } },
                "dataverse": {
                    "url": "https://contoso.crm4.dynamics.com",
                    "tenant_id": "tenant",
                    "client_id": "client",
                    "client_secret": "env:TEST_DV_SECRET"
                },
                "script": { "max_operations": 5000 },
                "agent": { "max_steps": 12 }
            }"#,
        );

        let config = ConfigLoader::new()
            .with_config_override(file.path().to_path_buf())
            .with_env(env(&[("TEST_OPENAI_KEY", "sk-1"), ("TEST_DV_SECRET", "s3cret")]))
            .load()
            .await
            .unwrap();

        let llm = config.require_llm().unwrap();
        assert_eq!(llm.api_key, "sk-1");
        assert_eq!(llm.model, "gpt-5.1");
        assert_eq!(llm.base_url, "https://api.openai.com/v1");
        assert_eq!(llm.params.max_tokens, Some(4096));

        let dv = config.require_dataverse().unwrap();
        assert_eq!(dv.client_secret, "s3cret");
        assert_eq!(dv.authority_host, "https://login.microsoftonline.com");

        assert_eq!(config.script.max_operations, 5000);
        assert_eq!(config.agent.max_steps, 12);
        assert_eq!(config.agent.events_file, PathBuf::from("past_events.txt"));
        assert_eq!(config.source.as_deref(), Some(file.path()));
    }

    #[tokio::test]
    async fn test_env_only() {
        let config = ConfigLoader::new()
            .without_search()
            .with_env(env(&[
                ("OPENAI_API_KEY", "sk-env"),
                ("OPENAI_MODEL", "gpt-5-mini"),
                ("DATAVERSE_URL", "https://org.crm.dynamics.com"),
                ("DATAVERSE_TENANT_ID", "t"),
                ("DATAVERSE_CLIENT_ID", "c"),
                ("DATAVERSE_CLIENT_SECRET", "s"),
            ]))
            .load()
            .await
            .unwrap();

        assert_eq!(config.require_llm().unwrap().model, "gpt-5-mini");
        assert_eq!(
            config.require_dataverse().unwrap().url,
            "https://org.crm.dynamics.com"
        );
        assert!(config.source.is_none());
    }

    #[tokio::test]
    async fn test_nothing_configured() {
        let config = ConfigLoader::new()
            .without_search()
            .with_env(env(&[]))
            .load()
            .await
            .unwrap();

        assert!(config.llm.is_none());
        assert!(config.dataverse.is_none());
        let err = config.require_llm().unwrap_err().to_string();
        assert!(err.contains("No configuration found"), "{}", err);
    }

    #[tokio::test]
    async fn test_flag_overrides_win() {
        let file = write_config(r#"{ "llm": { "api_key": "sk-file", "model": "gpt-4o" } }"#);

        let config = ConfigLoader::new()
            .with_config_override(file.path().to_path_buf())
            .with_api_key_override("sk-flag".to_string())
            .with_model_override("gpt-5.1".to_string())
            .with_base_url_override("http://localhost:8080/v1".to_string())
            .with_env(env(&[]))
            .load()
            .await
            .unwrap();

        let llm = config.require_llm().unwrap();
        assert_eq!(llm.api_key, "sk-flag");
        assert_eq!(llm.model, "gpt-5.1");
        assert_eq!(llm.base_url, "http://localhost:8080/v1");
    }

    #[tokio::test]
    async fn test_missing_env_secret_fails() {
        let file = write_config(r#"{ "llm": { "api_key": "env:NOT_SET_ANYWHERE" } }"#);

        let err = ConfigLoader::new()
            .with_config_override(file.path().to_path_buf())
            .with_env(env(&[]))
            .load()
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("NOT_SET_ANYWHERE"));
    }

    #[tokio::test]
    async fn test_unsupported_protocol() {
        let file = write_config(r#"{ "llm": { "protocol": "anthropic", "api_key": "k" } }"#);

        let err = ConfigLoader::new()
            .with_config_override(file.path().to_path_buf())
            .with_env(env(&[]))
            .load()
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("Unsupported protocol"));
    }

    #[tokio::test]
    async fn test_missing_override_path() {
        let result = ConfigLoader::new()
            .with_config_override(PathBuf::from("/definitely/not/here.json"))
            .load()
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_find_git_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_git_root(&nested).as_deref(), Some(dir.path()));
    }
}
