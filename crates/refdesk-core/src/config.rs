//! Refdesk configuration system.
//!
//! TOML file with serde defaults for every field, so a partial (or
//! empty) file always yields a runnable config. Secrets are taken
//! from the environment when the file leaves them blank
//! (`DATABASE_URL`, `AZURE_OPENAI_API_KEY`).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RefdeskError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RefdeskConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub azure_openai: AzureOpenAiConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub pdf: PdfConfig,
    /// Business-category display name -> numeric id.
    #[serde(default = "default_categories")]
    pub categories: BTreeMap<String, i16>,
}

impl RefdeskConfig {
    /// Load config from a specific path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RefdeskError::Config(format!("failed to read config: {e}")))?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| RefdeskError::Config(format!("failed to parse config: {e}")))?;
        config.apply_env();
        Ok(config)
    }

    /// Default config with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self {
            categories: default_categories(),
            ..Self::default()
        };
        config.apply_env();
        config
    }

    /// Fill blank secrets from the environment.
    fn apply_env(&mut self) {
        if self.database.url.is_empty() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                self.database.url = url;
            }
        }
        if self.azure_openai.api_key.is_empty() {
            if let Ok(key) = std::env::var("AZURE_OPENAI_API_KEY") {
                self.azure_openai.api_key = key;
            }
        }
        if self.azure_openai.endpoint.is_empty() {
            if let Ok(endpoint) = std::env::var("AZURE_OPENAI_ENDPOINT") {
                self.azure_openai.endpoint = endpoint;
            }
        }
    }
}

/// Default category mapping; deployments override via `[categories]`.
fn default_categories() -> BTreeMap<String, i16> {
    [
        ("新契約", 1),
        ("収納", 2),
        ("保全", 3),
        ("保険金", 4),
        ("商品", 5),
        ("MSAケア", 6),
        ("手数料", 7),
        ("代理店制度", 8),
        ("職域推進", 9),
        ("人事", 10),
        ("会計", 11),
    ]
    .into_iter()
    .map(|(name, id)| (name.to_string(), id))
    .collect()
}

/// Postgres connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Blank means "take DATABASE_URL from the environment".
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// ANN probe deadline; a slow query is a retrieval failure, not a retry.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_query_timeout_secs() -> u64 { 10 }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

/// Azure OpenAI endpoints and deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureOpenAiConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_embeddings_deployment")]
    pub embeddings_deployment: String,
    #[serde(default = "default_chat_deployment")]
    pub chat_deployment: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_api_version() -> String { "2024-02-01".into() }
fn default_embeddings_deployment() -> String { "text-embedding-3-large".into() }
fn default_chat_deployment() -> String { "gpt-4o".into() }
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 1024 }

impl Default for AzureOpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            api_version: default_api_version(),
            embeddings_deployment: default_embeddings_deployment(),
            chat_deployment: default_chat_deployment(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Retrieval engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Declared width of the stored vectors; mismatching query vectors
    /// are rejected before any database round-trip.
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    /// Manual results kept after dedup/exclusion.
    #[serde(default = "default_manual_top_k")]
    pub manual_top_k: usize,
    /// FAQ results kept after dedup/exclusion.
    #[serde(default = "default_faq_top_k")]
    pub faq_top_k: usize,
    /// Candidates fetched per collection before filtering; must exceed
    /// the caps so enough rows survive exclusion.
    #[serde(default = "default_probe_limit")]
    pub probe_limit: i64,
    #[serde(default = "default_hnsw_ef_search")]
    pub hnsw_ef_search: u32,
}

fn default_embedding_dim() -> usize { 3072 }
fn default_manual_top_k() -> usize { 4 }
fn default_faq_top_k() -> usize { 3 }
fn default_probe_limit() -> i64 { 50 }
fn default_hnsw_ef_search() -> u32 { 500 }

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            embedding_dim: default_embedding_dim(),
            manual_top_k: default_manual_top_k(),
            faq_top_k: default_faq_top_k(),
            probe_limit: default_probe_limit(),
            hnsw_ef_search: default_hnsw_ef_search(),
        }
    }
}

/// HTTP/WebSocket surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 8001 }
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:8000".into(), "http://frontend:8000".into()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Location of the source PDFs served back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    #[serde(default = "default_pdf_dir")]
    pub data_dir: String,
}

fn default_pdf_dir() -> String { "/app/data/pdf".into() }

impl Default for PdfConfig {
    fn default() -> Self {
        Self { data_dir: default_pdf_dir() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RefdeskConfig::default();
        assert_eq!(config.search.embedding_dim, 3072);
        assert_eq!(config.search.manual_top_k, 4);
        assert_eq!(config.search.faq_top_k, 3);
        assert_eq!(config.search.probe_limit, 50);
        assert_eq!(config.gateway.port, 8001);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [search]
            manual_top_k = 6
            probe_limit = 100

            [gateway]
            port = 9000

            [categories]
            "収納" = 2
            "保全" = 3
        "#;

        let config: RefdeskConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.search.manual_top_k, 6);
        assert_eq!(config.search.probe_limit, 100);
        // Untouched fields keep their defaults.
        assert_eq!(config.search.faq_top_k, 3);
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.categories.get("収納"), Some(&2));
        assert_eq!(config.categories.len(), 2);
    }

    #[test]
    fn test_config_missing_sections_use_defaults() {
        let config: RefdeskConfig = toml::from_str("").unwrap();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.azure_openai.temperature, 0.7);
        assert_eq!(config.search.hnsw_ef_search, 500);
    }

    #[test]
    fn test_default_categories_present() {
        let config = RefdeskConfig {
            categories: super::default_categories(),
            ..Default::default()
        };
        assert_eq!(config.categories.get("新契約"), Some(&1));
        assert_eq!(config.categories.get("会計"), Some(&11));
        assert_eq!(config.categories.len(), 11);
    }
}
