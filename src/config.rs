//! Configuração do mirrorsync carregada a partir de `mirror.toml`.
//!
//! A struct [`MirrorConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `MIRROR_API_TOKEN` e `MIRROR_TARGET_URL` têm
//! precedência sobre o arquivo.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::reconcile::{CoordinatorSettings, ExhaustedPolicy, PollPolicy, SyncMode};

pub const DEFAULT_CONFIG_PATH: &str = "mirror.toml";

/// Configuração de nível superior carregada de `mirror.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Credencial bearer compartilhada pelos dois serviços.
    #[serde(default)]
    pub api_token: String,

    /// URL base do serviço de destino (compare / sync / sync/status).
    #[serde(default = "default_target_base_url")]
    pub target_base_url: String,

    /// URL base do serviço de origem (contêineres e registros).
    #[serde(default = "default_source_base_url")]
    pub source_base_url: String,

    /// Modo do backend: `synchronous` ou `asynchronous`.
    #[serde(default)]
    pub mode: SyncMode,

    /// Arquivo JSON com o estado local (alvo selecionado, itens pendentes).
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Validade, em segundos, da lista de contêineres em cache.
    #[serde(default = "default_container_cache_ttl_secs")]
    pub container_cache_ttl_secs: u64,

    /// Nível de log padrão quando `RUST_LOG` não está definido.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Como tratar o esgotamento das tentativas de polling.
    #[serde(default)]
    pub exhausted_policy: ExhaustedPolicy,

    /// Parâmetros de backoff do polling.
    #[serde(default)]
    pub poll: PollPolicy,
}

// Valor padrão para a URL do destino: servidor local de desenvolvimento.
fn default_target_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_source_base_url() -> String {
    "http://localhost:3000/lms".to_string()
}

fn default_state_path() -> PathBuf {
    PathBuf::from(".mirrorsync/state.json")
}

// Valor padrão para o TTL do cache de contêineres: 5 minutos.
fn default_container_cache_ttl_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            target_base_url: default_target_base_url(),
            source_base_url: default_source_base_url(),
            mode: SyncMode::default(),
            state_path: default_state_path(),
            container_cache_ttl_secs: default_container_cache_ttl_secs(),
            log_level: default_log_level(),
            exhausted_policy: ExhaustedPolicy::default(),
            poll: PollPolicy::default(),
        }
    }
}

impl MirrorConfig {
    /// Carrega a configuração do caminho informado.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<MirrorConfig>(&contents)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("MIRROR_API_TOKEN").filter(|v| !v.is_empty()) {
            self.api_token = token;
        }
        if let Some(url) = lookup("MIRROR_TARGET_URL").filter(|v| !v.is_empty()) {
            self.target_base_url = url;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.poll.min_attempts > self.poll.max_attempts {
            anyhow::bail!(
                "poll.min_attempts ({}) must not exceed poll.max_attempts ({})",
                self.poll.min_attempts,
                self.poll.max_attempts
            );
        }
        if !(self.poll.large_workload_scale > 0.0 && self.poll.large_workload_scale.is_finite()) {
            anyhow::bail!("poll.large_workload_scale must be a positive number");
        }
        Ok(())
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            mode: self.mode,
            poll: self.poll.clone(),
            exhausted_policy: self.exhausted_policy,
            container_ttl: Duration::from_secs(self.container_cache_ttl_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = MirrorConfig::default();
        assert_eq!(config.mode, SyncMode::Asynchronous);
        assert_eq!(config.exhausted_policy, ExhaustedPolicy::Partial);
        assert_eq!(config.poll, PollPolicy::default());
        assert_eq!(config.container_cache_ttl_secs, 300);
        assert!(config.api_token.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            api_token = "tok-123"
            mode = "synchronous"
            exhausted_policy = "error"

            [poll]
            max_attempts = 40
            jitter_ms = 0
        "#;
        let config: MirrorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_token, "tok-123");
        assert_eq!(config.mode, SyncMode::Synchronous);
        assert_eq!(config.exhausted_policy, ExhaustedPolicy::Error);
        assert_eq!(config.poll.max_attempts, 40);
        assert_eq!(config.poll.jitter_ms, 0);
        assert_eq!(config.poll.base_delay_ms, 1000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = MirrorConfig::load_from(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.poll.min_attempts, 12);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror.toml");
        std::fs::write(&path, "container_cache_ttl_secs = 60\n").unwrap();
        let config = MirrorConfig::load_from(&path).unwrap();
        assert_eq!(config.container_cache_ttl_secs, 60);
        assert_eq!(
            config.coordinator_settings().container_ttl,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn inverted_attempt_bounds_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror.toml");
        std::fs::write(&path, "[poll]\nmin_attempts = 30\nmax_attempts = 20\n").unwrap();
        assert!(MirrorConfig::load_from(&path).is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = MirrorConfig {
            api_token: "from-file".into(),
            ..Default::default()
        };
        config.apply_env(|key| match key {
            "MIRROR_API_TOKEN" => Some("from-env".into()),
            "MIRROR_TARGET_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.api_token, "from-env");
        assert_eq!(config.target_base_url, default_target_base_url());
    }
}
