//! Tipos de dados trocados com o serviço de destino.
//!
//! Todas as structs derivam `Serialize`/`Deserialize` com nomes em camelCase,
//! conforme o formato JSON esperado pelos endpoints `compare`, `sync` e
//! `sync/status`.

use serde::{Deserialize, Serialize};

use super::error::TargetError;

/// Corpo das requisições `compare` e `sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRequest {
    /// Identificador do contêiner de destino (o banco de dados espelhado).
    pub target_id: String,
}

/// Resposta do endpoint `compare`.
///
/// `comparison` é mantido como JSON bruto: a validação do formato
/// (rótulo → `{onlyInSource: [...]}`) fica a cargo do comparador.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompareResponse {
    #[serde(default)]
    pub comparison: Option<serde_json::Value>,
}

/// Confirmação imediata do endpoint `sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSyncResponse {
    /// Ausente significa aceito, a menos que `error` esteja presente.
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    /// Identificador do job assíncrono, quando o backend fornece um.
    #[serde(default)]
    pub job_id: Option<String>,
}

impl StartSyncResponse {
    pub fn accepted(&self) -> bool {
        self.success.unwrap_or(self.error.is_none())
    }
}

/// Resposta do endpoint `sync/status`. O campo `status` é obrigatório.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Estado de um job remoto, já interpretado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Qualquer estado não terminal ("pending", "running", ...).
    Pending(String),
    Complete,
    Error(Option<String>),
}

impl StatusResponse {
    /// Converte a resposta em [`SyncStatus`]. Uma resposta com `success: false`
    /// é tratada como malformada, nunca como pendente.
    pub fn into_status(self) -> Result<SyncStatus, TargetError> {
        if self.success == Some(false) {
            return Err(TargetError::Malformed(
                self.message
                    .unwrap_or_else(|| "unsuccessful status response".to_string()),
            ));
        }
        Ok(match self.status.to_lowercase().as_str() {
            "complete" => SyncStatus::Complete,
            "error" => SyncStatus::Error(self.message),
            _ => SyncStatus::Pending(self.status),
        })
    }
}
