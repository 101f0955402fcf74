//! Tipos de erro para o cliente do serviço de destino.
//!
//! Define [`TargetError`] com variantes para falhas de transporte, erros HTTP
//! sem corpo interpretável e respostas malformadas. Usa `thiserror` para derivar
//! `Display` e `Error` a partir dos atributos `#[error(...)]`.

use thiserror::Error;

/// Erros que podem ocorrer ao falar com o serviço de destino.
///
/// - [`Transport`](TargetError::Transport): a requisição não chegou ou não voltou
/// - [`Api`](TargetError::Api): status não-2xx sem corpo JSON interpretável
/// - [`Malformed`](TargetError::Malformed): corpo presente, mas fora do formato esperado
#[derive(Debug, Error)]
pub enum TargetError {
    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Status HTTP de erro cujo corpo não pôde ser interpretado.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// O corpo não corresponde ao formato esperado (JSON inválido ou campos faltando).
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TargetError {
    /// `true` quando a falha impediu o job de sequer começar no backend.
    pub fn is_transport(&self) -> bool {
        matches!(self, TargetError::Transport(_) | TargetError::Api { .. })
    }
}
