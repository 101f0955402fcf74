//! Interface de linha de comando do mirrorsync baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (reconcile, select,
//! outstanding, status, records, request) e flags globais (--config,
//! --verbose, --json-logs).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_CONFIG_PATH;
use crate::reconcile::SyncMode;

/// mirrorsync: espelha tarefas do LMS no banco de destino e verifica a convergência.
#[derive(Debug, Parser)]
#[command(name = "mirrorsync", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Habilita saída detalhada (nível debug).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Emite logs em JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,
}

/// Modo aceito pela CLI, mapeado para [`SyncMode`] internamente.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// O backend espelha durante a própria requisição.
    Synchronous,
    /// O backend espelha em segundo plano; o status é consultado por polling.
    Asynchronous,
}

impl From<ModeArg> for SyncMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Synchronous => SyncMode::Synchronous,
            ModeArg::Asynchronous => SyncMode::Asynchronous,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa uma passada de reconciliação.
    Reconcile {
        /// Contêiner de destino; usa o selecionado quando omitido.
        #[arg(long)]
        target: Option<String>,

        /// Sobrescreve o modo configurado.
        #[arg(long)]
        mode: Option<ModeArg>,
    },

    /// Persiste o contêiner de destino selecionado.
    Select {
        /// Identificador do contêiner de destino.
        target_id: String,
    },

    /// Mostra os itens ainda não espelhados (do cache local).
    Outstanding,

    /// Mostra o último resultado e o alvo selecionado.
    Status,

    /// Lista todos os registros de origem, já classificados.
    Records,

    /// Executa uma requisição JSON com tag `action`.
    Request {
        /// Corpo JSON, ex.: '{"action": "getStatus"}'.
        json: String,
    },
}
