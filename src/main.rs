use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use mirrorsync::cli::{Cli, Command};
use mirrorsync::config::MirrorConfig;
use mirrorsync::credentials::StaticCredential;
use mirrorsync::error::MirrorError;
use mirrorsync::reconcile::ReconciliationCoordinator;
use mirrorsync::request;
use mirrorsync::source::HttpSourceClient;
use mirrorsync::store::JsonFileStore;
use mirrorsync::target::HttpTargetClient;
use mirrorsync::{logging, ui};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = MirrorConfig::load_from(&cli.config)?;
    let level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    logging::init(level, cli.json_logs);

    let coordinator = ReconciliationCoordinator::new(
        HttpTargetClient::new(&config.target_base_url),
        HttpSourceClient::new(&config.source_base_url),
        Arc::new(StaticCredential::new(config.api_token.clone())),
        Arc::new(JsonFileStore::new(&config.state_path)),
        config.coordinator_settings(),
    );

    match cli.command {
        Command::Reconcile { target, mode } => {
            let target_id = target
                .or_else(|| coordinator.selected_target())
                .ok_or(MirrorError::NoTarget)?;
            let mode = mode.map(Into::into).unwrap_or(coordinator.mode());

            let progress = ui::PassProgress::start(&target_id, mode);
            let report = coordinator.reconcile(mode, &target_id).await;
            progress.finish(&report);
        }
        Command::Select { target_id } => {
            coordinator.select_target(&target_id);
            println!("Selected target {target_id}");
        }
        Command::Outstanding => {
            ui::print_work_items(&coordinator.current_outstanding_items());
        }
        Command::Status => {
            match coordinator.selected_target() {
                Some(id) => println!("Target:   {id}"),
                None => println!("Target:   (none selected)"),
            }
            match coordinator.last_attempted_at() {
                Some(at) => println!("Attempted: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("Attempted: never"),
            }
            if let Some(outcome) = coordinator.last_outcome() {
                ui::print_outcome(&outcome);
            }
        }
        Command::Records => {
            let items = coordinator.list_work_items().await?;
            ui::print_work_items(&items);
        }
        Command::Request { json } => {
            let response = request::handle_json(&coordinator, &json).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
