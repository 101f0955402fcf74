//! Interface de terminal do mirrorsync: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para o spinner de progresso e `console` para
//! estilização com cores. O [`PassProgress`] acompanha visualmente uma
//! passada de reconciliação no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::reconcile::{OutcomeStatus, PassReport, ReconciliationOutcome, SyncMode};
use crate::records::{Lifecycle, WorkItem};

/// Indicador visual de progresso para uma passada de reconciliação.
///
/// Exibe um spinner durante a passada e, ao final, o resultado colorido:
/// sucesso em verde, parcial em amarelo, erro em vermelho.
pub struct PassProgress {
    pb: ProgressBar,
    dim: Style,
}

impl PassProgress {
    /// Inicia o spinner para o alvo e modo informados.
    pub fn start(target_id: &str, mode: SyncMode) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Reconciling {target_id} ({mode:?})"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            dim: Style::new().dim(),
        }
    }

    /// Finaliza o spinner e exibe o resultado da passada.
    pub fn finish(&self, report: &PassReport) {
        self.pb.finish_and_clear();
        match report {
            PassReport::Completed(outcome) => print_outcome(outcome),
            PassReport::Skipped(reason) => {
                println!("  {} Skipped: {reason}", self.dim.apply_to("-"));
            }
        }
    }
}

fn status_style(status: OutcomeStatus) -> (Style, &'static str) {
    match status {
        OutcomeStatus::Success => (Style::new().green().bold(), "✓"),
        OutcomeStatus::Partial => (Style::new().yellow().bold(), "~"),
        OutcomeStatus::Error => (Style::new().red().bold(), "✗"),
    }
}

/// Imprime o resultado de uma passada com a cor do seu status.
pub fn print_outcome(outcome: &ReconciliationOutcome) {
    let (style, mark) = status_style(outcome.status);
    println!("  {} {}", style.apply_to(mark), outcome_line(outcome));
}

/// Uma linha legível para o resultado de uma passada.
pub fn outcome_line(outcome: &ReconciliationOutcome) -> String {
    let mut line = format!(
        "{} for {} at {}",
        outcome.status,
        outcome.target_id,
        outcome.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(message) = &outcome.message {
        line.push_str(&format!(": {message}"));
    }
    line
}

/// Formata um item pendente em uma linha alinhada.
pub fn work_item_line(item: &WorkItem) -> String {
    let due = match item.lifecycle {
        Lifecycle::NoDeadline => "no deadline".to_string(),
        Lifecycle::Overdue => format!("OVERDUE {}", item.deadline),
        Lifecycle::Upcoming => format!("due {}", item.deadline),
    };
    format!(
        "[{:<10}] {:<40} {:<24} {}",
        item.category.to_string(),
        item.title,
        item.container_label,
        due
    )
}

/// Imprime a lista de itens, ou uma mensagem quando está vazia.
pub fn print_work_items(items: &[WorkItem]) {
    if items.is_empty() {
        println!("  {} Nothing outstanding", Style::new().green().apply_to("✓"));
        return;
    }
    let overdue = Style::new().red();
    for item in items {
        let line = work_item_line(item);
        if item.lifecycle == Lifecycle::Overdue {
            println!("  {}", overdue.apply_to(line));
        } else {
            println!("  {line}");
        }
    }
    println!("  {} item(s)", items.len());
}
