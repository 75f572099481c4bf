use auto_transfer_core::progress::{
    format_bytes, format_eta, ActionKind, ActionStatus, FileAction, RunPlan,
};
use auto_transfer_core::{Outcome, ProgressReporter, TransferProgress};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// CLI progress reporter using an indicatif byte bar for the execution
/// phase. Failures are printed above the bar as they happen.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn println(&self, line: String) {
        let guard = self.bar.lock().unwrap();
        match guard.as_ref() {
            Some(pb) => pb.println(line),
            None => eprintln!("{}", line),
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_run_start(&self, plan: &RunPlan) {
        eprintln!(
            "  {} {} of {} files eligible, {} skipped ({})",
            plan.operation.as_str().to_uppercase().cyan(),
            plan.eligible,
            plan.total_in_source,
            plan.skipped,
            format_bytes(plan.bytes_total),
        );

        let pb = ProgressBar::new(plan.bytes_total);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} [{bar:30.cyan/dim}] {bytes}/{total_bytes} {msg}",
            )
            .unwrap()
            .progress_chars("━╸─")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        *self.bar.lock().unwrap() = Some(pb);
    }

    fn on_file_action(&self, action: &FileAction) {
        if action.kind == ActionKind::Skip {
            return;
        }
        match &action.status {
            ActionStatus::Success => {}
            ActionStatus::FailedSizeMismatch => self.println(format!(
                "  {} {} size mismatch after copy, source kept",
                "✗".red(),
                action.file_name
            )),
            ActionStatus::CancelledAfterCopy => self.println(format!(
                "  {} {} copied but not removed from source",
                "!".yellow(),
                action.file_name
            )),
            other => self.println(format!("  {} {} {}", "✗".red(), action.file_name, other)),
        }
    }

    fn on_file_progress(&self, progress: &TransferProgress) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_position(progress.bytes_processed);
            pb.set_message(format!(
                "{}/{} files | {:.2} MB/s | ETA {} | {}",
                progress.processed,
                progress.eligible,
                progress.average_mb_per_sec,
                format_eta(progress.eta),
                progress.current_file,
            ));
        }
    }

    fn on_run_complete(&self, outcome: &Outcome) {
        if let Some(pb) = self.bar.lock().unwrap().take() {
            pb.finish_and_clear();
        }
        match outcome {
            Outcome::Completed(summary) => eprintln!(
                "  {} {} ({} in {:.2}s)",
                "✓".green(),
                outcome,
                format_bytes(summary.bytes_processed),
                summary.elapsed.as_secs_f64()
            ),
            Outcome::Cancelled(_) => eprintln!("  {} {}", "!".yellow(), outcome),
            Outcome::Failed(_) => eprintln!("  {} {}", "✗".red(), outcome.to_string().red()),
        }
    }
}
