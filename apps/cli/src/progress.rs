//! Terminal rendering of update events.

use indicatif::{ProgressBar, ProgressStyle};
use otapush_updater::UpdateEvent;
use tokio::sync::mpsc;

/// Percent bar in the same layout as the byte bars.
pub fn percent_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("   {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar
}

/// Applies update events to a progress bar.
pub struct EventView {
    bar: ProgressBar,
}

impl EventView {
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }

    /// Renders one event. Returns the outcome once `Done` arrives.
    pub fn apply(&self, event: UpdateEvent) -> Option<(bool, String)> {
        match event {
            UpdateEvent::Phase(phase) => {
                self.bar.set_message(phase.to_string());
                None
            }
            UpdateEvent::Progress(pct) => {
                self.bar.set_position(u64::from(pct));
                None
            }
            UpdateEvent::Log(line) => {
                self.bar.println(format!("   {line}"));
                None
            }
            UpdateEvent::Done { success, message } => {
                if success {
                    self.bar.finish_with_message("done");
                } else {
                    self.bar.abandon_with_message("failed");
                }
                Some((success, message))
            }
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Consumes events until `Done` or until the sender goes away.
    pub async fn follow(
        self,
        mut rx: mpsc::UnboundedReceiver<UpdateEvent>,
    ) -> Option<(bool, String)> {
        while let Some(event) = rx.recv().await {
            if let Some(outcome) = self.apply(event) {
                return Some(outcome);
            }
        }
        self.bar.abandon();
        None
    }
}
