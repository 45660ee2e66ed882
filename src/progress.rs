//! Progress rendering driven purely by scheduler events.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::cluster::events::{ClusterEvent, EventObserver};

/// Renders completion count and ETA on stderr. Knows nothing about the
/// scheduler beyond the events it receives.
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        // Hidden until a run actually starts with a nonzero job count
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template("[{bar:40}] {pos}/{len} ({percent}%) ETA: {eta}")
                .expect("progress template is valid")
                .progress_chars("█░"),
        );
        Self { bar }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventObserver for ProgressReporter {
    fn on_event(&self, event: &ClusterEvent) {
        match event {
            ClusterEvent::RunStarted { total_jobs, .. } => {
                if *total_jobs > 0 {
                    self.bar.set_length(*total_jobs as u64);
                    self.bar.set_position(0);
                    self.bar.set_draw_target(ProgressDrawTarget::stderr());
                }
            }
            ClusterEvent::JobFinished { .. } => self.bar.inc(1),
            ClusterEvent::RunFinished { .. } => {
                if self.bar.length().unwrap_or(0) > 0 {
                    self.bar.finish();
                }
            }
            ClusterEvent::JobStarted { .. } => {}
        }
    }
}
