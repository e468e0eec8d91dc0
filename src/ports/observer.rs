//! Observer port - abstraction for experiment observation and data collection
//!
//! This port defines the interface for observing experiment events,
//! allowing composable reporting without coupling the experiment loop
//! to specific output formats.

use crate::{
    Result,
    pipeline::{EpisodeReport, ExperimentSummary},
};

/// Observer trait for monitoring an experiment
///
/// Observers are composed to collect different kinds of output during a run:
/// progress bars, CSV result rows, structured log lines.
///
/// # Event Sequence
///
/// 1. `on_experiment_start(total_frames)` - once at the beginning
/// 2. `on_episode(report)` - after every learning/evaluation episode pair
/// 3. `on_experiment_end(summary)` - once at the end
///
/// # Examples
///
/// ```no_run
/// use smve::{pipeline::EpisodeReport, ports::Observer};
///
/// struct BestScore {
///     best: f64,
/// }
///
/// impl Observer for BestScore {
///     fn on_episode(&mut self, report: &EpisodeReport) -> smve::Result<()> {
///         self.best = self.best.max(report.eval_score);
///         Ok(())
///     }
/// }
/// ```
pub trait Observer {
    /// Called before the first frame.
    ///
    /// # Default Implementation
    ///
    /// Does nothing.
    fn on_experiment_start(&mut self, _total_frames: usize) -> Result<()> {
        Ok(())
    }

    /// Called after each learning episode and its evaluation episode.
    fn on_episode(&mut self, _report: &EpisodeReport) -> Result<()> {
        Ok(())
    }

    /// Called once the frame budget is exhausted.
    ///
    /// Use this to flush files or display summaries.
    fn on_experiment_end(&mut self, _summary: &ExperimentSummary) -> Result<()> {
        Ok(())
    }
}
