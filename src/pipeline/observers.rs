//! Observer pattern for experiment runs
//!
//! Observers allow composable data collection during a run without coupling
//! the experiment loop to specific output formats.

use std::{fs::File, path::Path};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::{
    experiment::{EpisodeReport, ExperimentSummary},
    metrics::{DepthSeries, QUANTILES},
};
use crate::{Error, Result, ports::Observer};

/// Progress bar observer - Shows frames spent and the latest evaluation score
pub struct ProgressObserver {
    progress_bar: Option<ProgressBar>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self { progress_bar: None }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for ProgressObserver {
    fn on_experiment_start(&mut self, total_frames: usize) -> Result<()> {
        let pb = ProgressBar::new(total_frames as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames (eval: {msg})")
                .map_err(|e| Error::ProgressBarTemplate {
                    message: e.to_string(),
                })?
                .progress_chars("=>-"),
        );
        self.progress_bar = Some(pb);
        Ok(())
    }

    fn on_episode(&mut self, report: &EpisodeReport) -> Result<()> {
        if let Some(pb) = &self.progress_bar {
            pb.set_position(report.total_frames as u64);
            pb.set_message(format!("{}", report.eval_score));
        }
        Ok(())
    }

    fn on_experiment_end(&mut self, summary: &ExperimentSummary) -> Result<()> {
        if let Some(pb) = &self.progress_bar {
            pb.finish_with_message(format!("mean {:.2}", summary.mean_eval_score));
        }
        Ok(())
    }
}

/// Log observer - One `info` line per episode and a closing summary
#[derive(Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_episode(&mut self, report: &EpisodeReport) -> Result<()> {
        info!(
            "frames {} | score {} return {:.3} | eval {} return {:.3} | horizon {:.3} state err {:.4} target err {:.4}",
            report.total_frames,
            report.episode_score,
            report.episode_return,
            report.eval_score,
            report.eval_return,
            report.errors.effective_horizon,
            report.errors.state_error.total,
            report.errors.target_error.total
        );
        Ok(())
    }

    fn on_experiment_end(&mut self, summary: &ExperimentSummary) -> Result<()> {
        info!(
            "{} finished after {} frames ({} episodes): mean eval {:.3}, best {}, final {}",
            summary.planner,
            summary.total_frames,
            summary.episodes,
            summary.mean_eval_score,
            summary.best_eval_score,
            summary.final_eval_score
        );
        Ok(())
    }
}

/// CSV observer - One row per episode
///
/// Per-depth statistics are flattened into one column per depth
/// (`state_err_h2`, `state_err_h3`, ...) followed by the overall column. The
/// header is written with the first row, once the number of depths is known.
pub struct CsvObserver {
    writer: csv::Writer<File>,
    header_written: bool,
}

impl CsvObserver {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| Error::Io {
            operation: format!("create results file {}", path.display()),
            source,
        })?;
        Ok(Self {
            writer: csv::Writer::from_writer(file),
            header_written: false,
        })
    }
}

fn series_columns(columns: &mut Vec<String>, name: &str, depths: usize) {
    for h in 0..depths {
        columns.push(format!("{name}_h{}", h + 2));
    }
    columns.push(name.to_string());
}

fn series_values(values: &mut Vec<String>, series: &DepthSeries) {
    values.extend(series.by_depth.iter().map(f64::to_string));
    values.push(series.total.to_string());
}

fn count_values(values: &mut Vec<String>, counts: &[usize]) {
    values.extend(counts.iter().map(usize::to_string));
    values.push(counts.iter().sum::<usize>().to_string());
}

const QUANTILE_NAMES: [&str; QUANTILES.len()] = ["u_err_min", "u_err_lq", "u_err_med", "u_err_uq", "u_err_max"];

/// Column names for reports over `depths` model depths.
pub fn csv_header(depths: usize) -> Vec<String> {
    let mut columns: Vec<String> = [
        "total_frames",
        "episode_score",
        "episode_return",
        "episode_frames",
        "eval_score",
        "eval_return",
        "eval_frames",
        "episode_seconds",
        "plan_seconds",
        "effective_horizon",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();

    for name in [
        "state_err",
        "reward_err",
        "term_err",
        "pred_err",
        "target_err",
        "uncertainty_err",
        "num_inf",
        "num_neg_inf",
    ] {
        series_columns(&mut columns, name, depths);
    }
    for name in QUANTILE_NAMES {
        series_columns(&mut columns, name, depths);
    }
    series_columns(&mut columns, "correlation", depths);
    columns
}

/// Values in the order of [`csv_header`].
pub fn csv_record(report: &EpisodeReport) -> Vec<String> {
    let e = &report.errors;
    let mut values = vec![
        report.total_frames.to_string(),
        report.episode_score.to_string(),
        report.episode_return.to_string(),
        report.episode_frames.to_string(),
        report.eval_score.to_string(),
        report.eval_return.to_string(),
        report.eval_frames.to_string(),
        report.episode_seconds.to_string(),
        report.plan_seconds.to_string(),
        e.effective_horizon.to_string(),
    ];

    for series in [
        &e.state_error,
        &e.reward_error,
        &e.term_error,
        &e.prediction_error,
        &e.target_error,
        &e.uncertainty_error,
    ] {
        series_values(&mut values, series);
    }
    count_values(&mut values, &e.num_inf);
    count_values(&mut values, &e.num_neg_inf);
    for series in &e.uncertainty_quantiles {
        series_values(&mut values, series);
    }
    series_values(&mut values, &e.correlation);
    values
}

impl Observer for CsvObserver {
    fn on_episode(&mut self, report: &EpisodeReport) -> Result<()> {
        if !self.header_written {
            let depths = report.errors.state_error.by_depth.len();
            self.writer.write_record(csv_header(depths))?;
            self.header_written = true;
        }
        self.writer.write_record(csv_record(report))?;
        Ok(())
    }

    fn on_experiment_end(&mut self, _summary: &ExperimentSummary) -> Result<()> {
        self.writer.flush().map_err(|source| Error::Io {
            operation: "flush results file".to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::metrics::ErrorAccumulator;

    fn report(depths: usize) -> EpisodeReport {
        EpisodeReport {
            episode: 0,
            total_frames: 20,
            episode_score: -4.0,
            episode_return: -2.5,
            episode_frames: 20,
            eval_score: 0.0,
            eval_return: 0.0,
            eval_frames: 20,
            episode_seconds: 0.1,
            plan_seconds: 0.05,
            errors: ErrorAccumulator::new(depths + 1, 3).report(),
        }
    }

    #[test]
    fn header_and_record_line_up() {
        for depths in [0, 1, 4] {
            assert_eq!(csv_header(depths).len(), csv_record(&report(depths)).len());
        }
    }

    #[test]
    fn per_depth_columns_start_at_depth_two() {
        let header = csv_header(2);
        assert!(header.contains(&"state_err_h2".to_string()));
        assert!(header.contains(&"state_err_h3".to_string()));
        assert!(!header.contains(&"state_err_h4".to_string()));
    }

    #[test]
    fn csv_observer_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let mut observer = CsvObserver::new(&path).unwrap();
        observer.on_episode(&report(2)).unwrap();
        observer.on_episode(&report(2)).unwrap();
        let summary = ExperimentSummary {
            planner: "E".to_string(),
            episodes: 2,
            total_frames: 40,
            mean_eval_score: 0.0,
            best_eval_score: 0.0,
            final_eval_score: 0.0,
            mean_effective_horizon: 1.0,
            model_leaves: vec![1; 5],
        };
        observer.on_experiment_end(&summary).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("total_frames,episode_score"));
        assert!(lines[1].starts_with("20,-4,-2.5,20"));
    }
}
