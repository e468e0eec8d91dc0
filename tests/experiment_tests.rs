//! End-to-end experiment runs, observers and configuration files

mod common;

use std::sync::{Arc, Mutex};

use common::short_experiment;
use smve::{
    SmveConfig,
    pipeline::{
        CsvObserver, EpisodeReport, Experiment, ExperimentConfig, ExperimentSummary, Observer,
    },
};

#[derive(Debug, Default)]
struct Recorded {
    started_with: Option<usize>,
    reports: Vec<EpisodeReport>,
    summaries: Vec<ExperimentSummary>,
}

/// Observer that shares everything it sees with the test.
struct Recorder(Arc<Mutex<Recorded>>);

impl Observer for Recorder {
    fn on_experiment_start(&mut self, total_frames: usize) -> smve::Result<()> {
        self.0.lock().unwrap().started_with = Some(total_frames);
        Ok(())
    }

    fn on_episode(&mut self, report: &EpisodeReport) -> smve::Result<()> {
        self.0.lock().unwrap().reports.push(report.clone());
        Ok(())
    }

    fn on_experiment_end(&mut self, summary: &ExperimentSummary) -> smve::Result<()> {
        self.0.lock().unwrap().summaries.push(summary.clone());
        Ok(())
    }
}

fn recorded_run(planner: &str) -> (ExperimentSummary, Recorded) {
    let shared = Arc::new(Mutex::new(Recorded::default()));
    let summary = Experiment::new(short_experiment(planner))
        .unwrap()
        .with_observer(Box::new(Recorder(Arc::clone(&shared))))
        .run()
        .unwrap();
    let recorded = std::mem::take(&mut *shared.lock().unwrap());
    (summary, recorded)
}

#[test]
fn test_observers_see_every_episode() {
    let (summary, recorded) = recorded_run("SR");

    assert_eq!(recorded.started_with, Some(60));
    assert_eq!(recorded.reports.len(), summary.episodes);
    assert_eq!(recorded.summaries, vec![summary.clone()]);

    let frames: Vec<usize> = recorded.reports.iter().map(|r| r.total_frames).collect();
    assert!(frames.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(frames.last(), Some(&summary.total_frames));
    for (i, report) in recorded.reports.iter().enumerate() {
        assert_eq!(report.episode, i);
        assert!(report.episode_frames <= 20);
        assert!(report.plan_seconds <= report.episode_seconds);
    }
}

#[test]
fn test_reports_carry_one_column_per_model_depth() {
    let (_, recorded) = recorded_run("E");
    for report in &recorded.reports {
        assert_eq!(report.errors.state_error.by_depth.len(), 2);
        assert_eq!(report.errors.target_error.by_depth.len(), 2);
        assert!(report.errors.effective_horizon >= 1.0);
        assert!(report.errors.effective_horizon <= 3.0);
    }
}

#[test]
fn test_plain_q_learning_looks_one_step_ahead() {
    let (summary, _) = recorded_run("Q");
    assert_eq!(summary.mean_effective_horizon, 1.0);
    assert!(summary.model_leaves.iter().all(|&n| n == 1));
}

#[test]
fn test_learned_model_grows() {
    let summary = Experiment::new(ExperimentConfig {
        num_frames: 400,
        ..short_experiment("E")
    })
    .unwrap()
    .run()
    .unwrap();
    assert!(summary.model_leaves.iter().any(|&n| n > 1), "{:?}", summary.model_leaves);
}

#[test]
fn test_csv_observer_writes_a_row_per_episode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.csv");
    let summary = Experiment::new(short_experiment("TDOR"))
        .unwrap()
        .with_observer(Box::new(CsvObserver::new(&path).unwrap()))
        .run()
        .unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let header = reader.headers().unwrap().clone();
    assert_eq!(&header[0], "total_frames");
    assert!(header.iter().any(|c| c == "target_err_h3"));
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), summary.episodes);
    assert!(rows.iter().all(|row| row.len() == header.len()));
    assert_eq!(rows[rows.len() - 1][0].parse::<usize>().unwrap(), summary.total_frames);
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("experiment.json");

    // "E" forces an infinite temperature, which JSON has no number for
    let config = short_experiment("E").resolved();
    assert!(config.smve.temperature.is_infinite());
    config.save(&path).unwrap();
    assert_eq!(ExperimentConfig::load(&path).unwrap(), config);
}

#[test]
fn test_partial_config_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("experiment.json");
    std::fs::write(&path, r#"{ "planner": "itdor", "num_frames": 1000 }"#).unwrap();

    let config = ExperimentConfig::load(&path).unwrap();
    assert_eq!(config.planner.code(), "ITDOR");
    assert!(config.planner.uses_oracle());
    assert_eq!(config.num_frames, 1000);
    assert_eq!(config.go_right.length, 10);
    assert_eq!(config.smve, SmveConfig::default());
}

#[test]
fn test_bad_config_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let unknown = dir.path().join("unknown.json");
    std::fs::write(&unknown, r#"{ "planner": "XYZ" }"#).unwrap();
    assert!(ExperimentConfig::load(&unknown).is_err());

    let invalid = dir.path().join("invalid.json");
    std::fs::write(&invalid, r#"{ "smve": { "discount": 2.0 } }"#).unwrap();
    assert!(ExperimentConfig::load(&invalid).is_err());

    assert!(ExperimentConfig::load(dir.path().join("missing.json")).is_err());
}
