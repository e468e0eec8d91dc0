//! Output formatting for CLI

use crate::pipeline::{ExperimentConfig, ExperimentSummary};

/// Print a section header
pub fn print_section(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("{title}");
    println!("{}", "=".repeat(60));
}

/// Format a number with thousands separators
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i.is_multiple_of(3) {
            result.insert(0, ',');
        }
        result.insert(0, c);
    }
    result
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {:20} {}", format!("{}:", key), value);
}

/// Print the settings a run will use
pub fn print_config(config: &ExperimentConfig) {
    print_section(&format!("Planner {}", config.planner));
    print_kv("Frames", &format_number(config.num_frames));
    print_kv("Seed", &config.seed.to_string());
    print_kv("Horizon", &config.smve.horizon.to_string());
    print_kv("Temperature", &config.smve.temperature.to_string());
    print_kv(
        "Corridor",
        &format!(
            "length {}, {} indicators",
            config.go_right.length, config.go_right.num_indicators
        ),
    );
}

/// Print the totals of a finished run
pub fn print_summary(summary: &ExperimentSummary) {
    print_section("Summary");
    print_kv("Episodes", &format_number(summary.episodes));
    print_kv("Frames", &format_number(summary.total_frames));
    print_kv("Mean eval score", &format!("{:.3}", summary.mean_eval_score));
    print_kv("Best eval score", &summary.best_eval_score.to_string());
    print_kv("Final eval score", &summary.final_eval_score.to_string());
    print_kv(
        "Effective horizon",
        &format!("{:.3}", summary.mean_effective_horizon),
    );
    print_kv("Model leaves", &format!("{:?}", summary.model_leaves));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_separators() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(300_000), "300,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
