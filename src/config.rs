//! Learner configuration and planner selection
//!
//! [`SmveConfig`] is the single explicit configuration value handed to every
//! constructor in the core. [`Planner`] parses the short planner codes used on
//! the command line and forces the options each planner implies.

use std::{fmt, fs, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Options recognised by the learner and the model tree.
///
/// # Examples
///
/// ```
/// use smve::config::SmveConfig;
///
/// let config = SmveConfig::default()
///     .with_horizon(3)
///     .with_temperature(f64::INFINITY)
///     .with_step_size(0.5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmveConfig {
    /// Learning rate before division by the Q-function's normalizer
    pub step_size: f64,
    pub discount: f64,
    /// Number of rollout depths, including the plain one-step target
    pub horizon: usize,
    /// Softness of the uncertainty weighting; infinity means plain averaging
    #[serde(with = "infinite_f64")]
    pub temperature: f64,
    /// Extra multiplicative weight decay per depth
    pub decay: f64,
    /// Particle count for Monte Carlo rollouts
    pub num_samples: usize,
    pub directional_range: bool,
    pub reject_overlap: bool,
    pub use_variance: bool,
    pub inc_rwd: bool,
    pub inc_state: bool,
    pub split_confidence: f64,
    pub tie_threshold: f64,
    pub max_leaves: usize,
    pub predict_change: bool,
}

impl Default for SmveConfig {
    fn default() -> Self {
        Self {
            step_size: 0.1,
            discount: 0.9,
            horizon: 5,
            temperature: 0.1,
            decay: 1.0,
            num_samples: 10,
            directional_range: false,
            reject_overlap: false,
            use_variance: false,
            inc_rwd: false,
            inc_state: true,
            split_confidence: 0.05,
            tie_threshold: 0.05,
            max_leaves: usize::MAX,
            predict_change: false,
        }
    }
}

impl SmveConfig {
    pub fn with_step_size(mut self, step_size: f64) -> Self {
        self.step_size = step_size;
        self
    }

    pub fn with_discount(mut self, discount: f64) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    pub fn with_num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }

    pub fn with_directional_range(mut self, enabled: bool) -> Self {
        self.directional_range = enabled;
        self
    }

    pub fn with_reject_overlap(mut self, enabled: bool) -> Self {
        self.reject_overlap = enabled;
        self
    }

    pub fn with_use_variance(mut self, enabled: bool) -> Self {
        self.use_variance = enabled;
        self
    }

    /// Choose which one-step uncertainty components accumulate across depths.
    pub fn with_uncertainty_sources(mut self, inc_rwd: bool, inc_state: bool) -> Self {
        self.inc_rwd = inc_rwd;
        self.inc_state = inc_state;
        self
    }

    pub fn with_split_confidence(mut self, confidence: f64) -> Self {
        self.split_confidence = confidence;
        self
    }

    pub fn with_tie_threshold(mut self, threshold: f64) -> Self {
        self.tie_threshold = threshold;
        self
    }

    pub fn with_max_leaves(mut self, max_leaves: usize) -> Self {
        self.max_leaves = max_leaves;
        self
    }

    pub fn with_predict_change(mut self, enabled: bool) -> Self {
        self.predict_change = enabled;
        self
    }

    /// Check the invariants the learner and model tree rely on.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::InvalidConfiguration { message });

        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return invalid(format!("step_size must be positive, got {}", self.step_size));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return invalid(format!("discount must lie in [0, 1], got {}", self.discount));
        }
        if self.horizon == 0 {
            return invalid("horizon must be at least 1".to_string());
        }
        if self.temperature.is_nan() || self.temperature <= 0.0 {
            return invalid(format!(
                "temperature must be positive (or inf), got {}",
                self.temperature
            ));
        }
        if !(self.decay.is_finite() && self.decay > 0.0) {
            return invalid(format!("decay must be positive, got {}", self.decay));
        }
        if self.num_samples == 0 {
            return invalid("num_samples must be at least 1".to_string());
        }
        if !(self.split_confidence > 0.0 && self.split_confidence < 1.0) {
            return invalid(format!(
                "split_confidence must lie in (0, 1), got {}",
                self.split_confidence
            ));
        }
        if self.tie_threshold.is_nan() || self.tie_threshold < 0.0 {
            return invalid(format!(
                "tie_threshold must be non-negative, got {}",
                self.tie_threshold
            ));
        }
        if self.max_leaves == 0 {
            return invalid("max_leaves must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            operation: format!("read config {}", path.display()),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| Error::Io {
            operation: format!("write config {}", path.display()),
            source,
        })
    }
}

/// JSON has no infinity literal; infinite values travel as the string `"inf"`.
pub(crate) mod infinite_f64 {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Number(value) => Ok(value),
            NumberOrText::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "inf" | "+inf" | "infinity" => Ok(f64::INFINITY),
                "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
                other => other
                    .parse::<f64>()
                    .map_err(|_| de::Error::custom(format!("expected a number or \"inf\", got {text:?}"))),
            },
        }
    }
}

/// Which update the learner performs each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateRule {
    /// Plain one-step Q-learning
    QLearning,
    /// Unweighted multi-step expansion
    Expectation,
    /// Weights from accumulated one-step predictive uncertainty
    OneStepUncertainty,
    /// Weights from interval bounds on each depth's return
    TargetRange,
    /// Weights from a particle population per depth
    MonteCarlo,
}

impl fmt::Display for UpdateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateRule::QLearning => "q-learning",
            UpdateRule::Expectation => "expectation",
            UpdateRule::OneStepUncertainty => "one-step-uncertainty",
            UpdateRule::TargetRange => "target-range",
            UpdateRule::MonteCarlo => "monte-carlo",
        };
        f.write_str(name)
    }
}

const PLANNER_CODES: &[&str] = &[
    "Q", "P", "E", "SR", "SV", "RR", "RV", "SRR", "SRV", "TR", "TDR", "TOR", "TDOR", "S", "MCTV",
    "MCTR", "MCTDR", "MCTOR", "MCTDOR",
];

/// A parsed planner code such as `TDOR` or `ISRV`
///
/// A leading `I` plans with the uncertain oracle model in place of the learned
/// model. `P` plans with the true environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Planner {
    code: String,
    rule: UpdateRule,
    oracle: bool,
}

impl Planner {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn rule(&self) -> UpdateRule {
        self.rule
    }

    /// Plan with the uncertain oracle instead of the learned model.
    pub fn uses_oracle(&self) -> bool {
        self.oracle
    }

    /// Plan with the exact environment dynamics.
    pub fn uses_perfect_model(&self) -> bool {
        self.code == "P"
    }

    /// Whether planning needs a learned model that must be trained and refit.
    pub fn uses_learned_model(&self) -> bool {
        !self.oracle && !self.uses_perfect_model() && self.rule != UpdateRule::QLearning
    }

    fn base(&self) -> &str {
        if self.oracle { &self.code[1..] } else { &self.code }
    }

    /// Force the options this planner implies, overriding explicit values.
    pub fn apply(&self, config: &mut SmveConfig) {
        let base = self.base();

        if matches!(base, "S" | "E" | "P" | "Q") {
            config.num_samples = 1;
            config.temperature = f64::INFINITY;
        }

        let (inc_rwd, inc_state) = match base {
            "RR" | "RV" => (true, false),
            "SRR" | "SRV" => (true, true),
            _ => (false, true),
        };
        config.inc_rwd = inc_rwd;
        config.inc_state = inc_state;

        config.use_variance = matches!(base, "MCTV" | "RV" | "SRV" | "SV");
        config.directional_range = matches!(base, "TDR" | "TDOR" | "MCTDR" | "MCTDOR");
        config.reject_overlap = matches!(base, "TOR" | "TDOR" | "MCTOR" | "MCTDOR");
    }
}

impl FromStr for Planner {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let code = input.trim().to_ascii_uppercase();
        let unknown = || Error::ParsePlanner {
            input: input.to_string(),
            expected: PLANNER_CODES.join(", "),
        };

        let (oracle, base) = match code.strip_prefix('I') {
            Some(rest) if PLANNER_CODES.contains(&rest) && !matches!(rest, "Q" | "P") => (true, rest),
            _ => (false, code.as_str()),
        };

        let rule = match base {
            "Q" => UpdateRule::QLearning,
            "P" | "E" => UpdateRule::Expectation,
            "SR" | "SV" | "RR" | "RV" | "SRR" | "SRV" => UpdateRule::OneStepUncertainty,
            "TR" | "TDR" | "TOR" | "TDOR" => UpdateRule::TargetRange,
            "S" | "MCTV" | "MCTR" | "MCTDR" | "MCTOR" | "MCTDOR" => UpdateRule::MonteCarlo,
            _ => return Err(unknown()),
        };

        Ok(Self { code, rule, oracle })
    }
}

impl TryFrom<String> for Planner {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Planner> for String {
    fn from(planner: Planner) -> Self {
        planner.code
    }
}

impl fmt::Display for Planner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self {
            code: "P".to_string(),
            rule: UpdateRule::Expectation,
            oracle: false,
        }
    }
}
