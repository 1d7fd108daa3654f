//! Configuration of the objective function and of the search.
//!
//! Options are plain structs with getters and setters and sensible defaults.
//! They are validated once, when handed over to the
//! [`Optimizer`](crate::Optimizer). Loosely typed input (for example settings
//! read from a JSON file) goes through `from_json` constructors which report
//! wrongly typed entries as [`ConfigError::Type`] and out-of-range entries as
//! [`ConfigError::Value`].

use std::{fmt, str::FromStr};

use getset::{CopyGetters, Setters};
use serde_json::Value;

use crate::error::ConfigError;

/// How the individual statistic errors are aggregated by the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Sum of squared errors. The only mode with an analytic gradient.
    #[default]
    Sse,
    /// Maximal absolute error.
    Max,
}

impl ErrorMode {
    /// Returns `true` if the objective has an analytic gradient in this mode.
    pub fn has_gradient(&self) -> bool {
        matches!(self, Self::Sse)
    }
}

impl FromStr for ErrorMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SSE" => Ok(Self::Sse),
            "MAX" => Ok(Self::Max),
            _ => Err(ConfigError::value_error(
                "error",
                format!("unrecognized error mode `{}`, expected SSE or MAX", s),
            )),
        }
    }
}

impl fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sse => write!(f, "SSE"),
            Self::Max => write!(f, "MAX"),
        }
    }
}

/// Minimization algorithm used for optimizing probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// [Projected gradient](crate::algo::projected_gradient). Used when no
    /// method is given.
    ProjectedGradient,
    /// [Nelder-Mead](crate::algo::nelder_mead), derivative-free.
    NelderMead,
}

impl FromStr for Method {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "projected-gradient" | "pg" => Ok(Self::ProjectedGradient),
            "nelder-mead" | "nm" => Ok(Self::NelderMead),
            _ => Err(ConfigError::value_error(
                "method",
                format!("unrecognized method `{}`", s),
            )),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProjectedGradient => write!(f, "projected-gradient"),
            Self::NelderMead => write!(f, "nelder-mead"),
        }
    }
}

/// Settings of the objective function measuring the discrepancy between an
/// SROM and its target.
#[derive(Debug, Clone, Copy, PartialEq, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct ObjectiveSettings {
    /// Relative weights of the moment, CDF and correlation errors, in this
    /// order. Default: equal weights.
    weights: [f64; 3],
    /// Aggregation of the errors. Default: [`ErrorMode::Sse`].
    error_mode: ErrorMode,
    /// Highest order of moments compared. Default: `5`.
    max_moment: usize,
    /// Number of points of the grid on which CDFs are compared. Default:
    /// `100`.
    cdf_grid_pts: usize,
}

impl Default for ObjectiveSettings {
    fn default() -> Self {
        Self {
            weights: [1.0; 3],
            error_mode: ErrorMode::Sse,
            max_moment: 5,
            cdf_grid_pts: 100,
        }
    }
}

impl ObjectiveSettings {
    /// Sets the weights from a slice which must have exactly three entries.
    pub fn with_weights(mut self, weights: &[f64]) -> Result<Self, ConfigError> {
        self.weights = weights.try_into().map_err(|_| {
            ConfigError::value_error(
                "obj_weights",
                format!("expected 3 weights, got {}", weights.len()),
            )
        })?;
        Ok(self)
    }

    /// Checks that all settings are within their accepted ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.weights.iter().any(|w| !w.is_finite()) {
            return Err(ConfigError::value_error("obj_weights", "weights must be finite"));
        }

        if self.weights.iter().any(|w| *w < 0.0) {
            return Err(ConfigError::value_error(
                "obj_weights",
                "weights must be nonnegative",
            ));
        }

        if self.max_moment == 0 {
            return Err(ConfigError::value_error("max_moment", "must be positive"));
        }

        if self.cdf_grid_pts == 0 {
            return Err(ConfigError::value_error("cdf_grid_pts", "must be positive"));
        }

        Ok(())
    }

    /// Reads the settings from a JSON object.
    ///
    /// Recognized keys are `obj_weights`, `error`, `max_moment` and
    /// `cdf_grid_pts`. Missing keys (or `null` weights) keep their defaults.
    /// The result is validated.
    pub fn from_json(value: &Value) -> Result<Self, ConfigError> {
        let map = value
            .as_object()
            .ok_or_else(|| ConfigError::type_error("settings", "object"))?;

        let mut settings = Self::default();

        for (key, value) in map {
            match key.as_str() {
                "obj_weights" => {
                    if !value.is_null() {
                        settings.weights = weights_from_json(value)?;
                    }
                }
                "error" => {
                    settings.error_mode = value
                        .as_str()
                        .ok_or_else(|| ConfigError::type_error("error", "string"))?
                        .parse()?;
                }
                "max_moment" => settings.max_moment = positive_int("max_moment", value)?,
                "cdf_grid_pts" => settings.cdf_grid_pts = positive_int("cdf_grid_pts", value)?,
                other => return Err(ConfigError::value_error(other, "unknown setting")),
            }
        }

        settings.validate()?;
        Ok(settings)
    }
}

/// Stopping criteria of a single minimization of probabilities.
#[derive(Debug, Clone, Copy, PartialEq, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct MinimizeOptions {
    /// Maximal number of iterations. Default: `100`.
    max_iters: usize,
    /// Absolute decrease of the objective below which the minimization is
    /// considered converged. Default: `1e-6`.
    ftol: f64,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            ftol: 1e-6,
        }
    }
}

impl MinimizeOptions {
    /// Checks that all options are within their accepted ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iters == 0 {
            return Err(ConfigError::value_error("max_iters", "must be positive"));
        }

        if !self.ftol.is_finite() || self.ftol < 0.0 {
            return Err(ConfigError::value_error(
                "ftol",
                "must be finite and nonnegative",
            ));
        }

        Ok(())
    }
}

/// Options of one run of [`Optimizer::get_optimal_params`](crate::Optimizer::get_optimal_params).
#[derive(Debug, Clone, Copy, PartialEq, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct SearchOptions {
    /// Total number of random sample sets tried, split among workers.
    /// Default: `500`.
    num_test_samples: usize,
    /// Minimization algorithm. Default: none, which picks
    /// [`Method::ProjectedGradient`].
    method: Option<Method>,
    /// Optimize samples and probabilities jointly. Not implemented, requesting
    /// it fails. Default: `false`.
    joint_opt: bool,
    /// Progress is reported every `output_interval` iterations. Default: `10`.
    output_interval: usize,
    /// Report progress and final errors. Default: `true`.
    verbose: bool,
    /// Stopping criteria of every minimization.
    minimize: MinimizeOptions,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            num_test_samples: 500,
            method: None,
            joint_opt: false,
            output_interval: 10,
            verbose: true,
            minimize: MinimizeOptions::default(),
        }
    }
}

impl SearchOptions {
    /// Checks that all options are within their accepted ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_test_samples == 0 {
            return Err(ConfigError::value_error(
                "num_test_samples",
                "insufficient number of test samples specified",
            ));
        }

        if self.output_interval == 0 {
            return Err(ConfigError::value_error("output_interval", "must be positive"));
        }

        self.minimize.validate()
    }

    /// Reads the options from a JSON object.
    ///
    /// Recognized keys are `num_test_samples`, `method`, `joint_opt`,
    /// `output_interval`, `verbose`, `max_iters` and `ftol`. Missing keys keep
    /// their defaults. The result is validated.
    pub fn from_json(value: &Value) -> Result<Self, ConfigError> {
        let map = value
            .as_object()
            .ok_or_else(|| ConfigError::type_error("options", "object"))?;

        let mut options = Self::default();

        for (key, value) in map {
            match key.as_str() {
                "num_test_samples" => {
                    options.num_test_samples = positive_int("num_test_samples", value)?
                }
                "method" => {
                    options.method = match value {
                        Value::Null => None,
                        Value::String(s) => Some(s.parse()?),
                        _ => return Err(ConfigError::type_error("method", "string")),
                    }
                }
                "joint_opt" => options.joint_opt = boolean("joint_opt", value)?,
                "output_interval" => {
                    options.output_interval = positive_int("output_interval", value)?
                }
                "verbose" => options.verbose = boolean("verbose", value)?,
                "max_iters" => options.minimize.max_iters = positive_int("max_iters", value)?,
                "ftol" => {
                    options.minimize.ftol = value
                        .as_f64()
                        .ok_or_else(|| ConfigError::type_error("ftol", "number"))?
                }
                other => return Err(ConfigError::value_error(other, "unknown option")),
            }
        }

        options.validate()?;
        Ok(options)
    }
}

fn weights_from_json(value: &Value) -> Result<[f64; 3], ConfigError> {
    let items = value
        .as_array()
        .ok_or_else(|| ConfigError::type_error("obj_weights", "numeric sequence"))?;

    if items.iter().any(Value::is_array) {
        return Err(ConfigError::value_error(
            "obj_weights",
            "weights must be one-dimensional",
        ));
    }

    let weights = items
        .iter()
        .map(|item| {
            item.as_f64()
                .ok_or_else(|| ConfigError::type_error("obj_weights", "numeric sequence"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    ObjectiveSettings::default()
        .with_weights(&weights)
        .map(|settings| settings.weights)
}

fn positive_int(param: &str, value: &Value) -> Result<usize, ConfigError> {
    if let Some(n) = value.as_u64() {
        if n == 0 {
            return Err(ConfigError::value_error(param, "must be positive"));
        }

        usize::try_from(n).map_err(|_| ConfigError::value_error(param, "too large"))
    } else if value.as_i64().is_some() {
        Err(ConfigError::value_error(param, "must be positive"))
    } else {
        Err(ConfigError::type_error(param, "positive integer"))
    }
}

fn boolean(param: &str, value: &Value) -> Result<bool, ConfigError> {
    value
        .as_bool()
        .ok_or_else(|| ConfigError::type_error(param, "boolean"))
}
