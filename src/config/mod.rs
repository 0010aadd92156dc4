//! Runtime configuration loaded from `config.yaml`.
//!
//! The file is a single mapping at the root: the flat scheduling keys plus
//! an optional nested `solver` section. Unknown keys reject at parse time,
//! and every numeric field is range-checked before the pipeline starts.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Search strategy handed to the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchBranching {
    #[default]
    Automatic,
    Portfolio,
    FixedSearch,
}

impl SearchBranching {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automatic => "AUTOMATIC",
            Self::Portfolio => "PORTFOLIO",
            Self::FixedSearch => "FIXED_SEARCH",
        }
    }
}

/// Solver runtime parameters (the `solver:` mapping).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SolverParams {
    pub search_branching: SearchBranching,
    /// Parallel search workers; 0 means one worker per CPU.
    pub num_workers: u32,
    pub max_time_in_seconds: f64,
    pub random_seed: u64,
    pub cp_model_presolve: bool,
    /// 0 = off, 1 = basic, 2 = aggressive.
    pub linearization_level: u8,
    pub relative_gap_limit: f64,
    pub absolute_gap_limit: f64,
    pub max_num_conflicts: Option<u64>,
    pub max_num_branches: Option<u64>,
    pub max_memory_in_mb: Option<u64>,
    pub log_to_stdout: bool,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            search_branching: SearchBranching::Automatic,
            num_workers: 4,
            max_time_in_seconds: 60.0,
            random_seed: 0,
            cp_model_presolve: true,
            linearization_level: 0,
            relative_gap_limit: 0.0,
            absolute_gap_limit: 0.0,
            max_num_conflicts: None,
            max_num_branches: None,
            max_memory_in_mb: None,
            log_to_stdout: true,
        }
    }
}

/// Immutable parameter bundle for one scheduling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Tick size in fractional hours; 1/12 is a 5-minute lattice.
    pub time_unit: f64,
    /// Upper bound on operating rooms.
    pub rooms_max: usize,
    /// Minimum paid shift length (hours).
    pub shift_min: f64,
    /// Maximum allowed shift span (hours).
    pub shift_max: f64,
    /// Threshold above which the overtime multiplier applies (hours).
    pub shift_overtime: f64,
    pub overtime_multiplier: f64,
    /// Minimum gap when the same anesthesiologist crosses rooms (hours).
    pub buffer: f64,
    /// Advisory utilization floor; below it a warning is emitted.
    pub utilization_target: f64,
    pub enforce_surgery_duration_limit: bool,
    /// Additive cost per active anesthesiologist and per used room.
    pub activation_penalty: f64,
    pub solver: SolverParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_unit: 1.0 / 12.0,
            rooms_max: 20,
            shift_min: 5.0,
            shift_max: 12.0,
            shift_overtime: 9.0,
            overtime_multiplier: 1.5,
            buffer: 0.25,
            utilization_target: 0.8,
            enforce_surgery_duration_limit: true,
            activation_penalty: 0.0,
            solver: SolverParams::default(),
        }
    }
}

impl Config {
    /// Loads and validates configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, SchedulerError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if extension != "yaml" && extension != "yml" {
            return Err(SchedulerError::config(
                format!("invalid configuration file extension: {}", path.display()),
                "Config::load",
                "Use a .yaml or .yml extension for configuration files.",
            ));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            SchedulerError::config(
                format!("unable to read configuration file {}: {e}", path.display()),
                "Config::load",
                "Ensure config.yaml exists and the path is correct.",
            )
        })?;

        let config: Config = serde_yaml::from_str(&text).map_err(|e| {
            SchedulerError::config(
                format!("invalid configuration structure: {e}"),
                "Config::load",
                "Check field names, types, and bounds; remove unknown keys.",
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Range checks mirroring the schema bounds. Non-finite values are
    /// fatal here so the model never sees them.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        let finite = [
            ("time_unit", self.time_unit),
            ("shift_min", self.shift_min),
            ("shift_max", self.shift_max),
            ("shift_overtime", self.shift_overtime),
            ("overtime_multiplier", self.overtime_multiplier),
            ("buffer", self.buffer),
            ("utilization_target", self.utilization_target),
            ("activation_penalty", self.activation_penalty),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(self.range_error(name, "must be a finite number"));
            }
        }

        if self.time_unit <= 0.0 {
            return Err(self.range_error("time_unit", "must be > 0"));
        }
        if self.rooms_max < 1 {
            return Err(self.range_error("rooms_max", "must be >= 1"));
        }
        if self.shift_min <= 0.0 {
            return Err(self.range_error("shift_min", "must be > 0"));
        }
        if self.shift_max <= 0.0 {
            return Err(self.range_error("shift_max", "must be > 0"));
        }
        if self.shift_overtime < 0.0 {
            return Err(self.range_error("shift_overtime", "must be >= 0"));
        }
        if self.overtime_multiplier < 1.0 {
            return Err(self.range_error("overtime_multiplier", "must be >= 1.0"));
        }
        if self.buffer <= 0.0 {
            return Err(self.range_error("buffer", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.utilization_target) {
            return Err(self.range_error("utilization_target", "must be within 0..1"));
        }
        if self.activation_penalty < 0.0 {
            return Err(self.range_error("activation_penalty", "must be >= 0"));
        }

        let solver = &self.solver;
        if !solver.max_time_in_seconds.is_finite() || solver.max_time_in_seconds < 0.0 {
            return Err(self.range_error("solver.max_time_in_seconds", "must be >= 0"));
        }
        if solver.linearization_level > 2 {
            return Err(self.range_error("solver.linearization_level", "must be 0, 1, or 2"));
        }
        if !(0.0..=1.0).contains(&solver.relative_gap_limit) {
            return Err(self.range_error("solver.relative_gap_limit", "must be within 0..1"));
        }
        if !solver.absolute_gap_limit.is_finite() || solver.absolute_gap_limit < 0.0 {
            return Err(self.range_error("solver.absolute_gap_limit", "must be >= 0"));
        }
        if let Some(mb) = solver.max_memory_in_mb {
            if mb < 128 {
                return Err(self.range_error("solver.max_memory_in_mb", "must be >= 128"));
            }
        }
        Ok(())
    }

    /// Ticks per hour on the model lattice.
    pub fn ticks_per_hour(&self) -> i64 {
        (1.0 / self.time_unit).round() as i64
    }

    fn range_error(&self, field: &str, rule: &str) -> SchedulerError {
        SchedulerError::config(
            format!("configuration field '{field}' {rule}"),
            "Config::validate",
            "Adjust the offending value in config.yaml.",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yaml(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.ticks_per_hour(), 12);
        assert_eq!(cfg.rooms_max, 20);
        assert_eq!(cfg.solver.num_workers, 4);
    }

    #[test]
    fn loads_partial_yaml_with_defaults() {
        let (_dir, path) = write_yaml(
            "time_unit: 0.08333\n\
             rooms_max: 2\n\
             solver:\n\
             \x20 num_workers: 1\n\
             \x20 random_seed: 42\n",
        );
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.rooms_max, 2);
        assert_eq!(cfg.solver.num_workers, 1);
        assert_eq!(cfg.solver.random_seed, 42);
        assert_eq!(cfg.shift_min, 5.0);
        assert_eq!(cfg.solver.search_branching, SearchBranching::Automatic);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let (_dir, path) = write_yaml("rooms_max: 2\nnot_a_key: 1\n");
        let err = Config::load(&path).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
        assert!(err.to_string().contains("not_a_key"));
    }

    #[test]
    fn branching_parses_screaming_snake_case() {
        let (_dir, path) = write_yaml("solver:\n  search_branching: FIXED_SEARCH\n");
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.solver.search_branching, SearchBranching::FixedSearch);
        assert_eq!(cfg.solver.search_branching.as_str(), "FIXED_SEARCH");
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let (_dir, path) = write_yaml("overtime_multiplier: 0.5\n");
        assert_eq!(Config::load(&path).unwrap_err().kind(), "ConfigError");

        let (_dir, path) = write_yaml("utilization_target: 1.5\n");
        assert_eq!(Config::load(&path).unwrap_err().kind(), "ConfigError");

        let (_dir, path) = write_yaml("solver:\n  linearization_level: 3\n");
        assert_eq!(Config::load(&path).unwrap_err().kind(), "ConfigError");
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let (_dir, path) = write_yaml("buffer: .nan\n");
        assert_eq!(Config::load(&path).unwrap_err().kind(), "ConfigError");
    }

    #[test]
    fn wrong_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "rooms_max: 2\n").unwrap();
        assert_eq!(Config::load(&path).unwrap_err().kind(), "ConfigError");
    }
}
