//! Graph execution configuration
//!
//! [`GraphConfig`] carries the tunables of the scheduler: whether cycles are
//! tolerated, the bounds of the cyclic relaxation solver, and the guards that
//! stop corrupted graphs from hanging a loop.
//!
//! Configuration can be built in code with the `with_*` builders or loaded
//! from YAML. Missing fields fall back to their defaults.
//!
//! ```rust
//! use depgraph_core::GraphConfig;
//!
//! let config = GraphConfig::from_yaml_str("cyclic_allowed: true\nmax_cycle_steps: 16\n").unwrap();
//! assert!(config.cyclic_allowed);
//! assert_eq!(config.max_cycle_steps, 16);
//! assert_eq!(config.loop_guard, 10_000);
//! ```

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Scheduler and solver settings for a [`Graph`](crate::Graph)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Allow cyclic graphs to execute through the relaxation solver
    pub cyclic_allowed: bool,

    /// Maximum relaxation iterations per exec
    pub max_cycle_steps: usize,

    /// Relaxation stops once the summed socket change falls below this
    pub cycle_stop_threshold: f64,

    /// Upper bound on iterations of structural loops such as disconnect-all
    pub loop_guard: usize,

    /// Maximum recursion depth of subtree execution
    pub max_subtree_depth: usize,
}

impl GraphConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self {
            cyclic_allowed: false,
            max_cycle_steps: 64,
            cycle_stop_threshold: 0.0005,
            loop_guard: 10_000,
            max_subtree_depth: 512,
        }
    }

    /// Allow or forbid cycles
    pub fn with_cyclic_allowed(mut self, allowed: bool) -> Self {
        self.cyclic_allowed = allowed;
        self
    }

    /// Set the relaxation iteration cap
    pub fn with_max_cycle_steps(mut self, steps: usize) -> Self {
        self.max_cycle_steps = steps;
        self
    }

    /// Set the relaxation convergence threshold
    pub fn with_cycle_stop_threshold(mut self, threshold: f64) -> Self {
        self.cycle_stop_threshold = threshold;
        self
    }

    /// Set the structural loop guard
    pub fn with_loop_guard(mut self, guard: usize) -> Self {
        self.loop_guard = guard;
        self
    }

    /// Set the subtree recursion depth limit
    pub fn with_max_subtree_depth(mut self, depth: usize) -> Self {
        self.max_subtree_depth = depth;
        self
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from a YAML string and validate it
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Configuration`] when a bound is zero or the
    /// threshold is negative or not finite.
    pub fn validate(&self) -> Result<()> {
        if self.max_cycle_steps == 0 {
            return Err(GraphError::Configuration(
                "max_cycle_steps must be at least 1".to_string(),
            ));
        }
        if !self.cycle_stop_threshold.is_finite() || self.cycle_stop_threshold < 0.0 {
            return Err(GraphError::Configuration(format!(
                "cycle_stop_threshold must be a non-negative number, got {}",
                self.cycle_stop_threshold
            )));
        }
        if self.loop_guard == 0 {
            return Err(GraphError::Configuration(
                "loop_guard must be at least 1".to_string(),
            ));
        }
        if self.max_subtree_depth == 0 {
            return Err(GraphError::Configuration(
                "max_subtree_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GraphConfig::default();
        assert!(!config.cyclic_allowed);
        assert_eq!(config.max_cycle_steps, 64);
        assert_eq!(config.cycle_stop_threshold, 0.0005);
        assert_eq!(config.loop_guard, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = GraphConfig::new()
            .with_cyclic_allowed(true)
            .with_max_cycle_steps(8)
            .with_cycle_stop_threshold(0.1)
            .with_loop_guard(50)
            .with_max_subtree_depth(12);
        assert!(config.cyclic_allowed);
        assert_eq!(config.max_cycle_steps, 8);
        assert_eq!(config.cycle_stop_threshold, 0.1);
        assert_eq!(config.loop_guard, 50);
        assert_eq!(config.max_subtree_depth, 12);
    }

    #[test]
    fn test_yaml_partial_fields() {
        let yaml = r#"
cycle_stop_threshold: 0.01
loop_guard: 99
"#;
        let config = GraphConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.cycle_stop_threshold, 0.01);
        assert_eq!(config.loop_guard, 99);
        assert_eq!(config.max_cycle_steps, 64);
    }

    #[test]
    fn test_validation_rejects_zero_steps() {
        let err = GraphConfig::from_yaml_str("max_cycle_steps: 0").unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));

        let config = GraphConfig::new().with_cycle_stop_threshold(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = GraphConfig::from_yaml_str("loop_guard: [1, 2").unwrap_err();
        assert!(matches!(err, GraphError::Yaml(_)));
    }

    #[test]
    fn test_from_missing_file() {
        let err = GraphConfig::from_file("/nonexistent/depgraph.yaml").unwrap_err();
        assert!(matches!(err, GraphError::Io(_)));
    }
}
