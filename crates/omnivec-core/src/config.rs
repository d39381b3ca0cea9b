//! Execution configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default upper bound on the rows of a page accepted by an operator.
pub const DEFAULT_MAX_PAGE_POSITIONS: usize = 1 << 16;

/// Errors from [`ExecutionConfig::validate()`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Task memory limit must be greater than zero.
    ZeroMemoryLimit,
    /// Operator memory limit must be greater than zero.
    ZeroOperatorMemoryLimit,
    /// Page position limit must be greater than zero.
    ZeroPagePositions,
    /// An operator cannot be allowed more memory than its task.
    OperatorLimitExceedsTaskLimit {
        /// Per-operator limit.
        operator: usize,
        /// Task limit.
        task: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroMemoryLimit => write!(f, "memory_limit must be greater than zero"),
            Self::ZeroOperatorMemoryLimit => {
                write!(f, "operator_memory_limit must be greater than zero")
            }
            Self::ZeroPagePositions => write!(f, "max_page_positions must be greater than zero"),
            Self::OperatorLimitExceedsTaskLimit { operator, task } => {
                write!(
                    f,
                    "operator_memory_limit ({operator}) exceeds memory_limit ({task})"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration of one task's execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Native memory limit of the task in bytes (None for unlimited).
    pub memory_limit: Option<usize>,
    /// Native memory limit of each operator in bytes (None for unlimited).
    pub operator_memory_limit: Option<usize>,
    /// Maximum rows in a page passed to an operator.
    pub max_page_positions: usize,
    /// Whether to record memory usage per allocation tag.
    pub track_allocations_by_tag: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            memory_limit: None,
            operator_memory_limit: None,
            max_page_positions: DEFAULT_MAX_PAGE_POSITIONS,
            track_allocations_by_tag: false,
        }
    }
}

impl ExecutionConfig {
    /// Sets the task memory limit.
    #[must_use]
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = Some(limit);
        self
    }

    /// Sets the per-operator memory limit.
    #[must_use]
    pub fn with_operator_memory_limit(mut self, limit: usize) -> Self {
        self.operator_memory_limit = Some(limit);
        self
    }

    /// Sets the maximum rows per page.
    #[must_use]
    pub fn with_max_page_positions(mut self, positions: usize) -> Self {
        self.max_page_positions = positions;
        self
    }

    /// Enables per-tag memory accounting.
    #[must_use]
    pub fn with_allocation_tracking(mut self) -> Self {
        self.track_allocations_by_tag = true;
        self
    }

    /// Validates the configuration.
    ///
    /// Called by [`TaskContext::new()`](crate::context::TaskContext::new).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any setting is invalid.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if let Some(limit) = self.memory_limit
            && limit == 0
        {
            return Err(ConfigError::ZeroMemoryLimit);
        }
        if let Some(limit) = self.operator_memory_limit
            && limit == 0
        {
            return Err(ConfigError::ZeroOperatorMemoryLimit);
        }
        if self.max_page_positions == 0 {
            return Err(ConfigError::ZeroPagePositions);
        }
        if let (Some(operator), Some(task)) = (self.operator_memory_limit, self.memory_limit)
            && operator > task
        {
            return Err(ConfigError::OperatorLimitExceedsTaskLimit { operator, task });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ExecutionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_page_positions, DEFAULT_MAX_PAGE_POSITIONS);
        assert!(config.memory_limit.is_none());
    }

    #[test]
    fn test_builder() {
        let config = ExecutionConfig::default()
            .with_memory_limit(1 << 20)
            .with_operator_memory_limit(1 << 16)
            .with_max_page_positions(1024)
            .with_allocation_tracking();
        assert_eq!(config.memory_limit, Some(1 << 20));
        assert_eq!(config.operator_memory_limit, Some(1 << 16));
        assert_eq!(config.max_page_positions, 1024);
        assert!(config.track_allocations_by_tag);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(
            ExecutionConfig::default().with_memory_limit(0).validate(),
            Err(ConfigError::ZeroMemoryLimit)
        );
        assert_eq!(
            ExecutionConfig::default()
                .with_operator_memory_limit(0)
                .validate(),
            Err(ConfigError::ZeroOperatorMemoryLimit)
        );
        assert_eq!(
            ExecutionConfig::default().with_max_page_positions(0).validate(),
            Err(ConfigError::ZeroPagePositions)
        );
        let err = ExecutionConfig::default()
            .with_memory_limit(100)
            .with_operator_memory_limit(200)
            .validate()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "operator_memory_limit (200) exceeds memory_limit (100)"
        );
    }
}
