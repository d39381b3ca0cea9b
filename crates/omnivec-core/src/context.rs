//! Task and operator contexts.
//!
//! A [`TaskContext`] owns the root memory context of one task; every operator
//! gets an [`OperatorContext`] with its own child allocator, so its native
//! allocations show up both under its tag and in the task total.

use std::fmt;
use std::sync::Arc;

use arcstr::ArcStr;
use omnivec_common::memory::{MemoryContext, VecAllocator};

use crate::config::{ConfigError, ExecutionConfig};

/// Execution state shared by all operators of one task.
#[derive(Debug, Clone)]
pub struct TaskContext {
    config: Arc<ExecutionConfig>,
    allocator: VecAllocator,
}

impl TaskContext {
    /// Validates `config` and creates the task's root memory context.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: ExecutionConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let memory = if config.track_allocations_by_tag {
            MemoryContext::root_with_tag_tracking("task", config.memory_limit)
        } else {
            MemoryContext::root("task", config.memory_limit)
        };
        Ok(Self {
            config: Arc::new(config),
            allocator: VecAllocator::new(memory),
        })
    }

    /// The configuration this task runs with.
    #[must_use]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// The task's root memory context.
    #[must_use]
    pub fn memory_context(&self) -> &Arc<MemoryContext> {
        self.allocator.context()
    }

    /// Allocator charging the task context directly.
    #[must_use]
    pub fn allocator(&self) -> &VecAllocator {
        &self.allocator
    }

    /// Creates the context of one operator instance.
    #[must_use]
    pub fn add_operator_context(
        &self,
        operator_id: usize,
        plan_node_id: impl Into<ArcStr>,
        operator_type: &'static str,
    ) -> OperatorContext {
        let tag = arcstr::format!("{operator_type}-{operator_id}");
        let allocator = self
            .allocator
            .new_child(tag, self.config.operator_memory_limit);
        OperatorContext {
            operator_id,
            plan_node_id: plan_node_id.into(),
            operator_type,
            allocator,
            max_page_positions: self.config.max_page_positions,
        }
    }
}

/// Identity and memory of one operator instance.
#[derive(Debug, Clone)]
pub struct OperatorContext {
    operator_id: usize,
    plan_node_id: ArcStr,
    operator_type: &'static str,
    allocator: VecAllocator,
    max_page_positions: usize,
}

impl OperatorContext {
    /// Operator id within the pipeline.
    #[must_use]
    pub fn operator_id(&self) -> usize {
        self.operator_id
    }

    /// Plan node this operator executes.
    #[must_use]
    pub fn plan_node_id(&self) -> &str {
        &self.plan_node_id
    }

    /// Operator type name.
    #[must_use]
    pub fn operator_type(&self) -> &'static str {
        self.operator_type
    }

    /// Allocator charging this operator's memory context.
    #[must_use]
    pub fn allocator(&self) -> &VecAllocator {
        &self.allocator
    }

    /// Native bytes currently held by this operator.
    #[must_use]
    pub fn reserved_bytes(&self) -> usize {
        self.allocator.context().reserved_bytes()
    }

    /// Largest page this operator accepts.
    #[must_use]
    pub fn max_page_positions(&self) -> usize {
        self.max_page_positions
    }
}

impl fmt::Display for OperatorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} ({})",
            self.operator_type, self.operator_id, self.plan_node_id
        )
    }
}
