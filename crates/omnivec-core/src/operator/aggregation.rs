//! Global aggregation delegated to a native runtime.

use std::sync::Arc;

use arcstr::ArcStr;
use omnivec_common::types::DataType;
use omnivec_common::{Error, Result};

use super::{Operator, OperatorFactory};
use crate::context::{OperatorContext, TaskContext};
use crate::page::Page;
use crate::runtime::{
    AggregationDescriptor, NativeAggregationFactory, NativeOperator, NativeOperatorFactory,
};

const OPERATOR_TYPE: &str = "Aggregation";

/// Forwards every input page to a native aggregation and emits its single
/// result page after [`finish`](Operator::finish).
#[derive(Debug)]
pub struct AggregationOperator {
    context: OperatorContext,
    native: Box<dyn NativeOperator>,
    /// No more input will arrive.
    finishing: bool,
    /// The result page has been returned.
    finished: bool,
    closed: bool,
}

impl AggregationOperator {
    /// Wraps a native operator.
    #[must_use]
    pub fn new(context: OperatorContext, native: Box<dyn NativeOperator>) -> Self {
        tracing::debug!(operator = %context, "created aggregation operator");
        Self {
            context,
            native,
            finishing: false,
            finished: false,
            closed: false,
        }
    }
}

impl Operator for AggregationOperator {
    fn operator_context(&self) -> &OperatorContext {
        &self.context
    }

    fn needs_input(&self) -> bool {
        !self.finishing && !self.closed
    }

    fn add_input(&mut self, page: Option<Page>) -> Result<()> {
        let page = page.ok_or(Error::NullArgument("page"))?;
        if self.closed {
            return Err(Error::illegal_state("aggregation operator is closed"));
        }
        if self.finishing {
            return Err(Error::illegal_state(
                "aggregation operator does not accept input after finish",
            ));
        }
        let max = self.context.max_page_positions();
        if page.position_count() > max {
            return Err(Error::invalid_argument(format!(
                "page of {} positions exceeds the limit of {max}",
                page.position_count()
            )));
        }

        tracing::trace!(
            operator = %self.context,
            positions = page.position_count(),
            channels = page.channel_count(),
            "aggregation input"
        );
        let batch = page.into_vec_batch()?;
        self.native.add_input(batch)
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        if !self.finishing || self.finished || self.closed {
            return Ok(None);
        }
        // Unfinished until a page has actually been produced.
        let Some(batch) = self.native.get_output()? else {
            self.finished = true;
            return Ok(None);
        };
        let page = Page::from_vec_batch(batch)?;
        self.finished = true;
        tracing::trace!(
            operator = %self.context,
            positions = page.position_count(),
            channels = page.channel_count(),
            "aggregation output"
        );
        Ok(Some(page))
    }

    fn finish(&mut self) {
        if !self.finishing {
            tracing::debug!(operator = %self.context, "aggregation finishing");
            self.finishing = true;
        }
    }

    fn is_finished(&self) -> bool {
        self.finished || self.closed
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        tracing::debug!(
            operator = %self.context,
            reserved = self.context.reserved_bytes(),
            "closing aggregation operator"
        );
        self.native.close()
    }

    fn name(&self) -> &'static str {
        OPERATOR_TYPE
    }
}

/// Creates [`AggregationOperator`]s for one plan node.
#[derive(Debug, Clone)]
pub struct AggregationOperatorFactory {
    operator_id: usize,
    plan_node_id: ArcStr,
    source_types: Vec<DataType>,
    native_factory: Arc<dyn NativeOperatorFactory>,
    closed: bool,
}

impl AggregationOperatorFactory {
    /// Creates a factory backed by the reference aggregation runtime.
    ///
    /// # Errors
    ///
    /// Returns the validation errors of [`NativeAggregationFactory::new`].
    pub fn new(
        operator_id: usize,
        plan_node_id: impl Into<ArcStr>,
        descriptor: AggregationDescriptor,
    ) -> Result<Self> {
        let source_types = descriptor.source_types.clone();
        let native = NativeAggregationFactory::new(descriptor)?;
        Ok(Self::with_native_factory(
            operator_id,
            plan_node_id,
            source_types,
            Arc::new(native),
        ))
    }

    /// Creates a factory backed by any native runtime.
    #[must_use]
    pub fn with_native_factory(
        operator_id: usize,
        plan_node_id: impl Into<ArcStr>,
        source_types: Vec<DataType>,
        native_factory: Arc<dyn NativeOperatorFactory>,
    ) -> Self {
        Self {
            operator_id,
            plan_node_id: plan_node_id.into(),
            source_types,
            native_factory,
            closed: false,
        }
    }

    /// Operator id assigned to created operators.
    #[must_use]
    pub fn operator_id(&self) -> usize {
        self.operator_id
    }

    /// Plan node of created operators.
    #[must_use]
    pub fn plan_node_id(&self) -> &str {
        &self.plan_node_id
    }
}

impl OperatorFactory for AggregationOperatorFactory {
    fn source_types(&self) -> &[DataType] {
        &self.source_types
    }

    fn create_operator(&self, task: &TaskContext) -> Result<Box<dyn Operator>> {
        if self.closed {
            return Err(Error::illegal_state("factory is already closed"));
        }
        let context =
            task.add_operator_context(self.operator_id, self.plan_node_id.clone(), OPERATOR_TYPE);
        let native = self.native_factory.create_operator(context.allocator())?;
        Ok(Box::new(AggregationOperator::new(context, native)))
    }

    fn no_more_operators(&mut self) {
        self.closed = true;
    }

    fn duplicate(&self) -> Box<dyn OperatorFactory> {
        Box::new(Self {
            closed: false,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::LongArrayBlock;
    use crate::config::ExecutionConfig;
    use crate::operator::OperatorState;
    use crate::runtime::{AggregationStep, FunctionType};
    use omnivec_common::types::Value;

    fn sum_factory() -> AggregationOperatorFactory {
        AggregationOperatorFactory::new(
            1,
            "agg",
            AggregationDescriptor {
                source_types: vec![DataType::Long],
                functions: vec![FunctionType::Sum, FunctionType::CountAll],
                input_channels: vec![Some(0), None],
                mask_channels: Vec::new(),
                output_types: vec![DataType::Long, DataType::Long],
                step: AggregationStep::Single,
            },
        )
        .unwrap()
    }

    fn long_page(task: &TaskContext, values: &[i64]) -> Page {
        let block =
            LongArrayBlock::from_values(task.allocator(), 0, values.len(), None, values).unwrap();
        let block: Box<dyn crate::block::Block> = Box::new(block);
        Page::new(vec![block]).unwrap()
    }

    #[test]
    fn test_lifecycle() {
        let task = TaskContext::new(ExecutionConfig::default()).unwrap();
        let mut op = sum_factory().create_operator(&task).unwrap();
        assert_eq!(op.name(), "Aggregation");
        assert_eq!(op.state(), OperatorState::NeedsInput);

        op.add_input(Some(long_page(&task, &[1, 2, 3]))).unwrap();
        op.add_input(Some(long_page(&task, &[4]))).unwrap();
        assert!(op.get_output().unwrap().is_none());
        assert!(!op.is_finished());

        op.finish();
        op.finish();
        assert_eq!(op.state(), OperatorState::HasOutput);
        assert!(!op.needs_input());

        let page = op.get_output().unwrap().unwrap();
        assert_eq!(page.position_count(), 1);
        assert_eq!(page.block(0).unwrap().get(0).unwrap(), Value::Long(10));
        assert_eq!(page.block(1).unwrap().get(0).unwrap(), Value::Long(4));
        assert!(op.is_finished());
        assert_eq!(op.state(), OperatorState::Finished);
        assert!(op.get_output().unwrap().is_none());

        op.close().unwrap();
        op.close().unwrap();
    }

    #[test]
    fn test_null_and_late_input() {
        let task = TaskContext::new(ExecutionConfig::default()).unwrap();
        let mut op = sum_factory().create_operator(&task).unwrap();
        assert_eq!(op.add_input(None), Err(Error::NullArgument("page")));
        op.finish();
        let err = op.add_input(Some(long_page(&task, &[1]))).unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
    }

    #[test]
    fn test_page_limit() {
        let task =
            TaskContext::new(ExecutionConfig::default().with_max_page_positions(2)).unwrap();
        let mut op = sum_factory().create_operator(&task).unwrap();
        let err = op.add_input(Some(long_page(&task, &[1, 2, 3]))).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_close_before_finish() {
        let task = TaskContext::new(ExecutionConfig::default()).unwrap();
        let mut op = sum_factory().create_operator(&task).unwrap();
        op.add_input(Some(long_page(&task, &[1]))).unwrap();
        op.close().unwrap();
        assert!(op.is_finished());
        assert_eq!(op.state(), OperatorState::Finished);
        assert!(op.get_output().unwrap().is_none());
    }

    #[test]
    fn test_rejected_output_is_retryable() {
        let task =
            TaskContext::new(ExecutionConfig::default().with_operator_memory_limit(1)).unwrap();
        let mut op = sum_factory().create_operator(&task).unwrap();
        op.add_input(Some(long_page(&task, &[5]))).unwrap();
        op.finish();

        for _ in 0..2 {
            let err = op.get_output().unwrap_err();
            assert!(matches!(err, Error::ResourceExhausted { .. }));
            assert!(!op.is_finished());
            assert_eq!(op.state(), OperatorState::HasOutput);
        }
        op.close().unwrap();
        assert!(op.is_finished());
    }

    #[test]
    fn test_debug_shows_native_operator() {
        let task = TaskContext::new(ExecutionConfig::default()).unwrap();
        let context = task.add_operator_context(7, "agg", OPERATOR_TYPE);
        let native = NativeAggregationFactory::new(AggregationDescriptor {
            source_types: Vec::new(),
            functions: Vec::new(),
            input_channels: Vec::new(),
            mask_channels: Vec::new(),
            output_types: Vec::new(),
            step: AggregationStep::Single,
        })
        .unwrap()
        .create_operator(context.allocator())
        .unwrap();
        let op = AggregationOperator::new(context, native);
        assert!(format!("{op:?}").contains("NativeAggregationOperator"));
    }

    #[test]
    fn test_factory_lifecycle() {
        let task = TaskContext::new(ExecutionConfig::default()).unwrap();
        let mut factory = sum_factory();
        assert_eq!(factory.source_types(), &[DataType::Long]);
        let duplicate = factory.duplicate();
        factory.no_more_operators();
        assert!(matches!(
            factory.create_operator(&task),
            Err(Error::IllegalState(_))
        ));
        assert!(duplicate.create_operator(&task).is_ok());
    }
}
