//! The push-style operator protocol.
//!
//! A driver feeds pages with [`Operator::add_input`] while
//! [`Operator::needs_input`] holds, pulls results with
//! [`Operator::get_output`], and calls [`Operator::finish`] once the input is
//! exhausted. The operator is done when [`Operator::is_finished`] turns true.
//!
//! ```text
//! NeedsInput --add_input--> NeedsInput | HasOutput --finish + drain--> Finished
//! ```
//!
//! - [`AggregationOperator`] - global aggregation computed by a native runtime

mod aggregation;

use omnivec_common::Result;
use omnivec_common::types::DataType;

pub use aggregation::{AggregationOperator, AggregationOperatorFactory};

use crate::context::{OperatorContext, TaskContext};
use crate::page::Page;

/// Coarse state of an operator, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    /// Accepting input.
    NeedsInput,
    /// Not accepting input; output may be pending.
    HasOutput,
    /// Finished and drained.
    Finished,
}

/// A stateful transform from input pages to output pages.
///
/// One driver thread calls an operator at a time.
pub trait Operator: Send {
    /// Identity and memory of this instance.
    fn operator_context(&self) -> &OperatorContext;

    /// Whether [`add_input`](Self::add_input) may be called.
    fn needs_input(&self) -> bool;

    /// Pushes a page.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NullArgument`](omnivec_common::Error::NullArgument)
    /// for `None` and [`Error::IllegalState`](omnivec_common::Error::IllegalState)
    /// after [`finish`](Self::finish).
    fn add_input(&mut self, page: Option<Page>) -> Result<()>;

    /// Pulls the next ready page; `None` if nothing is ready.
    fn get_output(&mut self) -> Result<Option<Page>>;

    /// Signals that no more input will arrive. Idempotent.
    fn finish(&mut self);

    /// True once finished and all output has been returned.
    fn is_finished(&self) -> bool;

    /// Releases native resources. Idempotent.
    fn close(&mut self) -> Result<()>;

    /// Name for logs and explain output.
    fn name(&self) -> &'static str;

    /// Current protocol state.
    fn state(&self) -> OperatorState {
        if self.is_finished() {
            OperatorState::Finished
        } else if self.needs_input() {
            OperatorState::NeedsInput
        } else {
            OperatorState::HasOutput
        }
    }
}

/// Creates operator instances for one plan node.
pub trait OperatorFactory: Send + Sync {
    /// Types of the input columns.
    fn source_types(&self) -> &[DataType];

    /// Creates an operator bound to `task`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::IllegalState`](omnivec_common::Error::IllegalState)
    /// after [`no_more_operators`](Self::no_more_operators).
    fn create_operator(&self, task: &TaskContext) -> Result<Box<dyn Operator>>;

    /// Marks the factory closed for new operators.
    fn no_more_operators(&mut self);

    /// An open copy of this factory.
    fn duplicate(&self) -> Box<dyn OperatorFactory>;
}
