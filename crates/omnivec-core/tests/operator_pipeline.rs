//! Integration tests for the operator protocol driven end to end.

use std::sync::Arc;

use omnivec_common::memory::VecAllocator;
use omnivec_common::types::{DataType, Value};
use omnivec_common::{Error, ErrorKind, Result};
use omnivec_core::block::{Block, block_from_values};
use omnivec_core::operator::{AggregationOperatorFactory, Operator, OperatorFactory, OperatorState};
use omnivec_core::page::Page;
use omnivec_core::runtime::{
    AggregationDescriptor, AggregationStep, FunctionType, NativeOperator, NativeOperatorFactory,
    VecBatch,
};
use omnivec_core::vector::AnyVector;
use omnivec_core::{ExecutionConfig, TaskContext};

fn task() -> TaskContext {
    TaskContext::new(ExecutionConfig::default().with_allocation_tracking()).unwrap()
}

fn page(task: &TaskContext, columns: Vec<(DataType, Vec<Value>)>) -> Page {
    let blocks = columns
        .iter()
        .map(|(data_type, values)| block_from_values(task.allocator(), *data_type, values))
        .collect::<Result<Vec<_>>>()
        .unwrap();
    Page::new(blocks).unwrap()
}

/// Feeds `pages`, finishes, and drains the operator.
fn run(op: &mut dyn Operator, pages: Vec<Page>) -> Vec<Page> {
    for page in pages {
        assert!(op.needs_input());
        op.add_input(Some(page)).unwrap();
    }
    op.finish();
    let mut output = Vec::new();
    while !op.is_finished() {
        if let Some(page) = op.get_output().unwrap() {
            output.push(page);
        }
    }
    output
}

// --- Aggregation ---

#[test]
fn zero_aggregates_emit_one_empty_row() {
    let task = task();
    let factory = AggregationOperatorFactory::new(
        0,
        "0",
        AggregationDescriptor {
            source_types: Vec::new(),
            functions: Vec::new(),
            input_channels: Vec::new(),
            mask_channels: vec![Some(1), Some(2), None],
            output_types: Vec::new(),
            step: AggregationStep::Single,
        },
    )
    .unwrap();
    let mut op = factory.create_operator(&task).unwrap();

    assert_eq!(op.add_input(None), Err(Error::NullArgument("page")));

    op.finish();
    let page = op.get_output().unwrap().unwrap();
    assert_eq!(page.channel_count(), 0);
    assert_eq!(page.position_count(), 1);
    assert!(op.is_finished());
    assert!(op.get_output().unwrap().is_none());
    op.close().unwrap();
}

#[test]
fn masked_aggregates_over_several_pages() {
    let task = task();
    let factory = AggregationOperatorFactory::new(
        3,
        "agg-node",
        AggregationDescriptor {
            source_types: vec![DataType::Long, DataType::Byte, DataType::VarChar],
            functions: vec![
                FunctionType::Sum,
                FunctionType::CountColumn,
                FunctionType::Max,
                FunctionType::Avg,
            ],
            input_channels: vec![Some(0), Some(2), Some(2), Some(0)],
            mask_channels: vec![Some(1)],
            output_types: vec![
                DataType::Long,
                DataType::Long,
                DataType::VarChar,
                DataType::Double,
            ],
            step: AggregationStep::Single,
        },
    )
    .unwrap();
    let mut op = factory.create_operator(&task).unwrap();
    assert_eq!(op.operator_context().to_string(), "Aggregation#3 (agg-node)");

    let first = page(
        &task,
        vec![
            (DataType::Long, vec![Value::Long(1), Value::Long(2), Value::Null]),
            (DataType::Byte, vec![Value::Byte(1), Value::Byte(0), Value::Byte(1)]),
            (DataType::VarChar, vec![Value::from("b"), Value::Null, Value::from("a")]),
        ],
    );
    let second = page(
        &task,
        vec![
            (DataType::Long, vec![Value::Long(5)]),
            (DataType::Byte, vec![Value::Null]),
            (DataType::VarChar, vec![Value::from("z")]),
        ],
    );
    let output = run(op.as_mut(), vec![first, second]);
    assert_eq!(output.len(), 1);
    let result = &output[0];
    assert_eq!(result.position_count(), 1);

    // Only the masked-in first page rows count towards the sum.
    assert_eq!(result.block(0).unwrap().get(0).unwrap(), Value::Long(1));
    assert_eq!(result.block(1).unwrap().get(0).unwrap(), Value::Long(3));
    assert_eq!(result.block(2).unwrap().get(0).unwrap(), Value::from("z"));
    assert_eq!(result.block(3).unwrap().get(0).unwrap(), Value::Double(8.0 / 3.0));
    assert_eq!(op.state(), OperatorState::Finished);
    op.close().unwrap();
}

#[test]
fn input_after_finish_is_rejected() {
    let task = task();
    let factory = AggregationOperatorFactory::new(
        1,
        "count",
        AggregationDescriptor {
            source_types: vec![DataType::Int],
            functions: vec![FunctionType::CountAll],
            input_channels: vec![None],
            mask_channels: Vec::new(),
            output_types: vec![DataType::Long],
            step: AggregationStep::Single,
        },
    )
    .unwrap();
    let mut op = factory.create_operator(&task).unwrap();
    op.finish();
    let late = page(&task, vec![(DataType::Int, vec![Value::Int(1)])]);
    assert!(matches!(
        op.add_input(Some(late)),
        Err(Error::IllegalState(_))
    ));
}

#[test]
fn memory_returns_to_zero_after_close() {
    let task = task();
    let factory = AggregationOperatorFactory::new(
        2,
        "sum",
        AggregationDescriptor {
            source_types: vec![DataType::Double],
            functions: vec![FunctionType::Sum],
            input_channels: vec![Some(0)],
            mask_channels: Vec::new(),
            output_types: vec![DataType::Double],
            step: AggregationStep::Single,
        },
    )
    .unwrap();
    let mut op = factory.create_operator(&task).unwrap();
    let input = page(
        &task,
        vec![(DataType::Double, vec![Value::Double(0.5), Value::Double(1.5)])],
    );
    assert!(task.memory_context().reserved_bytes() > 0);

    let output = run(op.as_mut(), vec![input]);
    assert_eq!(
        output[0].block(0).unwrap().get(0).unwrap(),
        Value::Double(2.0)
    );
    assert!(op.operator_context().reserved_bytes() > 0);

    drop(output);
    op.close().unwrap();
    assert_eq!(op.operator_context().reserved_bytes(), 0);
    assert_eq!(task.memory_context().reserved_bytes(), 0);
}

fn count_and_sum_factory() -> AggregationOperatorFactory {
    AggregationOperatorFactory::new(
        4,
        "count-sum",
        AggregationDescriptor {
            source_types: vec![DataType::Long],
            functions: vec![FunctionType::CountAll, FunctionType::Sum],
            input_channels: vec![None, Some(0)],
            mask_channels: Vec::new(),
            output_types: vec![DataType::Long, DataType::Long],
            step: AggregationStep::Single,
        },
    )
    .unwrap()
}

#[test]
fn close_before_finish_ends_the_operator() {
    let task = task();
    let mut op = count_and_sum_factory().create_operator(&task).unwrap();
    op.add_input(Some(page(&task, vec![(DataType::Long, vec![Value::Long(1)])])))
        .unwrap();

    op.close().unwrap();
    assert!(op.is_finished());
    assert_eq!(op.state(), OperatorState::Finished);
    assert!(!op.needs_input());
    assert!(op.get_output().unwrap().is_none());
    assert!(matches!(
        op.add_input(Some(page(&task, vec![(DataType::Long, vec![Value::Long(2)])]))),
        Err(Error::IllegalState(_))
    ));
    assert_eq!(task.memory_context().reserved_bytes(), 0);
}

#[test]
fn rejected_output_keeps_the_operator_unfinished() {
    let task = TaskContext::new(
        ExecutionConfig::default()
            .with_allocation_tracking()
            .with_operator_memory_limit(1),
    )
    .unwrap();
    let mut op = count_and_sum_factory().create_operator(&task).unwrap();
    op.add_input(Some(page(&task, vec![(DataType::Long, vec![Value::Long(5)])])))
        .unwrap();
    op.finish();

    for _ in 0..2 {
        let err = op.get_output().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
        assert!(!op.is_finished());
        assert_eq!(op.state(), OperatorState::HasOutput);
    }
    assert_eq!(op.operator_context().reserved_bytes(), 0);

    op.close().unwrap();
    assert!(op.is_finished());
    assert_eq!(task.memory_context().reserved_bytes(), 0);
}

#[test]
fn rejected_input_leaves_results_intact() {
    let task = task();
    let mut op = count_and_sum_factory().create_operator(&task).unwrap();
    op.add_input(Some(page(
        &task,
        vec![(DataType::Long, vec![Value::Long(i64::MAX)])],
    )))
    .unwrap();
    let err = op
        .add_input(Some(page(&task, vec![(DataType::Long, vec![Value::Long(1)])])))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    // The rejected page is released all the same.
    assert_eq!(task.memory_context().reserved_bytes(), 0);

    let output = run(
        op.as_mut(),
        vec![page(&task, vec![(DataType::Long, vec![Value::Null])])],
    );
    let result = &output[0];
    assert_eq!(result.block(0).unwrap().get(0).unwrap(), Value::Long(2));
    assert_eq!(
        result.block(1).unwrap().get(0).unwrap(),
        Value::Long(i64::MAX)
    );
    op.close().unwrap();
}

#[test]
fn descriptor_errors_surface_at_factory_creation() {
    let err = AggregationOperatorFactory::new(
        0,
        "bad",
        AggregationDescriptor {
            source_types: vec![DataType::Long, DataType::Long],
            functions: vec![FunctionType::Sum],
            input_channels: vec![Some(0)],
            mask_channels: vec![Some(1)],
            output_types: vec![DataType::Long],
            step: AggregationStep::Single,
        },
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

// --- Factory lifecycle ---

#[test]
fn factory_refuses_operators_after_close() {
    let task = task();
    let mut factory = AggregationOperatorFactory::new(
        0,
        "0",
        AggregationDescriptor {
            source_types: Vec::new(),
            functions: Vec::new(),
            input_channels: Vec::new(),
            mask_channels: Vec::new(),
            output_types: Vec::new(),
            step: AggregationStep::Single,
        },
    )
    .unwrap();
    assert!(factory.create_operator(&task).is_ok());
    factory.no_more_operators();
    assert!(matches!(
        factory.create_operator(&task),
        Err(Error::IllegalState(_))
    ));
}

// --- Pluggable runtime ---

/// Counts input rows and emits the total as one BIGINT column.
#[derive(Debug)]
struct RowCounter {
    allocator: VecAllocator,
    rows: i64,
    emitted: bool,
}

impl NativeOperator for RowCounter {
    fn add_input(&mut self, mut batch: VecBatch) -> Result<()> {
        self.rows += i64::try_from(batch.row_count()).unwrap_or(i64::MAX);
        batch.close()
    }

    fn get_output(&mut self) -> Result<Option<VecBatch>> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        let total = AnyVector::from_values(&self.allocator, DataType::Long, &[Value::Long(self.rows)])?;
        Ok(Some(VecBatch::new(vec![total], 1)))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct RowCounterFactory;

impl NativeOperatorFactory for RowCounterFactory {
    fn create_operator(&self, allocator: &VecAllocator) -> Result<Box<dyn NativeOperator>> {
        Ok(Box::new(RowCounter {
            allocator: allocator.clone(),
            rows: 0,
            emitted: false,
        }))
    }
}

#[test]
fn custom_native_runtime_plugs_in() {
    let task = task();
    let factory = AggregationOperatorFactory::with_native_factory(
        9,
        "rows",
        vec![DataType::Int],
        Arc::new(RowCounterFactory),
    );
    let mut op = factory.duplicate().create_operator(&task).unwrap();
    let pages = vec![
        page(&task, vec![(DataType::Int, vec![Value::Int(1), Value::Int(2)])]),
        page(&task, vec![(DataType::Int, vec![Value::Null])]),
    ];
    let output = run(op.as_mut(), pages);
    let total: &dyn Block = output[0].block(0).unwrap();
    assert_eq!(total.get(0).unwrap(), Value::Long(3));
    assert_eq!(
        task.memory_context().usage_by_tag().unwrap(),
        vec![(
            arcstr::literal!("Aggregation-9"),
            op.operator_context().reserved_bytes()
        )]
    );
}
