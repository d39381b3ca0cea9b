//! Reference runtime for global (ungrouped) aggregations.
//!
//! Supports SUM, COUNT(column), COUNT(*), AVG, MIN and MAX over every
//! [`DataType`]. Intermediate and final steps combine partial results: counts
//! are summed, sums are summed, min/max are re-minimized.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use omnivec_common::memory::VecAllocator;
use omnivec_common::types::{DataType, Value};
use omnivec_common::{Error, Result};
use serde::{Deserialize, Serialize};

use super::{NativeOperator, NativeOperatorFactory, VecBatch};
use crate::vector::AnyVector;

/// Aggregate function identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionType {
    /// SUM(column).
    Sum,
    /// COUNT(column): non-null rows.
    CountColumn,
    /// COUNT(*): all rows.
    CountAll,
    /// AVG(column).
    Avg,
    /// MIN(column).
    Min,
    /// MAX(column).
    Max,
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionType::Sum => "sum",
            FunctionType::CountColumn => "count",
            FunctionType::CountAll => "count(*)",
            FunctionType::Avg => "avg",
            FunctionType::Min => "min",
            FunctionType::Max => "max",
        };
        f.write_str(name)
    }
}

/// Where an aggregation sits in a distributed plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationStep {
    /// Raw input, partial output.
    Partial,
    /// Partial input, partial output.
    Intermediate,
    /// Partial input, final output.
    Final,
    /// Raw input, final output.
    Single,
}

impl AggregationStep {
    /// Whether input rows are raw column values.
    #[must_use]
    pub const fn is_input_raw(self) -> bool {
        matches!(self, AggregationStep::Partial | AggregationStep::Single)
    }

    /// Whether output rows are partial results.
    #[must_use]
    pub const fn is_output_partial(self) -> bool {
        matches!(self, AggregationStep::Partial | AggregationStep::Intermediate)
    }
}

/// Shape of an aggregation: what to read and what to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationDescriptor {
    /// Types of the input columns.
    pub source_types: Vec<DataType>,
    /// One entry per aggregate.
    pub functions: Vec<FunctionType>,
    /// Input column per aggregate; `None` only for COUNT(*) on raw input.
    pub input_channels: Vec<Option<usize>>,
    /// Optional BYTE mask column per aggregate. Missing entries mean no mask.
    pub mask_channels: Vec<Option<usize>>,
    /// Declared result type per aggregate.
    pub output_types: Vec<DataType>,
    /// Plan step.
    pub step: AggregationStep,
}

/// One validated aggregate.
#[derive(Debug, Clone, Copy)]
struct AggregateSpec {
    function: FunctionType,
    input: Option<(usize, DataType)>,
    mask: Option<usize>,
    output_type: DataType,
}

/// Creates [`NativeAggregationOperator`]s; validates the descriptor once.
#[derive(Debug, Clone)]
pub struct NativeAggregationFactory {
    descriptor: AggregationDescriptor,
    specs: Arc<[AggregateSpec]>,
}

impl NativeAggregationFactory {
    /// Validates `descriptor` and builds the factory.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] on arity mismatches, channels out of range,
    ///   non-BYTE masks, or declared output types that differ from the result
    ///   types
    /// - [`Error::Unsupported`] for AVG outside the single step or SUM/AVG of
    ///   strings
    pub fn new(descriptor: AggregationDescriptor) -> Result<Self> {
        let count = descriptor.functions.len();
        if descriptor.input_channels.len() != count || descriptor.output_types.len() != count {
            return Err(Error::invalid_argument(format!(
                "{count} functions need as many input channels ({}) and output types ({})",
                descriptor.input_channels.len(),
                descriptor.output_types.len()
            )));
        }

        let specs = (0..count)
            .map(|i| resolve_spec(&descriptor, i))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            descriptor,
            specs: specs.into(),
        })
    }

    /// The validated descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &AggregationDescriptor {
        &self.descriptor
    }
}

fn resolve_spec(descriptor: &AggregationDescriptor, index: usize) -> Result<AggregateSpec> {
    let function = descriptor.functions[index];
    let step = descriptor.step;
    let column = |channel: usize, what: &str| -> Result<DataType> {
        descriptor.source_types.get(channel).copied().ok_or_else(|| {
            Error::invalid_argument(format!(
                "{what} channel {channel} of aggregate {index} exceeds {} source columns",
                descriptor.source_types.len()
            ))
        })
    };

    let input = match (descriptor.input_channels[index], function) {
        (None, FunctionType::CountAll) if step.is_input_raw() => None,
        (None, _) => {
            return Err(Error::invalid_argument(format!(
                "aggregate {index} ({function}) needs an input channel"
            )));
        }
        (Some(channel), _) => Some((channel, column(channel, "input")?)),
    };

    let mask = descriptor.mask_channels.get(index).copied().flatten();
    if let Some(channel) = mask {
        let mask_type = column(channel, "mask")?;
        if mask_type != DataType::Byte {
            return Err(Error::invalid_argument(format!(
                "mask channel {channel} of aggregate {index} is {mask_type}, expected TINYINT"
            )));
        }
    }

    let result_type = result_type(function, input.map(|(_, t)| t), step)?;
    let output_type = descriptor.output_types[index];
    if output_type != result_type {
        return Err(Error::invalid_argument(format!(
            "aggregate {index} ({function}) produces {result_type}, declared {output_type}"
        )));
    }

    Ok(AggregateSpec {
        function,
        input,
        mask,
        output_type,
    })
}

fn result_type(
    function: FunctionType,
    input: Option<DataType>,
    step: AggregationStep,
) -> Result<DataType> {
    let Some(input) = input else {
        return Ok(DataType::Long);
    };
    match function {
        FunctionType::CountColumn | FunctionType::CountAll => {
            if !step.is_input_raw() && input != DataType::Long {
                return Err(Error::invalid_argument(format!(
                    "partial counts must be BIGINT, got {input}"
                )));
            }
            Ok(DataType::Long)
        }
        FunctionType::Sum => match input {
            DataType::Double => Ok(DataType::Double),
            DataType::Long => Ok(DataType::Long),
            t if t.is_integral() && step.is_input_raw() => Ok(DataType::Long),
            t => Err(Error::unsupported(format!("sum of {t} in {step:?} step"))),
        },
        FunctionType::Avg => {
            if step != AggregationStep::Single {
                return Err(Error::unsupported(format!(
                    "avg is only supported in the Single step, not {step:?}"
                )));
            }
            if !input.is_numeric() {
                return Err(Error::unsupported(format!("avg of {input}")));
            }
            Ok(DataType::Double)
        }
        FunctionType::Min | FunctionType::Max => Ok(input),
    }
}

impl NativeOperatorFactory for NativeAggregationFactory {
    fn create_operator(&self, allocator: &VecAllocator) -> Result<Box<dyn NativeOperator>> {
        Ok(Box::new(NativeAggregationOperator::new(
            Arc::clone(&self.specs),
            self.descriptor.step,
            allocator.clone(),
        )))
    }
}

#[derive(Debug, Clone)]
enum Accumulator {
    SumLong(Option<i64>),
    SumDouble(Option<f64>),
    Count(i64),
    Avg { sum: f64, count: u64 },
    Extreme { value: Option<Value>, keep: Ordering },
}

impl Accumulator {
    fn new(spec: &AggregateSpec) -> Self {
        match spec.function {
            FunctionType::Sum if spec.output_type == DataType::Double => Accumulator::SumDouble(None),
            FunctionType::Sum => Accumulator::SumLong(None),
            FunctionType::CountColumn | FunctionType::CountAll => Accumulator::Count(0),
            FunctionType::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
            FunctionType::Min => Accumulator::Extreme {
                value: None,
                keep: Ordering::Less,
            },
            FunctionType::Max => Accumulator::Extreme {
                value: None,
                keep: Ordering::Greater,
            },
        }
    }

    /// Folds one non-null input value. Partial counts arrive as BIGINTs and
    /// are added rather than counted.
    fn accumulate(&mut self, value: &Value, raw: bool) -> Result<()> {
        match self {
            Accumulator::SumLong(sum) => {
                let v = value
                    .as_integral()
                    .ok_or_else(|| type_error("sum", value))?;
                let next = sum.unwrap_or(0).checked_add(v).ok_or_else(|| {
                    Error::invalid_argument("BIGINT overflow in sum aggregation")
                })?;
                *sum = Some(next);
            }
            Accumulator::SumDouble(sum) => {
                let v = value.as_double().ok_or_else(|| type_error("sum", value))?;
                *sum = Some(sum.unwrap_or(0.0) + v);
            }
            Accumulator::Count(count) => {
                let increment = if raw {
                    1
                } else {
                    value.as_long().ok_or_else(|| type_error("count", value))?
                };
                *count = count.checked_add(increment).ok_or_else(|| {
                    Error::invalid_argument("BIGINT overflow in count aggregation")
                })?;
            }
            Accumulator::Avg { sum, count } => {
                *sum += value.as_f64().ok_or_else(|| type_error("avg", value))?;
                *count += 1;
            }
            Accumulator::Extreme { value: best, keep } => {
                let replace = match best {
                    None => true,
                    Some(current) => compare(value, current)? == *keep,
                };
                if replace {
                    *best = Some(value.clone());
                }
            }
        }
        Ok(())
    }

    fn add_rows(&mut self, rows: usize) -> Result<()> {
        if let Accumulator::Count(count) = self {
            let rows = i64::try_from(rows)
                .map_err(|_| Error::invalid_argument("row count exceeds BIGINT"))?;
            *count = count.checked_add(rows).ok_or_else(|| {
                Error::invalid_argument("BIGINT overflow in count aggregation")
            })?;
        }
        Ok(())
    }

    fn result(&self) -> Value {
        match self {
            Accumulator::SumLong(sum) => sum.map_or(Value::Null, Value::Long),
            Accumulator::SumDouble(sum) => sum.map_or(Value::Null, Value::Double),
            Accumulator::Count(count) => Value::Long(*count),
            Accumulator::Avg { count: 0, .. } => Value::Null,
            Accumulator::Avg { sum, count } => Value::Double(*sum / *count as f64),
            Accumulator::Extreme { value, .. } => value.clone().unwrap_or(Value::Null),
        }
    }
}

fn type_error(function: &str, value: &Value) -> Error {
    Error::invalid_argument(format!("{function} cannot take a {} value", value.type_name()))
}

fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    Ok(match (a, b) {
        (Value::Byte(x), Value::Byte(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Long(x), Value::Long(y)) => x.cmp(y),
        (Value::Double(x), Value::Double(y)) => x.total_cmp(y),
        (Value::VarChar(x), Value::VarChar(y)) => x.as_str().cmp(y.as_str()),
        _ => {
            return Err(Error::invalid_argument(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            )));
        }
    })
}

/// A single-group aggregation over every batch it is given.
#[derive(Debug)]
pub struct NativeAggregationOperator {
    specs: Arc<[AggregateSpec]>,
    step: AggregationStep,
    accumulators: Vec<Accumulator>,
    allocator: VecAllocator,
    emitted: bool,
    closed: bool,
}

impl NativeAggregationOperator {
    fn new(specs: Arc<[AggregateSpec]>, step: AggregationStep, allocator: VecAllocator) -> Self {
        let accumulators = specs.iter().map(Accumulator::new).collect();
        Self {
            specs,
            step,
            accumulators,
            allocator,
            emitted: false,
            closed: false,
        }
    }

    fn column<'a>(batch: &'a VecBatch, channel: usize, expected: DataType) -> Result<&'a AnyVector> {
        let vector = batch.vectors().get(channel).ok_or_else(|| {
            Error::invalid_argument(format!(
                "batch has {} columns, channel {channel} requested",
                batch.vector_count()
            ))
        })?;
        if vector.data_type() != expected {
            return Err(Error::invalid_argument(format!(
                "channel {channel} is {}, expected {expected}",
                vector.data_type()
            )));
        }
        if vector.size() < batch.row_count() {
            return Err(Error::invalid_argument(format!(
                "channel {channel} has {} rows, batch has {}",
                vector.size(),
                batch.row_count()
            )));
        }
        Ok(vector)
    }

    fn selected(mask: Option<&AnyVector>, row: usize) -> Result<bool> {
        let Some(mask) = mask else {
            return Ok(true);
        };
        Ok(match mask.get_value(row)? {
            Value::Byte(flag) => flag != 0,
            _ => false,
        })
    }

    /// Folds `batch` into a copy of the accumulators, so a rejected batch
    /// leaves the committed state untouched.
    fn fold(&self, batch: &VecBatch) -> Result<Vec<Accumulator>> {
        let raw = self.step.is_input_raw();
        let mut accumulators = self.accumulators.clone();
        for (spec, accumulator) in self.specs.iter().zip(accumulators.iter_mut()) {
            let mask = spec
                .mask
                .map(|channel| Self::column(batch, channel, DataType::Byte))
                .transpose()?;
            let input = spec
                .input
                .map(|(channel, data_type)| Self::column(batch, channel, data_type))
                .transpose()?;

            match input {
                None if mask.is_none() => accumulator.add_rows(batch.row_count())?,
                None => {
                    for row in 0..batch.row_count() {
                        if Self::selected(mask, row)? {
                            accumulator.add_rows(1)?;
                        }
                    }
                }
                Some(input) => {
                    for row in 0..batch.row_count() {
                        if !Self::selected(mask, row)? {
                            continue;
                        }
                        match (spec.function, input.get_value(row)?) {
                            (FunctionType::CountAll, _) if raw => accumulator.add_rows(1)?,
                            (_, Value::Null) => {}
                            (_, value) => accumulator.accumulate(&value, raw)?,
                        }
                    }
                }
            }
        }
        Ok(accumulators)
    }
}

impl NativeOperator for NativeAggregationOperator {
    fn add_input(&mut self, mut batch: VecBatch) -> Result<()> {
        if self.closed {
            return Err(Error::illegal_state("aggregation operator is closed"));
        }
        if self.emitted {
            return Err(Error::illegal_state("aggregation result already produced"));
        }
        let folded = self.fold(&batch);
        // Input vectors belong to the runtime now; release them either way.
        let closed = batch.close();
        self.accumulators = folded?;
        closed
    }

    fn get_output(&mut self) -> Result<Option<VecBatch>> {
        if self.closed || self.emitted {
            return Ok(None);
        }
        let vectors = self
            .specs
            .iter()
            .zip(&self.accumulators)
            .map(|(spec, acc)| AnyVector::from_values(&self.allocator, spec.output_type, &[acc.result()]))
            .collect::<Result<Vec<_>>>()?;
        self.emitted = true;
        Ok(Some(VecBatch::new(vectors, 1)))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.accumulators.clear();
        Ok(())
    }
}
