// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! The reducing aggregators: `hash_sum`, `hash_product` and `hash_mean`.
//!
//! All three keep one accumulator per group plus the shared null policy
//! state. Integer accumulators are widened to 64 bits and overflow wraps
//! (two's complement): the result of summing or multiplying integers is
//! the result in modular arithmetic, never an error. Float and decimal
//! accumulators stay at the declared width; only the mean promotes its
//! numeric output to `f64`.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use arrow::array::{ArrayRef, PrimitiveArray};
use arrow::datatypes::{
    ArrowNativeTypeOp, ArrowPrimitiveType, DataType, Decimal128Type,
    Decimal256Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
    Int8Type, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};

use crate::accumulate::{decoded_type, visit_grouped_booleans, visit_grouped_values};
use crate::aggregator::{
    check_mapping, merge_target, AggregateBatch, GroupedAggregator,
};
use crate::error::Result;
use crate::null_policy::NullPolicyState;
use crate::options::{AggregateOptions, ScalarAggregateOptions};

/// The accumulator (and `hash_sum` output) type for an input type. This is
/// the single source of truth for accumulator widening: integers widen to
/// 64 bits, floats and decimals stay at their declared width. Only mean
/// promotes further, see [`mean_out_type`].
pub fn sum_accumulator_type(input: &DataType) -> Result<DataType> {
    match input {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            Ok(DataType::Int64)
        }
        DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Ok(DataType::UInt64),
        DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => Ok(input.clone()),
        other => not_impl_err!("no sum accumulator for input type {other}"),
    }
}

/// The `hash_mean` output type for an input type.
pub fn mean_out_type(input: &DataType) -> Result<DataType> {
    match input {
        DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64 => Ok(DataType::Float64),
        DataType::Decimal128(_, _) => Ok(input.clone()),
        other => not_impl_err!("no mean for input type {other}"),
    }
}

/// `10^scale` in the decimal's native representation, the multiplicative
/// identity of a decimal with that scale.
pub(crate) fn scale_multiplier<N: ArrowNativeTypeOp>(scale: i8) -> N {
    let ten = N::usize_as(10);
    (0..scale.max(0)).fold(N::ONE, |acc, _| acc.mul_wrapping(ten))
}

/// Per-group accumulator vector plus null bookkeeping, shared by the
/// reducing aggregators.
#[derive(Debug)]
struct ReducingState<A: ArrowPrimitiveType> {
    reduced: Vec<A::Native>,
    identity: A::Native,
    policy: NullPolicyState,
}

impl<A: ArrowPrimitiveType> ReducingState<A> {
    fn new(identity: A::Native) -> Self {
        Self {
            reduced: vec![],
            identity,
            policy: NullPolicyState::new(),
        }
    }

    fn resize(&mut self, new_num_groups: usize) {
        self.reduced.resize(new_num_groups, self.identity);
        self.policy.resize(new_num_groups);
    }

    fn num_groups(&self) -> usize {
        self.policy.num_groups()
    }
}

/// A single-accumulator-per-group reducer (`hash_sum`, `hash_product`).
///
/// `C` converts (widens) an input value into the accumulator type; `R`
/// folds a new accumulator value into the existing one.
pub struct GroupedReducer<I, A, C, R>
where
    I: ArrowPrimitiveType + Send,
    A: ArrowPrimitiveType,
    C: Fn(I::Native) -> A::Native + Send + Sync + 'static,
    R: Fn(&mut A::Native, A::Native) + Send + Sync + 'static,
{
    state: ReducingState<A>,
    out_type: DataType,
    options: ScalarAggregateOptions,
    convert: C,
    reduce: R,
    _marker: PhantomData<I>,
}

impl<I, A, C, R> GroupedReducer<I, A, C, R>
where
    I: ArrowPrimitiveType + Send,
    A: ArrowPrimitiveType,
    C: Fn(I::Native) -> A::Native + Send + Sync + 'static,
    R: Fn(&mut A::Native, A::Native) + Send + Sync + 'static,
{
    pub fn new(
        out_type: DataType,
        options: ScalarAggregateOptions,
        identity: A::Native,
        convert: C,
        reduce: R,
    ) -> Self {
        Self {
            state: ReducingState::new(identity),
            out_type,
            options,
            convert,
            reduce,
            _marker: PhantomData,
        }
    }
}

impl<I, A, C, R> GroupedAggregator for GroupedReducer<I, A, C, R>
where
    I: ArrowPrimitiveType + Send,
    A: ArrowPrimitiveType,
    C: Fn(I::Native) -> A::Native + Send + Sync + 'static,
    R: Fn(&mut A::Native, A::Native) + Send + Sync + 'static,
{
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        self.state.resize(new_num_groups);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let reduced = &mut self.state.reduced;
        let counts = &mut self.state.policy.counts;
        let no_nulls = &mut self.state.policy.no_nulls;
        let convert = &self.convert;
        let reduce = &self.reduce;

        visit_grouped_values::<I, _, _>(
            batch.value(0)?,
            batch.group_ids(),
            |g, v| {
                reduce(&mut reduced[g as usize], convert(v));
                counts[g as usize] += 1;
            },
            |g| no_nulls.set_bit(g as usize, false),
        )
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(
            group_id_mapping,
            other.state.num_groups(),
            self.state.num_groups(),
        )?;
        let reduce = &self.reduce;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            reduce(
                &mut self.state.reduced[g as usize],
                other.state.reduced[other_g],
            );
        }
        self.state.policy.merge(&other.state.policy, group_id_mapping);
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let nulls = self.state.policy.build_validity(
            self.options.skip_nulls,
            self.options.min_count,
            |_| true,
        );
        let values = std::mem::take(&mut self.state.reduced);
        Ok(Arc::new(
            PrimitiveArray::<A>::new(values.into(), Some(nulls))
                .with_data_type(self.out_type.clone()),
        ))
    }

    fn out_type(&self) -> DataType {
        self.out_type.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Divides a finished accumulator by the group count at finalize time.
pub trait MeanDivide: ArrowPrimitiveType {
    fn divide(sum: Self::Native, count: i64) -> Self::Native;
}

impl MeanDivide for Float64Type {
    fn divide(sum: f64, count: i64) -> f64 {
        sum / count as f64
    }
}

impl MeanDivide for Decimal128Type {
    /// Decimal means round half away from zero based on the remainder.
    fn divide(sum: i128, count: i64) -> i128 {
        if count == 0 {
            return 0;
        }
        let count = count as i128;
        let mut quotient = sum / count;
        let remainder = sum % count;
        if remainder.unsigned_abs() * 2 >= count.unsigned_abs() {
            quotient += if sum >= 0 { 1 } else { -1 };
        }
        quotient
    }
}

/// `hash_mean`: reduces as a sum, divides by the non-null count at
/// finalize.
pub struct GroupedMean<I, A, C>
where
    I: ArrowPrimitiveType + Send,
    A: MeanDivide,
    C: Fn(I::Native) -> A::Native + Send + Sync + 'static,
{
    state: ReducingState<A>,
    out_type: DataType,
    options: ScalarAggregateOptions,
    convert: C,
    _marker: PhantomData<I>,
}

impl<I, A, C> GroupedMean<I, A, C>
where
    I: ArrowPrimitiveType + Send,
    A: MeanDivide,
    A::Native: ArrowNativeTypeOp,
    C: Fn(I::Native) -> A::Native + Send + Sync + 'static,
{
    pub fn new(
        out_type: DataType,
        options: ScalarAggregateOptions,
        convert: C,
    ) -> Self {
        Self {
            state: ReducingState::new(A::Native::ZERO),
            out_type,
            options,
            convert,
            _marker: PhantomData,
        }
    }
}

impl<I, A, C> GroupedAggregator for GroupedMean<I, A, C>
where
    I: ArrowPrimitiveType + Send,
    A: MeanDivide,
    A::Native: ArrowNativeTypeOp,
    C: Fn(I::Native) -> A::Native + Send + Sync + 'static,
{
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        self.state.resize(new_num_groups);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let reduced = &mut self.state.reduced;
        let counts = &mut self.state.policy.counts;
        let no_nulls = &mut self.state.policy.no_nulls;
        let convert = &self.convert;

        visit_grouped_values::<I, _, _>(
            batch.value(0)?,
            batch.group_ids(),
            |g, v| {
                let acc = &mut reduced[g as usize];
                *acc = acc.add_wrapping(convert(v));
                counts[g as usize] += 1;
            },
            |g| no_nulls.set_bit(g as usize, false),
        )
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(
            group_id_mapping,
            other.state.num_groups(),
            self.state.num_groups(),
        )?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            let acc = &mut self.state.reduced[g as usize];
            *acc = acc.add_wrapping(other.state.reduced[other_g]);
        }
        self.state.policy.merge(&other.state.policy, group_id_mapping);
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let nulls = self.state.policy.build_validity(
            self.options.skip_nulls,
            self.options.min_count,
            |_| true,
        );
        let sums = std::mem::take(&mut self.state.reduced);
        let means: Vec<A::Native> = sums
            .into_iter()
            .zip(self.state.policy.counts.iter())
            .map(|(sum, &count)| A::divide(sum, count))
            .collect();
        Ok(Arc::new(
            PrimitiveArray::<A>::new(means.into(), Some(nulls))
                .with_data_type(self.out_type.clone()),
        ))
    }

    fn out_type(&self) -> DataType {
        self.out_type.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// `hash_mean` over booleans, which average as {0, 1}.
pub struct GroupedBooleanMean {
    state: ReducingState<Float64Type>,
    options: ScalarAggregateOptions,
}

impl GroupedBooleanMean {
    pub fn new(options: ScalarAggregateOptions) -> Self {
        Self {
            state: ReducingState::new(0.0),
            options,
        }
    }
}

impl GroupedAggregator for GroupedBooleanMean {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        self.state.resize(new_num_groups);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let reduced = &mut self.state.reduced;
        let counts = &mut self.state.policy.counts;
        let no_nulls = &mut self.state.policy.no_nulls;

        visit_grouped_booleans(
            batch.value(0)?,
            batch.group_ids(),
            |g, v| {
                reduced[g as usize] += v as u8 as f64;
                counts[g as usize] += 1;
            },
            |g| no_nulls.set_bit(g as usize, false),
        )
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(
            group_id_mapping,
            other.state.num_groups(),
            self.state.num_groups(),
        )?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            self.state.reduced[g as usize] += other.state.reduced[other_g];
        }
        self.state.policy.merge(&other.state.policy, group_id_mapping);
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let nulls = self.state.policy.build_validity(
            self.options.skip_nulls,
            self.options.min_count,
            |_| true,
        );
        let means: Vec<f64> = self
            .state
            .reduced
            .iter()
            .zip(self.state.policy.counts.iter())
            .map(|(&sum, &count)| sum / count as f64)
            .collect();
        Ok(Arc::new(PrimitiveArray::<Float64Type>::new(
            means.into(),
            Some(nulls),
        )))
    }

    fn out_type(&self) -> DataType {
        DataType::Float64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub(crate) fn make_sum(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.scalar_aggregate()?;
    let input = decoded_type(&input_types[0]);
    let out_type = sum_accumulator_type(input)?;

    macro_rules! helper {
        ($in:ty, $acc:ty, $conv:expr) => {
            Ok(Box::new(GroupedReducer::<$in, $acc, _, _>::new(
                out_type,
                options,
                <$acc as ArrowPrimitiveType>::Native::ZERO,
                $conv,
                |x, y| *x = x.add_wrapping(y),
            )))
        };
    }

    match input {
        DataType::Int8 => helper!(Int8Type, Int64Type, |v: i8| v as i64),
        DataType::Int16 => helper!(Int16Type, Int64Type, |v: i16| v as i64),
        DataType::Int32 => helper!(Int32Type, Int64Type, |v: i32| v as i64),
        DataType::Int64 => helper!(Int64Type, Int64Type, |v: i64| v),
        DataType::UInt8 => helper!(UInt8Type, UInt64Type, |v: u8| v as u64),
        DataType::UInt16 => helper!(UInt16Type, UInt64Type, |v: u16| v as u64),
        DataType::UInt32 => helper!(UInt32Type, UInt64Type, |v: u32| v as u64),
        DataType::UInt64 => helper!(UInt64Type, UInt64Type, |v: u64| v),
        DataType::Float32 => helper!(Float32Type, Float32Type, |v: f32| v),
        DataType::Float64 => helper!(Float64Type, Float64Type, |v: f64| v),
        DataType::Decimal128(_, _) => {
            helper!(Decimal128Type, Decimal128Type, |v: i128| v)
        }
        DataType::Decimal256(_, _) => {
            helper!(Decimal256Type, Decimal256Type, |v| v)
        }
        other => not_impl_err!("hash_sum over input type {other}"),
    }
}

pub(crate) fn make_product(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.scalar_aggregate()?;
    let input = decoded_type(&input_types[0]);
    let out_type = sum_accumulator_type(input)?;

    macro_rules! helper {
        ($in:ty, $acc:ty, $conv:expr) => {
            Ok(Box::new(GroupedReducer::<$in, $acc, _, _>::new(
                out_type,
                options,
                <$acc as ArrowPrimitiveType>::Native::ONE,
                $conv,
                |x, y| *x = x.mul_wrapping(y),
            )))
        };
    }

    // Decimal products rescale by 10^scale on every multiply so that the
    // accumulator stays at the declared scale; its identity is 10^scale.
    macro_rules! decimal_helper {
        ($acc:ty, $scale:expr) => {{
            type Native = <$acc as ArrowPrimitiveType>::Native;
            let scale_mul: Native = scale_multiplier($scale);
            Ok(Box::new(GroupedReducer::<$acc, $acc, _, _>::new(
                out_type,
                options,
                scale_mul,
                |v| v,
                move |x: &mut Native, y| {
                    *x = x.mul_wrapping(y).div_wrapping(scale_mul)
                },
            )))
        }};
    }

    match input {
        DataType::Int8 => helper!(Int8Type, Int64Type, |v: i8| v as i64),
        DataType::Int16 => helper!(Int16Type, Int64Type, |v: i16| v as i64),
        DataType::Int32 => helper!(Int32Type, Int64Type, |v: i32| v as i64),
        DataType::Int64 => helper!(Int64Type, Int64Type, |v: i64| v),
        DataType::UInt8 => helper!(UInt8Type, UInt64Type, |v: u8| v as u64),
        DataType::UInt16 => helper!(UInt16Type, UInt64Type, |v: u16| v as u64),
        DataType::UInt32 => helper!(UInt32Type, UInt64Type, |v: u32| v as u64),
        DataType::UInt64 => helper!(UInt64Type, UInt64Type, |v: u64| v),
        DataType::Float32 => helper!(Float32Type, Float32Type, |v: f32| v),
        DataType::Float64 => helper!(Float64Type, Float64Type, |v: f64| v),
        DataType::Decimal128(_, scale) => {
            decimal_helper!(Decimal128Type, *scale)
        }
        DataType::Decimal256(_, scale) => {
            decimal_helper!(Decimal256Type, *scale)
        }
        other => not_impl_err!("hash_product over input type {other}"),
    }
}

pub(crate) fn make_mean(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.scalar_aggregate()?;
    let input = decoded_type(&input_types[0]);
    let out_type = mean_out_type(input)?;

    macro_rules! helper {
        ($in:ty, $conv:expr) => {
            Ok(Box::new(GroupedMean::<$in, Float64Type, _>::new(
                out_type, options, $conv,
            )))
        };
    }

    match input {
        DataType::Boolean => Ok(Box::new(GroupedBooleanMean::new(options))),
        DataType::Int8 => helper!(Int8Type, |v: i8| v as f64),
        DataType::Int16 => helper!(Int16Type, |v: i16| v as f64),
        DataType::Int32 => helper!(Int32Type, |v: i32| v as f64),
        DataType::Int64 => helper!(Int64Type, |v: i64| v as f64),
        DataType::UInt8 => helper!(UInt8Type, |v: u8| v as f64),
        DataType::UInt16 => helper!(UInt16Type, |v: u16| v as f64),
        DataType::UInt32 => helper!(UInt32Type, |v: u32| v as f64),
        DataType::UInt64 => helper!(UInt64Type, |v: u64| v as f64),
        DataType::Float32 => helper!(Float32Type, |v: f32| v as f64),
        DataType::Float64 => helper!(Float64Type, |v: f64| v),
        DataType::Decimal128(_, _) => {
            Ok(Box::new(GroupedMean::<Decimal128Type, Decimal128Type, _>::new(
                out_type,
                options,
                |v| v,
            )))
        }
        other => not_impl_err!("hash_mean over input type {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregateInput;
    use arrow::array::{
        Array, AsArray, BooleanArray, Decimal128Array, Float64Array,
        Int64Array, UInt32Array,
    };

    fn int64_batch(
        values: Vec<Option<i64>>,
        groups: Vec<u32>,
    ) -> AggregateBatch {
        AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(Int64Array::from(values))),
            UInt32Array::from(groups),
        )
        .unwrap()
    }

    #[test]
    fn sum_int64() {
        let mut agg = make_sum(&[DataType::Int64], &AggregateOptions::None)
            .unwrap();
        agg.resize(2).unwrap();
        agg.consume(&int64_batch(
            vec![Some(1), Some(2), Some(3), None, Some(5)],
            vec![0, 1, 0, 1, 0],
        ))
        .unwrap();

        let out = agg.finalize().unwrap();
        let out = out.as_primitive::<Int64Type>();
        assert_eq!(out.value(0), 9);
        assert_eq!(out.value(1), 2);
        assert!(out.is_valid(0) && out.is_valid(1));
    }

    #[test]
    fn sum_integer_overflow_wraps() {
        let mut agg = make_sum(&[DataType::Int64], &AggregateOptions::None)
            .unwrap();
        agg.resize(1).unwrap();
        agg.consume(&int64_batch(vec![Some(i64::MAX), Some(1)], vec![0, 0]))
            .unwrap();
        let out = agg.finalize().unwrap();
        assert_eq!(out.as_primitive::<Int64Type>().value(0), i64::MIN);
    }

    #[test]
    fn sum_empty_group_is_null() {
        let mut agg = make_sum(&[DataType::Int64], &AggregateOptions::None)
            .unwrap();
        agg.resize(3).unwrap();
        agg.consume(&int64_batch(vec![Some(1)], vec![0])).unwrap();
        let out = agg.finalize().unwrap();
        assert!(out.is_valid(0));
        assert!(out.is_null(1));
        assert!(out.is_null(2));
    }

    #[test]
    fn sum_widens_integers_only() {
        let agg = make_sum(&[DataType::Int8], &AggregateOptions::None).unwrap();
        assert_eq!(agg.out_type(), DataType::Int64);
        // floats keep their width; only the mean promotes
        let agg =
            make_sum(&[DataType::Float32], &AggregateOptions::None).unwrap();
        assert_eq!(agg.out_type(), DataType::Float32);
        let agg =
            make_mean(&[DataType::Float32], &AggregateOptions::None).unwrap();
        assert_eq!(agg.out_type(), DataType::Float64);
    }

    #[test]
    fn product_identity_and_wrap() {
        let mut agg =
            make_product(&[DataType::Int64], &AggregateOptions::None).unwrap();
        agg.resize(2).unwrap();
        agg.consume(&int64_batch(
            vec![Some(3), Some(5), Some(4)],
            vec![0, 1, 0],
        ))
        .unwrap();
        let out = agg.finalize().unwrap();
        let out = out.as_primitive::<Int64Type>();
        assert_eq!(out.value(0), 12);
        assert_eq!(out.value(1), 5);
    }

    #[test]
    fn decimal_product_rescales() {
        // 1.50 * 2.00 = 3.00 at scale 2
        let values = Decimal128Array::from(vec![150_i128, 200])
            .with_precision_and_scale(10, 2)
            .unwrap();
        let batch = AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(values)),
            UInt32Array::from(vec![0_u32, 0]),
        )
        .unwrap();
        let mut agg = make_product(
            &[DataType::Decimal128(10, 2)],
            &AggregateOptions::None,
        )
        .unwrap();
        agg.resize(1).unwrap();
        agg.consume(&batch).unwrap();
        let out = agg.finalize().unwrap();
        assert_eq!(out.as_primitive::<Decimal128Type>().value(0), 300);
    }

    #[test]
    fn mean_skip_nulls_false_masks_groups_with_nulls() {
        let values = Float64Array::from(vec![
            Some(1.0),
            Some(2.0),
            Some(3.0),
            None,
            Some(5.0),
        ]);
        let batch = AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(values)),
            UInt32Array::from(vec![0, 1, 0, 1, 0]),
        )
        .unwrap();
        let options =
            AggregateOptions::ScalarAggregate(ScalarAggregateOptions {
                skip_nulls: false,
                min_count: 1,
            });
        let mut agg = make_mean(&[DataType::Float64], &options).unwrap();
        agg.resize(2).unwrap();
        agg.consume(&batch).unwrap();
        let out = agg.finalize().unwrap();
        let out = out.as_primitive::<Float64Type>();
        assert_eq!(out.value(0), 3.0);
        assert!(out.is_null(1));
    }

    #[test]
    fn mean_of_booleans() {
        let values = BooleanArray::from(vec![
            Some(true),
            Some(false),
            Some(true),
            None,
        ]);
        let batch = AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(values)),
            UInt32Array::from(vec![0, 0, 0, 1]),
        )
        .unwrap();
        let mut agg =
            make_mean(&[DataType::Boolean], &AggregateOptions::None).unwrap();
        agg.resize(2).unwrap();
        agg.consume(&batch).unwrap();
        let out = agg.finalize().unwrap();
        let out = out.as_primitive::<Float64Type>();
        assert!((out.value(0) - 2.0 / 3.0).abs() < 1e-12);
        assert!(out.is_null(1));
    }

    #[test]
    fn decimal_mean_rounds_half_away_from_zero() {
        // sum 1.00 + 1.01 = 2.01 over 2 values -> 1.005 -> rounds to 1.01
        let values = Decimal128Array::from(vec![100_i128, 101])
            .with_precision_and_scale(10, 2)
            .unwrap();
        let batch = AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(values)),
            UInt32Array::from(vec![0_u32, 0]),
        )
        .unwrap();
        let mut agg = make_mean(
            &[DataType::Decimal128(10, 2)],
            &AggregateOptions::None,
        )
        .unwrap();
        agg.resize(1).unwrap();
        agg.consume(&batch).unwrap();
        let out = agg.finalize().unwrap();
        assert_eq!(out.as_primitive::<Decimal128Type>().value(0), 101);

        // negative sums round away from zero too
        assert_eq!(<Decimal128Type as MeanDivide>::divide(-201_i128, 2), -101);
        assert_eq!(
            <Decimal128Type as MeanDivide>::divide(-200_i128, 3),
            -67
        );
    }

    #[test]
    fn sum_merge_remaps_groups() {
        let mut a = make_sum(&[DataType::Int64], &AggregateOptions::None)
            .unwrap();
        a.resize(2).unwrap();
        a.consume(&int64_batch(vec![Some(1), Some(10)], vec![0, 1]))
            .unwrap();

        let mut b = make_sum(&[DataType::Int64], &AggregateOptions::None)
            .unwrap();
        b.resize(2).unwrap();
        b.consume(&int64_batch(vec![Some(100), Some(1000)], vec![0, 1]))
            .unwrap();

        a.merge(b, &[1, 0]).unwrap();
        let out = a.finalize().unwrap();
        let out = out.as_primitive::<Int64Type>();
        assert_eq!(out.value(0), 1001);
        assert_eq!(out.value(1), 110);
    }

    #[test]
    fn half_float_sum_is_not_implemented() {
        let err = make_sum(&[DataType::Float16], &AggregateOptions::None)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::AggregateError::NotImplemented(_)
        ));
    }
}
