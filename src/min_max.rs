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

//! `hash_min_max`, `hash_min` and `hash_max`.
//!
//! Both extrema are tracked together: per group a `min` accumulator
//! starting at the type's *anti-minimum* (its maximum sentinel) and a
//! `max` accumulator starting at the anti-maximum, plus `has_values` /
//! `has_nulls` bits. `hash_min` and `hash_max` run the same state and
//! emit a single field of the `{min, max}` struct.

use std::any::Any;
use std::cmp::Ordering;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, BooleanBufferBuilder, GenericBinaryBuilder,
    GenericStringBuilder, PrimitiveArray, StructArray,
};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{
    i256, ArrowNativeTypeOp, ArrowPrimitiveType, DataType, Decimal128Type,
    Decimal256Type, Field, Fields, Float16Type, Float32Type, Float64Type,
    Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type,
    UInt64Type, UInt8Type,
};
use half::f16;

use crate::accumulate::{
    decoded_type, visit_grouped_booleans, visit_grouped_bytes,
    visit_grouped_values,
};
use crate::aggregator::{
    check_mapping, merge_target, AggregateBatch, GroupedAggregator,
};
use crate::error::Result;
use crate::options::{AggregateOptions, ScalarAggregateOptions};

/// Which part of the `{min, max}` state an aggregator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MinMaxEmit {
    Struct,
    MinOnly,
    MaxOnly,
}

/// The identities the two accumulators start from: `anti_min` is the
/// type's maximum sentinel (so any value is smaller) and `anti_max` its
/// minimum sentinel.
pub trait AntiExtrema {
    const ANTI_MIN: Self;
    const ANTI_MAX: Self;
}

macro_rules! anti_extrema {
    ($native:ty, $anti_min:expr, $anti_max:expr) => {
        impl AntiExtrema for $native {
            const ANTI_MIN: $native = $anti_min;
            const ANTI_MAX: $native = $anti_max;
        }
    };
}

anti_extrema!(i8, i8::MAX, i8::MIN);
anti_extrema!(i16, i16::MAX, i16::MIN);
anti_extrema!(i32, i32::MAX, i32::MIN);
anti_extrema!(i64, i64::MAX, i64::MIN);
anti_extrema!(u8, u8::MAX, u8::MIN);
anti_extrema!(u16, u16::MAX, u16::MIN);
anti_extrema!(u32, u32::MAX, u32::MIN);
anti_extrema!(u64, u64::MAX, u64::MIN);
anti_extrema!(f16, f16::INFINITY, f16::NEG_INFINITY);
anti_extrema!(f32, f32::INFINITY, f32::NEG_INFINITY);
anti_extrema!(f64, f64::INFINITY, f64::NEG_INFINITY);
anti_extrema!(i128, i128::MAX, i128::MIN);
anti_extrema!(i256, i256::MAX, i256::MIN);

/// Grouped min/max over primitive inputs.
pub struct GroupedMinMax<T: ArrowPrimitiveType>
where
    T::Native: AntiExtrema,
{
    data_type: DataType,
    options: ScalarAggregateOptions,
    emit: MinMaxEmit,
    mins: Vec<T::Native>,
    maxes: Vec<T::Native>,
    has_values: BooleanBufferBuilder,
    has_nulls: BooleanBufferBuilder,
}

impl<T: ArrowPrimitiveType> GroupedMinMax<T>
where
    T::Native: AntiExtrema,
{
    pub(crate) fn new(
        data_type: DataType,
        options: ScalarAggregateOptions,
        emit: MinMaxEmit,
    ) -> Self {
        Self {
            data_type,
            options,
            emit,
            mins: vec![],
            maxes: vec![],
            has_values: BooleanBufferBuilder::new(0),
            has_nulls: BooleanBufferBuilder::new(0),
        }
    }

    fn num_groups(&self) -> usize {
        self.mins.len()
    }
}

/// The output validity shared by all min/max variants:
/// `has_values AND (skip_nulls OR NOT has_nulls)`.
fn min_max_validity(
    num_groups: usize,
    has_values: &BooleanBufferBuilder,
    has_nulls: &BooleanBufferBuilder,
    skip_nulls: bool,
) -> NullBuffer {
    let mut builder = BooleanBufferBuilder::new(num_groups);
    for g in 0..num_groups {
        builder.append(
            has_values.get_bit(g) && (skip_nulls || !has_nulls.get_bit(g)),
        );
    }
    NullBuffer::new(builder.finish())
}

/// Assembles the `{min, max}` struct (or one of its fields) from the two
/// finished accumulator arrays.
fn emit_min_max(
    emit: MinMaxEmit,
    data_type: &DataType,
    mins: ArrayRef,
    maxes: ArrayRef,
) -> ArrayRef {
    match emit {
        MinMaxEmit::MinOnly => mins,
        MinMaxEmit::MaxOnly => maxes,
        MinMaxEmit::Struct => {
            let fields = Fields::from(vec![
                Field::new("min", data_type.clone(), true),
                Field::new("max", data_type.clone(), true),
            ]);
            Arc::new(StructArray::new(fields, vec![mins, maxes], None))
        }
    }
}

fn min_max_out_type(emit: MinMaxEmit, data_type: &DataType) -> DataType {
    match emit {
        MinMaxEmit::MinOnly | MinMaxEmit::MaxOnly => data_type.clone(),
        MinMaxEmit::Struct => DataType::Struct(Fields::from(vec![
            Field::new("min", data_type.clone(), true),
            Field::new("max", data_type.clone(), true),
        ])),
    }
}

impl<T: ArrowPrimitiveType> GroupedAggregator for GroupedMinMax<T>
where
    T::Native: AntiExtrema + ArrowNativeTypeOp,
{
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        let added = new_num_groups - self.mins.len();
        self.mins.resize(new_num_groups, T::Native::ANTI_MIN);
        self.maxes.resize(new_num_groups, T::Native::ANTI_MAX);
        self.has_values.append_n(added, false);
        self.has_nulls.append_n(added, false);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let mins = &mut self.mins;
        let maxes = &mut self.maxes;
        let has_values = &mut self.has_values;
        let has_nulls = &mut self.has_nulls;

        visit_grouped_values::<T, _, _>(
            batch.value(0)?,
            batch.group_ids(),
            |g, v| {
                let g = g as usize;
                if v.compare(mins[g]) == Ordering::Less {
                    mins[g] = v;
                }
                if v.compare(maxes[g]) == Ordering::Greater {
                    maxes[g] = v;
                }
                has_values.set_bit(g, true);
            },
            |g| has_nulls.set_bit(g as usize, true),
        )
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(group_id_mapping, other.num_groups(), self.num_groups())?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            let g = g as usize;
            if other.has_values.get_bit(other_g) {
                let v = other.mins[other_g];
                if v.compare(self.mins[g]) == Ordering::Less {
                    self.mins[g] = v;
                }
                let v = other.maxes[other_g];
                if v.compare(self.maxes[g]) == Ordering::Greater {
                    self.maxes[g] = v;
                }
                self.has_values.set_bit(g, true);
            }
            if other.has_nulls.get_bit(other_g) {
                self.has_nulls.set_bit(g, true);
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let validity = min_max_validity(
            self.num_groups(),
            &self.has_values,
            &self.has_nulls,
            self.options.skip_nulls,
        );
        let mins: ArrayRef = Arc::new(
            PrimitiveArray::<T>::new(
                std::mem::take(&mut self.mins).into(),
                Some(validity.clone()),
            )
            .with_data_type(self.data_type.clone()),
        );
        let maxes: ArrayRef = Arc::new(
            PrimitiveArray::<T>::new(
                std::mem::take(&mut self.maxes).into(),
                Some(validity),
            )
            .with_data_type(self.data_type.clone()),
        );
        Ok(emit_min_max(self.emit, &self.data_type, mins, maxes))
    }

    fn out_type(&self) -> DataType {
        min_max_out_type(self.emit, &self.data_type)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Grouped min/max over booleans: `min` starts true, `max` starts false.
pub struct GroupedBooleanMinMax {
    options: ScalarAggregateOptions,
    emit: MinMaxEmit,
    mins: BooleanBufferBuilder,
    maxes: BooleanBufferBuilder,
    has_values: BooleanBufferBuilder,
    has_nulls: BooleanBufferBuilder,
    num_groups: usize,
}

impl GroupedBooleanMinMax {
    pub(crate) fn new(
        options: ScalarAggregateOptions,
        emit: MinMaxEmit,
    ) -> Self {
        Self {
            options,
            emit,
            mins: BooleanBufferBuilder::new(0),
            maxes: BooleanBufferBuilder::new(0),
            has_values: BooleanBufferBuilder::new(0),
            has_nulls: BooleanBufferBuilder::new(0),
            num_groups: 0,
        }
    }
}

impl GroupedAggregator for GroupedBooleanMinMax {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        let added = new_num_groups - self.num_groups;
        self.num_groups = new_num_groups;
        self.mins.append_n(added, true);
        self.maxes.append_n(added, false);
        self.has_values.append_n(added, false);
        self.has_nulls.append_n(added, false);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let mins = &mut self.mins;
        let maxes = &mut self.maxes;
        let has_values = &mut self.has_values;
        let has_nulls = &mut self.has_nulls;

        visit_grouped_booleans(
            batch.value(0)?,
            batch.group_ids(),
            |g, v| {
                let g = g as usize;
                if !v {
                    mins.set_bit(g, false);
                }
                if v {
                    maxes.set_bit(g, true);
                }
                has_values.set_bit(g, true);
            },
            |g| has_nulls.set_bit(g as usize, true),
        )
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(group_id_mapping, other.num_groups, self.num_groups)?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            let g = g as usize;
            if other.has_values.get_bit(other_g) {
                if !other.mins.get_bit(other_g) {
                    self.mins.set_bit(g, false);
                }
                if other.maxes.get_bit(other_g) {
                    self.maxes.set_bit(g, true);
                }
                self.has_values.set_bit(g, true);
            }
            if other.has_nulls.get_bit(other_g) {
                self.has_nulls.set_bit(g, true);
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let validity = min_max_validity(
            self.num_groups,
            &self.has_values,
            &self.has_nulls,
            self.options.skip_nulls,
        );
        let mins: ArrayRef = Arc::new(BooleanArray::new(
            self.mins.finish(),
            Some(validity.clone()),
        ));
        let maxes: ArrayRef = Arc::new(BooleanArray::new(
            self.maxes.finish(),
            Some(validity),
        ));
        Ok(emit_min_max(self.emit, &DataType::Boolean, mins, maxes))
    }

    fn out_type(&self) -> DataType {
        min_max_out_type(self.emit, &DataType::Boolean)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Grouped min/max over string and binary inputs: each accumulator is an
/// owned byte string, compared lexicographically.
pub struct GroupedMinMaxBytes {
    data_type: DataType,
    options: ScalarAggregateOptions,
    emit: MinMaxEmit,
    mins: Vec<Option<Vec<u8>>>,
    maxes: Vec<Option<Vec<u8>>>,
    has_nulls: BooleanBufferBuilder,
}

impl GroupedMinMaxBytes {
    pub(crate) fn new(
        data_type: DataType,
        options: ScalarAggregateOptions,
        emit: MinMaxEmit,
    ) -> Self {
        Self {
            data_type,
            options,
            emit,
            mins: vec![],
            maxes: vec![],
            has_nulls: BooleanBufferBuilder::new(0),
        }
    }

    fn set_min(slot: &mut Option<Vec<u8>>, value: &[u8]) {
        match slot {
            Some(existing) => {
                if value < existing.as_slice() {
                    existing.clear();
                    existing.extend_from_slice(value);
                }
            }
            None => *slot = Some(value.to_vec()),
        }
    }

    fn set_max(slot: &mut Option<Vec<u8>>, value: &[u8]) {
        match slot {
            Some(existing) => {
                if value > existing.as_slice() {
                    existing.clear();
                    existing.extend_from_slice(value);
                }
            }
            None => *slot = Some(value.to_vec()),
        }
    }
}

/// Builds the output array for one finished byte-string accumulator
/// vector, checking 32-bit offset overflow for the narrow-offset types.
pub(crate) fn build_bytes_array(
    data_type: &DataType,
    values: Vec<Option<Vec<u8>>>,
    validity: &NullBuffer,
) -> Result<ArrayRef> {
    let total_bytes: usize = values
        .iter()
        .enumerate()
        .filter(|(g, _)| validity.is_valid(*g))
        .filter_map(|(_, v)| v.as_ref().map(|v| v.len()))
        .sum();
    if matches!(data_type, DataType::Utf8 | DataType::Binary)
        && total_bytes > i32::MAX as usize
    {
        return invalid_err!(
            "aggregated byte output exceeds the 32-bit offset capacity, \
             use the large variant of the input type"
        );
    }

    macro_rules! build_string {
        ($offset:ty) => {{
            let mut builder = GenericStringBuilder::<$offset>::with_capacity(
                values.len(),
                total_bytes,
            );
            for (g, value) in values.into_iter().enumerate() {
                match value.filter(|_| validity.is_valid(g)) {
                    // value bytes came from a string array and stay valid utf-8
                    Some(v) => builder.append_value(unsafe {
                        std::str::from_utf8_unchecked(&v)
                    }),
                    None => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()) as ArrayRef)
        }};
    }
    macro_rules! build_binary {
        ($offset:ty) => {{
            let mut builder = GenericBinaryBuilder::<$offset>::with_capacity(
                values.len(),
                total_bytes,
            );
            for (g, value) in values.into_iter().enumerate() {
                match value.filter(|_| validity.is_valid(g)) {
                    Some(v) => builder.append_value(&v),
                    None => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()) as ArrayRef)
        }};
    }

    match data_type {
        DataType::Utf8 => build_string!(i32),
        DataType::LargeUtf8 => build_string!(i64),
        DataType::Binary => build_binary!(i32),
        DataType::LargeBinary => build_binary!(i64),
        other => not_impl_err!("byte aggregation output for type {other}"),
    }
}

impl GroupedAggregator for GroupedMinMaxBytes {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        let added = new_num_groups - self.mins.len();
        self.mins.resize(new_num_groups, None);
        self.maxes.resize(new_num_groups, None);
        self.has_nulls.append_n(added, false);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let mins = &mut self.mins;
        let maxes = &mut self.maxes;
        let has_nulls = &mut self.has_nulls;

        visit_grouped_bytes(batch.value(0)?, batch.group_ids(), |g, value| {
            let g = g as usize;
            match value {
                Some(v) => {
                    Self::set_min(&mut mins[g], v);
                    Self::set_max(&mut maxes[g], v);
                }
                None => has_nulls.set_bit(g, true),
            }
        })
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(group_id_mapping, other.mins.len(), self.mins.len())?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            let g = g as usize;
            if let Some(v) = &other.mins[other_g] {
                Self::set_min(&mut self.mins[g], v);
            }
            if let Some(v) = &other.maxes[other_g] {
                Self::set_max(&mut self.maxes[g], v);
            }
            if other.has_nulls.get_bit(other_g) {
                self.has_nulls.set_bit(g, true);
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let num_groups = self.mins.len();
        // has_values is implied by a populated min slot
        let mut has_values = BooleanBufferBuilder::new(num_groups);
        for slot in &self.mins {
            has_values.append(slot.is_some());
        }
        let validity = min_max_validity(
            num_groups,
            &has_values,
            &self.has_nulls,
            self.options.skip_nulls,
        );
        let mins = build_bytes_array(
            &self.data_type,
            std::mem::take(&mut self.mins),
            &validity,
        )?;
        let maxes = build_bytes_array(
            &self.data_type,
            std::mem::take(&mut self.maxes),
            &validity,
        )?;
        Ok(emit_min_max(self.emit, &self.data_type, mins, maxes))
    }

    fn out_type(&self) -> DataType {
        min_max_out_type(self.emit, &self.data_type)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub(crate) fn make_min_max_impl(
    input: &DataType,
    options: ScalarAggregateOptions,
    emit: MinMaxEmit,
) -> Result<Box<dyn GroupedAggregator>> {
    macro_rules! helper {
        ($in:ty) => {
            Ok(Box::new(GroupedMinMax::<$in>::new(
                input.clone(),
                options,
                emit,
            )))
        };
    }

    match input {
        DataType::Boolean => {
            Ok(Box::new(GroupedBooleanMinMax::new(options, emit)))
        }
        DataType::Int8 => helper!(Int8Type),
        DataType::Int16 => helper!(Int16Type),
        DataType::Int32 => helper!(Int32Type),
        DataType::Int64 => helper!(Int64Type),
        DataType::UInt8 => helper!(UInt8Type),
        DataType::UInt16 => helper!(UInt16Type),
        DataType::UInt32 => helper!(UInt32Type),
        DataType::UInt64 => helper!(UInt64Type),
        DataType::Float16 => helper!(Float16Type),
        DataType::Float32 => helper!(Float32Type),
        DataType::Float64 => helper!(Float64Type),
        DataType::Decimal128(_, _) => helper!(Decimal128Type),
        DataType::Decimal256(_, _) => helper!(Decimal256Type),
        DataType::Utf8
        | DataType::LargeUtf8
        | DataType::Binary
        | DataType::LargeBinary => Ok(Box::new(GroupedMinMaxBytes::new(
            input.clone(),
            options,
            emit,
        ))),
        other => not_impl_err!("hash_min_max over input type {other}"),
    }
}

pub(crate) fn make_min_max(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.scalar_aggregate()?;
    make_min_max_impl(
        decoded_type(&input_types[0]),
        options,
        MinMaxEmit::Struct,
    )
}

pub(crate) fn make_min(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.scalar_aggregate()?;
    make_min_max_impl(
        decoded_type(&input_types[0]),
        options,
        MinMaxEmit::MinOnly,
    )
}

pub(crate) fn make_max(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.scalar_aggregate()?;
    make_min_max_impl(
        decoded_type(&input_types[0]),
        options,
        MinMaxEmit::MaxOnly,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregateInput;
    use arrow::array::{Array, AsArray, Int32Array, StringArray, UInt32Array};

    fn int32_batch(
        values: Vec<Option<i32>>,
        groups: Vec<u32>,
    ) -> AggregateBatch {
        AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(Int32Array::from(values))),
            UInt32Array::from(groups),
        )
        .unwrap()
    }

    #[test]
    fn min_max_struct_int32() {
        let mut agg =
            make_min_max(&[DataType::Int32], &AggregateOptions::None).unwrap();
        agg.resize(2).unwrap();
        agg.consume(&int32_batch(
            vec![Some(4), Some(7), Some(1), Some(2), Some(9)],
            vec![0, 1, 0, 1, 0],
        ))
        .unwrap();

        let out = agg.finalize().unwrap();
        let out = out.as_struct();
        let mins = out.column(0).as_primitive::<Int32Type>();
        let maxes = out.column(1).as_primitive::<Int32Type>();
        assert_eq!(mins.value(0), 1);
        assert_eq!(maxes.value(0), 9);
        assert_eq!(mins.value(1), 2);
        assert_eq!(maxes.value(1), 7);
    }

    #[test]
    fn empty_group_is_null_and_nulls_are_skipped() {
        let mut agg =
            make_min_max(&[DataType::Int32], &AggregateOptions::None).unwrap();
        agg.resize(3).unwrap();
        agg.consume(&int32_batch(vec![Some(5), None], vec![0, 0])).unwrap();

        let out = agg.finalize().unwrap();
        let mins = out.as_struct().column(0).as_primitive::<Int32Type>();
        assert_eq!(mins.value(0), 5);
        assert!(mins.is_null(1));
        assert!(mins.is_null(2));
    }

    #[test]
    fn skip_nulls_false_masks_groups_with_nulls() {
        let options =
            AggregateOptions::ScalarAggregate(ScalarAggregateOptions {
                skip_nulls: false,
                min_count: 1,
            });
        let mut agg = make_min(&[DataType::Int32], &options).unwrap();
        agg.resize(2).unwrap();
        agg.consume(&int32_batch(
            vec![Some(5), None, Some(3)],
            vec![0, 0, 1],
        ))
        .unwrap();

        let out = agg.finalize().unwrap();
        let out = out.as_primitive::<Int32Type>();
        assert!(out.is_null(0));
        assert_eq!(out.value(1), 3);
    }

    #[test]
    fn min_max_merge() {
        let mut a =
            make_min_max(&[DataType::Int32], &AggregateOptions::None).unwrap();
        a.resize(2).unwrap();
        a.consume(&int32_batch(vec![Some(4), Some(7)], vec![0, 1])).unwrap();

        let mut b =
            make_min_max(&[DataType::Int32], &AggregateOptions::None).unwrap();
        b.resize(2).unwrap();
        b.consume(&int32_batch(vec![Some(-1), Some(100)], vec![0, 1]))
            .unwrap();

        a.merge(b, &[1, 0]).unwrap();
        let out = a.finalize().unwrap();
        let out = out.as_struct();
        let mins = out.column(0).as_primitive::<Int32Type>();
        let maxes = out.column(1).as_primitive::<Int32Type>();
        // b group 0 (-1) landed in a group 1; b group 1 (100) in a group 0
        assert_eq!((mins.value(0), maxes.value(0)), (4, 100));
        assert_eq!((mins.value(1), maxes.value(1)), (-1, 7));
    }

    #[test]
    fn min_max_strings() {
        let values = StringArray::from(vec![
            Some("pear"),
            Some("apple"),
            None,
            Some("zucchini"),
        ]);
        let batch = AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(values)),
            UInt32Array::from(vec![0, 0, 1, 0]),
        )
        .unwrap();
        let mut agg =
            make_min_max(&[DataType::Utf8], &AggregateOptions::None).unwrap();
        agg.resize(2).unwrap();
        agg.consume(&batch).unwrap();

        let out = agg.finalize().unwrap();
        let out = out.as_struct();
        let mins = out.column(0).as_string::<i32>();
        let maxes = out.column(1).as_string::<i32>();
        assert_eq!(mins.value(0), "apple");
        assert_eq!(maxes.value(0), "zucchini");
        assert!(mins.is_null(1)); // only a null reached group 1
    }

    #[test]
    fn booleans_use_true_false_sentinels() {
        let values = BooleanArray::from(vec![Some(false), Some(true), None]);
        let batch = AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(values)),
            UInt32Array::from(vec![0, 0, 1]),
        )
        .unwrap();
        let mut agg =
            make_min_max(&[DataType::Boolean], &AggregateOptions::None)
                .unwrap();
        agg.resize(2).unwrap();
        agg.consume(&batch).unwrap();

        let out = agg.finalize().unwrap();
        let out = out.as_struct();
        assert!(!out.column(0).as_boolean().value(0));
        assert!(out.column(1).as_boolean().value(0));
        assert!(out.column(0).as_boolean().is_null(1));
    }

    #[test]
    fn hash_min_emits_input_type() {
        let agg = make_min(
            &[DataType::Decimal128(10, 2)],
            &AggregateOptions::None,
        )
        .unwrap();
        assert_eq!(agg.out_type(), DataType::Decimal128(10, 2));
    }
}
