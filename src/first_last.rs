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

//! `hash_first_last`, `hash_first` and `hash_last`.
//!
//! These aggregators are *ordered*: the caller contracts to deliver
//! batches in the intended total order, and the merge is asymmetric —
//! `self` is the earlier segment, `other` the later one. `self`'s first
//! wins whenever `self` has seen any value; `other`'s last always wins.

use std::any::Any;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, BooleanBufferBuilder, PrimitiveArray, StructArray,
};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Decimal128Type, Decimal256Type, Field,
    Fields, Float16Type, Float32Type, Float64Type, Int16Type, Int32Type,
    Int64Type, Int8Type, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};

use crate::accumulate::{
    decoded_type, visit_grouped_booleans, visit_grouped_bytes,
    visit_grouped_values,
};
use crate::aggregator::{
    check_mapping, merge_target, AggregateBatch, GroupedAggregator,
};
use crate::error::Result;
use crate::min_max::build_bytes_array;
use crate::options::{AggregateOptions, ScalarAggregateOptions};

/// Which part of the `{first, last}` state an aggregator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FirstLastEmit {
    Struct,
    FirstOnly,
    LastOnly,
}

/// The per-group flag set shared by every first/last implementation.
#[derive(Debug)]
struct FirstLastFlags {
    /// At least one non-null value reached the group.
    has_values: BooleanBufferBuilder,
    /// At least one row (null or not) reached the group.
    has_any_values: BooleanBufferBuilder,
    first_is_nulls: BooleanBufferBuilder,
    last_is_nulls: BooleanBufferBuilder,
    num_groups: usize,
}

impl FirstLastFlags {
    fn new() -> Self {
        Self {
            has_values: BooleanBufferBuilder::new(0),
            has_any_values: BooleanBufferBuilder::new(0),
            first_is_nulls: BooleanBufferBuilder::new(0),
            last_is_nulls: BooleanBufferBuilder::new(0),
            num_groups: 0,
        }
    }

    fn resize(&mut self, new_num_groups: usize) {
        let added = new_num_groups - self.num_groups;
        self.num_groups = new_num_groups;
        self.has_values.append_n(added, false);
        self.has_any_values.append_n(added, false);
        self.first_is_nulls.append_n(added, false);
        self.last_is_nulls.append_n(added, false);
    }

    /// Flag updates for one non-null row; returns whether this is the
    /// group's first non-null value.
    fn on_value(&mut self, g: usize) -> bool {
        let is_first = !self.has_values.get_bit(g);
        if is_first {
            self.has_values.set_bit(g, true);
            self.has_any_values.set_bit(g, true);
        }
        // once first_is_nulls is set it never changes
        self.last_is_nulls.set_bit(g, false);
        is_first
    }

    fn on_null(&mut self, g: usize) {
        if !self.has_values.get_bit(g) {
            self.first_is_nulls.set_bit(g, true);
            self.has_any_values.set_bit(g, true);
        }
        self.last_is_nulls.set_bit(g, true);
    }

    /// The asymmetric flag merge; returns `(take_first, take_last)` for
    /// the value slots.
    fn merge_group(&mut self, g: usize, other: &FirstLastFlags, other_g: usize) -> (bool, bool) {
        let other_has_values = other.has_values.get_bit(other_g);
        let take_first = !self.has_values.get_bit(g) && other_has_values;
        // the later segment's last always wins when it has one
        let take_last = other_has_values;

        // an untouched group adopts the other side's leading null
        if !self.has_any_values.get_bit(g) {
            self.first_is_nulls
                .set_bit(g, other.first_is_nulls.get_bit(other_g));
        }
        if other.last_is_nulls.get_bit(other_g) {
            self.last_is_nulls.set_bit(g, true);
        }
        if other_has_values {
            self.has_values.set_bit(g, true);
        }
        if other.has_any_values.get_bit(other_g) {
            self.has_any_values.set_bit(g, true);
        }
        (take_first, take_last)
    }

    /// Output masks per the ordered-aggregate policy: with `skip_nulls`
    /// a slot is valid iff the group saw a value; without, a leading or
    /// trailing null is surfaced as null.
    fn build_validity(&self, skip_nulls: bool) -> (NullBuffer, NullBuffer) {
        let mut first = BooleanBufferBuilder::new(self.num_groups);
        let mut last = BooleanBufferBuilder::new(self.num_groups);
        for g in 0..self.num_groups {
            let has_value = self.has_values.get_bit(g);
            if skip_nulls {
                first.append(has_value);
                last.append(has_value);
            } else {
                first.append(!self.first_is_nulls.get_bit(g) && has_value);
                last.append(!self.last_is_nulls.get_bit(g) && has_value);
            }
        }
        (
            NullBuffer::new(first.finish()),
            NullBuffer::new(last.finish()),
        )
    }
}

fn emit_first_last(
    emit: FirstLastEmit,
    data_type: &DataType,
    firsts: ArrayRef,
    lasts: ArrayRef,
) -> ArrayRef {
    match emit {
        FirstLastEmit::FirstOnly => firsts,
        FirstLastEmit::LastOnly => lasts,
        FirstLastEmit::Struct => {
            let fields = Fields::from(vec![
                Field::new("first", data_type.clone(), true),
                Field::new("last", data_type.clone(), true),
            ]);
            Arc::new(StructArray::new(fields, vec![firsts, lasts], None))
        }
    }
}

fn first_last_out_type(emit: FirstLastEmit, data_type: &DataType) -> DataType {
    match emit {
        FirstLastEmit::FirstOnly | FirstLastEmit::LastOnly => {
            data_type.clone()
        }
        FirstLastEmit::Struct => DataType::Struct(Fields::from(vec![
            Field::new("first", data_type.clone(), true),
            Field::new("last", data_type.clone(), true),
        ])),
    }
}

/// Grouped first/last over primitive inputs.
pub struct GroupedFirstLast<T: ArrowPrimitiveType> {
    data_type: DataType,
    options: ScalarAggregateOptions,
    emit: FirstLastEmit,
    firsts: Vec<T::Native>,
    lasts: Vec<T::Native>,
    flags: FirstLastFlags,
}

impl<T: ArrowPrimitiveType> GroupedFirstLast<T> {
    pub(crate) fn new(
        data_type: DataType,
        options: ScalarAggregateOptions,
        emit: FirstLastEmit,
    ) -> Self {
        Self {
            data_type,
            options,
            emit,
            firsts: vec![],
            lasts: vec![],
            flags: FirstLastFlags::new(),
        }
    }
}

impl<T: ArrowPrimitiveType> GroupedAggregator for GroupedFirstLast<T> {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        // the placeholder is never emitted: validity comes from the flags
        self.firsts.resize(new_num_groups, T::default_value());
        self.lasts.resize(new_num_groups, T::default_value());
        self.flags.resize(new_num_groups);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let firsts = &mut self.firsts;
        let lasts = &mut self.lasts;
        // Raw pointer so the value and null closures below can both
        // reach `flags` without aliasing it as two live `&mut` borrows;
        // the two closures are never invoked concurrently.
        let flags: *mut FirstLastFlags = &mut self.flags;

        visit_grouped_values::<T, _, _>(
            batch.value(0)?,
            batch.group_ids(),
            |g, v| {
                let g = g as usize;
                if unsafe { (*flags).on_value(g) } {
                    firsts[g] = v;
                }
                lasts[g] = v;
            },
            |g| unsafe { (*flags).on_null(g as usize) },
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
            other.flags.num_groups,
            self.flags.num_groups,
        )?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            let g = g as usize;
            let (take_first, take_last) =
                self.flags.merge_group(g, &other.flags, other_g);
            if take_first {
                self.firsts[g] = other.firsts[other_g];
            }
            if take_last {
                self.lasts[g] = other.lasts[other_g];
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let (first_validity, last_validity) =
            self.flags.build_validity(self.options.skip_nulls);
        let firsts: ArrayRef = Arc::new(
            PrimitiveArray::<T>::new(
                std::mem::take(&mut self.firsts).into(),
                Some(first_validity),
            )
            .with_data_type(self.data_type.clone()),
        );
        let lasts: ArrayRef = Arc::new(
            PrimitiveArray::<T>::new(
                std::mem::take(&mut self.lasts).into(),
                Some(last_validity),
            )
            .with_data_type(self.data_type.clone()),
        );
        Ok(emit_first_last(self.emit, &self.data_type, firsts, lasts))
    }

    fn out_type(&self) -> DataType {
        first_last_out_type(self.emit, &self.data_type)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Grouped first/last over booleans.
pub struct GroupedBooleanFirstLast {
    options: ScalarAggregateOptions,
    emit: FirstLastEmit,
    firsts: Vec<bool>,
    lasts: Vec<bool>,
    flags: FirstLastFlags,
}

impl GroupedBooleanFirstLast {
    pub(crate) fn new(
        options: ScalarAggregateOptions,
        emit: FirstLastEmit,
    ) -> Self {
        Self {
            options,
            emit,
            firsts: vec![],
            lasts: vec![],
            flags: FirstLastFlags::new(),
        }
    }
}

impl GroupedAggregator for GroupedBooleanFirstLast {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        self.firsts.resize(new_num_groups, false);
        self.lasts.resize(new_num_groups, false);
        self.flags.resize(new_num_groups);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let firsts = &mut self.firsts;
        let lasts = &mut self.lasts;
        // Raw pointer so the value and null closures below can both
        // reach `flags` without aliasing it as two live `&mut` borrows;
        // the two closures are never invoked concurrently.
        let flags: *mut FirstLastFlags = &mut self.flags;

        visit_grouped_booleans(
            batch.value(0)?,
            batch.group_ids(),
            |g, v| {
                let g = g as usize;
                if unsafe { (*flags).on_value(g) } {
                    firsts[g] = v;
                }
                lasts[g] = v;
            },
            |g| unsafe { (*flags).on_null(g as usize) },
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
            other.flags.num_groups,
            self.flags.num_groups,
        )?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            let g = g as usize;
            let (take_first, take_last) =
                self.flags.merge_group(g, &other.flags, other_g);
            if take_first {
                self.firsts[g] = other.firsts[other_g];
            }
            if take_last {
                self.lasts[g] = other.lasts[other_g];
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let (first_validity, last_validity) =
            self.flags.build_validity(self.options.skip_nulls);
        let firsts = BooleanArray::from(std::mem::take(&mut self.firsts));
        let firsts: ArrayRef = Arc::new(BooleanArray::new(
            firsts.values().clone(),
            Some(first_validity),
        ));
        let lasts = BooleanArray::from(std::mem::take(&mut self.lasts));
        let lasts: ArrayRef = Arc::new(BooleanArray::new(
            lasts.values().clone(),
            Some(last_validity),
        ));
        Ok(emit_first_last(self.emit, &DataType::Boolean, firsts, lasts))
    }

    fn out_type(&self) -> DataType {
        first_last_out_type(self.emit, &DataType::Boolean)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Grouped first/last over string and binary inputs, with owned
/// byte-string slots.
pub struct GroupedFirstLastBytes {
    data_type: DataType,
    options: ScalarAggregateOptions,
    emit: FirstLastEmit,
    firsts: Vec<Option<Vec<u8>>>,
    lasts: Vec<Option<Vec<u8>>>,
    flags: FirstLastFlags,
}

impl GroupedFirstLastBytes {
    pub(crate) fn new(
        data_type: DataType,
        options: ScalarAggregateOptions,
        emit: FirstLastEmit,
    ) -> Self {
        Self {
            data_type,
            options,
            emit,
            firsts: vec![],
            lasts: vec![],
            flags: FirstLastFlags::new(),
        }
    }
}

impl GroupedAggregator for GroupedFirstLastBytes {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        self.firsts.resize(new_num_groups, None);
        self.lasts.resize(new_num_groups, None);
        self.flags.resize(new_num_groups);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let firsts = &mut self.firsts;
        let lasts = &mut self.lasts;
        let flags = &mut self.flags;

        visit_grouped_bytes(batch.value(0)?, batch.group_ids(), |g, value| {
            let g = g as usize;
            match value {
                Some(v) => {
                    if flags.on_value(g) {
                        firsts[g] = Some(v.to_vec());
                    }
                    match &mut lasts[g] {
                        Some(last) => {
                            last.clear();
                            last.extend_from_slice(v);
                        }
                        None => lasts[g] = Some(v.to_vec()),
                    }
                }
                None => flags.on_null(g),
            }
        })
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let mut other = merge_target::<Self>(other)?;
        check_mapping(
            group_id_mapping,
            other.flags.num_groups,
            self.flags.num_groups,
        )?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            let g = g as usize;
            let (take_first, take_last) =
                self.flags.merge_group(g, &other.flags, other_g);
            if take_first {
                self.firsts[g] = other.firsts[other_g].take();
            }
            if take_last {
                self.lasts[g] = other.lasts[other_g].take();
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let (first_validity, last_validity) =
            self.flags.build_validity(self.options.skip_nulls);
        let firsts = build_bytes_array(
            &self.data_type,
            std::mem::take(&mut self.firsts),
            &first_validity,
        )?;
        let lasts = build_bytes_array(
            &self.data_type,
            std::mem::take(&mut self.lasts),
            &last_validity,
        )?;
        Ok(emit_first_last(self.emit, &self.data_type, firsts, lasts))
    }

    fn out_type(&self) -> DataType {
        first_last_out_type(self.emit, &self.data_type)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub(crate) fn make_first_last_impl(
    input: &DataType,
    options: ScalarAggregateOptions,
    emit: FirstLastEmit,
) -> Result<Box<dyn GroupedAggregator>> {
    macro_rules! helper {
        ($in:ty) => {
            Ok(Box::new(GroupedFirstLast::<$in>::new(
                input.clone(),
                options,
                emit,
            )))
        };
    }

    match input {
        DataType::Boolean => {
            Ok(Box::new(GroupedBooleanFirstLast::new(options, emit)))
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
        | DataType::LargeBinary => Ok(Box::new(GroupedFirstLastBytes::new(
            input.clone(),
            options,
            emit,
        ))),
        other => not_impl_err!("hash_first_last over input type {other}"),
    }
}

pub(crate) fn make_first_last(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.scalar_aggregate()?;
    make_first_last_impl(
        decoded_type(&input_types[0]),
        options,
        FirstLastEmit::Struct,
    )
}

pub(crate) fn make_first(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.scalar_aggregate()?;
    make_first_last_impl(
        decoded_type(&input_types[0]),
        options,
        FirstLastEmit::FirstOnly,
    )
}

pub(crate) fn make_last(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.scalar_aggregate()?;
    make_first_last_impl(
        decoded_type(&input_types[0]),
        options,
        FirstLastEmit::LastOnly,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregateInput;
    use arrow::array::{Array, AsArray, Int64Array, StringArray, UInt32Array};

    fn string_batch(
        values: Vec<Option<&str>>,
        groups: Vec<u32>,
    ) -> AggregateBatch {
        AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(StringArray::from(values))),
            UInt32Array::from(groups),
        )
        .unwrap()
    }

    #[test]
    fn first_last_strings_in_call_order() {
        let mut agg = make_first_last(&[DataType::Utf8], &AggregateOptions::None)
            .unwrap();
        agg.resize(2).unwrap();
        agg.consume(&string_batch(
            vec![Some("a"), Some("b"), None, Some("d"), Some("e")],
            vec![0, 1, 0, 1, 0],
        ))
        .unwrap();

        let out = agg.finalize().unwrap();
        let out = out.as_struct();
        let firsts = out.column(0).as_string::<i32>();
        let lasts = out.column(1).as_string::<i32>();
        assert_eq!(firsts.value(0), "a");
        assert_eq!(firsts.value(1), "b");
        assert_eq!(lasts.value(0), "e");
        assert_eq!(lasts.value(1), "d");
    }

    #[test]
    fn leading_null_shows_without_skip_nulls() {
        let options =
            AggregateOptions::ScalarAggregate(ScalarAggregateOptions {
                skip_nulls: false,
                min_count: 1,
            });
        let mut agg = make_first_last(&[DataType::Utf8], &options).unwrap();
        agg.resize(1).unwrap();
        agg.consume(&string_batch(
            vec![None, Some("x"), Some("y")],
            vec![0, 0, 0],
        ))
        .unwrap();

        let out = agg.finalize().unwrap();
        let out = out.as_struct();
        assert!(out.column(0).is_null(0)); // first was a null
        assert_eq!(out.column(1).as_string::<i32>().value(0), "y");
    }

    #[test]
    fn merge_keeps_first_and_takes_other_last() {
        let part = |values: Vec<Option<i64>>, groups: Vec<u32>| {
            let mut agg = make_first_last(
                &[DataType::Int64],
                &AggregateOptions::None,
            )
            .unwrap();
            agg.resize(2).unwrap();
            agg.consume(
                &AggregateBatch::new_single(
                    AggregateInput::Array(Arc::new(Int64Array::from(values))),
                    UInt32Array::from(groups),
                )
                .unwrap(),
            )
            .unwrap();
            agg
        };

        // segment 1: group 0 sees 1, group 1 sees nothing
        let mut earlier = part(vec![Some(1)], vec![0]);
        // segment 2: both groups see values
        let later = part(vec![Some(7), Some(8)], vec![0, 1]);

        earlier.merge(later, &[0, 1]).unwrap();
        let out = earlier.finalize().unwrap();
        let out = out.as_struct();
        let firsts = out.column(0).as_primitive::<Int64Type>();
        let lasts = out.column(1).as_primitive::<Int64Type>();
        assert_eq!(firsts.value(0), 1); // earlier segment's first wins
        assert_eq!(lasts.value(0), 7); // later segment's last wins
        assert_eq!(firsts.value(1), 8);
        assert_eq!(lasts.value(1), 8);
    }

    #[test]
    fn hash_first_unwraps_the_struct() {
        let mut agg =
            make_first(&[DataType::Utf8], &AggregateOptions::None).unwrap();
        agg.resize(1).unwrap();
        agg.consume(&string_batch(vec![Some("q"), Some("r")], vec![0, 0]))
            .unwrap();
        let out = agg.finalize().unwrap();
        assert_eq!(out.as_string::<i32>().value(0), "q");
        assert_eq!(agg.out_type(), DataType::Utf8);
    }
}
