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

//! `hash_distinct` and `hash_count_distinct`.
//!
//! Both delegate to a value grouper that deduplicates `(group, value)`
//! pairs in a hash set. Floats are deduplicated on their bit pattern, so
//! `-0.0` and `0.0` are distinct and equal NaN payloads collapse. Merging
//! drains the other side's unique pairs, remaps their group ids and
//! re-consumes them locally. Emitted lists are sorted per group for a
//! deterministic output order.

use std::any::Any;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ahash::RandomState;
use arrow::array::{
    ArrayBuilder, ArrayRef, BooleanBuilder, GenericBinaryBuilder,
    GenericStringBuilder, Int64Array, ListArray, PrimitiveBuilder,
};
use arrow::buffer::OffsetBuffer;
use arrow::datatypes::{
    ArrowNativeType, ArrowNativeTypeOp, ArrowPrimitiveType, DataType,
    Decimal128Type, Decimal256Type, Field, Float16Type, Float32Type,
    Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, ToByteSlice,
    UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use hashbrown::HashSet;

use crate::accumulate::{
    decoded_type, visit_grouped_booleans, visit_grouped_bytes,
    visit_grouped_values,
};
use crate::aggregator::{
    check_mapping, merge_target, AggregateBatch, AggregateInput,
    GroupedAggregator,
};
use crate::error::Result;
use crate::options::{AggregateOptions, CountMode};

/// Hash/Eq on the value's byte representation, giving floats bit-pattern
/// identity inside hash sets.
#[derive(Debug, Clone, Copy)]
struct BitKey<N: ArrowNativeType>(N);

impl<N: ArrowNativeType> PartialEq for BitKey<N> {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_byte_slice() == other.0.to_byte_slice()
    }
}

impl<N: ArrowNativeType> Eq for BitKey<N> {}

impl<N: ArrowNativeType> Hash for BitKey<N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(self.0.to_byte_slice());
    }
}

/// A per-type set of unique `(group, value)` pairs.
pub trait DistinctSet: Send + 'static {
    fn consume(
        &mut self,
        input: &AggregateInput,
        group_ids: &[u32],
        null_groups: &mut HashSet<u32, RandomState>,
    ) -> Result<()>;

    /// Drains `other` into `self`, remapping each pair's group id.
    fn merge_remapped(&mut self, other: Self, group_id_mapping: &[u32]);

    /// Unique non-null values per group.
    fn counts(&self, num_groups: usize) -> Vec<i64>;

    /// Drains the set into per-group child values and list offsets; null
    /// entries are appended per `mode` for groups in `null_groups`.
    fn emit(
        &mut self,
        num_groups: usize,
        mode: CountMode,
        null_groups: &HashSet<u32, RandomState>,
    ) -> Result<(OffsetBuffer<i32>, ArrayRef)>;
}

/// Appends one group's worth of entries given the closures for values
/// and nulls; shared by all set implementations.
fn append_group<V, A, N>(
    mode: CountMode,
    values: V,
    has_null: bool,
    mut append_value: A,
    mut append_null: N,
) where
    V: IntoIterator,
    A: FnMut(V::Item),
    N: FnMut(),
{
    match mode {
        CountMode::OnlyValid => {
            for v in values {
                append_value(v);
            }
        }
        CountMode::All => {
            for v in values {
                append_value(v);
            }
            if has_null {
                append_null();
            }
        }
        CountMode::OnlyNull => {
            if has_null {
                append_null();
            }
        }
    }
}

fn check_list_offsets(total_len: usize) -> Result<()> {
    if total_len > i32::MAX as usize {
        return invalid_err!(
            "list output exceeds the 32-bit offset capacity"
        );
    }
    Ok(())
}

/// Unique values for primitive inputs.
struct PrimitiveDistinctSet<T: ArrowPrimitiveType> {
    data_type: DataType,
    values: HashSet<(u32, BitKey<T::Native>), RandomState>,
}

impl<T: ArrowPrimitiveType> PrimitiveDistinctSet<T> {
    fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            values: HashSet::default(),
        }
    }
}

impl<T: ArrowPrimitiveType> DistinctSet for PrimitiveDistinctSet<T>
where
    T::Native: ArrowNativeTypeOp,
{
    fn consume(
        &mut self,
        input: &AggregateInput,
        group_ids: &[u32],
        null_groups: &mut HashSet<u32, RandomState>,
    ) -> Result<()> {
        let values = &mut self.values;
        visit_grouped_values::<T, _, _>(
            input,
            group_ids,
            |g, v| {
                values.insert((g, BitKey(v)));
            },
            |g| {
                null_groups.insert(g);
            },
        )
    }

    fn merge_remapped(&mut self, other: Self, group_id_mapping: &[u32]) {
        for (other_g, key) in other.values {
            self.values.insert((group_id_mapping[other_g as usize], key));
        }
    }

    fn counts(&self, num_groups: usize) -> Vec<i64> {
        let mut counts = vec![0_i64; num_groups];
        for &(g, _) in &self.values {
            counts[g as usize] += 1;
        }
        counts
    }

    fn emit(
        &mut self,
        num_groups: usize,
        mode: CountMode,
        null_groups: &HashSet<u32, RandomState>,
    ) -> Result<(OffsetBuffer<i32>, ArrayRef)> {
        let mut per_group: Vec<Vec<T::Native>> = vec![vec![]; num_groups];
        for (g, key) in self.values.drain() {
            per_group[g as usize].push(key.0);
        }
        check_list_offsets(
            per_group.iter().map(|v| v.len() + 1).sum::<usize>(),
        )?;

        let mut builder =
            PrimitiveBuilder::<T>::new().with_data_type(self.data_type.clone());
        let mut offsets = Vec::with_capacity(num_groups + 1);
        offsets.push(0_i32);
        for (g, mut group_values) in per_group.into_iter().enumerate() {
            group_values.sort_by(|a, b| a.compare(*b));
            // Raw pointer so the value and null closures below can both
            // reach `builder` without aliasing it as two live `&mut`
            // borrows; the two closures are never invoked concurrently.
            let builder_ptr: *mut _ = &mut builder;
            append_group(
                mode,
                group_values,
                null_groups.contains(&(g as u32)),
                |v| unsafe { (*builder_ptr).append_value(v) },
                || unsafe { (*builder_ptr).append_null() },
            );
            offsets.push(builder.len() as i32);
        }
        Ok((
            OffsetBuffer::new(offsets.into()),
            Arc::new(builder.finish()),
        ))
    }
}

/// Unique values for boolean inputs.
struct BooleanDistinctSet {
    values: HashSet<(u32, bool), RandomState>,
}

impl BooleanDistinctSet {
    fn new() -> Self {
        Self {
            values: HashSet::default(),
        }
    }
}

impl DistinctSet for BooleanDistinctSet {
    fn consume(
        &mut self,
        input: &AggregateInput,
        group_ids: &[u32],
        null_groups: &mut HashSet<u32, RandomState>,
    ) -> Result<()> {
        let values = &mut self.values;
        visit_grouped_booleans(
            input,
            group_ids,
            |g, v| {
                values.insert((g, v));
            },
            |g| {
                null_groups.insert(g);
            },
        )
    }

    fn merge_remapped(&mut self, other: Self, group_id_mapping: &[u32]) {
        for (other_g, v) in other.values {
            self.values.insert((group_id_mapping[other_g as usize], v));
        }
    }

    fn counts(&self, num_groups: usize) -> Vec<i64> {
        let mut counts = vec![0_i64; num_groups];
        for &(g, _) in &self.values {
            counts[g as usize] += 1;
        }
        counts
    }

    fn emit(
        &mut self,
        num_groups: usize,
        mode: CountMode,
        null_groups: &HashSet<u32, RandomState>,
    ) -> Result<(OffsetBuffer<i32>, ArrayRef)> {
        let mut per_group: Vec<Vec<bool>> = vec![vec![]; num_groups];
        for (g, v) in self.values.drain() {
            per_group[g as usize].push(v);
        }

        let mut builder = BooleanBuilder::new();
        let mut offsets = Vec::with_capacity(num_groups + 1);
        offsets.push(0_i32);
        for (g, mut group_values) in per_group.into_iter().enumerate() {
            group_values.sort();
            // Raw pointer so the value and null closures below can both
            // reach `builder` without aliasing it as two live `&mut`
            // borrows; the two closures are never invoked concurrently.
            let builder_ptr: *mut _ = &mut builder;
            append_group(
                mode,
                group_values,
                null_groups.contains(&(g as u32)),
                |v| unsafe { (*builder_ptr).append_value(v) },
                || unsafe { (*builder_ptr).append_null() },
            );
            offsets.push(builder.len() as i32);
        }
        Ok((
            OffsetBuffer::new(offsets.into()),
            Arc::new(builder.finish()),
        ))
    }
}

/// Unique values for string and binary inputs, stored as owned bytes.
struct BytesDistinctSet {
    data_type: DataType,
    values: HashSet<(u32, Vec<u8>), RandomState>,
}

impl BytesDistinctSet {
    fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            values: HashSet::default(),
        }
    }
}

impl DistinctSet for BytesDistinctSet {
    fn consume(
        &mut self,
        input: &AggregateInput,
        group_ids: &[u32],
        null_groups: &mut HashSet<u32, RandomState>,
    ) -> Result<()> {
        let values = &mut self.values;
        visit_grouped_bytes(input, group_ids, |g, value| match value {
            Some(v) => {
                // TODO: use the raw entry API to avoid allocating when the
                // value is already present
                values.insert((g, v.to_vec()));
            }
            None => {
                null_groups.insert(g);
            }
        })
    }

    fn merge_remapped(&mut self, other: Self, group_id_mapping: &[u32]) {
        for (other_g, v) in other.values {
            self.values.insert((group_id_mapping[other_g as usize], v));
        }
    }

    fn counts(&self, num_groups: usize) -> Vec<i64> {
        let mut counts = vec![0_i64; num_groups];
        for (g, _) in &self.values {
            counts[*g as usize] += 1;
        }
        counts
    }

    fn emit(
        &mut self,
        num_groups: usize,
        mode: CountMode,
        null_groups: &HashSet<u32, RandomState>,
    ) -> Result<(OffsetBuffer<i32>, ArrayRef)> {
        let mut per_group: Vec<Vec<Vec<u8>>> = vec![vec![]; num_groups];
        for (g, v) in self.values.drain() {
            per_group[g as usize].push(v);
        }
        check_list_offsets(
            per_group.iter().map(|v| v.len() + 1).sum::<usize>(),
        )?;

        macro_rules! emit_bytes {
            ($builder:expr, $to_value:expr) => {{
                let mut builder = $builder;
                let mut offsets = Vec::with_capacity(num_groups + 1);
                offsets.push(0_i32);
                for (g, mut group_values) in per_group.into_iter().enumerate()
                {
                    group_values.sort();
                    // Raw pointer so the value and null closures below can
                    // both reach `builder` without aliasing it as two live
                    // `&mut` borrows; the two closures are never invoked
                    // concurrently.
                    let builder_ptr: *mut _ = &mut builder;
                    append_group(
                        mode,
                        group_values,
                        null_groups.contains(&(g as u32)),
                        |v: Vec<u8>| unsafe {
                            (*builder_ptr).append_value($to_value(&v))
                        },
                        || unsafe { (*builder_ptr).append_null() },
                    );
                    offsets.push(builder.len() as i32);
                }
                Ok((
                    OffsetBuffer::new(offsets.into()),
                    Arc::new(builder.finish()) as ArrayRef,
                ))
            }};
        }

        fn bytes_to_str(v: &Vec<u8>) -> &str {
            // distinct values were consumed from string arrays and stay
            // valid utf-8
            unsafe { std::str::from_utf8_unchecked(v) }
        }
        fn bytes_to_slice(v: &Vec<u8>) -> &[u8] {
            v.as_slice()
        }

        match &self.data_type {
            DataType::Utf8 => emit_bytes!(
                GenericStringBuilder::<i32>::new(),
                bytes_to_str
            ),
            DataType::LargeUtf8 => emit_bytes!(
                GenericStringBuilder::<i64>::new(),
                bytes_to_str
            ),
            DataType::Binary => emit_bytes!(
                GenericBinaryBuilder::<i32>::new(),
                bytes_to_slice
            ),
            DataType::LargeBinary => emit_bytes!(
                GenericBinaryBuilder::<i64>::new(),
                bytes_to_slice
            ),
            other => not_impl_err!("distinct output for type {other}"),
        }
    }
}

/// `hash_distinct` / `hash_count_distinct` over one concrete set type.
pub struct GroupedDistinct<S: DistinctSet> {
    set: S,
    null_groups: HashSet<u32, RandomState>,
    mode: CountMode,
    emit_list: bool,
    data_type: DataType,
    num_groups: usize,
}

impl<S: DistinctSet> GroupedDistinct<S> {
    fn new(set: S, mode: CountMode, emit_list: bool, data_type: DataType) -> Self {
        Self {
            set,
            null_groups: HashSet::default(),
            mode,
            emit_list,
            data_type,
            num_groups: 0,
        }
    }
}

impl<S: DistinctSet> GroupedAggregator for GroupedDistinct<S> {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        self.num_groups = new_num_groups;
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        self.set.consume(
            batch.value(0)?,
            batch.group_ids(),
            &mut self.null_groups,
        )
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(group_id_mapping, other.num_groups, self.num_groups)?;
        for other_g in other.null_groups {
            self.null_groups.insert(group_id_mapping[other_g as usize]);
        }
        self.set.merge_remapped(other.set, group_id_mapping);
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        if !self.emit_list {
            let mut counts = self.set.counts(self.num_groups);
            match self.mode {
                CountMode::OnlyValid => {}
                CountMode::All => {
                    for &g in &self.null_groups {
                        counts[g as usize] += 1;
                    }
                }
                CountMode::OnlyNull => {
                    counts.iter_mut().for_each(|c| *c = 0);
                    for &g in &self.null_groups {
                        counts[g as usize] = 1;
                    }
                }
            }
            return Ok(Arc::new(Int64Array::new(counts.into(), None)));
        }

        let (offsets, child) =
            self.set
                .emit(self.num_groups, self.mode, &self.null_groups)?;
        let field = Arc::new(Field::new_list_field(self.data_type.clone(), true));
        Ok(Arc::new(ListArray::new(field, offsets, child, None)))
    }

    fn out_type(&self) -> DataType {
        if self.emit_list {
            DataType::List(Arc::new(Field::new_list_field(
                self.data_type.clone(),
                true,
            )))
        } else {
            DataType::Int64
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

fn make_distinct_impl(
    input: &DataType,
    mode: CountMode,
    emit_list: bool,
) -> Result<Box<dyn GroupedAggregator>> {
    macro_rules! helper {
        ($in:ty) => {
            Ok(Box::new(GroupedDistinct::new(
                PrimitiveDistinctSet::<$in>::new(input.clone()),
                mode,
                emit_list,
                input.clone(),
            )))
        };
    }

    match input {
        DataType::Boolean => Ok(Box::new(GroupedDistinct::new(
            BooleanDistinctSet::new(),
            mode,
            emit_list,
            input.clone(),
        ))),
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
        | DataType::LargeBinary => Ok(Box::new(GroupedDistinct::new(
            BytesDistinctSet::new(input.clone()),
            mode,
            emit_list,
            input.clone(),
        ))),
        other => not_impl_err!("hash_distinct over input type {other}"),
    }
}

pub(crate) fn make_count_distinct(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.count()?;
    make_distinct_impl(decoded_type(&input_types[0]), options.mode, false)
}

pub(crate) fn make_distinct(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.count()?;
    make_distinct_impl(decoded_type(&input_types[0]), options.mode, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray, Int64Array, StringArray, UInt32Array};
    use crate::options::CountOptions;

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

    fn mode_options(mode: CountMode) -> AggregateOptions {
        AggregateOptions::Count(CountOptions { mode })
    }

    #[test]
    fn count_distinct_deduplicates_per_group() {
        let mut agg = make_count_distinct(
            &[DataType::Int64],
            &AggregateOptions::None,
        )
        .unwrap();
        agg.resize(2).unwrap();
        agg.consume(&int64_batch(
            vec![Some(1), Some(1), Some(2), None, Some(1)],
            vec![0, 0, 0, 1, 1],
        ))
        .unwrap();
        let out = agg.finalize().unwrap();
        let out = out.as_primitive::<Int64Type>();
        assert_eq!(out.value(0), 2); // {1, 2}
        assert_eq!(out.value(1), 1); // {1}, null not counted
    }

    #[test]
    fn count_distinct_modes() {
        let consume = |mode| {
            let mut agg =
                make_count_distinct(&[DataType::Int64], &mode_options(mode))
                    .unwrap();
            agg.resize(2).unwrap();
            agg.consume(&int64_batch(
                vec![Some(1), None, None, Some(2)],
                vec![0, 0, 0, 1],
            ))
            .unwrap();
            let out = agg.finalize().unwrap();
            out.as_primitive::<Int64Type>().values().to_vec()
        };

        assert_eq!(consume(CountMode::OnlyValid), vec![1, 1]);
        // at most one null per group
        assert_eq!(consume(CountMode::All), vec![2, 1]);
        assert_eq!(consume(CountMode::OnlyNull), vec![1, 0]);
    }

    #[test]
    fn distinct_emits_sorted_lists() {
        let mut agg =
            make_distinct(&[DataType::Int64], &AggregateOptions::None)
                .unwrap();
        agg.resize(2).unwrap();
        agg.consume(&int64_batch(
            vec![Some(3), Some(1), Some(3), Some(7), None],
            vec![0, 0, 0, 1, 1],
        ))
        .unwrap();
        let out = agg.finalize().unwrap();
        let list = out.as_list::<i32>();
        let g0 = list.value(0);
        let g0 = g0.as_primitive::<Int64Type>();
        assert_eq!(g0.values(), &[1, 3]);
        let g1 = list.value(1);
        assert_eq!(g1.len(), 1); // the null is filtered under OnlyValid
    }

    #[test]
    fn distinct_all_keeps_one_null() {
        let mut agg = make_distinct(
            &[DataType::Utf8],
            &mode_options(CountMode::All),
        )
        .unwrap();
        agg.resize(1).unwrap();
        let batch = AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(StringArray::from(vec![
                Some("b"),
                None,
                Some("a"),
                None,
                Some("b"),
            ]))),
            UInt32Array::from(vec![0_u32; 5]),
        )
        .unwrap();
        agg.consume(&batch).unwrap();
        let out = agg.finalize().unwrap();
        let list = out.as_list::<i32>();
        let g0 = list.value(0);
        let g0 = g0.as_string::<i32>();
        assert_eq!(g0.len(), 3); // "a", "b", null
        assert_eq!(g0.value(0), "a");
        assert_eq!(g0.value(1), "b");
        assert!(g0.is_null(2));
    }

    #[test]
    fn distinct_merge_remaps_and_deduplicates() {
        let part = |values: Vec<Option<i64>>, groups: Vec<u32>| {
            let mut agg = make_count_distinct(
                &[DataType::Int64],
                &AggregateOptions::None,
            )
            .unwrap();
            agg.resize(2).unwrap();
            agg.consume(&int64_batch(values, groups)).unwrap();
            agg
        };
        let mut a = part(vec![Some(1), Some(2)], vec![0, 1]);
        // b group 0 -> a group 1, b group 1 -> a group 0
        let b = part(vec![Some(2), Some(1)], vec![0, 1]);
        a.merge(b, &[1, 0]).unwrap();
        let out = a.finalize().unwrap();
        let out = out.as_primitive::<Int64Type>();
        // a group 0: {1} from a, {1} from b's group 1 -> still {1}
        assert_eq!(out.value(0), 1);
        // a group 1: {2} from a, {2} from b's group 0 -> still {2}
        assert_eq!(out.value(1), 1);
    }

    #[test]
    fn float_distinct_uses_bit_identity() {
        let values = arrow::array::Float64Array::from(vec![
            Some(0.0),
            Some(-0.0),
            Some(f64::NAN),
            Some(f64::NAN),
        ]);
        let batch = AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(values)),
            UInt32Array::from(vec![0_u32; 4]),
        )
        .unwrap();
        let mut agg = make_count_distinct(
            &[DataType::Float64],
            &AggregateOptions::None,
        )
        .unwrap();
        agg.resize(1).unwrap();
        agg.consume(&batch).unwrap();
        let out = agg.finalize().unwrap();
        // 0.0 and -0.0 differ in bits; the two NaNs collapse
        assert_eq!(out.as_primitive::<Int64Type>().value(0), 3);
    }
}
