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

//! `hash_tdigest` and `hash_approximate_median`: per-group quantile
//! sketches.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use arrow::array::{ArrayRef, FixedSizeListArray, PrimitiveArray};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{
    DataType, Decimal128Type, Field, Float32Type, Float64Type, Int16Type,
    Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type, UInt64Type,
    UInt8Type,
};

use crate::accumulate::{decoded_type, visit_grouped_values};
use crate::aggregator::{
    check_mapping, merge_target, AggregateBatch, GroupedAggregator,
};
use crate::error::Result;
use crate::null_policy::NullPolicyState;
use crate::options::{AggregateOptions, TDigestOptions};
use crate::statistic::MomentsInput;
use crate::tdigest::TDigest;

/// Per-group t-digest sketches. With `unwrap_single` the single requested
/// quantile is emitted as a plain `Float64` column
/// (`hash_approximate_median`); otherwise the output is a
/// `FixedSizeList<Float64>` with one slot per requested quantile.
pub struct GroupedTDigest<T: MomentsInput> {
    options: TDigestOptions,
    decimal_scale: i8,
    unwrap_single: bool,
    digests: Vec<TDigest>,
    policy: NullPolicyState,
    _marker: PhantomData<T>,
}

impl<T: MomentsInput> GroupedTDigest<T> {
    pub(crate) fn new(
        options: TDigestOptions,
        decimal_scale: i8,
        unwrap_single: bool,
    ) -> Self {
        Self {
            options,
            decimal_scale,
            unwrap_single,
            digests: vec![],
            policy: NullPolicyState::new(),
            _marker: PhantomData,
        }
    }
}

impl<T: MomentsInput> GroupedAggregator for GroupedTDigest<T> {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        while self.digests.len() < new_num_groups {
            self.digests.push(TDigest::new(
                self.options.delta,
                self.options.buffer_size,
            ));
        }
        self.policy.resize(new_num_groups);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let digests = &mut self.digests;
        let counts = &mut self.policy.counts;
        let no_nulls = &mut self.policy.no_nulls;
        let scale = self.decimal_scale;

        visit_grouped_values::<T, _, _>(
            batch.value(0)?,
            batch.group_ids(),
            |g, v| {
                // NaNs count as values but never enter the sketch
                digests[g as usize].nan_add(T::to_double(v, scale));
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
            other.digests.len(),
            self.digests.len(),
        )?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            self.digests[g as usize].merge(&other.digests[other_g]);
        }
        self.policy.merge(&other.policy, group_id_mapping);
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let num_groups = self.digests.len();
        let q = std::mem::take(&mut self.options.q);
        let slot_len = q.len();

        let digests = std::mem::take(&mut self.digests);
        let mut empties = Vec::with_capacity(num_groups);
        let mut values = vec![0.0_f64; num_groups * slot_len];
        for (g, mut digest) in digests.into_iter().enumerate() {
            empties.push(digest.is_empty());
            if !empties[g] {
                for (j, &quantile) in q.iter().enumerate() {
                    values[g * slot_len + j] = digest.quantile(quantile);
                }
            }
        }

        let validity = self.policy.build_validity(
            self.options.skip_nulls,
            self.options.min_count,
            |g| !empties[g],
        );

        if self.unwrap_single {
            return Ok(Arc::new(PrimitiveArray::<Float64Type>::new(
                values.into(),
                Some(validity),
            )));
        }

        // replicate the per-group validity over each group's slots
        let mut child_validity = arrow::array::BooleanBufferBuilder::new(
            num_groups * slot_len,
        );
        for g in 0..num_groups {
            child_validity.append_n(slot_len, validity.is_valid(g));
        }
        let child = PrimitiveArray::<Float64Type>::new(
            values.into(),
            Some(NullBuffer::new(child_validity.finish())),
        );
        let field = Arc::new(Field::new_list_field(DataType::Float64, true));
        Ok(Arc::new(FixedSizeListArray::new(
            field,
            slot_len as i32,
            Arc::new(child),
            Some(validity),
        )))
    }

    fn out_type(&self) -> DataType {
        if self.unwrap_single {
            DataType::Float64
        } else {
            DataType::FixedSizeList(
                Arc::new(Field::new_list_field(DataType::Float64, true)),
                self.options.q.len() as i32,
            )
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

fn make_grouped_tdigest(
    input: &DataType,
    options: TDigestOptions,
    unwrap_single: bool,
) -> Result<Box<dyn GroupedAggregator>> {
    macro_rules! helper {
        ($in:ty) => {
            Ok(Box::new(GroupedTDigest::<$in>::new(
                options,
                0,
                unwrap_single,
            )))
        };
    }

    match input {
        DataType::Int8 => helper!(Int8Type),
        DataType::Int16 => helper!(Int16Type),
        DataType::Int32 => helper!(Int32Type),
        DataType::Int64 => helper!(Int64Type),
        DataType::UInt8 => helper!(UInt8Type),
        DataType::UInt16 => helper!(UInt16Type),
        DataType::UInt32 => helper!(UInt32Type),
        DataType::UInt64 => helper!(UInt64Type),
        DataType::Float32 => helper!(Float32Type),
        DataType::Float64 => helper!(Float64Type),
        DataType::Decimal128(_, scale) => {
            Ok(Box::new(GroupedTDigest::<Decimal128Type>::new(
                options,
                *scale,
                unwrap_single,
            )))
        }
        other => not_impl_err!("t-digest over input type {other}"),
    }
}

pub(crate) fn make_tdigest(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.tdigest()?;
    make_grouped_tdigest(decoded_type(&input_types[0]), options, false)
}

pub(crate) fn make_approximate_median(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let scalar = options.scalar_aggregate()?;
    let options = TDigestOptions {
        q: vec![0.5],
        skip_nulls: scalar.skip_nulls,
        min_count: scalar.min_count,
        ..Default::default()
    };
    make_grouped_tdigest(decoded_type(&input_types[0]), options, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregateInput;
    use arrow::array::{Array, AsArray, Float64Array, UInt32Array};

    fn float64_batch(
        values: Vec<Option<f64>>,
        groups: Vec<u32>,
    ) -> AggregateBatch {
        AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(Float64Array::from(values))),
            UInt32Array::from(groups),
        )
        .unwrap()
    }

    #[test]
    fn approximate_median_small_groups() {
        let mut agg = make_approximate_median(
            &[DataType::Float64],
            &AggregateOptions::None,
        )
        .unwrap();
        agg.resize(2).unwrap();
        agg.consume(&float64_batch(
            vec![Some(1.0), Some(10.0), Some(2.0), Some(20.0), Some(3.0)],
            vec![0, 1, 0, 1, 0],
        ))
        .unwrap();
        let out = agg.finalize().unwrap();
        let out = out.as_primitive::<Float64Type>();
        assert_eq!(out.value(0), 2.0);
        assert_eq!(out.value(1), 15.0);
    }

    #[test]
    fn tdigest_emits_one_slot_per_quantile() {
        let options = AggregateOptions::TDigest(TDigestOptions {
            q: vec![0.0, 0.5, 1.0],
            ..Default::default()
        });
        let mut agg = make_tdigest(&[DataType::Float64], &options).unwrap();
        agg.resize(2).unwrap();
        agg.consume(&float64_batch(
            vec![Some(1.0), Some(5.0), Some(2.0), Some(3.0)],
            vec![0, 1, 0, 0],
        ))
        .unwrap();

        let out = agg.finalize().unwrap();
        let list = out.as_fixed_size_list();
        assert_eq!(list.value_length(), 3);
        let child = list.values().as_primitive::<Float64Type>();
        // group 0: [1, 2, 3]
        assert_eq!(child.value(0), 1.0);
        assert_eq!(child.value(1), 2.0);
        assert_eq!(child.value(2), 3.0);
        // group 1: [5, 5, 5]
        assert_eq!(child.value(4), 5.0);
    }

    #[test]
    fn empty_group_and_empty_sketch_are_null() {
        let mut agg = make_approximate_median(
            &[DataType::Float64],
            &AggregateOptions::None,
        )
        .unwrap();
        agg.resize(3).unwrap();
        // group 1 sees only NaN: count is 1 but the sketch stays empty
        agg.consume(&float64_batch(
            vec![Some(1.0), Some(f64::NAN)],
            vec![0, 1],
        ))
        .unwrap();
        let out = agg.finalize().unwrap();
        assert!(out.is_valid(0));
        assert!(out.is_null(1));
        assert!(out.is_null(2));
    }

    #[test]
    fn merge_combines_group_sketches() {
        let make = || {
            let mut agg = make_approximate_median(
                &[DataType::Float64],
                &AggregateOptions::None,
            )
            .unwrap();
            agg.resize(1).unwrap();
            agg
        };
        let mut a = make();
        a.consume(&float64_batch(vec![Some(1.0), Some(2.0)], vec![0, 0]))
            .unwrap();
        let mut b = make();
        b.consume(&float64_batch(vec![Some(3.0)], vec![0])).unwrap();
        a.merge(b, &[0]).unwrap();
        let out = a.finalize().unwrap();
        assert_eq!(out.as_primitive::<Float64Type>().value(0), 2.0);
    }
}
