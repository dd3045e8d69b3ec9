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

//! `hash_count_all` and `hash_count`.

use std::any::Any;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, RunArray};
use arrow::datatypes::{
    ArrowNativeType, DataType, Int16Type, Int32Type, Int64Type,
    RunEndIndexType,
};

use crate::aggregator::{
    check_mapping, merge_target, AggregateBatch, AggregateInput,
    GroupedAggregator,
};
use crate::error::Result;
use crate::options::{AggregateOptions, CountMode};

/// `hash_count_all`: the number of rows routed to each group, nulls
/// included.
#[derive(Debug, Default)]
pub struct GroupedCountAll {
    counts: Vec<i64>,
}

impl GroupedCountAll {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GroupedAggregator for GroupedCountAll {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        self.counts.resize(new_num_groups, 0);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        for &g in batch.group_ids() {
            self.counts[g as usize] += 1;
        }
        Ok(())
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(group_id_mapping, other.counts.len(), self.counts.len())?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            self.counts[g as usize] += other.counts[other_g];
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let counts = std::mem::take(&mut self.counts);
        Ok(Arc::new(Int64Array::new(counts.into(), None)))
    }

    fn out_type(&self) -> DataType {
        DataType::Int64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// `hash_count`: the number of valid (or null, or all) values routed to
/// each group.
#[derive(Debug)]
pub struct GroupedCount {
    mode: CountMode,
    counts: Vec<i64>,
}

impl GroupedCount {
    pub fn new(mode: CountMode) -> Self {
        Self {
            mode,
            counts: vec![],
        }
    }

    /// Count a run-end encoded array run-wise: runs whose physical value
    /// does not match the mode are skipped whole.
    fn count_run_ends<R: RunEndIndexType>(
        &mut self,
        array: &dyn Array,
        group_ids: &[u32],
        count_valid: bool,
    ) -> Result<()> {
        let Some(run_array) = array.as_any().downcast_ref::<RunArray<R>>()
        else {
            return internal_err!(
                "expected run-end encoded array, got {}",
                array.data_type()
            );
        };
        let values = run_array.values();
        let run_ends = run_array.run_ends();
        let window_start = run_ends.offset();
        let window_end = window_start + run_ends.len();

        let mut run_start = 0_usize;
        for (physical, end) in run_ends.values().iter().enumerate() {
            let run_end = end.as_usize();
            let start = run_start.max(window_start);
            let stop = run_end.min(window_end);
            run_start = run_end;
            if start < stop && values.is_valid(physical) == count_valid {
                for i in (start - window_start)..(stop - window_start) {
                    self.counts[group_ids[i] as usize] += 1;
                }
            }
            if run_end >= window_end {
                break;
            }
        }
        Ok(())
    }
}

impl GroupedAggregator for GroupedCount {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        self.counts.resize(new_num_groups, 0);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let group_ids = batch.group_ids();

        if self.mode == CountMode::All {
            for &g in group_ids {
                self.counts[g as usize] += 1;
            }
            return Ok(());
        }
        let count_valid = self.mode == CountMode::OnlyValid;

        match batch.value(0)? {
            AggregateInput::Scalar(s) => {
                // a scalar broadcasts its validity over the whole batch
                if s.is_valid(0) == count_valid {
                    for &g in group_ids {
                        self.counts[g as usize] += 1;
                    }
                }
            }
            AggregateInput::Array(a) => match a.data_type() {
                // The all-null type has no validity bitmap at all
                DataType::Null => {
                    if !count_valid {
                        for &g in group_ids {
                            self.counts[g as usize] += 1;
                        }
                    }
                }
                DataType::RunEndEncoded(run_ends, _) => {
                    match run_ends.data_type() {
                        DataType::Int16 => self.count_run_ends::<Int16Type>(
                            a.as_ref(),
                            group_ids,
                            count_valid,
                        )?,
                        DataType::Int32 => self.count_run_ends::<Int32Type>(
                            a.as_ref(),
                            group_ids,
                            count_valid,
                        )?,
                        DataType::Int64 => self.count_run_ends::<Int64Type>(
                            a.as_ref(),
                            group_ids,
                            count_valid,
                        )?,
                        other => {
                            return internal_err!(
                                "invalid run end type {other}"
                            )
                        }
                    }
                }
                _ => {
                    // Types without a plain validity bitmap (dictionaries
                    // and friends) are handled through the logical null
                    // predicate.
                    match a.logical_nulls().filter(|n| n.null_count() > 0) {
                        None => {
                            if count_valid {
                                for &g in group_ids {
                                    self.counts[g as usize] += 1;
                                }
                            }
                        }
                        Some(nulls) => {
                            if count_valid {
                                for i in nulls.valid_indices() {
                                    self.counts[group_ids[i] as usize] += 1;
                                }
                            } else {
                                for (i, &g) in group_ids.iter().enumerate() {
                                    if nulls.is_null(i) {
                                        self.counts[g as usize] += 1;
                                    }
                                }
                            }
                        }
                    }
                }
            },
        }
        Ok(())
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(group_id_mapping, other.counts.len(), self.counts.len())?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            self.counts[g as usize] += other.counts[other_g];
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let counts = std::mem::take(&mut self.counts);
        Ok(Arc::new(Int64Array::new(counts.into(), None)))
    }

    fn out_type(&self) -> DataType {
        DataType::Int64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub(crate) fn make_count_all(
    _input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    match options {
        AggregateOptions::None => Ok(Box::new(GroupedCountAll::new())),
        other => options_err!(
            "hash_count_all takes no options, got {other:?}"
        ),
    }
}

pub(crate) fn make_count(
    _input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.count()?;
    Ok(Box::new(GroupedCount::new(options.mode)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, NullArray, StringArray, UInt32Array};
    use arrow::datatypes::Int32Type;

    fn batch(values: ArrayRef, groups: Vec<u32>) -> AggregateBatch {
        AggregateBatch::new_single(
            AggregateInput::Array(values),
            UInt32Array::from(groups),
        )
        .unwrap()
    }

    fn finalize_counts(agg: &mut dyn GroupedAggregator) -> Vec<i64> {
        let out = agg.finalize().unwrap();
        let out = out.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(out.null_count(), 0);
        out.values().to_vec()
    }

    #[test]
    fn count_all_counts_rows() {
        let mut agg = GroupedCountAll::new();
        agg.resize(2).unwrap();
        let groups = UInt32Array::from(vec![0, 1, 0, 1, 0]);
        agg.consume(&AggregateBatch::new_groups_only(groups).unwrap())
            .unwrap();
        assert_eq!(finalize_counts(&mut agg), vec![3, 2]);
    }

    #[test]
    fn count_modes() {
        let values: ArrayRef = Arc::new(Int32Array::from(vec![
            Some(1),
            None,
            Some(3),
            None,
            Some(5),
        ]));
        let groups = vec![0, 1, 0, 1, 0];

        for (mode, expected) in [
            (CountMode::OnlyValid, vec![3, 0]),
            (CountMode::OnlyNull, vec![0, 2]),
            (CountMode::All, vec![3, 2]),
        ] {
            let mut agg = GroupedCount::new(mode);
            agg.resize(2).unwrap();
            agg.consume(&batch(Arc::clone(&values), groups.clone()))
                .unwrap();
            assert_eq!(finalize_counts(&mut agg), expected, "{mode:?}");
        }
    }

    #[test]
    fn count_null_type() {
        let values: ArrayRef = Arc::new(NullArray::new(3));
        let mut agg = GroupedCount::new(CountMode::OnlyValid);
        agg.resize(2).unwrap();
        agg.consume(&batch(Arc::clone(&values), vec![0, 1, 0])).unwrap();
        assert_eq!(finalize_counts(&mut agg), vec![0, 0]);

        let mut agg = GroupedCount::new(CountMode::OnlyNull);
        agg.resize(2).unwrap();
        agg.consume(&batch(values, vec![0, 1, 0])).unwrap();
        assert_eq!(finalize_counts(&mut agg), vec![2, 1]);
    }

    #[test]
    fn count_run_end_encoded() {
        // logical: [9, 9, null, null, null, 4]
        let run_ends = Int32Array::from(vec![2, 5, 6]);
        let values = Int32Array::from(vec![Some(9), None, Some(4)]);
        let ree: ArrayRef = Arc::new(
            RunArray::<Int32Type>::try_new(&run_ends, &values).unwrap(),
        );
        let groups = vec![0, 1, 0, 1, 0, 1];

        let mut agg = GroupedCount::new(CountMode::OnlyValid);
        agg.resize(2).unwrap();
        agg.consume(&batch(Arc::clone(&ree), groups.clone())).unwrap();
        assert_eq!(finalize_counts(&mut agg), vec![1, 2]);

        let mut agg = GroupedCount::new(CountMode::OnlyNull);
        agg.resize(2).unwrap();
        agg.consume(&batch(ree, groups)).unwrap();
        assert_eq!(finalize_counts(&mut agg), vec![2, 1]);
    }

    #[test]
    fn count_scalar_validity_broadcasts() {
        let scalar = AggregateInput::Scalar(Arc::new(StringArray::from(
            vec![None::<&str>],
        )));
        let groups = UInt32Array::from(vec![0, 0, 1]);
        let mut agg = GroupedCount::new(CountMode::OnlyNull);
        agg.resize(2).unwrap();
        agg.consume(&AggregateBatch::new_single(scalar, groups).unwrap())
            .unwrap();
        assert_eq!(finalize_counts(&mut agg), vec![2, 1]);
    }

    #[test]
    fn count_merges_across_partitions() {
        let mut a = GroupedCount::new(CountMode::OnlyValid);
        a.resize(2).unwrap();
        a.consume(&batch(
            Arc::new(Int32Array::from(vec![Some(1), None])),
            vec![0, 1],
        ))
        .unwrap();

        let mut b = GroupedCount::new(CountMode::OnlyValid);
        b.resize(2).unwrap();
        b.consume(&batch(
            Arc::new(Int32Array::from(vec![Some(2), Some(3)])),
            vec![0, 1],
        ))
        .unwrap();

        // b's groups swap onto a's
        a.merge(Box::new(b), &[1, 0]).unwrap();
        assert_eq!(finalize_counts(&mut a), vec![2, 1]);
    }
}
