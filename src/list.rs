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

//! `hash_list`: all values per group, nulls included, in consumption
//! order.
//!
//! Consumed batches are stacked as-is next to a per-row group id vector;
//! only `finalize` pays for regrouping, with a counting-sort permutation
//! applied through the `take` kernel. This keeps `consume` allocation-free
//! apart from the stacked `ArrayRef`s and works for every input type.

use std::any::Any;
use std::sync::Arc;

use arrow::array::{new_empty_array, Array, ArrayRef, ListArray, UInt64Array};
use arrow::buffer::OffsetBuffer;
use arrow::compute;
use arrow::datatypes::{DataType, Field};

use crate::aggregator::{
    check_mapping, merge_target, AggregateBatch, GroupedAggregator,
};
use crate::error::Result;
use crate::options::AggregateOptions;

/// `hash_list` for any input type.
pub struct GroupedList {
    data_type: DataType,
    /// Consumed batches, in call order.
    chunks: Vec<ArrayRef>,
    /// Group id of every stacked row, aligned with the chunk
    /// concatenation.
    groups: Vec<u32>,
    num_groups: usize,
}

impl GroupedList {
    fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            chunks: vec![],
            groups: vec![],
            num_groups: 0,
        }
    }
}

impl GroupedAggregator for GroupedList {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        self.num_groups = new_num_groups;
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let values = batch.value(0)?.to_array(batch.num_rows())?;
        self.chunks.push(values);
        self.groups.extend_from_slice(batch.group_ids());
        Ok(())
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(group_id_mapping, other.num_groups, self.num_groups)?;
        self.chunks.extend(other.chunks);
        self.groups.extend(
            other
                .groups
                .iter()
                .map(|&other_g| group_id_mapping[other_g as usize]),
        );
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let groups = std::mem::take(&mut self.groups);
        let chunks = std::mem::take(&mut self.chunks);

        if groups.len() > i32::MAX as usize {
            return invalid_err!(
                "list output exceeds the 32-bit offset capacity"
            );
        }

        // list lengths, then prefix-summed into offsets
        let mut counts = vec![0_i32; self.num_groups];
        for &g in &groups {
            counts[g as usize] += 1;
        }
        let mut offsets = Vec::with_capacity(self.num_groups + 1);
        offsets.push(0_i32);
        let mut running = 0_i32;
        for &count in &counts {
            running += count;
            offsets.push(running);
        }

        let values = if chunks.is_empty() {
            new_empty_array(&self.data_type)
        } else {
            let chunk_refs: Vec<&dyn Array> =
                chunks.iter().map(|c| c.as_ref()).collect();
            compute::concat(&chunk_refs)?
        };

        // counting-sort permutation: row i lands at the next free slot of
        // its group's output range
        let mut positions: Vec<usize> =
            offsets[..self.num_groups].iter().map(|&o| o as usize).collect();
        let mut take_indices = vec![0_u64; groups.len()];
        for (row, &g) in groups.iter().enumerate() {
            take_indices[positions[g as usize]] = row as u64;
            positions[g as usize] += 1;
        }
        let sorted = compute::take(
            values.as_ref(),
            &UInt64Array::from(take_indices),
            None,
        )?;

        let field = Arc::new(Field::new_list_field(self.data_type.clone(), true));
        Ok(Arc::new(ListArray::new(
            field,
            OffsetBuffer::new(offsets.into()),
            sorted,
            None,
        )))
    }

    fn out_type(&self) -> DataType {
        DataType::List(Arc::new(Field::new_list_field(
            self.data_type.clone(),
            true,
        )))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub(crate) fn make_list(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    match options {
        AggregateOptions::None => {}
        other => {
            return options_err!(
                "hash_list takes no options, got {other:?}"
            )
        }
    }
    Ok(Box::new(GroupedList::new(input_types[0].clone())))
}
