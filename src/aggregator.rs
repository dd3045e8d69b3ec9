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

//! The [`GroupedAggregator`] contract and the batch type fed to it.

use std::any::Any;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::datatypes::DataType;

use crate::error::Result;

/// One value column of an [`AggregateBatch`]: either a full array or a
/// scalar broadcast to the batch length (the arrow `Datum` convention,
/// represented as a length-1 array).
#[derive(Debug, Clone)]
pub enum AggregateInput {
    Array(ArrayRef),
    /// A length-1 array, logically repeated for every row of the batch.
    Scalar(ArrayRef),
}

impl AggregateInput {
    pub fn data_type(&self) -> &DataType {
        match self {
            AggregateInput::Array(a) | AggregateInput::Scalar(a) => {
                a.data_type()
            }
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, AggregateInput::Scalar(_))
    }

    /// The underlying array; length 1 for scalars.
    pub fn inner(&self) -> &ArrayRef {
        match self {
            AggregateInput::Array(a) | AggregateInput::Scalar(a) => a,
        }
    }

    /// Materializes the input as an array of `num_rows` rows, copying only
    /// in the scalar case.
    pub fn to_array(&self, num_rows: usize) -> Result<ArrayRef> {
        match self {
            AggregateInput::Array(a) => Ok(Arc::clone(a)),
            AggregateInput::Scalar(s) => {
                if s.is_valid(0) {
                    let indices = UInt32Array::from(vec![0_u32; num_rows]);
                    Ok(arrow::compute::take(s.as_ref(), &indices, None)?)
                } else {
                    Ok(arrow::array::new_null_array(s.data_type(), num_rows))
                }
            }
        }
    }
}

/// A batch of rows routed to groups: zero or more aligned value columns
/// plus one non-null `uint32` group id column.
#[derive(Debug, Clone)]
pub struct AggregateBatch {
    values: Vec<AggregateInput>,
    group_ids: UInt32Array,
}

impl AggregateBatch {
    /// Creates a batch, validating column alignment and that the group id
    /// column has no nulls.
    pub fn try_new(
        values: Vec<AggregateInput>,
        group_ids: UInt32Array,
    ) -> Result<Self> {
        if group_ids.null_count() != 0 {
            return invalid_err!("group id column must not contain nulls");
        }
        for (i, value) in values.iter().enumerate() {
            if let AggregateInput::Array(a) = value {
                if a.len() != group_ids.len() {
                    return invalid_err!(
                        "value column {i} has length {} but the batch has {} rows",
                        a.len(),
                        group_ids.len()
                    );
                }
            }
        }
        Ok(Self { values, group_ids })
    }

    /// A batch with a single value column.
    pub fn new_single(values: AggregateInput, group_ids: UInt32Array) -> Result<Self> {
        Self::try_new(vec![values], group_ids)
    }

    /// A batch with no value columns (`hash_count_all`).
    pub fn new_groups_only(group_ids: UInt32Array) -> Result<Self> {
        Self::try_new(vec![], group_ids)
    }

    pub fn num_rows(&self) -> usize {
        self.group_ids.len()
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn value(&self, i: usize) -> Result<&AggregateInput> {
        self.values.get(i).ok_or_else(|| {
            internal_agg_err!(
                "aggregate expected value column {i} but the batch has {}",
                self.values.len()
            )
        })
    }

    /// The group id of each row.
    pub fn group_ids(&self) -> &[u32] {
        self.group_ids.values()
    }
}

/// A stateful aggregator over grouped rows, one instance per partition.
///
/// Instances are created by the factories in [`crate::registry`], sized
/// with [`resize`](Self::resize), fed batches with
/// [`consume`](Self::consume), optionally combined across partitions with
/// [`merge`](Self::merge), and drained once with
/// [`finalize`](Self::finalize).
///
/// All per-group state is indexed by group id; group id `g` is valid after
/// `resize(g + 1)`. Implementations own their buffers and never suspend;
/// callers that want parallelism run one instance per partition and merge.
pub trait GroupedAggregator: Send + std::fmt::Debug {
    /// Extends per-group state to `new_num_groups` slots, initializing new
    /// slots to the aggregate's identity. `new_num_groups` must be at least
    /// the current group count; calling with the current count is a no-op.
    fn resize(&mut self, new_num_groups: usize) -> Result<()>;

    /// Folds one batch into the per-group state. Group ids in the batch
    /// must be below the current group count.
    fn consume(&mut self, batch: &AggregateBatch) -> Result<()>;

    /// Folds `other`'s state into `self`. Slot `other_g` of `other`
    /// corresponds to slot `group_id_mapping[other_g]` of `self`; the
    /// mapping image must already be covered by a prior `resize`.
    ///
    /// `other` must be the same aggregator type; anything else is an
    /// internal error.
    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()>;

    /// Returns the output column, one slot per group. The aggregator is
    /// left in an unspecified state.
    fn finalize(&mut self) -> Result<ArrayRef>;

    /// The output column's type, known at construction time.
    fn out_type(&self) -> DataType;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Downcasts the right-hand side of a merge to the concrete aggregator
/// type, failing with an internal error on a mismatch.
pub(crate) fn merge_target<T: GroupedAggregator + 'static>(
    other: Box<dyn GroupedAggregator>,
) -> Result<Box<T>> {
    other.into_any().downcast::<T>().map_err(|_| {
        internal_agg_err!(
            "cannot merge aggregators of different types (expected {})",
            std::any::type_name::<T>()
        )
    })
}

/// Validates that a merge mapping covers `other`'s groups and lands inside
/// `self`'s group count.
pub(crate) fn check_mapping(
    group_id_mapping: &[u32],
    other_num_groups: usize,
    num_groups: usize,
) -> Result<()> {
    if group_id_mapping.len() != other_num_groups {
        return internal_err!(
            "group id mapping has {} entries for {} groups",
            group_id_mapping.len(),
            other_num_groups
        );
    }
    if let Some(&g) = group_id_mapping.iter().max() {
        if g as usize >= num_groups {
            return internal_err!(
                "group id mapping targets group {g} but only {num_groups} groups exist"
            );
        }
    }
    Ok(())
}
