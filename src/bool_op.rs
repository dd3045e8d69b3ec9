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

//! `hash_any` and `hash_all`: boolean reducers.
//!
//! With `skip_nulls=false` a group that saw a null is masked to null
//! *unless* the result is already decided: `any` that saw a `true` stays
//! `true`, `all` that saw a `false` stays `false` (three-valued logic).

use std::any::Any;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, BooleanBufferBuilder};
use arrow::buffer::NullBuffer;
use arrow::datatypes::DataType;

use crate::accumulate::visit_grouped_booleans;
use crate::aggregator::{
    check_mapping, merge_target, AggregateBatch, GroupedAggregator,
};
use crate::error::Result;
use crate::null_policy::NullPolicyState;
use crate::options::{AggregateOptions, ScalarAggregateOptions};

/// Whether an instance reduces with OR (`any`) or AND (`all`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BooleanOp {
    Any,
    All,
}

impl BooleanOp {
    /// The reduction identity: what an untouched group holds.
    fn null_value(self) -> bool {
        match self {
            BooleanOp::Any => false,
            BooleanOp::All => true,
        }
    }

    #[inline]
    fn update(self, reduced: &mut BooleanBufferBuilder, g: usize, value: bool) {
        match self {
            BooleanOp::Any => {
                if value {
                    reduced.set_bit(g, true);
                }
            }
            BooleanOp::All => {
                if !value {
                    reduced.set_bit(g, false);
                }
            }
        }
    }

    /// Whether the reduced value alone already decides the result, so
    /// nulls cannot change it.
    fn short_circuits(self, reduced: bool) -> bool {
        match self {
            BooleanOp::Any => reduced,
            BooleanOp::All => !reduced,
        }
    }
}

/// Grouped `any`/`all` over boolean inputs.
pub struct GroupedBooleanOp {
    op: BooleanOp,
    options: ScalarAggregateOptions,
    reduced: BooleanBufferBuilder,
    policy: NullPolicyState,
}

impl GroupedBooleanOp {
    fn new(op: BooleanOp, options: ScalarAggregateOptions) -> Self {
        Self {
            op,
            options,
            reduced: BooleanBufferBuilder::new(0),
            policy: NullPolicyState::new(),
        }
    }
}

impl GroupedAggregator for GroupedBooleanOp {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        let added = new_num_groups - self.policy.num_groups();
        self.reduced.append_n(added, self.op.null_value());
        self.policy.resize(new_num_groups);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let op = self.op;
        let reduced = &mut self.reduced;
        let counts = &mut self.policy.counts;
        let no_nulls = &mut self.policy.no_nulls;

        visit_grouped_booleans(
            batch.value(0)?,
            batch.group_ids(),
            |g, v| {
                op.update(reduced, g as usize, v);
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
            other.policy.num_groups(),
            self.policy.num_groups(),
        )?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            self.op.update(
                &mut self.reduced,
                g as usize,
                other.reduced.get_bit(other_g),
            );
        }
        self.policy.merge(&other.policy, group_id_mapping);
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let op = self.op;
        let num_groups = self.policy.num_groups();
        let mut decided = Vec::with_capacity(num_groups);
        for g in 0..num_groups {
            decided.push(op.short_circuits(self.reduced.get_bit(g)));
        }
        let mut validity_bits = BooleanBufferBuilder::new(num_groups);
        for g in 0..num_groups {
            let valid = self.policy.counts[g]
                >= self.options.min_count as i64
                && (self.options.skip_nulls
                    || self.policy.no_nulls_bit(g)
                    || decided[g]);
            validity_bits.append(valid);
        }
        Ok(Arc::new(BooleanArray::new(
            self.reduced.finish(),
            Some(NullBuffer::new(validity_bits.finish())),
        )))
    }

    fn out_type(&self) -> DataType {
        DataType::Boolean
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

fn make_boolean_op(
    input_types: &[DataType],
    options: &AggregateOptions,
    op: BooleanOp,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.scalar_aggregate()?;
    match crate::accumulate::decoded_type(&input_types[0]) {
        DataType::Boolean => Ok(Box::new(GroupedBooleanOp::new(op, options))),
        other => not_impl_err!("boolean aggregation over input type {other}"),
    }
}

pub(crate) fn make_any(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    make_boolean_op(input_types, options, BooleanOp::Any)
}

pub(crate) fn make_all(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    make_boolean_op(input_types, options, BooleanOp::All)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregateInput;
    use arrow::array::{Array, AsArray, UInt32Array};

    fn bool_batch(
        values: Vec<Option<bool>>,
        groups: Vec<u32>,
    ) -> AggregateBatch {
        AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(BooleanArray::from(values))),
            UInt32Array::from(groups),
        )
        .unwrap()
    }

    fn no_skip() -> AggregateOptions {
        AggregateOptions::ScalarAggregate(ScalarAggregateOptions {
            skip_nulls: false,
            min_count: 1,
        })
    }

    #[test]
    fn any_and_all_reduce() {
        let values = vec![
            Some(true),
            Some(false),
            Some(false),
            Some(false),
            Some(true),
        ];
        let groups = vec![0, 1, 0, 1, 0];

        let mut any =
            make_any(&[DataType::Boolean], &AggregateOptions::None).unwrap();
        any.resize(2).unwrap();
        any.consume(&bool_batch(values.clone(), groups.clone())).unwrap();
        let out = any.finalize().unwrap();
        let out = out.as_boolean();
        assert!(out.value(0));
        assert!(!out.value(1));

        let mut all =
            make_all(&[DataType::Boolean], &AggregateOptions::None).unwrap();
        all.resize(2).unwrap();
        all.consume(&bool_batch(values, groups)).unwrap();
        let out = all.finalize().unwrap();
        let out = out.as_boolean();
        assert!(!out.value(0));
        assert!(!out.value(1));
    }

    #[test]
    fn nulls_mask_unless_short_circuited() {
        // group 0: true + null  -> any=true (decided), all=null
        // group 1: false + null -> any=null, all=false (decided)
        let values = vec![Some(true), Some(false), None, None];
        let groups = vec![0, 1, 0, 1];

        let mut any = make_any(&[DataType::Boolean], &no_skip()).unwrap();
        any.resize(2).unwrap();
        any.consume(&bool_batch(values.clone(), groups.clone())).unwrap();
        let out = any.finalize().unwrap();
        let out = out.as_boolean();
        assert!(out.value(0));
        assert!(out.is_null(1));

        let mut all = make_all(&[DataType::Boolean], &no_skip()).unwrap();
        all.resize(2).unwrap();
        all.consume(&bool_batch(values, groups)).unwrap();
        let out = all.finalize().unwrap();
        let out = out.as_boolean();
        assert!(out.is_null(0));
        assert!(!out.value(1));
    }

    #[test]
    fn min_count_masks_small_groups() {
        let options =
            AggregateOptions::ScalarAggregate(ScalarAggregateOptions {
                skip_nulls: true,
                min_count: 2,
            });
        let mut any = make_any(&[DataType::Boolean], &options).unwrap();
        any.resize(2).unwrap();
        any.consume(&bool_batch(
            vec![Some(true), Some(true), Some(false)],
            vec![0, 1, 1],
        ))
        .unwrap();
        let out = any.finalize().unwrap();
        let out = out.as_boolean();
        assert!(out.is_null(0)); // only one value
        assert!(out.value(1));
    }

    #[test]
    fn merge_keeps_reduction_and_null_state() {
        let mut a = make_all(&[DataType::Boolean], &no_skip()).unwrap();
        a.resize(2).unwrap();
        a.consume(&bool_batch(vec![Some(true), Some(true)], vec![0, 1]))
            .unwrap();

        let mut b = make_all(&[DataType::Boolean], &no_skip()).unwrap();
        b.resize(2).unwrap();
        b.consume(&bool_batch(vec![Some(false), None], vec![0, 1])).unwrap();

        a.merge(b, &[0, 1]).unwrap();
        let out = a.finalize().unwrap();
        let out = out.as_boolean();
        assert!(!out.value(0)); // false decided it despite later merges
        assert!(out.is_null(1)); // null propagated, undecided
    }
}
