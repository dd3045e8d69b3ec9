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

//! Per-group null bookkeeping shared by the value-producing aggregators.
//!
//! Every value-producing aggregator (everything except the counting
//! functions) masks its output with the same finalize-time rule:
//!
//! ```text
//! valid[g] = count[g] >= min_count AND (skip_nulls OR no_nulls[g])
//! ```
//!
//! refined by aggregator-specific conditions (variance needs
//! `count > ddof`, a t-digest must be non-empty, any/all short-circuit).

use arrow::array::BooleanBufferBuilder;
use arrow::buffer::NullBuffer;

/// Tracks, per group, the number of non-null values consumed and whether
/// any null was consumed.
#[derive(Debug)]
pub(crate) struct NullPolicyState {
    /// Number of non-null values routed to each group.
    pub counts: Vec<i64>,
    /// Bit `g` stays true until a null is routed to group `g`.
    pub no_nulls: BooleanBufferBuilder,
}

impl NullPolicyState {
    pub fn new() -> Self {
        Self {
            counts: vec![],
            no_nulls: BooleanBufferBuilder::new(0),
        }
    }

    pub fn num_groups(&self) -> usize {
        self.counts.len()
    }

    pub fn resize(&mut self, new_num_groups: usize) {
        let added = new_num_groups - self.counts.len();
        self.counts.resize(new_num_groups, 0);
        self.no_nulls.append_n(added, true);
    }

    #[inline]
    pub fn count_value(&mut self, g: u32) {
        self.counts[g as usize] += 1;
    }

    #[inline]
    pub fn mark_null(&mut self, g: u32) {
        self.no_nulls.set_bit(g as usize, false);
    }

    pub fn no_nulls_bit(&self, g: usize) -> bool {
        self.no_nulls.get_bit(g)
    }

    /// Folds `other` into `self` under a group id mapping: counts add,
    /// `no_nulls` bits AND.
    pub fn merge(&mut self, other: &NullPolicyState, group_id_mapping: &[u32]) {
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            let g = g as usize;
            self.counts[g] += other.counts[other_g];
            if !other.no_nulls.get_bit(other_g) {
                self.no_nulls.set_bit(g, false);
            }
        }
    }

    /// Builds the output validity bitmap for the policy above; `also_valid`
    /// is the aggregator-specific refinement, ANDed in per group.
    pub fn build_validity(
        &mut self,
        skip_nulls: bool,
        min_count: u32,
        mut also_valid: impl FnMut(usize) -> bool,
    ) -> NullBuffer {
        let num_groups = self.counts.len();
        let mut builder = BooleanBufferBuilder::new(num_groups);
        for g in 0..num_groups {
            let valid = self.counts[g] >= min_count as i64
                && (skip_nulls || self.no_nulls.get_bit(g))
                && also_valid(g);
            builder.append(valid);
        }
        NullBuffer::new(builder.finish())
    }
}
