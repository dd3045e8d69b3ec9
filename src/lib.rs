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

//! Group-wise aggregation kernels for Arrow columnar data.
//!
//! Each aggregate function is a [`GroupedAggregator`]: a stateful object
//! fed batches of `(value, group id)` rows that maintains per-group state
//! and produces one output slot per group. The caller assigns dense
//! `u32` group ids (a hash grouper, typically), sizes the aggregator
//! with [`GroupedAggregator::resize`], feeds it with
//! [`GroupedAggregator::consume`], optionally folds per-partition
//! instances together with [`GroupedAggregator::merge`], and drains the
//! result with [`GroupedAggregator::finalize`].
//!
//! ```
//! use std::sync::Arc;
//! use arrow::array::{AsArray, Int64Array, UInt32Array};
//! use arrow::datatypes::{DataType, Int64Type};
//! use groupwise::aggregator::{AggregateBatch, AggregateInput};
//! use groupwise::registry::aggregate_registry;
//!
//! # fn main() -> groupwise::error::Result<()> {
//! let function = aggregate_registry().get("hash_sum")?;
//! let mut sum = function.build(&[DataType::Int64], None)?;
//!
//! let values = Int64Array::from(vec![Some(1), Some(2), Some(3), None, Some(5)]);
//! let group_ids = UInt32Array::from(vec![0, 1, 0, 1, 0]);
//! sum.resize(2)?;
//! sum.consume(&AggregateBatch::new_single(
//!     AggregateInput::Array(Arc::new(values)),
//!     group_ids,
//! )?)?;
//!
//! let out = sum.finalize()?;
//! let out = out.as_primitive::<Int64Type>();
//! assert_eq!(out.value(0), 9);
//! assert_eq!(out.value(1), 2);
//! # Ok(())
//! # }
//! ```
//!
//! Aggregators are single-threaded; parallel callers run one instance
//! per partition and merge them with a group-id remapping. The merge is
//! associative and commutative at the group level, except for the
//! *ordered* aggregates (`hash_first_last` and friends) where `other` is
//! the logically later segment.

#[macro_use]
pub mod error;
pub mod aggregator;
pub mod options;
pub mod registry;

pub mod bool_op;
pub mod count;
pub mod distinct;
pub mod first_last;
pub mod list;
pub mod min_max;
pub mod one;
pub mod pivot;
pub mod quantile;
pub mod reduce;
pub mod statistic;
pub mod tdigest;

mod accumulate;
mod null_policy;

pub use aggregator::{AggregateBatch, AggregateInput, GroupedAggregator};
pub use error::{AggregateError, Result};
pub use options::{
    AggregateOptions, CountMode, CountOptions, PivotWiderOptions,
    ScalarAggregateOptions, SkewOptions, TDigestOptions,
    UnexpectedKeyBehavior, VarianceOptions,
};
pub use registry::{aggregate_registry, AggregateFunction, AggregateRegistry};
