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

//! Option records accepted by the aggregate factories.

use crate::error::Result;

/// Options for most single-value aggregates (sum, mean, min/max, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarAggregateOptions {
    /// If true, nulls are ignored; otherwise a group that saw any null
    /// produces a null result.
    pub skip_nulls: bool,
    /// Minimum number of non-null inputs a group needs to produce a
    /// non-null output.
    pub min_count: u32,
}

impl Default for ScalarAggregateOptions {
    fn default() -> Self {
        Self {
            skip_nulls: true,
            min_count: 1,
        }
    }
}

/// Which rows `hash_count`, `hash_count_distinct` and `hash_distinct`
/// consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    /// Count (or keep) only non-null values.
    OnlyValid,
    /// Count (or keep) only null values.
    OnlyNull,
    /// Count (or keep) all values.
    All,
}

/// Options for the counting aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct CountOptions {
    pub mode: CountMode,
}

impl Default for CountOptions {
    fn default() -> Self {
        Self {
            mode: CountMode::OnlyValid,
        }
    }
}

/// Options for `hash_variance` and `hash_stddev`.
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceOptions {
    /// Delta degrees of freedom: the divisor in the variance is
    /// `count - ddof`.
    pub ddof: i32,
    pub skip_nulls: bool,
    pub min_count: u32,
}

impl Default for VarianceOptions {
    fn default() -> Self {
        Self {
            ddof: 0,
            skip_nulls: true,
            min_count: 0,
        }
    }
}

/// Options for `hash_skew` and `hash_kurtosis` (`ddof` is implicitly 0).
#[derive(Debug, Clone, PartialEq)]
pub struct SkewOptions {
    pub skip_nulls: bool,
    pub min_count: u32,
}

impl Default for SkewOptions {
    fn default() -> Self {
        Self {
            skip_nulls: true,
            min_count: 0,
        }
    }
}

/// Options for `hash_tdigest`.
#[derive(Debug, Clone, PartialEq)]
pub struct TDigestOptions {
    /// Quantiles to compute, each in `[0, 1]`.
    pub q: Vec<f64>,
    /// Compression parameter: larger values trade memory for accuracy.
    pub delta: u32,
    /// Number of incoming values buffered before they are folded into the
    /// sketch.
    pub buffer_size: u32,
    pub skip_nulls: bool,
    pub min_count: u32,
}

impl Default for TDigestOptions {
    fn default() -> Self {
        Self {
            q: vec![0.5],
            delta: 100,
            buffer_size: 500,
            skip_nulls: true,
            min_count: 0,
        }
    }
}

/// What `hash_pivot_wider` does with a key that is not listed in
/// `key_names`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnexpectedKeyBehavior {
    /// Silently skip the row.
    #[default]
    Ignore,
    /// Fail with an `Invalid` error.
    Raise,
}

/// Options for `hash_pivot_wider`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PivotWiderOptions {
    /// The output struct has one field per key name, in this order.
    pub key_names: Vec<String>,
    pub unexpected_key_behavior: UnexpectedKeyBehavior,
}

/// The options record passed to an aggregate factory. Each factory accepts
/// exactly one variant and fails with `InvalidOptions` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOptions {
    /// For nullary functions (`hash_count_all`, `hash_one`, `hash_list`).
    None,
    ScalarAggregate(ScalarAggregateOptions),
    Count(CountOptions),
    Variance(VarianceOptions),
    Skew(SkewOptions),
    TDigest(TDigestOptions),
    PivotWider(PivotWiderOptions),
}

impl AggregateOptions {
    /// Extracts the [`ScalarAggregateOptions`] variant, treating `None` as
    /// the defaults.
    pub(crate) fn scalar_aggregate(&self) -> Result<ScalarAggregateOptions> {
        match self {
            AggregateOptions::ScalarAggregate(opts) => Ok(opts.clone()),
            AggregateOptions::None => Ok(ScalarAggregateOptions::default()),
            other => options_err!(
                "expected ScalarAggregateOptions, got {other:?}"
            ),
        }
    }

    pub(crate) fn count(&self) -> Result<CountOptions> {
        match self {
            AggregateOptions::Count(opts) => Ok(opts.clone()),
            AggregateOptions::None => Ok(CountOptions::default()),
            other => options_err!("expected CountOptions, got {other:?}"),
        }
    }

    pub(crate) fn variance(&self) -> Result<VarianceOptions> {
        match self {
            AggregateOptions::Variance(opts) => Ok(opts.clone()),
            AggregateOptions::None => Ok(VarianceOptions::default()),
            other => options_err!("expected VarianceOptions, got {other:?}"),
        }
    }

    pub(crate) fn skew(&self) -> Result<SkewOptions> {
        match self {
            AggregateOptions::Skew(opts) => Ok(opts.clone()),
            AggregateOptions::None => Ok(SkewOptions::default()),
            other => options_err!("expected SkewOptions, got {other:?}"),
        }
    }

    pub(crate) fn tdigest(&self) -> Result<TDigestOptions> {
        match self {
            AggregateOptions::TDigest(opts) => Ok(opts.clone()),
            AggregateOptions::None => Ok(TDigestOptions::default()),
            other => options_err!("expected TDigestOptions, got {other:?}"),
        }
    }

    pub(crate) fn pivot_wider(&self) -> Result<PivotWiderOptions> {
        match self {
            AggregateOptions::PivotWider(opts) => Ok(opts.clone()),
            other => options_err!("expected PivotWiderOptions, got {other:?}"),
        }
    }
}
