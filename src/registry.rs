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

//! The process-wide aggregate function registry.
//!
//! Maps function names (`hash_sum`, `hash_pivot_wider`, ...) to their
//! factories, default options, documentation and ordering contract. The
//! singleton is built once on first access.

use std::collections::HashMap;
use std::sync::OnceLock;

use arrow::datatypes::DataType;

use crate::aggregator::GroupedAggregator;
use crate::error::Result;
use crate::options::{AggregateOptions, CountOptions, ScalarAggregateOptions};
use crate::{
    bool_op, count, distinct, first_last, list, min_max, one, pivot,
    quantile, reduce, statistic,
};

type FactoryFn =
    fn(&[DataType], &AggregateOptions) -> Result<Box<dyn GroupedAggregator>>;

/// One registered aggregate function.
pub struct AggregateFunction {
    name: &'static str,
    /// Number of value columns ahead of the group id column (0, 1 or 2).
    num_inputs: usize,
    /// Ordered aggregates require the caller to feed batches in a
    /// deterministic total order, and their merge treats `other` as the
    /// later segment.
    ordered: bool,
    doc: &'static str,
    default_options: fn() -> AggregateOptions,
    factory: FactoryFn,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn doc(&self) -> &'static str {
        self.doc
    }

    pub fn default_options(&self) -> AggregateOptions {
        (self.default_options)()
    }

    /// Instantiates an aggregator for the given value input types,
    /// falling back to the function's default options.
    pub fn build(
        &self,
        input_types: &[DataType],
        options: Option<&AggregateOptions>,
    ) -> Result<Box<dyn GroupedAggregator>> {
        if input_types.len() != self.num_inputs {
            return invalid_err!(
                "{} expects {} value column(s), got {}",
                self.name,
                self.num_inputs,
                input_types.len()
            );
        }
        match options {
            Some(options) => (self.factory)(input_types, options),
            None => (self.factory)(input_types, &self.default_options()),
        }
    }
}

/// A lookup table of every aggregate function in this crate.
pub struct AggregateRegistry {
    functions: HashMap<&'static str, AggregateFunction>,
}

impl AggregateRegistry {
    fn register(&mut self, function: AggregateFunction) {
        debug_assert!(
            !self.functions.contains_key(function.name),
            "duplicate registration of {}",
            function.name
        );
        self.functions.insert(function.name, function);
    }

    pub fn get(&self, name: &str) -> Result<&AggregateFunction> {
        self.functions
            .get(name)
            .ok_or_else(|| invalid_agg_err!("no aggregate function named {name:?}"))
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

fn no_options() -> AggregateOptions {
    AggregateOptions::None
}

fn default_scalar_aggregate() -> AggregateOptions {
    AggregateOptions::ScalarAggregate(ScalarAggregateOptions::default())
}

fn default_count() -> AggregateOptions {
    AggregateOptions::Count(CountOptions::default())
}

fn default_variance() -> AggregateOptions {
    AggregateOptions::Variance(Default::default())
}

fn default_skew() -> AggregateOptions {
    AggregateOptions::Skew(Default::default())
}

fn default_tdigest() -> AggregateOptions {
    AggregateOptions::TDigest(Default::default())
}

fn build_registry() -> AggregateRegistry {
    let mut registry = AggregateRegistry {
        functions: HashMap::new(),
    };

    macro_rules! register {
        ($name:literal, $num_inputs:expr, $ordered:expr, $defaults:expr, $factory:expr, $doc:literal) => {
            registry.register(AggregateFunction {
                name: $name,
                num_inputs: $num_inputs,
                ordered: $ordered,
                doc: $doc,
                default_options: $defaults,
                factory: $factory,
            });
        };
    }

    register!(
        "hash_count_all",
        0,
        false,
        no_options,
        count::make_count_all,
        "Count the number of rows in each group"
    );
    register!(
        "hash_count",
        1,
        false,
        default_count,
        count::make_count,
        "Count the number of null / non-null values in each group"
    );
    register!(
        "hash_sum",
        1,
        false,
        default_scalar_aggregate,
        reduce::make_sum,
        "Sum values in each group; integer overflow wraps around"
    );
    register!(
        "hash_product",
        1,
        false,
        default_scalar_aggregate,
        reduce::make_product,
        "Multiply values in each group; integer overflow wraps around"
    );
    register!(
        "hash_mean",
        1,
        false,
        default_scalar_aggregate,
        reduce::make_mean,
        "Average values in each group"
    );
    register!(
        "hash_variance",
        1,
        false,
        default_variance,
        statistic::make_variance,
        "Calculate the variance of values in each group"
    );
    register!(
        "hash_stddev",
        1,
        false,
        default_variance,
        statistic::make_stddev,
        "Calculate the standard deviation of values in each group"
    );
    register!(
        "hash_skew",
        1,
        false,
        default_skew,
        statistic::make_skew,
        "Calculate the skewness of values in each group"
    );
    register!(
        "hash_kurtosis",
        1,
        false,
        default_skew,
        statistic::make_kurtosis,
        "Calculate the excess kurtosis of values in each group"
    );
    register!(
        "hash_tdigest",
        1,
        false,
        default_tdigest,
        quantile::make_tdigest,
        "Calculate approximate quantiles of values in each group"
    );
    register!(
        "hash_approximate_median",
        1,
        false,
        default_scalar_aggregate,
        quantile::make_approximate_median,
        "Calculate the approximate median of values in each group"
    );
    register!(
        "hash_min_max",
        1,
        false,
        default_scalar_aggregate,
        min_max::make_min_max,
        "Find the minimum and maximum value in each group"
    );
    register!(
        "hash_min",
        1,
        false,
        default_scalar_aggregate,
        min_max::make_min,
        "Find the minimum value in each group"
    );
    register!(
        "hash_max",
        1,
        false,
        default_scalar_aggregate,
        min_max::make_max,
        "Find the maximum value in each group"
    );
    register!(
        "hash_first_last",
        1,
        true,
        default_scalar_aggregate,
        first_last::make_first_last,
        "Find the first and last value in each group, in delivery order"
    );
    register!(
        "hash_first",
        1,
        true,
        default_scalar_aggregate,
        first_last::make_first,
        "Find the first value in each group, in delivery order"
    );
    register!(
        "hash_last",
        1,
        true,
        default_scalar_aggregate,
        first_last::make_last,
        "Find the last value in each group, in delivery order"
    );
    register!(
        "hash_any",
        1,
        false,
        default_scalar_aggregate,
        bool_op::make_any,
        "Whether any value in each group is true"
    );
    register!(
        "hash_all",
        1,
        false,
        default_scalar_aggregate,
        bool_op::make_all,
        "Whether all values in each group are true"
    );
    register!(
        "hash_count_distinct",
        1,
        false,
        default_count,
        distinct::make_count_distinct,
        "Count the distinct values in each group"
    );
    register!(
        "hash_distinct",
        1,
        false,
        default_count,
        distinct::make_distinct,
        "Keep the distinct values in each group"
    );
    register!(
        "hash_one",
        1,
        false,
        no_options,
        one::make_one,
        "Keep one arbitrary non-null value from each group"
    );
    register!(
        "hash_list",
        1,
        false,
        no_options,
        list::make_list,
        "Keep all values in each group, nulls included"
    );
    register!(
        "hash_pivot_wider",
        2,
        false,
        || AggregateOptions::PivotWider(Default::default()),
        pivot::make_pivot_wider,
        "Scatter values into one output column per pivot key"
    );

    log::debug!(
        "registered {} hash aggregate functions",
        registry.functions.len()
    );
    registry
}

/// The process-wide registry singleton.
pub fn aggregate_registry() -> &'static AggregateRegistry {
    static REGISTRY: OnceLock<AggregateRegistry> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AggregateError;

    #[test]
    fn registry_has_all_functions() {
        let registry = aggregate_registry();
        let names = registry.names();
        assert_eq!(names.len(), 24);
        for name in [
            "hash_count",
            "hash_sum",
            "hash_variance",
            "hash_tdigest",
            "hash_min_max",
            "hash_first_last",
            "hash_pivot_wider",
        ] {
            assert!(names.contains(&name), "{name} missing");
        }
    }

    #[test]
    fn ordered_flags() {
        let registry = aggregate_registry();
        assert!(registry.get("hash_first_last").unwrap().is_ordered());
        assert!(registry.get("hash_first").unwrap().is_ordered());
        assert!(registry.get("hash_last").unwrap().is_ordered());
        assert!(!registry.get("hash_sum").unwrap().is_ordered());
    }

    #[test]
    fn build_checks_arity() {
        let registry = aggregate_registry();
        let err = registry
            .get("hash_sum")
            .unwrap()
            .build(&[], None)
            .unwrap_err();
        assert!(matches!(err, AggregateError::Invalid(_)));

        let agg = registry
            .get("hash_sum")
            .unwrap()
            .build(&[DataType::Int32], None)
            .unwrap();
        assert_eq!(agg.out_type(), DataType::Int64);
    }

    #[test]
    fn unknown_name() {
        let err = aggregate_registry().get("hash_frobnicate").unwrap_err();
        assert!(err.to_string().contains("hash_frobnicate"));
    }

    #[test]
    fn wrong_options_variant_is_rejected() {
        let registry = aggregate_registry();
        let err = registry
            .get("hash_variance")
            .unwrap()
            .build(
                &[DataType::Int32],
                Some(&AggregateOptions::Count(CountOptions::default())),
            )
            .unwrap_err();
        assert!(matches!(err, AggregateError::InvalidOptions(_)));
    }
}
