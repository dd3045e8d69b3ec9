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

//! Grouped statistical moments: `hash_variance`, `hash_stddev`,
//! `hash_skew` and `hash_kurtosis`.
//!
//! Per group the state is `(count, mean, m2[, m3[, m4]])` where
//! `m_k = sum((x - mean)^k)`. Batches are reduced locally and folded into
//! the persistent state with the parallel-moment formulas (Pébay's
//! generalization of Chan et al.), which also drive cross-partition
//! merges. Small integers take a one-pass integer path; everything else
//! uses a numerically stable two-pass algorithm per batch.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanBufferBuilder, PrimitiveArray};
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Decimal128Type, Float32Type, Float64Type,
    Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type,
    UInt64Type, UInt8Type,
};

use crate::accumulate::{decoded_type, visit_grouped_values};
use crate::aggregator::{
    check_mapping, merge_target, AggregateBatch, AggregateInput,
    GroupedAggregator,
};
use crate::error::Result;
use crate::options::AggregateOptions;

/// Which statistic an instance of [`GroupedStatistic`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticType {
    Variance,
    Stddev,
    Skew,
    Kurtosis,
}

/// The highest central moment a statistic needs.
fn moments_level(stat_type: StatisticType) -> usize {
    match stat_type {
        StatisticType::Variance | StatisticType::Stddev => 2,
        StatisticType::Skew => 3,
        StatisticType::Kurtosis => 4,
    }
}

/// One group's moments, used as the unit of merging.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    count: i64,
    mean: f64,
    m2: f64,
    m3: f64,
    m4: f64,
}

impl Moments {
    /// Combines the moments of two disjoint samples. Moments above
    /// `level` are left at zero and must not be read.
    fn merge(level: usize, a: Moments, b: Moments) -> Moments {
        if a.count == 0 {
            return b;
        }
        if b.count == 0 {
            return a;
        }
        let na = a.count as f64;
        let nb = b.count as f64;
        let n = na + nb;
        let delta = b.mean - a.mean;

        let mut out = Moments {
            count: a.count + b.count,
            mean: a.mean + delta * nb / n,
            m2: a.m2 + b.m2 + delta * delta * na * nb / n,
            m3: 0.0,
            m4: 0.0,
        };
        if level >= 3 {
            out.m3 = a.m3
                + b.m3
                + delta.powi(3) * na * nb * (na - nb) / (n * n)
                + 3.0 * delta * (na * b.m2 - nb * a.m2) / n;
        }
        if level >= 4 {
            out.m4 = a.m4
                + b.m4
                + delta.powi(4) * na * nb * (na * na - na * nb + nb * nb)
                    / (n * n * n)
                + 6.0 * delta * delta * (na * na * b.m2 + nb * nb * a.m2)
                    / (n * n)
                + 4.0 * delta * (na * b.m3 - nb * a.m3) / n;
        }
        out
    }

    fn variance(&self, ddof: i32) -> f64 {
        self.m2 / (self.count - ddof as i64) as f64
    }

    fn stddev(&self, ddof: i32) -> f64 {
        self.variance(ddof).sqrt()
    }

    fn skew(&self) -> f64 {
        let n = self.count as f64;
        (self.m3 / n) / (self.m2 / n).powf(1.5)
    }

    /// Excess kurtosis.
    fn kurtosis(&self) -> f64 {
        let n = self.count as f64;
        (self.m4 / n) / (self.m2 / n).powi(2) - 3.0
    }
}

/// One-pass `(count, sum, sum of squares)` over a chunk of small-integer
/// rows; the chunk length bound keeps `sum` inside `i64`.
#[derive(Debug, Clone, Copy, Default)]
struct IntegerVarStd {
    count: i64,
    sum: i64,
    square_sum: i128,
}

impl IntegerVarStd {
    #[inline]
    fn consume_one(&mut self, value: i64) {
        self.count += 1;
        self.sum += value;
        self.square_sum += (value * value) as i128;
    }

    fn mean(&self) -> f64 {
        self.sum as f64 / self.count as f64
    }

    /// `m2 = sum(x^2) - sum(x) * mean`
    fn m2(&self) -> f64 {
        self.square_sum as f64 - self.sum as f64 * self.mean()
    }
}

/// Input types the moment aggregators accept.
pub trait MomentsInput: ArrowPrimitiveType + Send {
    /// Maximum chunk length for the integer fast path:
    /// `2^(63 - 8 * size_of::<Native>())` rows keep the running sum inside
    /// `i64`. `None` for types without the fast path.
    const INTEGER_CHUNK: Option<usize>;

    fn to_double(v: Self::Native, decimal_scale: i8) -> f64;

    /// Only called on the integer fast path.
    fn to_i64(v: Self::Native) -> i64;
}

macro_rules! integer_moments_input {
    ($type:ty, $native:ty) => {
        impl MomentsInput for $type {
            const INTEGER_CHUNK: Option<usize> =
                Some(1 << (63 - 8 * std::mem::size_of::<$native>()));

            fn to_double(v: $native, _decimal_scale: i8) -> f64 {
                v as f64
            }

            fn to_i64(v: $native) -> i64 {
                v as i64
            }
        }
    };
}

macro_rules! float_moments_input {
    ($type:ty, $native:ty) => {
        impl MomentsInput for $type {
            const INTEGER_CHUNK: Option<usize> = None;

            fn to_double(v: $native, _decimal_scale: i8) -> f64 {
                v as f64
            }

            fn to_i64(_v: $native) -> i64 {
                debug_assert!(false, "no integer fast path for this type");
                0
            }
        }
    };
}

integer_moments_input!(Int8Type, i8);
integer_moments_input!(Int16Type, i16);
integer_moments_input!(Int32Type, i32);
integer_moments_input!(UInt8Type, u8);
integer_moments_input!(UInt16Type, u16);
integer_moments_input!(UInt32Type, u32);
// 8-byte integers would overflow the chunked i64 sums; they go through
// the general path.
float_moments_input!(Int64Type, i64);
float_moments_input!(UInt64Type, u64);
float_moments_input!(Float32Type, f32);
float_moments_input!(Float64Type, f64);

impl MomentsInput for Decimal128Type {
    const INTEGER_CHUNK: Option<usize> = None;

    fn to_double(v: i128, decimal_scale: i8) -> f64 {
        v as f64 / 10_f64.powi(decimal_scale as i32)
    }

    fn to_i64(_v: i128) -> i64 {
        debug_assert!(false, "no integer fast path for decimals");
        0
    }
}

/// Grouped accumulator for all four moment statistics.
pub struct GroupedStatistic<T: MomentsInput> {
    stat_type: StatisticType,
    moments_level: usize,
    ddof: i32,
    skip_nulls: bool,
    min_count: u32,
    decimal_scale: i8,
    counts: Vec<i64>,
    means: Vec<f64>,
    m2s: Vec<f64>,
    /// Allocated only when `moments_level >= 3` / `>= 4`.
    m3s: Vec<f64>,
    m4s: Vec<f64>,
    no_nulls: BooleanBufferBuilder,
    _marker: PhantomData<T>,
}

impl<T: MomentsInput> GroupedStatistic<T> {
    pub(crate) fn new(
        stat_type: StatisticType,
        ddof: i32,
        skip_nulls: bool,
        min_count: u32,
        decimal_scale: i8,
    ) -> Self {
        Self {
            stat_type,
            moments_level: moments_level(stat_type),
            ddof,
            skip_nulls,
            min_count,
            decimal_scale,
            counts: vec![],
            means: vec![],
            m2s: vec![],
            m3s: vec![],
            m4s: vec![],
            no_nulls: BooleanBufferBuilder::new(0),
            _marker: PhantomData,
        }
    }

    fn num_groups(&self) -> usize {
        self.counts.len()
    }

    fn moments(&self, g: usize) -> Moments {
        Moments {
            count: self.counts[g],
            mean: self.means[g],
            m2: self.m2s[g],
            m3: if self.moments_level >= 3 { self.m3s[g] } else { 0.0 },
            m4: if self.moments_level >= 4 { self.m4s[g] } else { 0.0 },
        }
    }

    fn store_moments(&mut self, g: usize, m: Moments) {
        self.counts[g] = m.count;
        self.means[g] = m.mean;
        self.m2s[g] = m.m2;
        if self.moments_level >= 3 {
            self.m3s[g] = m.m3;
        }
        if self.moments_level >= 4 {
            self.m4s[g] = m.m4;
        }
    }

    /// Reduces one slice of rows into per-group scratch moments with the
    /// two-pass algorithm, then folds the scratch into the persistent
    /// state with the same-group merge.
    fn consume_generic(
        &mut self,
        input: &AggregateInput,
        group_ids: &[u32],
    ) -> Result<()> {
        let num_groups = self.num_groups();
        let mut scratch = vec![Moments::default(); num_groups];
        let mut sums = vec![0.0_f64; num_groups];
        let scale = self.decimal_scale;
        let level = self.moments_level;

        {
            let no_nulls = &mut self.no_nulls;
            visit_grouped_values::<T, _, _>(
                input,
                group_ids,
                |g, v| {
                    sums[g as usize] += T::to_double(v, scale);
                    scratch[g as usize].count += 1;
                },
                |g| no_nulls.set_bit(g as usize, false),
            )?;
        }

        for (m, &sum) in scratch.iter_mut().zip(sums.iter()) {
            if m.count > 0 {
                m.mean = sum / m.count as f64;
            }
        }

        visit_grouped_values::<T, _, _>(
            input,
            group_ids,
            |g, v| {
                let m = &mut scratch[g as usize];
                let d = T::to_double(v, scale) - m.mean;
                let d2 = d * d;
                m.m2 += d2;
                if level >= 3 {
                    m.m3 += d2 * d;
                    if level >= 4 {
                        m.m4 += d2 * d2;
                    }
                }
            },
            |_| {},
        )?;

        for (g, m) in scratch.into_iter().enumerate() {
            if m.count > 0 {
                self.store_moments(g, Moments::merge(level, self.moments(g), m));
            }
        }
        Ok(())
    }

    /// One-pass integer path: processes the batch in chunks short enough
    /// that the per-group integer sums cannot overflow, then derives
    /// `(mean, m2)` per chunk and merges.
    fn consume_integral(
        &mut self,
        input: &AggregateInput,
        group_ids: &[u32],
        chunk: usize,
    ) -> Result<()> {
        let num_rows = group_ids.len();
        let num_groups = self.num_groups();
        let mut var_std: Vec<IntegerVarStd> = Vec::new();

        let mut start = 0;
        while start < num_rows {
            let len = chunk.min(num_rows - start);
            let sliced = match input {
                AggregateInput::Array(a) => {
                    AggregateInput::Array(a.slice(start, len))
                }
                AggregateInput::Scalar(s) => {
                    AggregateInput::Scalar(Arc::clone(s))
                }
            };

            var_std.clear();
            var_std.resize(num_groups, IntegerVarStd::default());
            {
                let no_nulls = &mut self.no_nulls;
                visit_grouped_values::<T, _, _>(
                    &sliced,
                    &group_ids[start..start + len],
                    |g, v| var_std[g as usize].consume_one(T::to_i64(v)),
                    |g| no_nulls.set_bit(g as usize, false),
                )?;
            }

            for (g, vs) in var_std.iter().enumerate() {
                if vs.count == 0 {
                    continue;
                }
                let chunk_moments = Moments {
                    count: vs.count,
                    mean: vs.mean(),
                    m2: vs.m2(),
                    m3: 0.0,
                    m4: 0.0,
                };
                self.store_moments(
                    g,
                    Moments::merge(2, self.moments(g), chunk_moments),
                );
            }
            start += len;
        }
        Ok(())
    }
}

impl<T: MomentsInput> GroupedAggregator for GroupedStatistic<T> {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        let added = new_num_groups - self.counts.len();
        self.counts.resize(new_num_groups, 0);
        self.means.resize(new_num_groups, 0.0);
        self.m2s.resize(new_num_groups, 0.0);
        if self.moments_level >= 3 {
            self.m3s.resize(new_num_groups, 0.0);
        }
        if self.moments_level >= 4 {
            self.m4s.resize(new_num_groups, 0.0);
        }
        self.no_nulls.append_n(added, true);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let input = batch.value(0)?.clone();
        let group_ids = batch.group_ids();
        match T::INTEGER_CHUNK {
            Some(chunk) if self.moments_level == 2 => {
                self.consume_integral(&input, group_ids, chunk)
            }
            _ => self.consume_generic(&input, group_ids),
        }
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(group_id_mapping, other.num_groups(), self.num_groups())?;
        let level = self.moments_level;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            let g = g as usize;
            if !other.no_nulls.get_bit(other_g) {
                self.no_nulls.set_bit(g, false);
            }
            if other.counts[other_g] == 0 {
                continue;
            }
            self.store_moments(
                g,
                Moments::merge(level, self.moments(g), other.moments(other_g)),
            );
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let num_groups = self.num_groups();
        let mut values = vec![0.0_f64; num_groups];
        let mut validity = BooleanBufferBuilder::new(num_groups);

        for g in 0..num_groups {
            let count = self.counts[g];
            let valid = count > self.ddof as i64
                && count >= self.min_count as i64
                && (self.skip_nulls || self.no_nulls.get_bit(g));
            validity.append(valid);
            if !valid {
                continue;
            }
            let moments = self.moments(g);
            values[g] = match self.stat_type {
                StatisticType::Variance => moments.variance(self.ddof),
                StatisticType::Stddev => moments.stddev(self.ddof),
                StatisticType::Skew => moments.skew(),
                StatisticType::Kurtosis => moments.kurtosis(),
            };
        }

        Ok(Arc::new(PrimitiveArray::<Float64Type>::new(
            values.into(),
            Some(validity.finish().into()),
        )))
    }

    fn out_type(&self) -> DataType {
        DataType::Float64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

fn make_statistic(
    input: &DataType,
    stat_type: StatisticType,
    ddof: i32,
    skip_nulls: bool,
    min_count: u32,
) -> Result<Box<dyn GroupedAggregator>> {
    macro_rules! helper {
        ($in:ty) => {
            Ok(Box::new(GroupedStatistic::<$in>::new(
                stat_type, ddof, skip_nulls, min_count, 0,
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
            Ok(Box::new(GroupedStatistic::<Decimal128Type>::new(
                stat_type, ddof, skip_nulls, min_count, *scale,
            )))
        }
        other => {
            not_impl_err!("grouped {stat_type:?} over input type {other}")
        }
    }
}

pub(crate) fn make_variance(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.variance()?;
    make_statistic(
        decoded_type(&input_types[0]),
        StatisticType::Variance,
        options.ddof,
        options.skip_nulls,
        options.min_count,
    )
}

pub(crate) fn make_stddev(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.variance()?;
    make_statistic(
        decoded_type(&input_types[0]),
        StatisticType::Stddev,
        options.ddof,
        options.skip_nulls,
        options.min_count,
    )
}

pub(crate) fn make_skew(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.skew()?;
    make_statistic(
        decoded_type(&input_types[0]),
        StatisticType::Skew,
        0,
        options.skip_nulls,
        options.min_count,
    )
}

pub(crate) fn make_kurtosis(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.skew()?;
    make_statistic(
        decoded_type(&input_types[0]),
        StatisticType::Kurtosis,
        0,
        options.skip_nulls,
        options.min_count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::VarianceOptions;
    use arrow::array::{Array, AsArray, Float64Array, Int32Array, UInt32Array};

    fn int32_batch(
        values: Vec<Option<i32>>,
        groups: Vec<u32>,
    ) -> AggregateBatch {
        AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(Int32Array::from(values))),
            UInt32Array::from(groups),
        )
        .unwrap()
    }

    fn float64_batch(values: Vec<f64>, groups: Vec<u32>) -> AggregateBatch {
        AggregateBatch::new_single(
            AggregateInput::Array(Arc::new(Float64Array::from(values))),
            UInt32Array::from(groups),
        )
        .unwrap()
    }

    fn variance_opts(ddof: i32) -> AggregateOptions {
        AggregateOptions::Variance(VarianceOptions {
            ddof,
            ..Default::default()
        })
    }

    #[test]
    fn sample_variance_int32() {
        let mut agg =
            make_variance(&[DataType::Int32], &variance_opts(1)).unwrap();
        agg.resize(2).unwrap();
        agg.consume(&int32_batch(
            vec![Some(1), Some(10), Some(2), Some(20), Some(3)],
            vec![0, 1, 0, 1, 0],
        ))
        .unwrap();
        let out = agg.finalize().unwrap();
        let out = out.as_primitive::<Float64Type>();
        assert_eq!(out.value(0), 1.0);
        assert_eq!(out.value(1), 50.0);
    }

    #[test]
    fn variance_needs_count_above_ddof() {
        let mut agg =
            make_variance(&[DataType::Int32], &variance_opts(1)).unwrap();
        agg.resize(2).unwrap();
        agg.consume(&int32_batch(vec![Some(1), Some(2)], vec![0, 0]))
            .unwrap();
        let out = agg.finalize().unwrap();
        assert!(out.is_valid(0));
        assert!(out.is_null(1)); // empty group

        let mut agg =
            make_variance(&[DataType::Int32], &variance_opts(1)).unwrap();
        agg.resize(1).unwrap();
        agg.consume(&int32_batch(vec![Some(7)], vec![0])).unwrap();
        let out = agg.finalize().unwrap();
        assert!(out.is_null(0)); // count == ddof
    }

    #[test]
    fn integer_path_matches_general_path() {
        // the same data through Int32 (integer fast path) and Float64
        // (two-pass general path)
        let raw: Vec<i32> =
            vec![3, -7, 11, 0, 5, 5, -2, 9, 14, -8, 1, 2, 6, -13, 4];
        let groups: Vec<u32> =
            raw.iter().enumerate().map(|(i, _)| (i % 3) as u32).collect();

        let mut int_agg =
            make_variance(&[DataType::Int32], &variance_opts(0)).unwrap();
        int_agg.resize(3).unwrap();
        int_agg
            .consume(&int32_batch(
                raw.iter().map(|&v| Some(v)).collect(),
                groups.clone(),
            ))
            .unwrap();

        let mut float_agg =
            make_variance(&[DataType::Float64], &variance_opts(0)).unwrap();
        float_agg.resize(3).unwrap();
        float_agg
            .consume(&float64_batch(
                raw.iter().map(|&v| v as f64).collect(),
                groups,
            ))
            .unwrap();

        let ints = int_agg.finalize().unwrap();
        let ints = ints.as_primitive::<Float64Type>();
        let floats = float_agg.finalize().unwrap();
        let floats = floats.as_primitive::<Float64Type>();
        for g in 0..3 {
            assert!(
                (ints.value(g) - floats.value(g)).abs() < 1e-9,
                "group {g}: {} vs {}",
                ints.value(g),
                floats.value(g)
            );
        }
    }

    #[test]
    fn skew_of_symmetric_data_is_zero() {
        let mut agg = make_skew(&[DataType::Float64], &AggregateOptions::None)
            .unwrap();
        agg.resize(1).unwrap();
        agg.consume(&float64_batch(vec![1.0, 2.0, 3.0, 4.0, 5.0], vec![0; 5]))
            .unwrap();
        let out = agg.finalize().unwrap();
        assert!(out.as_primitive::<Float64Type>().value(0).abs() < 1e-12);
    }

    #[test]
    fn kurtosis_of_uniform_four_points() {
        let mut agg =
            make_kurtosis(&[DataType::Float64], &AggregateOptions::None)
                .unwrap();
        agg.resize(1).unwrap();
        agg.consume(&float64_batch(vec![1.0, 2.0, 3.0, 4.0], vec![0; 4]))
            .unwrap();
        let out = agg.finalize().unwrap();
        let k = out.as_primitive::<Float64Type>().value(0);
        assert!((k - (-1.36)).abs() < 1e-12, "kurtosis {k}");
    }

    #[test]
    fn merge_is_associative_for_moments() {
        let data: Vec<f64> = (0..30).map(|i| (i * 7 % 13) as f64).collect();
        let groups: Vec<u32> = (0..30).map(|i| (i % 2) as u32).collect();

        let make_part = |range: std::ops::Range<usize>| {
            let mut agg =
                make_variance(&[DataType::Float64], &variance_opts(1))
                    .unwrap();
            agg.resize(2).unwrap();
            agg.consume(&float64_batch(
                data[range.clone()].to_vec(),
                groups[range].to_vec(),
            ))
            .unwrap();
            agg
        };

        let identity = [0_u32, 1];

        // (A + B) + C
        let mut left = make_part(0..10);
        let b = make_part(10..20);
        left.merge(b, &identity).unwrap();
        let c = make_part(20..30);
        left.merge(c, &identity).unwrap();

        // A + (B + C)
        let mut right = make_part(0..10);
        let mut bc = make_part(10..20);
        let c = make_part(20..30);
        bc.merge(c, &identity).unwrap();
        right.merge(bc, &identity).unwrap();

        let l = left.finalize().unwrap();
        let l = l.as_primitive::<Float64Type>();
        let r = right.finalize().unwrap();
        let r = r.as_primitive::<Float64Type>();
        for g in 0..2 {
            assert!((l.value(g) - r.value(g)).abs() < 1e-9);
        }
    }

    #[test]
    fn skew_over_strings_is_not_implemented() {
        let err = make_skew(&[DataType::Utf8], &AggregateOptions::None)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::AggregateError::NotImplemented(_)
        ));
    }
}
