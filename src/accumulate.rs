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

//! Row visitation helpers shared by the aggregators.
//!
//! [`visit_grouped_values`] is the inner loop of most aggregators and thus
//! performance critical: the null path iterates the validity bitmap in
//! 64-bit chunks rather than per row. Scalar inputs are broadcast without
//! materialization, and run-end encoded inputs are iterated run-wise.

use arrow::array::{Array, AsArray, BooleanArray, GenericByteArray, RunArray};
use arrow::datatypes::{
    ArrowNativeType, ArrowPrimitiveType, ByteArrayType, DataType, Int16Type,
    Int32Type, Int64Type, RunEndIndexType,
};

use crate::aggregator::AggregateInput;
use crate::error::Result;

/// Invokes `value_fn(group, value)` for every non-null row and
/// `null_fn(group)` for every null row of a primitive input.
///
/// The input may be a plain primitive array, a run-end encoded array whose
/// values are of type `T`, or a scalar broadcast over the batch.
pub(crate) fn visit_grouped_values<T, V, N>(
    input: &AggregateInput,
    group_ids: &[u32],
    mut value_fn: V,
    mut null_fn: N,
) -> Result<()>
where
    T: ArrowPrimitiveType,
    V: FnMut(u32, T::Native),
    N: FnMut(u32),
{
    match input {
        AggregateInput::Scalar(s) => {
            if s.is_valid(0) {
                let value = s.as_primitive::<T>().value(0);
                for &g in group_ids {
                    value_fn(g, value);
                }
            } else {
                for &g in group_ids {
                    null_fn(g);
                }
            }
            Ok(())
        }
        AggregateInput::Array(a) => {
            if let DataType::RunEndEncoded(run_ends, _) = a.data_type() {
                return match run_ends.data_type() {
                    DataType::Int16 => visit_run_encoded::<T, Int16Type, _, _>(
                        a.as_ref(),
                        group_ids,
                        value_fn,
                        null_fn,
                    ),
                    DataType::Int32 => visit_run_encoded::<T, Int32Type, _, _>(
                        a.as_ref(),
                        group_ids,
                        value_fn,
                        null_fn,
                    ),
                    DataType::Int64 => visit_run_encoded::<T, Int64Type, _, _>(
                        a.as_ref(),
                        group_ids,
                        value_fn,
                        null_fn,
                    ),
                    other => {
                        internal_err!("invalid run end type {other}")
                    }
                };
            }
            let values = a.as_primitive::<T>();
            match values.nulls().filter(|n| n.null_count() > 0) {
                None => {
                    let data = values.values();
                    for (&g, &v) in group_ids.iter().zip(data.iter()) {
                        value_fn(g, v);
                    }
                }
                Some(nulls) => {
                    // Iterate the validity bitmap one 64-bit word at a
                    // time (see arrow::compute::aggregate::sum).
                    let data = values.values();
                    let group_chunks = group_ids.chunks_exact(64);
                    let data_chunks = data.chunks_exact(64);
                    let bit_chunks = nulls.inner().bit_chunks();

                    let group_remainder = group_chunks.remainder();
                    let data_remainder = data_chunks.remainder();

                    group_chunks
                        .zip(data_chunks)
                        .zip(bit_chunks.iter())
                        .for_each(|((group_chunk, data_chunk), mask)| {
                            // index_mask has value 1 << i in the loop
                            let mut index_mask = 1;
                            group_chunk.iter().zip(data_chunk.iter()).for_each(
                                |(&g, &v)| {
                                    if (mask & index_mask) != 0 {
                                        value_fn(g, v);
                                    } else {
                                        null_fn(g);
                                    }
                                    index_mask <<= 1;
                                },
                            )
                        });

                    let remainder_bits = bit_chunks.remainder_bits();
                    group_remainder
                        .iter()
                        .zip(data_remainder.iter())
                        .enumerate()
                        .for_each(|(i, (&g, &v))| {
                            if remainder_bits & (1 << i) != 0 {
                                value_fn(g, v);
                            } else {
                                null_fn(g);
                            }
                        });
                }
            }
            Ok(())
        }
    }
}

/// Run-wise visitation of a run-end encoded primitive array: each physical
/// run is decoded once and its value (or null) replayed over the logical
/// rows it covers.
fn visit_run_encoded<T, R, V, N>(
    array: &dyn Array,
    group_ids: &[u32],
    mut value_fn: V,
    mut null_fn: N,
) -> Result<()>
where
    T: ArrowPrimitiveType,
    R: RunEndIndexType,
    V: FnMut(u32, T::Native),
    N: FnMut(u32),
{
    let Some(run_array) = array.as_any().downcast_ref::<RunArray<R>>() else {
        return internal_err!(
            "expected run-end encoded array, got {}",
            array.data_type()
        );
    };
    let values = run_array.values().as_primitive::<T>();
    let run_ends = run_array.run_ends();
    // Run ends are cumulative row counts in the unsliced coordinate
    // space; the logical view is the window [offset, offset + len).
    let window_start = run_ends.offset();
    let window_end = window_start + run_ends.len();

    let mut run_start = 0_usize;
    for (physical, end) in run_ends.values().iter().enumerate() {
        let run_end = end.as_usize();
        let clamped_start = run_start.max(window_start);
        let clamped_end = run_end.min(window_end);
        run_start = run_end;
        if clamped_start >= clamped_end {
            continue;
        }
        let logical = (clamped_start - window_start)..(clamped_end - window_start);
        if values.is_valid(physical) {
            let value = values.value(physical);
            for i in logical {
                value_fn(group_ids[i], value);
            }
        } else {
            for i in logical {
                null_fn(group_ids[i]);
            }
        }
        if run_end >= window_end {
            break;
        }
    }
    Ok(())
}

/// Like [`visit_grouped_values`] but for boolean inputs.
pub(crate) fn visit_grouped_booleans<V, N>(
    input: &AggregateInput,
    group_ids: &[u32],
    mut value_fn: V,
    mut null_fn: N,
) -> Result<()>
where
    V: FnMut(u32, bool),
    N: FnMut(u32),
{
    match input {
        AggregateInput::Scalar(s) => {
            if s.is_valid(0) {
                let value = s.as_boolean().value(0);
                for &g in group_ids {
                    value_fn(g, value);
                }
            } else {
                for &g in group_ids {
                    null_fn(g);
                }
            }
        }
        AggregateInput::Array(a) => {
            let values: &BooleanArray = a.as_boolean();
            match values.nulls().filter(|n| n.null_count() > 0) {
                None => {
                    for (i, &g) in group_ids.iter().enumerate() {
                        value_fn(g, values.value(i));
                    }
                }
                Some(nulls) => {
                    for (i, &g) in group_ids.iter().enumerate() {
                        if nulls.is_valid(i) {
                            value_fn(g, values.value(i));
                        } else {
                            null_fn(g);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Invokes `f(group, Some(bytes))` / `f(group, None)` for each row of a
/// string or binary input.
pub(crate) fn visit_grouped_bytes<F>(
    input: &AggregateInput,
    group_ids: &[u32],
    mut f: F,
) -> Result<()>
where
    F: FnMut(u32, Option<&[u8]>),
{
    fn visit_array<B, F>(
        array: &GenericByteArray<B>,
        group_ids: &[u32],
        f: &mut F,
    ) where
        B: ByteArrayType,
        B::Native: AsRef<[u8]>,
        F: FnMut(u32, Option<&[u8]>),
    {
        for (i, &g) in group_ids.iter().enumerate() {
            if array.is_valid(i) {
                f(g, Some(array.value(i).as_ref()));
            } else {
                f(g, None);
            }
        }
    }

    fn scalar_bytes<B: ByteArrayType>(
        array: &GenericByteArray<B>,
    ) -> Option<&[u8]>
    where
        B::Native: AsRef<[u8]>,
    {
        array.is_valid(0).then(|| array.value(0).as_ref())
    }

    match input {
        AggregateInput::Scalar(s) => {
            let value = match s.data_type() {
                DataType::Utf8 => scalar_bytes(s.as_string::<i32>()),
                DataType::LargeUtf8 => scalar_bytes(s.as_string::<i64>()),
                DataType::Binary => scalar_bytes(s.as_binary::<i32>()),
                DataType::LargeBinary => scalar_bytes(s.as_binary::<i64>()),
                other => {
                    return not_impl_err!(
                        "binary aggregation over {other} scalars"
                    )
                }
            };
            for &g in group_ids {
                f(g, value);
            }
        }
        AggregateInput::Array(a) => match a.data_type() {
            DataType::Utf8 => visit_array(a.as_string::<i32>(), group_ids, &mut f),
            DataType::LargeUtf8 => {
                visit_array(a.as_string::<i64>(), group_ids, &mut f)
            }
            DataType::Binary => {
                visit_array(a.as_binary::<i32>(), group_ids, &mut f)
            }
            DataType::LargeBinary => {
                visit_array(a.as_binary::<i64>(), group_ids, &mut f)
            }
            other => {
                return not_impl_err!("binary aggregation over {other} arrays")
            }
        },
    }
    Ok(())
}

/// Strips run-end encoding from a declared input type, yielding the type
/// of the values the visitors will actually produce.
pub(crate) fn decoded_type(data_type: &DataType) -> &DataType {
    match data_type {
        DataType::RunEndEncoded(_, values) => values.data_type(),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use arrow::array::{Int32Array, Int64Array, StringArray};
    use arrow::datatypes::Int32Type;

    fn collect_visits(
        input: &AggregateInput,
        group_ids: &[u32],
    ) -> (Vec<(u32, i64)>, Vec<u32>) {
        let mut values = vec![];
        let mut nulls = vec![];
        visit_grouped_values::<Int64Type, _, _>(
            input,
            group_ids,
            |g, v| values.push((g, v)),
            |g| nulls.push(g),
        )
        .unwrap();
        (values, nulls)
    }

    #[test]
    fn visits_array_with_nulls() {
        let input = AggregateInput::Array(Arc::new(Int64Array::from(vec![
            Some(1),
            None,
            Some(3),
        ])));
        let (values, nulls) = collect_visits(&input, &[0, 1, 0]);
        assert_eq!(values, vec![(0, 1), (0, 3)]);
        assert_eq!(nulls, vec![1]);
    }

    #[test]
    fn visits_long_array_chunked() {
        // spans multiple 64-bit validity words
        let data: Vec<Option<i64>> = (0..200)
            .map(|i| if i % 3 == 0 { None } else { Some(i) })
            .collect();
        let groups: Vec<u32> = (0..200).map(|i| (i % 7) as u32).collect();
        let input = AggregateInput::Array(Arc::new(Int64Array::from(data)));
        let (values, nulls) = collect_visits(&input, &groups);
        assert_eq!(values.len(), 200 - 67);
        assert_eq!(nulls.len(), 67);
        assert!(values.iter().all(|&(_, v)| v % 3 != 0));
    }

    #[test]
    fn broadcasts_scalars() {
        let input =
            AggregateInput::Scalar(Arc::new(Int64Array::from(vec![42_i64])));
        let (values, nulls) = collect_visits(&input, &[0, 1, 1]);
        assert_eq!(values, vec![(0, 42), (1, 42), (1, 42)]);
        assert!(nulls.is_empty());

        let input = AggregateInput::Scalar(Arc::new(Int64Array::from(vec![
            None::<i64>,
        ])));
        let (values, nulls) = collect_visits(&input, &[0, 1]);
        assert!(values.is_empty());
        assert_eq!(nulls, vec![0, 1]);
    }

    #[test]
    fn visits_run_encoded_runs() {
        // logical: [5, 5, 5, null, null, 7]
        let run_ends = Int32Array::from(vec![3, 5, 6]);
        let values = Int32Array::from(vec![Some(5), None, Some(7)]);
        let run_array =
            RunArray::<Int32Type>::try_new(&run_ends, &values).unwrap();
        let input = AggregateInput::Array(Arc::new(run_array));
        let groups = [0, 1, 0, 1, 0, 1];

        let mut seen = vec![];
        let mut nulls = vec![];
        visit_grouped_values::<Int32Type, _, _>(
            &input,
            &groups,
            |g, v| seen.push((g, v)),
            |g| nulls.push(g),
        )
        .unwrap();
        assert_eq!(seen, vec![(0, 5), (1, 5), (0, 5), (1, 7)]);
        assert_eq!(nulls, vec![1, 0]);
    }

    #[test]
    fn visits_bytes() {
        let input = AggregateInput::Array(Arc::new(StringArray::from(vec![
            Some("a"),
            None,
            Some("bc"),
        ])));
        let mut seen: Vec<(u32, Option<Vec<u8>>)> = vec![];
        visit_grouped_bytes(&input, &[0, 0, 1], |g, v| {
            seen.push((g, v.map(|b| b.to_vec())))
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                (0, Some(b"a".to_vec())),
                (0, None),
                (1, Some(b"bc".to_vec()))
            ]
        );
    }
}
