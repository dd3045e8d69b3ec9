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

//! `hash_pivot_wider`: scatters `(key, value)` rows into one output
//! column per configured key, with the group id selecting the row.
//!
//! Rather than materializing a dense `rows x keys` matrix, each batch
//! builds one `num_groups`-sized take-index vector per key (with the
//! narrowest index width the batch length allows) and runs the `take`
//! kernel against the value column. Batch results fold into the
//! persistent per-key columns through `coalesce`; a `(group, key)` cell
//! fed by more than one non-null value is an error, detected by a bitmap
//! within a batch and by a non-null count mismatch across batches.

use std::any::Any;
use std::sync::Arc;

use ahash::RandomState;
use arrow::array::{
    new_null_array, Array, ArrayRef, AsArray, BooleanBufferBuilder,
    Int32Array, PrimitiveArray, StructArray,
};
use arrow::buffer::NullBuffer;
use arrow::compute;
use arrow::compute::kernels::zip::zip;
use arrow::datatypes::{
    ArrowNativeType, ArrowPrimitiveType, DataType, Field, Fields, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use hashbrown::HashMap;

use crate::aggregator::{
    check_mapping, merge_target, AggregateBatch, GroupedAggregator,
};
use crate::error::Result;
use crate::options::{
    AggregateOptions, PivotWiderOptions, UnexpectedKeyBehavior,
};

fn duplicate_value<T>() -> Result<T> {
    invalid_err!(
        "Encountered more than one non-null value for the same grouped pivot key"
    )
}

/// Maps pivot keys to their position in `key_names`; unknown keys are
/// skipped or rejected per the configured behavior.
struct PivotKeyMapper {
    key_index: HashMap<String, usize, RandomState>,
    unexpected_key_behavior: UnexpectedKeyBehavior,
}

impl PivotKeyMapper {
    fn new(options: &PivotWiderOptions) -> Result<Self> {
        let mut key_index =
            HashMap::with_capacity_and_hasher(options.key_names.len(), RandomState::new());
        for (i, name) in options.key_names.iter().enumerate() {
            if key_index.insert(name.clone(), i).is_some() {
                return invalid_err!("duplicate pivot key name {name:?}");
            }
        }
        Ok(Self {
            key_index,
            unexpected_key_behavior: options.unexpected_key_behavior,
        })
    }

    /// The key index for one key value, `None` for a null or ignored key.
    fn lookup(&self, key: Option<&str>) -> Result<Option<usize>> {
        match key {
            None => Ok(None),
            Some(key) => match self.key_index.get(key) {
                Some(&index) => Ok(Some(index)),
                None => match self.unexpected_key_behavior {
                    UnexpectedKeyBehavior::Ignore => Ok(None),
                    UnexpectedKeyBehavior::Raise => {
                        invalid_err!("unexpected pivot key: {key}")
                    }
                },
            },
        }
    }

    /// Key indices for a whole key column.
    fn map_keys(
        &self,
        keys: &ArrayRef,
        num_rows: usize,
        is_scalar: bool,
    ) -> Result<Vec<Option<usize>>> {
        let lookup_all = |iter: &mut dyn Iterator<Item = Option<&str>>| {
            iter.map(|key| self.lookup(key)).collect::<Result<Vec<_>>>()
        };
        let mut mapped = match keys.data_type() {
            DataType::Utf8 => {
                lookup_all(&mut keys.as_string::<i32>().iter())?
            }
            DataType::LargeUtf8 => {
                lookup_all(&mut keys.as_string::<i64>().iter())?
            }
            other => {
                return not_impl_err!("pivot keys of type {other}");
            }
        };
        if is_scalar {
            mapped = vec![mapped[0]; num_rows];
        }
        Ok(mapped)
    }
}

/// Per-key output columns, each `num_groups` long. `None` stands for an
/// all-null column that has not been materialized yet.
struct PivotColumns {
    value_type: DataType,
    columns: Vec<Option<ArrayRef>>,
    num_groups: usize,
}

impl PivotColumns {
    fn new(value_type: DataType, num_keys: usize) -> Self {
        Self {
            value_type,
            columns: (0..num_keys).map(|_| None).collect(),
            num_groups: 0,
        }
    }

    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        if new_num_groups > i32::MAX as usize {
            // take indices for the merge path are clamped at i32
            return not_impl_err!("pivot with more than 2^31 groups");
        }
        if new_num_groups == self.num_groups && self.num_groups != 0 {
            return Ok(());
        }
        let added = new_num_groups - self.num_groups;
        let suffix = new_null_array(&self.value_type, added);
        for column in self.columns.iter_mut().flatten() {
            *column = compute::concat(&[column.as_ref(), suffix.as_ref()])?;
        }
        self.num_groups = new_num_groups;
        Ok(())
    }

    /// `coalesce(existing, incoming)`, failing when a non-null cell is
    /// fed from both sides.
    fn merge_column(&mut self, key: usize, incoming: ArrayRef) -> Result<()> {
        if incoming.null_count() == incoming.len() {
            return Ok(());
        }
        let slot = &mut self.columns[key];
        let existing = match slot {
            None => {
                *slot = Some(incoming);
                return Ok(());
            }
            Some(existing) if existing.null_count() == existing.len() => {
                *slot = Some(incoming);
                return Ok(());
            }
            Some(existing) => existing,
        };

        let expected_non_nulls = (existing.len() - existing.null_count())
            + (incoming.len() - incoming.null_count());
        let mask = compute::is_not_null(existing.as_ref())?;
        let coalesced = zip(&mask, &*existing, &incoming)?;
        if expected_non_nulls != coalesced.len() - coalesced.null_count() {
            return duplicate_value();
        }
        *slot = Some(coalesced);
        Ok(())
    }

    /// Materializes every column, lazily-null ones included.
    fn into_columns(mut self) -> Vec<ArrayRef> {
        self.columns
            .drain(..)
            .map(|c| {
                c.unwrap_or_else(|| {
                    new_null_array(&self.value_type, self.num_groups)
                })
            })
            .collect()
    }
}

/// `hash_pivot_wider` over `(key, value, group id)` batches.
pub struct GroupedPivot {
    key_names: Vec<String>,
    mapper: PivotKeyMapper,
    columns: PivotColumns,
}

impl GroupedPivot {
    fn new(value_type: DataType, options: &PivotWiderOptions) -> Result<Self> {
        Ok(Self {
            key_names: options.key_names.clone(),
            mapper: PivotKeyMapper::new(options)?,
            columns: PivotColumns::new(value_type, options.key_names.len()),
        })
    }

    /// Builds the per-key take indices for one batch with index type
    /// `Idx`, takes the values, and folds the result into the persistent
    /// columns.
    fn scatter_batch<Idx: ArrowPrimitiveType>(
        &mut self,
        key_indices: &[Option<usize>],
        values: &ArrayRef,
        group_ids: &[u32],
    ) -> Result<()> {
        let num_groups = self.columns.num_groups;
        let num_keys = self.key_names.len();

        let mut take_indices: Vec<Vec<Idx::Native>> =
            vec![vec![Idx::Native::usize_as(0); num_groups]; num_keys];
        let mut take_bitmaps: Vec<BooleanBufferBuilder> = (0..num_keys)
            .map(|_| {
                let mut bitmap = BooleanBufferBuilder::new(num_groups);
                bitmap.append_n(num_groups, false);
                bitmap
            })
            .collect();

        for (row, (&key, &group)) in
            key_indices.iter().zip(group_ids.iter()).enumerate()
        {
            let Some(key) = key else { continue };
            if values.is_null(row) {
                continue;
            }
            let group = group as usize;
            if take_bitmaps[key].get_bit(group) {
                return duplicate_value();
            }
            take_bitmaps[key].set_bit(group, true);
            take_indices[key][group] = Idx::Native::usize_as(row);
        }

        for (key, (indices, mut bitmap)) in take_indices
            .into_iter()
            .zip(take_bitmaps.into_iter())
            .enumerate()
        {
            let validity = NullBuffer::new(bitmap.finish());
            if validity.null_count() == num_groups {
                // nothing landed in this column for this batch
                continue;
            }
            let indices =
                PrimitiveArray::<Idx>::new(indices.into(), Some(validity));
            let taken = compute::take(values.as_ref(), &indices, None)?;
            self.columns.merge_column(key, taken)?;
        }
        Ok(())
    }
}

impl GroupedAggregator for GroupedPivot {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        self.columns.resize(new_num_groups)
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let num_rows = batch.num_rows();
        let keys_input = batch.value(0)?;
        let key_indices = self.mapper.map_keys(
            keys_input.inner(),
            num_rows,
            keys_input.is_scalar(),
        )?;
        let values = batch.value(1)?.to_array(num_rows)?;
        let group_ids = batch.group_ids();

        // the narrowest take-index width the batch length fits in
        log::trace!(
            "pivot scatter: {num_rows} rows over {} groups",
            self.columns.num_groups
        );
        if num_rows <= u8::MAX as usize {
            self.scatter_batch::<UInt8Type>(&key_indices, &values, group_ids)
        } else if num_rows <= u16::MAX as usize {
            self.scatter_batch::<UInt16Type>(&key_indices, &values, group_ids)
        } else if num_rows <= u32::MAX as usize {
            self.scatter_batch::<UInt32Type>(&key_indices, &values, group_ids)
        } else {
            self.scatter_batch::<UInt64Type>(&key_indices, &values, group_ids)
        }
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(
            group_id_mapping,
            other.columns.num_groups,
            self.columns.num_groups,
        )?;

        // Transposing `other`'s rows is a scatter, implemented as a take
        // with the inverse permutation of the mapping, computed once for
        // all columns. Group counts were clamped to i32 in resize.
        let num_groups = self.columns.num_groups;
        let mut inverse = vec![0_i32; num_groups];
        let mut populated = BooleanBufferBuilder::new(num_groups);
        populated.append_n(num_groups, false);
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            inverse[g as usize] = other_g as i32;
            populated.set_bit(g as usize, true);
        }
        let inverse = Int32Array::new(
            inverse.into(),
            Some(NullBuffer::new(populated.finish())),
        );

        for (key, column) in other.columns.columns.into_iter().enumerate() {
            let Some(column) = column else { continue };
            if column.null_count() == column.len() {
                continue;
            }
            let scattered = compute::take(column.as_ref(), &inverse, None)?;
            self.columns.merge_column(key, scattered)?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let num_groups = self.columns.num_groups;
        let columns = std::mem::replace(
            &mut self.columns,
            PivotColumns::new(DataType::Null, 0),
        );
        if self.key_names.is_empty() {
            return Ok(Arc::new(StructArray::new_empty_fields(
                num_groups, None,
            )));
        }
        let fields: Vec<Field> = self
            .key_names
            .iter()
            .map(|name| {
                Field::new(name.clone(), columns.value_type.clone(), true)
            })
            .collect();
        Ok(Arc::new(StructArray::new(
            Fields::from(fields),
            columns.into_columns(),
            None,
        )))
    }

    fn out_type(&self) -> DataType {
        DataType::Struct(Fields::from(
            self.key_names
                .iter()
                .map(|name| {
                    Field::new(
                        name.clone(),
                        self.columns.value_type.clone(),
                        true,
                    )
                })
                .collect::<Vec<_>>(),
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub(crate) fn make_pivot_wider(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    let options = options.pivot_wider()?;
    match &input_types[0] {
        DataType::Utf8 | DataType::LargeUtf8 => {}
        other => return not_impl_err!("pivot keys of type {other}"),
    }
    Ok(Box::new(GroupedPivot::new(input_types[1].clone(), &options)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregateInput;
    use crate::error::AggregateError;
    use arrow::array::{Int64Array, StringArray, UInt32Array};
    use arrow::datatypes::Int64Type;

    fn pivot_options(keys: &[&str]) -> AggregateOptions {
        AggregateOptions::PivotWider(PivotWiderOptions {
            key_names: keys.iter().map(|k| k.to_string()).collect(),
            unexpected_key_behavior: UnexpectedKeyBehavior::Ignore,
        })
    }

    fn pivot_batch(
        keys: Vec<Option<&str>>,
        values: Vec<Option<i64>>,
        groups: Vec<u32>,
    ) -> AggregateBatch {
        AggregateBatch::try_new(
            vec![
                AggregateInput::Array(Arc::new(StringArray::from(keys))),
                AggregateInput::Array(Arc::new(Int64Array::from(values))),
            ],
            UInt32Array::from(groups),
        )
        .unwrap()
    }

    fn make(keys: &[&str]) -> Box<dyn GroupedAggregator> {
        make_pivot_wider(
            &[DataType::Utf8, DataType::Int64],
            &pivot_options(keys),
        )
        .unwrap()
    }

    #[test]
    fn scatters_values_into_key_columns() {
        let mut agg = make(&["x", "y"]);
        agg.resize(2).unwrap();
        agg.consume(&pivot_batch(
            vec![Some("x"), Some("y"), Some("y"), Some("x")],
            vec![Some(1), Some(2), Some(3), Some(4)],
            vec![0, 0, 1, 1],
        ))
        .unwrap();

        let out = agg.finalize().unwrap();
        let out = out.as_struct();
        let x = out.column(0).as_primitive::<Int64Type>();
        let y = out.column(1).as_primitive::<Int64Type>();
        assert_eq!(x.value(0), 1);
        assert_eq!(y.value(0), 2);
        assert_eq!(x.value(1), 4);
        assert_eq!(y.value(1), 3);
    }

    #[test]
    fn duplicate_cell_in_batch_is_invalid() {
        let mut agg = make(&["x", "y"]);
        agg.resize(2).unwrap();
        // group 0 has x=1 and x=5
        let err = agg
            .consume(&pivot_batch(
                vec![Some("x"), Some("y"), Some("y"), Some("x"), Some("x")],
                vec![Some(1), Some(2), Some(3), Some(4), Some(5)],
                vec![0, 1, 0, 1, 0],
            ))
            .unwrap_err();
        assert!(matches!(err, AggregateError::Invalid(_)), "{err}");
    }

    #[test]
    fn duplicate_cell_across_batches_is_invalid() {
        let mut agg = make(&["x"]);
        agg.resize(1).unwrap();
        agg.consume(&pivot_batch(vec![Some("x")], vec![Some(1)], vec![0]))
            .unwrap();
        let err = agg
            .consume(&pivot_batch(vec![Some("x")], vec![Some(2)], vec![0]))
            .unwrap_err();
        assert!(matches!(err, AggregateError::Invalid(_)), "{err}");
    }

    #[test]
    fn null_values_and_unknown_keys_are_skipped() {
        let mut agg = make(&["x"]);
        agg.resize(1).unwrap();
        agg.consume(&pivot_batch(
            vec![Some("x"), Some("stray"), None, Some("x")],
            vec![None, Some(1), Some(2), Some(3)],
            vec![0, 0, 0, 0],
        ))
        .unwrap();

        let out = agg.finalize().unwrap();
        let x = out.as_struct().column(0).as_primitive::<Int64Type>();
        // the null value for x was skipped; only x=3 landed
        assert_eq!(x.value(0), 3);
    }

    #[test]
    fn unexpected_key_raises_when_configured() {
        let options = AggregateOptions::PivotWider(PivotWiderOptions {
            key_names: vec!["x".to_string()],
            unexpected_key_behavior: UnexpectedKeyBehavior::Raise,
        });
        let mut agg = make_pivot_wider(
            &[DataType::Utf8, DataType::Int64],
            &options,
        )
        .unwrap();
        agg.resize(1).unwrap();
        let err = agg
            .consume(&pivot_batch(vec![Some("q")], vec![Some(1)], vec![0]))
            .unwrap_err();
        assert!(matches!(err, AggregateError::Invalid(_)), "{err}");
    }

    #[test]
    fn resize_appends_null_rows() {
        let mut agg = make(&["x"]);
        agg.resize(1).unwrap();
        agg.consume(&pivot_batch(vec![Some("x")], vec![Some(1)], vec![0]))
            .unwrap();
        agg.resize(3).unwrap();
        agg.consume(&pivot_batch(vec![Some("x")], vec![Some(9)], vec![2]))
            .unwrap();

        let out = agg.finalize().unwrap();
        let x = out.as_struct().column(0).as_primitive::<Int64Type>();
        assert_eq!(x.value(0), 1);
        assert!(x.is_null(1));
        assert_eq!(x.value(2), 9);
    }

    #[test]
    fn merge_remaps_groups() {
        let mut a = make(&["x", "y"]);
        a.resize(2).unwrap();
        a.consume(&pivot_batch(vec![Some("x")], vec![Some(1)], vec![0]))
            .unwrap();

        let mut b = make(&["x", "y"]);
        b.resize(2).unwrap();
        b.consume(&pivot_batch(
            vec![Some("y"), Some("x")],
            vec![Some(7), Some(8)],
            vec![0, 1],
        ))
        .unwrap();

        a.merge(b, &[0, 1]).unwrap();
        let out = a.finalize().unwrap();
        let out = out.as_struct();
        let x = out.column(0).as_primitive::<Int64Type>();
        let y = out.column(1).as_primitive::<Int64Type>();
        assert_eq!(x.value(0), 1);
        assert_eq!(y.value(0), 7);
        assert_eq!(x.value(1), 8);
        assert!(y.is_null(1));
    }

    #[test]
    fn merge_duplicate_cell_is_invalid() {
        let mut a = make(&["x"]);
        a.resize(1).unwrap();
        a.consume(&pivot_batch(vec![Some("x")], vec![Some(1)], vec![0]))
            .unwrap();

        let mut b = make(&["x"]);
        b.resize(1).unwrap();
        b.consume(&pivot_batch(vec![Some("x")], vec![Some(2)], vec![0]))
            .unwrap();

        let err = a.merge(b, &[0]).unwrap_err();
        assert!(matches!(err, AggregateError::Invalid(_)), "{err}");
    }
}
