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

//! `hash_one`: one representative non-null value per group.
//!
//! Which value is unspecified by contract; this implementation keeps the
//! first non-null value it sees, and a merge keeps `self`'s value when
//! both sides have one.

use std::any::Any;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, BooleanBufferBuilder, PrimitiveArray,
};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Decimal128Type, Decimal256Type,
    Float16Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
    Int8Type, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};

use crate::accumulate::{
    decoded_type, visit_grouped_booleans, visit_grouped_bytes,
    visit_grouped_values,
};
use crate::aggregator::{
    check_mapping, merge_target, AggregateBatch, GroupedAggregator,
};
use crate::error::Result;
use crate::min_max::build_bytes_array;
use crate::options::AggregateOptions;

/// `hash_one` over primitive inputs.
pub struct GroupedOne<T: ArrowPrimitiveType> {
    data_type: DataType,
    ones: Vec<T::Native>,
    has_one: BooleanBufferBuilder,
}

impl<T: ArrowPrimitiveType> GroupedOne<T> {
    fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            ones: vec![],
            has_one: BooleanBufferBuilder::new(0),
        }
    }
}

impl<T: ArrowPrimitiveType> GroupedAggregator for GroupedOne<T> {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        let added = new_num_groups - self.ones.len();
        self.ones.resize(new_num_groups, T::default_value());
        self.has_one.append_n(added, false);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let ones = &mut self.ones;
        let has_one = &mut self.has_one;
        visit_grouped_values::<T, _, _>(
            batch.value(0)?,
            batch.group_ids(),
            |g, v| {
                let g = g as usize;
                if !has_one.get_bit(g) {
                    ones[g] = v;
                    has_one.set_bit(g, true);
                }
            },
            |_| {},
        )
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(group_id_mapping, other.ones.len(), self.ones.len())?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            let g = g as usize;
            if !self.has_one.get_bit(g) && other.has_one.get_bit(other_g) {
                self.ones[g] = other.ones[other_g];
                self.has_one.set_bit(g, true);
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let validity = NullBuffer::new(self.has_one.finish());
        Ok(Arc::new(
            PrimitiveArray::<T>::new(
                std::mem::take(&mut self.ones).into(),
                Some(validity),
            )
            .with_data_type(self.data_type.clone()),
        ))
    }

    fn out_type(&self) -> DataType {
        self.data_type.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// `hash_one` over booleans.
pub struct GroupedBooleanOne {
    ones: BooleanBufferBuilder,
    has_one: BooleanBufferBuilder,
    num_groups: usize,
}

impl GroupedBooleanOne {
    fn new() -> Self {
        Self {
            ones: BooleanBufferBuilder::new(0),
            has_one: BooleanBufferBuilder::new(0),
            num_groups: 0,
        }
    }
}

impl GroupedAggregator for GroupedBooleanOne {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        let added = new_num_groups - self.num_groups;
        self.num_groups = new_num_groups;
        self.ones.append_n(added, false);
        self.has_one.append_n(added, false);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let ones = &mut self.ones;
        let has_one = &mut self.has_one;
        visit_grouped_booleans(
            batch.value(0)?,
            batch.group_ids(),
            |g, v| {
                let g = g as usize;
                if !has_one.get_bit(g) {
                    ones.set_bit(g, v);
                    has_one.set_bit(g, true);
                }
            },
            |_| {},
        )
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let other = merge_target::<Self>(other)?;
        check_mapping(group_id_mapping, other.num_groups, self.num_groups)?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            let g = g as usize;
            if !self.has_one.get_bit(g) && other.has_one.get_bit(other_g) {
                self.ones.set_bit(g, other.ones.get_bit(other_g));
                self.has_one.set_bit(g, true);
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let validity = NullBuffer::new(self.has_one.finish());
        Ok(Arc::new(BooleanArray::new(
            self.ones.finish(),
            Some(validity),
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

/// `hash_one` over string and binary inputs.
pub struct GroupedBytesOne {
    data_type: DataType,
    ones: Vec<Option<Vec<u8>>>,
}

impl GroupedBytesOne {
    fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            ones: vec![],
        }
    }
}

impl GroupedAggregator for GroupedBytesOne {
    fn resize(&mut self, new_num_groups: usize) -> Result<()> {
        self.ones.resize(new_num_groups, None);
        Ok(())
    }

    fn consume(&mut self, batch: &AggregateBatch) -> Result<()> {
        let ones = &mut self.ones;
        visit_grouped_bytes(batch.value(0)?, batch.group_ids(), |g, value| {
            if let Some(v) = value {
                let slot = &mut ones[g as usize];
                if slot.is_none() {
                    *slot = Some(v.to_vec());
                }
            }
        })
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        group_id_mapping: &[u32],
    ) -> Result<()> {
        let mut other = merge_target::<Self>(other)?;
        check_mapping(group_id_mapping, other.ones.len(), self.ones.len())?;
        for (other_g, &g) in group_id_mapping.iter().enumerate() {
            let slot = &mut self.ones[g as usize];
            if slot.is_none() {
                *slot = other.ones[other_g].take();
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<ArrayRef> {
        let num_groups = self.ones.len();
        let mut validity = BooleanBufferBuilder::new(num_groups);
        for slot in &self.ones {
            validity.append(slot.is_some());
        }
        build_bytes_array(
            &self.data_type,
            std::mem::take(&mut self.ones),
            &NullBuffer::new(validity.finish()),
        )
    }

    fn out_type(&self) -> DataType {
        self.data_type.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub(crate) fn make_one(
    input_types: &[DataType],
    options: &AggregateOptions,
) -> Result<Box<dyn GroupedAggregator>> {
    match options {
        AggregateOptions::None => {}
        other => {
            return options_err!(
                "hash_one takes no options, got {other:?}"
            )
        }
    }
    let input = decoded_type(&input_types[0]);

    macro_rules! helper {
        ($in:ty) => {
            Ok(Box::new(GroupedOne::<$in>::new(input.clone())))
        };
    }

    match input {
        DataType::Boolean => Ok(Box::new(GroupedBooleanOne::new())),
        DataType::Int8 => helper!(Int8Type),
        DataType::Int16 => helper!(Int16Type),
        DataType::Int32 => helper!(Int32Type),
        DataType::Int64 => helper!(Int64Type),
        DataType::UInt8 => helper!(UInt8Type),
        DataType::UInt16 => helper!(UInt16Type),
        DataType::UInt32 => helper!(UInt32Type),
        DataType::UInt64 => helper!(UInt64Type),
        DataType::Float16 => helper!(Float16Type),
        DataType::Float32 => helper!(Float32Type),
        DataType::Float64 => helper!(Float64Type),
        DataType::Decimal128(_, _) => helper!(Decimal128Type),
        DataType::Decimal256(_, _) => helper!(Decimal256Type),
        DataType::Utf8
        | DataType::LargeUtf8
        | DataType::Binary
        | DataType::LargeBinary => {
            Ok(Box::new(GroupedBytesOne::new(input.clone())))
        }
        other => not_impl_err!("hash_one over input type {other}"),
    }
}
