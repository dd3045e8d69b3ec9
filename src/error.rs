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

//! [`AggregateError`] and convenience macros for constructing it.
//!
//! There is one constructor macro per error category, all of which support
//! `format!` placeholders. Use `invalid_err!` for data-dependent failures and
//! `internal_err!` for contract violations that indicate a bug.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::result;

use arrow::error::ArrowError;

/// Result type for operations that could result in an [`AggregateError`].
pub type Result<T, E = AggregateError> = result::Result<T, E>;

/// Error returned by the aggregation kernels.
#[derive(Debug)]
pub enum AggregateError {
    /// Error returned by arrow.
    ArrowError(ArrowError),
    /// The input type (or type combination) is not supported by the
    /// requested aggregate function. Only returned from factories.
    NotImplemented(String),
    /// A data-dependent runtime failure, e.g. more than one non-null value
    /// for the same grouped pivot key, or a variable-length output that
    /// would overflow its 32-bit offsets.
    Invalid(String),
    /// The options record passed to a factory is of the wrong variant or
    /// carries values the function cannot honor.
    InvalidOptions(String),
    /// A contract violation that should not happen in normal usage and is
    /// most likely a bug, e.g. merging aggregators of different types.
    Internal(String),
}

impl Display for AggregateError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            AggregateError::ArrowError(e) => write!(f, "Arrow error: {e}"),
            AggregateError::NotImplemented(msg) => {
                write!(f, "Not implemented: {msg}")
            }
            AggregateError::Invalid(msg) => write!(f, "Invalid: {msg}"),
            AggregateError::InvalidOptions(msg) => {
                write!(f, "Invalid options: {msg}")
            }
            AggregateError::Internal(msg) => {
                write!(
                    f,
                    "Internal error: {msg}.\nThis issue was likely caused by a \
                     bug in groupwise's code. Please help us to resolve this by \
                     filing a bug report"
                )
            }
        }
    }
}

impl Error for AggregateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AggregateError::ArrowError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArrowError> for AggregateError {
    fn from(e: ArrowError) -> Self {
        AggregateError::ArrowError(e)
    }
}

/// Generates a pair of macros for one [`AggregateError`] variant:
/// `$NAME_AGG_ERR` wraps `AggregateError::$ERR` and `$NAME_ERR` wraps
/// `Err(AggregateError::$ERR)`. Both support `format!` placeholders:
///
///     invalid_err!("Error")
///     invalid_err!("Error {}", val)
///     invalid_err!("Error {val:?}")
macro_rules! make_error {
    ($NAME_ERR:ident, $NAME_AGG_ERR:ident, $ERR:ident) => { make_error!(@inner ($), $NAME_ERR, $NAME_AGG_ERR, $ERR); };
    (@inner ($d:tt), $NAME_ERR:ident, $NAME_AGG_ERR:ident, $ERR:ident) => {
        ::paste::paste! {
            /// Macro creating the [`AggregateError::
            #[doc = stringify!($ERR)]
            /// `] variant
            #[macro_export]
            macro_rules! $NAME_AGG_ERR {
                ($d($d args:expr),*) => {
                    $crate::error::AggregateError::$ERR(
                        ::std::format!($d($d args),*)
                    )
                }
            }

            /// Macro creating `Err(AggregateError::
            #[doc = stringify!($ERR)]
            /// )`
            #[macro_export]
            macro_rules! $NAME_ERR {
                ($d($d args:expr),*) => {
                    Err($crate::error::AggregateError::$ERR(
                        ::std::format!($d($d args),*)
                    ))
                }
            }
        }
    };
}

make_error!(not_impl_err, not_impl_agg_err, NotImplemented);
make_error!(invalid_err, invalid_agg_err, Invalid);
make_error!(options_err, options_agg_err, InvalidOptions);
make_error!(internal_err, internal_agg_err, Internal);
