//! Inner equi-joins over integer key columns without materializing the cross product.
//!
//! This crate focuses on:
//! - Range flattening ([`gen_ranges`]): turn `[start, end)` pairs into one segmented index array.
//! - Join sizing ([`estimate_join_size`]): predict pair count and memory before joining.
//! - The join engine ([`EquiJoin`]): align, group, flatten and optionally filter with a predicate.
//! - The client boundary of the server-side time-window join ([`TimeWindowJoin`]).
//!
//! The bulk primitives the engine is built from (grouping, segment broadcast and domain
//! alignment) sit behind [`GroupedDomain`]; [`InMemoryDomain`] implements them over slices.

#![forbid(unsafe_code)]

mod bitmap;
mod domain;
mod error;
mod estimate;
mod join;
mod kernels;
mod memory;
mod ranges;
mod remote;

pub use crate::bitmap::{Mask, Ones};
pub use crate::domain::{Alignment, GroupedDomain, Grouping, Key};
pub use crate::error::{JoinError, JoinResult, PredicateError};
pub use crate::estimate::{
    compute_join_size, estimate_join_size, EstimatorOptions, JoinSize, DEFAULT_BYTES_PER_ROW,
};
pub use crate::join::{
    inner_join, inner_join_where, EquiJoin, JoinIndices, JoinOptions, Where,
    DEFAULT_SMOKE_TEST_ROWS,
};
pub use crate::memory::{InMemoryDomain, DEFAULT_PARALLEL_THRESHOLD};
pub use crate::ranges::{gen_ranges, Ranges};
pub use crate::remote::{
    ArrayHandle, Column, DType, HandleRegistry, Request, TimeWindowJoin, Transport,
    WindowPredicate, DEFAULT_RESULT_LIMIT, JOIN_EQ_WITH_DT, LOCAL_NAME_PREFIX,
};

