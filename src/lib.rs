// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of fast-csv, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

//! Zero-copy parsing of delimiter-separated tables.
//!
//! The input file is mapped read-only and scanned in place with vectorized
//! terminator search; callbacks receive arrays of [`Field`]s that borrow
//! from the mapping, so no bytes are copied on the way to user code. The
//! table shape is fixed at compile time (`N` columns, delimiter byte `D`)
//! and the error and null policies are type parameters, so disabled
//! bookkeeping compiles out entirely.
//!
//! Quoting is not interpreted: a quote character is ordinary data. Inputs
//! that need RFC 4180 unescaping belong in a general CSV library, not here.
//!
//! ```no_run
//! use fast_csv::CheckedCsv;
//!
//! let mut reader = CheckedCsv::<3>::open("trades.csv");
//! let mut volume = 0u64;
//! let rows = reader.for_each(|record| {
//!     volume += record[2].parse_or(0u64);
//! });
//! assert!(!reader.has_error(), "short record at line {}", reader.line());
//! println!("{rows} rows, total volume {volume}");
//! ```
//!
//! For throughput beyond one core, [`ParallelReader`] partitions the file
//! on record boundaries and fans the same engine out across workers.

mod error;
mod field;
mod mmap;
mod parallel;
mod policy;
mod reader;
pub mod scan;

pub use error::{ErrorCode, ErrorInfo, FieldResult};
pub use field::{Field, FromField};
pub use mmap::MappedSource;
pub use parallel::ParallelReader;
pub use policy::{
    ErrorPolicy, ErrorState, ErrorsBasic, ErrorsFull, ErrorsOff, FullErrorState, LineErrorState,
    NoErrorState, NullPolicy, NullsLenient, NullsOff, NullsStandard, NullsStrict,
};
pub use reader::{
    Checked, CheckedCsv, CheckedTsv, Reader, Safe, SafeCsv, SafeTsv, Span, Turbo, TurboCsv,
    TurboTsv,
};
