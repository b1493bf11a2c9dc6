// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of fast-csv, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use std::mem;

use static_assertions::const_assert_eq;

use crate::error::{ErrorCode, ErrorInfo};

/// Compile-time selection of the diagnostics a reader records.
///
/// The policy is a type parameter of [`Reader`](crate::Reader), so a disabled
/// policy erases both the bookkeeping and its storage from the generated
/// code. [`ErrorsOff`] stores nothing at all; see the size assertion below.
pub trait ErrorPolicy {
    /// Whether malformed records are detected and skipped.
    const ENABLED: bool;
    /// Whether a 1-based line counter is maintained.
    const TRACK_LINE: bool;
    /// Whether the failing column is recorded.
    const TRACK_COLUMN: bool;
    /// Reader-resident storage for this policy.
    type State: ErrorState;
}

/// Storage behind an [`ErrorPolicy`]. Latest error wins.
pub trait ErrorState: Default {
    fn bump_line(&mut self);
    /// Current 1-based line, or 0 when untracked.
    fn line(&self) -> u64;
    fn record(&mut self, code: ErrorCode, column: u32);
    fn last(&self) -> Option<ErrorInfo>;
}

/// No tracking. The reader carries no error state and never skips a record.
#[derive(Clone, Copy, Debug, Default)]
pub struct ErrorsOff;

/// Malformed records are skipped and the failing line is recorded.
#[derive(Clone, Copy, Debug, Default)]
pub struct ErrorsBasic;

/// Malformed records are skipped; line and column are recorded.
#[derive(Clone, Copy, Debug, Default)]
pub struct ErrorsFull;

impl ErrorPolicy for ErrorsOff {
    const ENABLED: bool = false;
    const TRACK_LINE: bool = false;
    const TRACK_COLUMN: bool = false;
    type State = NoErrorState;
}

impl ErrorPolicy for ErrorsBasic {
    const ENABLED: bool = true;
    const TRACK_LINE: bool = true;
    const TRACK_COLUMN: bool = false;
    type State = LineErrorState;
}

impl ErrorPolicy for ErrorsFull {
    const ENABLED: bool = true;
    const TRACK_LINE: bool = true;
    const TRACK_COLUMN: bool = true;
    type State = FullErrorState;
}

/// State for [`ErrorsOff`]. Zero-sized; every query reports no error.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoErrorState;

impl ErrorState for NoErrorState {
    #[inline(always)]
    fn bump_line(&mut self) {}

    #[inline(always)]
    fn line(&self) -> u64 {
        0
    }

    #[inline(always)]
    fn record(&mut self, _code: ErrorCode, _column: u32) {}

    #[inline(always)]
    fn last(&self) -> Option<ErrorInfo> {
        None
    }
}

const_assert_eq!(mem::size_of::<NoErrorState>(), 0);

/// State for [`ErrorsBasic`].
#[derive(Clone, Copy, Debug, Default)]
pub struct LineErrorState {
    line: u64,
    last: Option<ErrorInfo>,
}

impl ErrorState for LineErrorState {
    #[inline(always)]
    fn bump_line(&mut self) {
        self.line += 1;
    }

    #[inline(always)]
    fn line(&self) -> u64 {
        self.line
    }

    #[inline(always)]
    fn record(&mut self, code: ErrorCode, _column: u32) {
        self.last = Some(ErrorInfo {
            code,
            line: self.line,
            column: 0,
        });
    }

    #[inline(always)]
    fn last(&self) -> Option<ErrorInfo> {
        self.last
    }
}

/// State for [`ErrorsFull`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FullErrorState {
    line: u64,
    last: Option<ErrorInfo>,
}

impl ErrorState for FullErrorState {
    #[inline(always)]
    fn bump_line(&mut self) {
        self.line += 1;
    }

    #[inline(always)]
    fn line(&self) -> u64 {
        self.line
    }

    #[inline(always)]
    fn record(&mut self, code: ErrorCode, column: u32) {
        self.last = Some(ErrorInfo {
            code,
            line: self.line,
            column,
        });
    }

    #[inline(always)]
    fn last(&self) -> Option<ErrorInfo> {
        self.last
    }
}

/// Compile-time selection of the byte sequences that count as null.
///
/// Matching is case-sensitive and exact. The `NULL` toggle matches the
/// 4-byte `None` in addition to `null` and `NULL`; the `NONE` toggle covers
/// `None`, `none`, and `NONE`.
pub trait NullPolicy {
    /// Zero-length fields are null.
    const EMPTY: bool;
    /// `NA`, `N/A`, and `n/a` are null.
    const NA: bool;
    /// `null`, `NULL`, and `None` are null.
    const NULL: bool;
    /// `None`, `none`, and `NONE` are null.
    const NONE: bool;
    /// A single `-` is null.
    const DASH: bool;

    /// Whether `bytes` is one of the null tokens selected by this policy.
    #[inline(always)]
    fn is_null(bytes: &[u8]) -> bool {
        match bytes.len() {
            0 => Self::EMPTY,
            1 => Self::DASH && bytes[0] == b'-',
            2 => Self::NA && bytes == b"NA",
            3 => Self::NA && (bytes == b"N/A" || bytes == b"n/a"),
            4 => {
                (Self::NULL && (bytes == b"null" || bytes == b"NULL" || bytes == b"None"))
                    || (Self::NONE
                        && (bytes == b"None" || bytes == b"none" || bytes == b"NONE"))
            }
            _ => false,
        }
    }
}

/// Every field reports not-null.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullsOff;

/// Only empty fields are null.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullsStrict;

/// Empty fields and the NA family are null.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullsStandard;

/// Every token in the vocabulary is null.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullsLenient;

impl NullPolicy for NullsOff {
    const EMPTY: bool = false;
    const NA: bool = false;
    const NULL: bool = false;
    const NONE: bool = false;
    const DASH: bool = false;
}

impl NullPolicy for NullsStrict {
    const EMPTY: bool = true;
    const NA: bool = false;
    const NULL: bool = false;
    const NONE: bool = false;
    const DASH: bool = false;
}

impl NullPolicy for NullsStandard {
    const EMPTY: bool = true;
    const NA: bool = true;
    const NULL: bool = false;
    const NONE: bool = false;
    const DASH: bool = false;
}

impl NullPolicy for NullsLenient {
    const EMPTY: bool = true;
    const NA: bool = true;
    const NULL: bool = true;
    const NONE: bool = true;
    const DASH: bool = true;
}
