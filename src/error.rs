// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of fast-csv, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use thiserror::Error;

/// Outcome code for field extraction and record iteration.
///
/// The set is closed: every fallible operation in the crate reports one of
/// these codes and nothing else.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No error.
    #[error("ok")]
    Ok,
    /// The field is not a base-10 integer, or trailing bytes remain.
    #[error("invalid integer")]
    InvalidInteger,
    /// The field is not a decimal floating-point number.
    #[error("invalid float")]
    InvalidFloat,
    /// The field is not one of the recognized boolean tokens.
    #[error("invalid bool")]
    InvalidBool,
    /// The field is not a calendar-valid `YYYY-MM-DD` date.
    #[error("invalid date")]
    InvalidDate,
    /// The field is not a valid `YYYY-MM-DD HH:MM:SS` date-time.
    #[error("invalid date-time")]
    InvalidDateTime,
    /// The field matched the active null vocabulary.
    #[error("null value")]
    NullValue,
    /// The value is a well-formed integer that does not fit the target type.
    #[error("value out of range")]
    OutOfRange,
    /// The record did not contain exactly the configured number of columns.
    #[error("column count mismatch")]
    ColumnCountMismatch,
    /// The cursor reached the end of the mapped input.
    #[error("end of file")]
    EndOfFile,
    /// The source file could not be opened or mapped.
    #[error("cannot open file")]
    FileOpenError,
}

impl ErrorCode {
    #[inline(always)]
    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }
}

/// The most recent diagnostic recorded by a reader.
///
/// `line` is 1-based and counts the header; `column` is the number of fields
/// that were filled when the record was rejected. Both are zero when the
/// reader's error policy does not track them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub line: u64,
    pub column: u32,
}

/// Result of a field extraction.
pub type FieldResult<T> = Result<T, ErrorCode>;
