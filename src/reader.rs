// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of fast-csv, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use std::{
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    ops::Range,
    path::Path,
};

use bstr::{BStr, ByteSlice};

use crate::{
    error::{ErrorCode, ErrorInfo, FieldResult},
    field::Field,
    mmap::MappedSource,
    policy::{
        ErrorPolicy, ErrorState, ErrorsBasic, ErrorsFull, ErrorsOff, NullPolicy, NullsLenient,
        NullsOff, NullsStandard,
    },
    scan,
};

/// A range of bytes within the mapping.
///
/// The reader's field slots are spans rather than slices so they can be
/// reused across records without borrowing the mapping; [`for_each_raw`]
/// hands them to the callback directly as the lowest-overhead surface.
///
/// [`for_each_raw`]: Reader::for_each_raw
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[cfg(debug_assertions)]
    #[inline(always)]
    pub(crate) fn slice<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[Range::from(*self)]
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub(crate) fn slice<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        // SAFETY: spans are only constructed by `split_record` and header
        // capture, which derive both offsets from positions within `bytes`.
        unsafe { bytes.get_unchecked(Range::from(*self)) }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        !(self.start < self.end)
    }
}

impl From<Range<usize>> for Span {
    #[inline(always)]
    fn from(range: Range<usize>) -> Self {
        Span {
            start: range.start,
            end: range.end,
        }
    }
}

impl From<Span> for Range<usize> {
    #[inline(always)]
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Splits the record starting at `*cursor` into up to `N` spans.
///
/// Blank lines (LF, CRLF, or a lone CR at a record boundary) are consumed
/// without producing a record. Returns the number of slots filled, or `None`
/// at end of input. On return the cursor is one byte past the record's line
/// terminator, or at the end of `data` for an unterminated final record.
/// Slots beyond the returned count keep their previous contents.
#[inline(always)]
pub(crate) fn split_record<const N: usize, const D: u8>(
    data: &[u8],
    cursor: &mut usize,
    spans: &mut [Span; N],
) -> Option<usize> {
    let len = data.len();
    let mut pos = *cursor;
    loop {
        if pos >= len {
            *cursor = pos;
            return None;
        }
        match data[pos] {
            b'\n' => pos += 1,
            b'\r' => {
                pos += 1;
                if pos < len && data[pos] == b'\n' {
                    pos += 1;
                }
            }
            _ => break,
        }
    }

    let line_end = pos + scan::find_newline(&data[pos..]);
    // Strip one trailing CR so CRLF terminators do not leak into the last
    // field.
    let effective_end = if line_end > pos && data[line_end - 1] == b'\r' {
        line_end - 1
    } else {
        line_end
    };

    let mut col = 0;
    let mut p = pos;
    while col < N && p < effective_end {
        let start = p;
        p += scan::find_field_end(&data[p..effective_end], D);
        spans[col] = Span { start, end: p };
        col += 1;
        if p < effective_end && data[p] == D {
            p += 1;
        }
    }
    // A terminal delimiter yields one trailing empty field.
    if col > 0 && col < N && spans[col - 1].end < effective_end && data[spans[col - 1].end] == D {
        spans[col] = Span { start: p, end: p };
        col += 1;
    }

    *cursor = if line_end < len { line_end + 1 } else { len };
    Some(col)
}

/// Non-semantic read hints one cache line and one page ahead of the cursor.
#[inline(always)]
fn prefetch(data: &[u8], pos: usize) {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: prefetch never dereferences, so the wrapped addresses need not
    // be in bounds.
    unsafe {
        use core::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        let base = data.as_ptr();
        _mm_prefetch::<_MM_HINT_T0>(base.wrapping_add(pos + 64) as *const i8);
        _mm_prefetch::<_MM_HINT_T0>(base.wrapping_add(pos + 4096) as *const i8);
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = (data, pos);
}

/// A single-threaded record iterator over a mapped file.
///
/// The shape of the table is fixed at compile time: `N` columns separated by
/// the byte `D`. The error policy `E` selects whether short records are
/// detected and skipped and which diagnostics are kept; the null policy `V`
/// selects the vocabulary used by [`Reader::is_null`] and the `Safe`,
/// `Checked`, and `Turbo` presets. Both policies are monomorphized, so a
/// disabled policy costs neither time nor space.
///
/// Records are handed to callbacks as arrays of [`Field`]s borrowing from
/// the mapping; nothing is copied. A record is only valid for the duration
/// of one callback invocation.
pub struct Reader<const N: usize, const D: u8, E: ErrorPolicy = ErrorsOff, V: NullPolicy = NullsOff>
{
    source: MappedSource,
    /// Byte offset into the mapping; always at a record boundary between
    /// callback invocations.
    cursor: usize,
    headers: [Span; N],
    /// Reusable field slots. After a short record with checking disabled,
    /// slots past the filled count keep stale spans from the previous
    /// record.
    spans: [Span; N],
    state: E::State,
    _null: PhantomData<V>,
}

impl<const N: usize, const D: u8, E: ErrorPolicy, V: NullPolicy> Reader<N, D, E, V> {
    /// Opens `path` and captures the first line as the header.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self::with_options(path, true)
    }

    /// Opens `path`. With `skip_header` false, line 1 is data and
    /// [`headers`](Reader::headers) reports empty slices.
    pub fn with_options<P: AsRef<Path>>(path: P, skip_header: bool) -> Self {
        let source = MappedSource::open(path);
        let mut reader: Reader<N, D, E, V> = Reader {
            source,
            cursor: 0,
            headers: [Span::default(); N],
            spans: [Span::default(); N],
            state: E::State::default(),
            _null: PhantomData,
        };
        if !reader.source.is_valid() {
            reader.state.record(ErrorCode::FileOpenError, 0u32);
            return reader;
        }
        if skip_header {
            reader.capture_headers();
        }
        reader
    }

    fn capture_headers(&mut self) {
        let data = self.source.data();
        // Slots past the filled count keep their empty initial value.
        if let Some(col) = split_record::<N, D>(data, &mut self.cursor, &mut self.headers) {
            self.state.bump_line();
            log::trace!("captured {col} header fields");
        }
    }

    /// The header fields, in column order. Slices are empty when the header
    /// was shorter than `N` or was not captured.
    pub fn headers(&self) -> [&BStr; N] {
        let data = self.source.data();
        self.headers.map(|span| span.slice(data).as_bstr())
    }

    /// The index of the column whose header equals `name`.
    pub fn column_index<B: AsRef<[u8]>>(&self, name: B) -> Option<usize> {
        let name = name.as_ref();
        let data = self.source.data();
        (0..N).find(|&i| self.headers[i].slice(data) == name)
    }

    /// The header of column `i`, or `None` past the last column.
    pub fn column_name(&self, i: usize) -> Option<&BStr> {
        let data = self.source.data();
        self.headers.get(i).map(|span| span.slice(data).as_bstr())
    }

    /// The most recent diagnostic, with latest-wins semantics. Always `None`
    /// under [`ErrorsOff`].
    #[inline]
    pub fn last_error(&self) -> Option<ErrorInfo> {
        self.state.last()
    }

    #[inline]
    pub fn has_error(&self) -> bool {
        self.state.last().is_some()
    }

    /// The current 1-based line, counting the header; 0 when the policy does
    /// not track lines.
    #[inline]
    pub fn line(&self) -> u64 {
        self.state.line()
    }

    /// The mapped bytes backing this reader.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.source.data()
    }

    /// Whether the source file was opened and mapped.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.source.is_valid()
    }

    /// Applies this reader's null vocabulary to a field.
    #[inline(always)]
    pub fn is_null(field: &Field<'_>) -> bool {
        V::is_null(field.as_bytes())
    }

    /// Pulls the next record. Reports [`ErrorCode::EndOfFile`] once the
    /// input is exhausted and, under a checking policy,
    /// [`ErrorCode::ColumnCountMismatch`] for a short record.
    pub fn read_record(&mut self) -> FieldResult<[Field<'_>; N]> {
        let Reader {
            source,
            cursor,
            spans,
            state,
            ..
        } = self;
        let data = source.data();
        let Some(col) = split_record::<N, D>(data, cursor, spans) else {
            return Err(ErrorCode::EndOfFile);
        };
        state.bump_line();
        if E::ENABLED && col != N {
            state.record(ErrorCode::ColumnCountMismatch, col as u32);
            return Err(ErrorCode::ColumnCountMismatch);
        }
        Ok((*spans).map(|span| Field::new(span.slice(data))))
    }

    /// Invokes `f` with the span slots of every record. Returns the number
    /// of records for which `f` was invoked.
    pub fn for_each_raw<F>(&mut self, mut f: F) -> u64
    where
        F: FnMut(&[Span; N]),
    {
        let Reader {
            source,
            cursor,
            spans,
            state,
            ..
        } = self;
        let data = source.data();
        let mut count = 0;
        loop {
            prefetch(data, *cursor);
            let Some(col) = split_record::<N, D>(data, cursor, spans) else {
                break;
            };
            state.bump_line();
            if E::ENABLED && col != N {
                state.record(ErrorCode::ColumnCountMismatch, col as u32);
                continue;
            }
            count += 1;
            f(spans);
        }
        count
    }

    /// Invokes `f` with every record. Returns the number of records for
    /// which `f` was invoked; under a checking policy, short records are
    /// skipped and recorded instead.
    #[inline]
    pub fn for_each<F>(&mut self, mut f: F) -> u64
    where
        F: FnMut(&[Field<'_>; N]),
    {
        self.for_each_until(|record| {
            f(record);
            true
        })
    }

    /// Like [`for_each`](Reader::for_each), but `f` returning false stops
    /// the iteration. The count includes the stopping invocation.
    pub fn for_each_until<F>(&mut self, mut f: F) -> u64
    where
        F: FnMut(&[Field<'_>; N]) -> bool,
    {
        let Reader {
            source,
            cursor,
            spans,
            state,
            ..
        } = self;
        let data = source.data();
        let mut count = 0;
        loop {
            prefetch(data, *cursor);
            let Some(col) = split_record::<N, D>(data, cursor, spans) else {
                break;
            };
            state.bump_line();
            if E::ENABLED && col != N {
                state.record(ErrorCode::ColumnCountMismatch, col as u32);
                continue;
            }
            count += 1;
            let record = (*spans).map(|span| Field::new(span.slice(data)));
            if !f(&record) {
                break;
            }
        }
        count
    }
}

impl<const N: usize, const D: u8, E: ErrorPolicy, V: NullPolicy> Debug for Reader<N, D, E, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("columns", &N)
            .field("delimiter", &(D as char))
            .field("valid", &self.source.is_valid())
            .field("cursor", &self.cursor)
            .field("headers", &self.headers)
            .finish()
    }
}

/// Maximum-throughput preset: no error tracking, no null vocabulary.
pub type Turbo<const N: usize, const D: u8> = Reader<N, D, ErrorsOff, NullsOff>;

/// Short records are skipped and the failing line recorded; the NA family
/// counts as null.
pub type Checked<const N: usize, const D: u8> = Reader<N, D, ErrorsBasic, NullsStandard>;

/// Full diagnostics and the whole null vocabulary.
pub type Safe<const N: usize, const D: u8> = Reader<N, D, ErrorsFull, NullsLenient>;

pub type TurboCsv<const N: usize> = Turbo<N, { b',' }>;
pub type CheckedCsv<const N: usize> = Checked<N, { b',' }>;
pub type SafeCsv<const N: usize> = Safe<N, { b',' }>;

pub type TurboTsv<const N: usize> = Turbo<N, { b'\t' }>;
pub type CheckedTsv<const N: usize> = Checked<N, { b'\t' }>;
pub type SafeTsv<const N: usize> = Safe<N, { b'\t' }>;
