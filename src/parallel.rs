// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of fast-csv, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use std::{marker::PhantomData, ops::Range, panic, path::Path, thread};

use bstr::{BStr, ByteSlice};

use crate::{
    field::Field,
    mmap::MappedSource,
    policy::{NullPolicy, NullsOff},
    reader::{split_record, Span},
    scan,
};

/// A fan-out record iterator over a mapped file.
///
/// The post-header region is partitioned into newline-aligned chunks, one
/// worker per chunk, and each worker runs the single-threaded record engine
/// over its chunk. The column-count check is always on here: short records
/// are silently skipped, which keeps the workers free of shared error state.
/// Callers that need diagnostics use the single-threaded [`Reader`].
///
/// Record order is preserved within a chunk and unspecified across chunks.
/// The callback runs concurrently on every worker, so any state it touches
/// must be synchronized by the caller.
///
/// [`Reader`]: crate::Reader
pub struct ParallelReader<const N: usize, const D: u8, V: NullPolicy = NullsOff> {
    source: MappedSource,
    headers: [Span; N],
    /// The byte range of the mapping after the header line.
    body: Range<usize>,
    threads: usize,
    _null: PhantomData<V>,
}

impl<const N: usize, const D: u8, V: NullPolicy> ParallelReader<N, D, V> {
    /// Opens `path` with `threads` workers and captures the header line.
    /// `threads == 0` selects the machine's available parallelism.
    pub fn open<P: AsRef<Path>>(path: P, threads: usize) -> Self {
        Self::with_options(path, threads, true)
    }

    /// Opens `path`. With `skip_header` false, line 1 is data.
    pub fn with_options<P: AsRef<Path>>(path: P, threads: usize, skip_header: bool) -> Self {
        let source = MappedSource::open(path);
        let mut headers = [Span::default(); N];
        let mut cursor = 0;
        if source.is_valid() && skip_header {
            split_record::<N, D>(source.data(), &mut cursor, &mut headers);
        }
        let threads = if threads == 0 {
            thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            threads
        };
        let body = cursor..source.len();
        ParallelReader {
            source,
            headers,
            body,
            threads,
            _null: PhantomData,
        }
    }

    /// The header fields, in column order.
    pub fn headers(&self) -> [&BStr; N] {
        let data = self.source.data();
        self.headers.map(|span| span.slice(data).as_bstr())
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

    /// Partitions the body into up to `threads` disjoint chunks that cover
    /// it exactly. Every chunk boundary sits one byte past a newline, so
    /// each chunk starts at a record boundary and holds whole records.
    fn chunks(&self) -> Vec<Range<usize>> {
        let data = self.source.data();
        let Range { start, end } = self.body.clone();
        let size = end - start;
        if size == 0 {
            return Vec::new();
        }
        let workers = self.threads.clamp(1, size);
        let chunk = size / workers;
        let mut ranges = Vec::with_capacity(workers);
        let mut begin = start;
        for i in 0..workers {
            if begin >= end {
                break;
            }
            let chunk_end = if i == workers - 1 {
                end
            } else {
                let target = (start + (i + 1) * chunk).clamp(begin, end);
                let newline = target + scan::find_newline(&data[target..end]);
                if newline < end {
                    newline + 1
                } else {
                    end
                }
            };
            ranges.push(begin..chunk_end);
            begin = chunk_end;
        }
        ranges
    }

    /// Invokes `f` with every whole record, fanning the chunks out across
    /// the workers. Returns the total number of callback invocations.
    ///
    /// Blocks until every worker has joined, including when `f` panics on a
    /// worker; the panic then resumes on the calling thread.
    pub fn for_each<F>(&self, f: F) -> u64
    where
        F: Fn(&[Field<'_>; N]) + Sync,
    {
        let data = self.source.data();
        let chunks = self.chunks();
        if chunks.is_empty() {
            return 0;
        }
        log::debug!(
            "parsing {} bytes on {} workers",
            self.body.len(),
            chunks.len()
        );
        let f = &f;
        thread::scope(|scope| {
            let workers: Vec<_> = chunks
                .into_iter()
                .map(|range| {
                    scope.spawn(move || {
                        let chunk = &data[range];
                        let mut spans = [Span::default(); N];
                        let mut cursor = 0;
                        let mut count = 0u64;
                        while let Some(col) =
                            split_record::<N, D>(chunk, &mut cursor, &mut spans)
                        {
                            if col != N {
                                continue;
                            }
                            let record = spans.map(|span| Field::new(span.slice(chunk)));
                            f(&record);
                            count += 1;
                        }
                        count
                    })
                })
                .collect();
            let mut total = 0;
            for worker in workers {
                match worker.join() {
                    Ok(count) => total += count,
                    // The scope joins the remaining workers while this
                    // unwinds.
                    Err(payload) => panic::resume_unwind(payload),
                }
            }
            total
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("fast-csv-parallel-{}-{name}", std::process::id()))
    }

    #[test]
    fn chunks_cover_body_and_align_to_newlines() {
        let path = temp_path("chunks");
        let mut contents = b"h1,h2\n".to_vec();
        for i in 0..1000 {
            contents.extend_from_slice(format!("{i},{}\n", i * 2).as_bytes());
        }
        fs::write(&path, &contents).unwrap();

        let reader = ParallelReader::<2, { b',' }>::open(&path, 4);
        let chunks = reader.chunks();
        assert!(!chunks.is_empty());
        assert!(chunks.len() <= 4);
        assert_eq!(chunks[0].start, reader.body.start);
        assert_eq!(chunks.last().unwrap().end, reader.body.end);
        for window in chunks.windows(2) {
            assert_eq!(window[0].end, window[1].start);
            // Every boundary is one byte past a newline.
            assert_eq!(contents[window[0].end - 1], b'\n');
        }
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn more_workers_than_bytes() {
        let path = temp_path("tiny");
        fs::write(&path, b"a,b\n1,2\n").unwrap();
        let reader = ParallelReader::<2, { b',' }>::open(&path, 64);
        let count = reader.for_each(|_| {});
        assert_eq!(count, 1);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn invalid_source_yields_no_records() {
        let reader = ParallelReader::<2, { b',' }>::open(temp_path("missing"), 4);
        assert!(!reader.is_valid());
        assert_eq!(reader.for_each(|_| {}), 0);
    }
}
