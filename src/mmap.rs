// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of fast-csv, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use std::{fs::File, path::Path};

use memmap2::Mmap;

/// A whole file mapped read-only into memory.
///
/// The mapping is the single owner of the storage every parsed
/// [`Field`](crate::Field) borrows from, so fields and header slices are
/// only usable while the source that produced them is alive.
///
/// Construction never fails loudly: a path that cannot be opened or mapped
/// produces an *invalid* source whose `data()` is empty, and iteration over
/// it yields no records. The mapping is released when the source is dropped.
pub struct MappedSource {
    /// `None` for invalid sources and for zero-length files, which cannot be
    /// mapped.
    map: Option<Mmap>,
    valid: bool,
}

impl MappedSource {
    /// Maps `path` read-only and advises the kernel of sequential access.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let invalid = MappedSource {
            map: None,
            valid: false,
        };
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                log::warn!("failed to open {}: {err}", path.display());
                return invalid;
            }
        };
        let len = match file.metadata() {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                log::warn!("failed to stat {}: {err}", path.display());
                return invalid;
            }
        };
        if len == 0 {
            return MappedSource {
                map: None,
                valid: true,
            };
        }
        // SAFETY: the mapping is private and read-only. Mutating the file
        // while it is mapped is the documented hazard shared by every
        // memory-mapped reader; the parser itself never writes.
        match unsafe { Mmap::map(&file) } {
            Ok(map) => {
                #[cfg(unix)]
                if let Err(err) = map.advise(memmap2::Advice::Sequential) {
                    log::debug!("madvise failed on {}: {err}", path.display());
                }
                MappedSource {
                    map: Some(map),
                    valid: true,
                }
            }
            Err(err) => {
                log::warn!("failed to map {}: {err}", path.display());
                invalid
            }
        }
    }

    /// The mapped bytes. Empty when the source is invalid or the file is
    /// empty.
    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.map.as_ref().map_or(0, |map| map.len())
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the file was opened and mapped.
    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("fast-csv-mmap-{}-{name}", std::process::id()))
    }

    #[test]
    fn maps_file_contents() {
        let path = temp_path("contents");
        fs::write(&path, b"a,b,c\n1,2,3\n").unwrap();
        let source = MappedSource::open(&path);
        assert!(source.is_valid());
        assert_eq!(source.data(), b"a,b,c\n1,2,3\n");
        assert_eq!(source.len(), 12);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_invalid() {
        let source = MappedSource::open(temp_path("does-not-exist"));
        assert!(!source.is_valid());
        assert!(source.data().is_empty());
        assert_eq!(source.len(), 0);
    }

    #[test]
    fn empty_file_is_valid_and_empty() {
        let path = temp_path("empty");
        fs::write(&path, b"").unwrap();
        let source = MappedSource::open(&path);
        assert!(source.is_valid());
        assert!(source.data().is_empty());
        fs::remove_file(&path).unwrap();
    }
}
