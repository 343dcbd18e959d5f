//! Listing store: line-delimited JSON record files under a root directory
//!
//! One logical record type per file, one record per line. Batch writes go
//! through a temporary file and a rename so a reader never sees a partially
//! written batch; appends write and flush one whole line at a time.

use crate::error::{LineageError, Result};
use glob::Pattern;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Lines, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Handle on a listing root directory
#[derive(Debug, Clone)]
pub struct ListingStore {
    root: PathBuf,
}

impl ListingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a path relative to the root
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Create the root directory if needed
    pub fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| LineageError::io(&self.root, e))
    }

    /// Replace `relative` with the given records
    pub fn write_records<T: Serialize>(&self, relative: impl AsRef<Path>, records: &[T]) -> Result<PathBuf> {
        let mut contents = String::new();
        for record in records {
            contents.push_str(&serde_json::to_string(record)?);
            contents.push('\n');
        }
        self.write_atomic(relative, &contents)
    }

    /// Replace `relative` with `contents` via a temporary sibling file
    pub fn write_atomic(&self, relative: impl AsRef<Path>, contents: &str) -> Result<PathBuf> {
        let target = self.path(relative);
        let parent = target.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
        std::fs::create_dir_all(&parent).map_err(|e| LineageError::io(&parent, e))?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{file_name}.tmp"));

        {
            let file = File::create(&tmp).map_err(|e| LineageError::io(&tmp, e))?;
            let mut writer = BufWriter::new(file);
            writer
                .write_all(contents.as_bytes())
                .and_then(|_| writer.flush())
                .map_err(|e| LineageError::io(&tmp, e))?;
        }

        std::fs::rename(&tmp, &target).map_err(|e| LineageError::io(&target, e))?;
        Ok(target)
    }

    /// Open `relative` for line appends, optionally truncating it first
    pub fn appender(&self, relative: impl AsRef<Path>, truncate: bool) -> Result<NdjsonAppender> {
        NdjsonAppender::open(self.path(relative), truncate)
    }

    /// Stream the records of a file (a discovered path or `store.path(..)`)
    pub fn read_records<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> Result<NdjsonReader<T>> {
        NdjsonReader::open(path.as_ref())
    }

    /// Read every decodable record of a file, logging and skipping bad lines
    pub fn load_records<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for record in self.read_records(path)? {
            match record {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable record"),
            }
        }
        Ok(records)
    }

    /// Recursively find files under the root whose name matches `pattern`
    ///
    /// `pattern` is a file-name glob such as `*views_references.ndjson`.
    /// Results are sorted.
    pub fn discover(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let matcher = compile_pattern(pattern)?;

        if !self.root.is_dir() {
            return Err(LineageError::io(
                &self.root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "listing root is not a directory"),
            ));
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let matched = matcher.matches(&entry.file_name().to_string_lossy());
            if matched {
                found.push(entry.into_path());
            }
        }

        found.sort();
        Ok(found)
    }
}

fn compile_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| LineageError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Streaming reader over the records of one NDJSON file
///
/// Yields one item per non-blank line; a line that fails to decode yields
/// [`LineageError::ArtifactRead`] and iteration continues with the next line.
pub struct NdjsonReader<T> {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line: usize,
    _record: PhantomData<T>,
}

impl<T: DeserializeOwned> NdjsonReader<T> {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path).map_err(|e| LineageError::ArtifactRead {
            path: path.clone(),
            line: 0,
            message: e.to_string(),
        })?;

        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line: 0,
            _record: PhantomData,
        })
    }

    /// 1-indexed number of the line most recently read
    pub fn line(&self) -> usize {
        self.line
    }
}

impl<T: DeserializeOwned> Iterator for NdjsonReader<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line += 1;

            let text = match line {
                Ok(text) => text,
                Err(e) => {
                    return Some(Err(LineageError::ArtifactRead {
                        path: self.path.clone(),
                        line: self.line,
                        message: e.to_string(),
                    }))
                }
            };

            if text.trim().is_empty() {
                continue;
            }

            return Some(serde_json::from_str(&text).map_err(|e| LineageError::ArtifactRead {
                path: self.path.clone(),
                line: self.line,
                message: e.to_string(),
            }));
        }
    }
}

/// Single-writer line appender for one NDJSON file
pub struct NdjsonAppender {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl NdjsonAppender {
    pub fn open(path: impl Into<PathBuf>, truncate: bool) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LineageError::io(parent, e))?;
        }

        let mut options = OpenOptions::new();
        if truncate {
            options.write(true).create(true).truncate(true);
        } else {
            options.append(true).create(true);
        }

        let torn = !truncate && ends_mid_line(&path).map_err(|e| LineageError::io(&path, e))?;

        let file = options.open(&path).map_err(|e| LineageError::io(&path, e))?;
        let mut writer = BufWriter::new(file);

        // Terminate a line left unfinished by an interrupted run so the next
        // record starts on its own line
        if torn {
            writer
                .write_all(b"\n")
                .and_then(|_| writer.flush())
                .map_err(|e| LineageError::io(&path, e))?;
        }

        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one record as a complete line and flush it
    pub fn append<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| LineageError::io(&self.path, e))
    }
}

fn ends_mid_line(path: &Path) -> std::io::Result<bool> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    if file.metadata()?.len() == 0 {
        return Ok(false);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
