// src/infrastructure/tabular.rs
//
// Streaming reader for delimited text files.
//
// The reader sniffs the delimiter from the header line, then hands out rows
// in chunks bounded by the number of input bytes consumed, so a caller can
// check for cancellation and report progress between chunks without holding
// the whole file in memory.

use std::fs::File;
use std::io::{BufRead, BufReader, Chain, Cursor, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Delimiters considered by `sniff_delimiter`, in tie-break order.
pub const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

pub const DEFAULT_CHUNK_BYTES: usize = 64 * 1024;
pub const PREVIEW_ROWS: usize = 100;

/// First rows of a file, for column mapping.
#[derive(Debug, Clone, Serialize)]
pub struct TabularPreview {
    pub delimiter: char,
    pub columns: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
}

/// Pick the delimiter that occurs most often in the header line, ignoring
/// anything between double quotes. Comma wins ties and empty headers.
pub fn sniff_delimiter(header_line: &str) -> u8 {
    let mut counts = [0usize; DELIMITER_CANDIDATES.len()];
    let mut in_quotes = false;

    for byte in header_line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(pos) = DELIMITER_CANDIDATES.iter().position(|&d| d == byte) {
            counts[pos] += 1;
        }
    }

    let mut best = 0;
    for (i, &count) in counts.iter().enumerate().skip(1) {
        if count > counts[best] {
            best = i;
        }
    }
    DELIMITER_CANDIDATES[best]
}

type Replay<R> = Chain<Cursor<Vec<u8>>, BufReader<R>>;

pub struct TabularReader<R: Read> {
    reader: csv::Reader<Replay<R>>,
    columns: Vec<String>,
    delimiter: u8,
    chunk_bytes: usize,
    record: StringRecord,
    exhausted: bool,
}

impl<R: Read> TabularReader<R> {
    /// Read the header and prepare for chunked reading.
    ///
    /// Fails with `AppError::Parse` when the input has no usable header.
    pub fn from_reader(inner: R, chunk_bytes: usize) -> AppResult<Self> {
        let mut buffered = BufReader::new(inner);
        let mut first_line = Vec::new();
        buffered.read_until(b'\n', &mut first_line)?;

        let header_text = std::str::from_utf8(&first_line)
            .map_err(|e| AppError::Parse(format!("Header is not valid UTF-8: {}", e)))?;
        let header_text = header_text.trim_start_matches('\u{feff}');
        if header_text.trim().is_empty() {
            return Err(AppError::Parse("File has no header row".to_string()));
        }
        let delimiter = sniff_delimiter(header_text);

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(Cursor::new(first_line).chain(buffered));

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        if columns.iter().all(|c| c.is_empty()) {
            return Err(AppError::Parse("Header row has no column names".to_string()));
        }

        log::debug!(
            "Tabular reader: {} columns, delimiter {:?}",
            columns.len(),
            delimiter as char
        );

        Ok(Self {
            reader,
            columns,
            delimiter,
            chunk_bytes: chunk_bytes.max(1),
            record: StringRecord::new(),
            exhausted: false,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Input bytes consumed so far, header included.
    pub fn bytes_read(&self) -> u64 {
        self.reader.position().byte()
    }

    /// Read rows until at least `chunk_bytes` more input has been consumed
    /// or the input ends. Returns `None` once the input is exhausted.
    pub fn next_chunk(&mut self) -> AppResult<Option<Vec<Vec<String>>>> {
        if self.exhausted {
            return Ok(None);
        }

        let start = self.bytes_read();
        let mut rows = Vec::new();

        loop {
            if !self.reader.read_record(&mut self.record)? {
                self.exhausted = true;
                break;
            }
            rows.push(self.record.iter().map(str::to_string).collect());
            if self.bytes_read() - start >= self.chunk_bytes as u64 {
                break;
            }
        }

        if rows.is_empty() && self.exhausted {
            Ok(None)
        } else {
            Ok(Some(rows))
        }
    }

    /// Collect up to `max_rows` rows from the current position.
    pub fn take_rows(&mut self, max_rows: usize) -> AppResult<Vec<Vec<String>>> {
        let mut rows = Vec::new();
        while rows.len() < max_rows && self.reader.read_record(&mut self.record)? {
            rows.push(self.record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }
}

/// Read the header and the first `max_rows` rows of a file.
pub fn preview(path: &Path, max_rows: usize) -> AppResult<TabularPreview> {
    let file = File::open(path)?;
    preview_reader(file, max_rows)
}

pub fn preview_reader<R: Read>(inner: R, max_rows: usize) -> AppResult<TabularPreview> {
    let mut reader = TabularReader::from_reader(inner, DEFAULT_CHUNK_BYTES)?;
    let sample_rows = reader.take_rows(max_rows)?;
    Ok(TabularPreview {
        delimiter: reader.delimiter() as char,
        columns: reader.columns().to_vec(),
        sample_rows,
    })
}
