use crate::csv_processor::dialect::Dialect;
use crate::csv_processor::enumerator::SourceFile;
use crate::csv_processor::header::{resolve_header, ResolvedHeader};
use crate::csv_processor::record::{ColumnSchema, Record};
use crate::utils::{Result, TapError};
use csv::ByteRecord;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A tokenized row and its 1-based physical position in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub number: u64,
    pub tokens: Vec<String>,
}

/// Counts the blank lines the tokenizer swallows, reading the same file
/// through a second handle.
///
/// A blank line is a bare `\n`, `\r\n` or `\r`. They only ever sit between
/// the end of one record and the first byte of the next.
struct BlankLineCounter {
    raw: BufReader<File>,
    pos: u64,
}

impl BlankLineCounter {
    fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            raw: BufReader::new(File::open(path)?),
            pos: 0,
        })
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        if offset != self.pos {
            self.raw.seek_relative(offset as i64 - self.pos as i64)?;
            self.pos = offset;
        }
        Ok(())
    }

    fn peek(&mut self) -> io::Result<Option<u8>> {
        Ok(self.raw.fill_buf()?.first().copied())
    }

    fn bump(&mut self) {
        self.raw.consume(1);
        self.pos += 1;
    }

    /// Blank lines at the front of `[start, end)`, the bytes consumed by one
    /// record read.
    fn count(&mut self, start: u64, end: u64) -> io::Result<u64> {
        // The `\n` of a `\r\n` terminator lands at the front of the next span.
        let mut after_cr = false;
        if start == 0 {
            self.seek_to(0)?;
            if self.raw.fill_buf()?.starts_with(UTF8_BOM) {
                for _ in 0..UTF8_BOM.len() {
                    self.bump();
                }
            }
        } else {
            self.seek_to(start - 1)?;
            after_cr = self.peek()? == Some(b'\r');
            self.bump();
        }

        let mut blanks = 0;
        while self.pos < end {
            match self.peek()? {
                Some(b'\n') if after_cr => after_cr = false,
                Some(b'\n') => blanks += 1,
                Some(b'\r') => {
                    blanks += 1;
                    after_cr = true;
                }
                _ => break,
            }
            self.bump();
        }
        Ok(blanks)
    }
}

/// Forward-only tokenizer over one file.
///
/// Row numbers are physical: header rows and blank lines count, and a record
/// whose quoted fields span several lines counts once. Blank lines are never
/// yielded.
pub struct CsvStreamReader {
    file_name: Arc<str>,
    dialect: Dialect,
    reader: csv::Reader<File>,
    record: ByteRecord,
    blank_lines: BlankLineCounter,
    rows_read: u64,
    finished: bool,
}

impl CsvStreamReader {
    pub fn open(file: &SourceFile, dialect: &Dialect) -> Result<Self> {
        let access = |e: io::Error| TapError::FileAccess {
            file: file.name.clone(),
            reason: e.to_string(),
        };
        let handle = File::open(&file.path).map_err(access)?;
        let blank_lines = BlankLineCounter::open(&file.path).map_err(access)?;

        Ok(Self {
            file_name: Arc::from(file.name.as_str()),
            dialect: dialect.clone(),
            reader: dialect.reader_builder().from_reader(handle),
            record: ByteRecord::new(),
            blank_lines,
            rows_read: 0,
            finished: false,
        })
    }

    pub fn file_name(&self) -> &Arc<str> {
        &self.file_name
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    fn decode_current(&self, first_record: bool) -> Result<Vec<String>> {
        let encoding = self.dialect.encoding;
        let mut tokens = Vec::with_capacity(self.record.len());

        for (i, field) in self.record.iter().enumerate() {
            let field = if first_record && i == 0 {
                encoding.strip_bom(field)
            } else {
                field
            };
            match encoding.decode(field) {
                Some(text) => tokens.push(text.into_owned()),
                None => {
                    return Err(TapError::Decode {
                        file: self.file_name.to_string(),
                        row: self.rows_read,
                        encoding: encoding.name().to_string(),
                    })
                }
            }
        }

        Ok(tokens)
    }
}

impl Iterator for CsvStreamReader {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.reader.read_byte_record(&mut self.record) {
            Ok(true) => {
                let start = self.record.position().map_or(0, |p| p.byte());
                let end = self.reader.position().byte();
                match self.blank_lines.count(start, end) {
                    Ok(blanks) => self.rows_read += blanks + 1,
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(TapError::FileAccess {
                            file: self.file_name.to_string(),
                            reason: e.to_string(),
                        }));
                    }
                }
                match self.decode_current(start == 0) {
                    Ok(tokens) => Some(Ok(RawRow {
                        number: self.rows_read,
                        tokens,
                    })),
                    Err(e) => {
                        self.finished = true;
                        Some(Err(e))
                    }
                }
            }
            Ok(false) => {
                self.finished = true;
                None
            }
            Err(e) => match e.kind() {
                csv::ErrorKind::Io(io) => {
                    self.finished = true;
                    Some(Err(TapError::FileAccess {
                        file: self.file_name.to_string(),
                        reason: io.to_string(),
                    }))
                }
                _ => {
                    self.rows_read += 1;
                    Some(Err(TapError::RowParse {
                        file: self.file_name.to_string(),
                        row: self.rows_read,
                        reason: e.to_string(),
                    }))
                }
            },
        }
    }
}

/// Lazy typed rows of one file.
///
/// Rows at or before `resume_after` are tokenized but never typed. Dropping
/// the iterator closes the file.
pub struct FileRows {
    rows: CsvStreamReader,
    columns: ColumnSchema,
    pending: Option<RawRow>,
    resume_after: u64,
    rows_skipped: u64,
}

impl FileRows {
    pub fn open(
        file: &SourceFile,
        dialect: &Dialect,
        explicit_header: Option<&ColumnSchema>,
        resume_after: u64,
    ) -> Result<Self> {
        let mut rows = CsvStreamReader::open(file, dialect)?;
        let ResolvedHeader {
            columns,
            first_data_row,
        } = resolve_header(&mut rows, explicit_header)?;

        Ok(Self {
            rows,
            columns,
            pending: first_data_row,
            resume_after,
            rows_skipped: 0,
        })
    }

    pub fn columns(&self) -> &ColumnSchema {
        &self.columns
    }

    pub fn file_name(&self) -> &Arc<str> {
        self.rows.file_name()
    }

    pub fn rows_read(&self) -> u64 {
        self.rows.rows_read()
    }

    /// Data rows passed over because they sit at or before `resume_after`.
    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped
    }

    fn next_raw(&mut self) -> Option<Result<RawRow>> {
        match self.pending.take() {
            Some(row) => Some(Ok(row)),
            None => self.rows.next(),
        }
    }
}

impl Iterator for FileRows {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = match self.next_raw()? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(e)),
            };

            if raw.number <= self.resume_after {
                self.rows_skipped += 1;
                continue;
            }

            return Some(Ok(Record::from_tokens(
                self.rows.file_name().clone(),
                raw.number,
                self.columns.clone(),
                raw.tokens,
            )));
        }
    }
}
