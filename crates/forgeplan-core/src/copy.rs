//! Streaming reader for PostgreSQL text-format `COPY` dumps.
//!
//! A GitLab backup ships its database as one large `database.sql(.gz)` file
//! containing a `COPY public.<table> (...) FROM stdin;` block per table.
//! `CopyRows` walks that file once, front to back, yielding a [`Row`] for
//! every data line of every requested table.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::{PlanError, Result};

const COPY_PREFIX: &str = "COPY public.";

/// One decoded data row: column name to field value, `None` for SQL NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: HashMap<String, Option<String>>,
}

impl Row {
    pub fn from_fields(fields: HashMap<String, Option<String>>) -> Self {
        Row { fields }
    }

    /// Field value, or `None` when the column is absent or NULL.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).and_then(|v| v.as_deref())
    }

    /// Field value with NULL collapsed to the empty string.
    pub fn get_or_empty(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    /// Integer field, `None` when absent, NULL, or not an integer.
    pub fn opt_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(|v| v.parse().ok())
    }

    /// Integer field that a well-formed dump always carries.
    pub fn require_i64(&self, table: &str, column: &str) -> Result<i64> {
        self.opt_i64(column).ok_or_else(|| PlanError::RowField {
            table: table.to_string(),
            column: column.to_string(),
        })
    }

    /// Whether the column was present in the COPY header (even if NULL).
    pub fn has_column(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Decode one raw tab-field per PostgreSQL COPY text escaping rules.
pub fn decode_copy_field(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch != '\\' {
            out.push(ch);
            i += 1;
            continue;
        }

        // Trailing backslash, keep as-is.
        if i + 1 >= chars.len() {
            out.push('\\');
            break;
        }

        let nxt = chars[i + 1];
        match nxt {
            'b' => {
                out.push('\u{8}');
                i += 2;
            }
            'f' => {
                out.push('\u{c}');
                i += 2;
            }
            'n' => {
                out.push('\n');
                i += 2;
            }
            'r' => {
                out.push('\r');
                i += 2;
            }
            't' => {
                out.push('\t');
                i += 2;
            }
            'v' => {
                out.push('\u{b}');
                i += 2;
            }
            '\\' => {
                out.push('\\');
                i += 2;
            }
            'x' if i + 3 < chars.len() => {
                let hex: String = chars[i + 2..i + 4].iter().collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(c) => {
                        out.push(c);
                        i += 4;
                    }
                    None => {
                        out.push(nxt);
                        i += 2;
                    }
                }
            }
            '0'..='9' => {
                // Octal escape: up to 3 digits, including nxt. Digits 8/9
                // fail the radix parse and fall back to the bare character.
                let mut j = i + 1;
                let mut digits = String::new();
                while j < chars.len() && digits.len() < 3 && chars[j].is_ascii_digit() {
                    digits.push(chars[j]);
                    j += 1;
                }
                match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    Some(c) => {
                        out.push(c);
                        i = j;
                    }
                    None => {
                        out.push(nxt);
                        i += 2;
                    }
                }
            }
            _ => {
                // Unknown escape, drop backslash per COPY behavior.
                out.push(nxt);
                i += 2;
            }
        }
    }

    out
}

fn parse_copy_header(line: &str) -> Result<(String, Vec<String>)> {
    // Example:
    //   COPY public.notes (note, noteable_type, ..., "position", ...) FROM stdin;
    let rest = line
        .strip_prefix(COPY_PREFIX)
        .ok_or_else(|| PlanError::CopyHeader {
            reason: "missing COPY prefix",
            line: line.to_string(),
        })?;
    let table = rest.split(' ').next().unwrap_or("").to_string();

    let open_paren = line.find('(');
    let close_paren = line.rfind(')');
    let (open, close) = match (open_paren, close_paren) {
        (Some(o), Some(c)) if c > o => (o, c),
        _ => {
            return Err(PlanError::CopyHeader {
                reason: "missing parens",
                line: line.to_string(),
            })
        }
    };

    let columns: Vec<String> = line[open + 1..close]
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .collect();
    if columns.is_empty() || columns.iter().any(|c| c.is_empty()) {
        return Err(PlanError::CopyHeader {
            reason: "empty column",
            line: line.to_string(),
        });
    }
    Ok((table, columns))
}

struct CopyBlock {
    table: String,
    columns: Vec<String>,
    capture: bool,
}

/// Lazy iterator over `(table, row)` pairs of a `database.sql(.gz)` dump.
///
/// The stream is finite and forward-only; a fresh `CopyRows` must be opened
/// for every pass over the file. Tables outside the requested set are
/// scanned but never decoded.
pub struct CopyRows {
    reader: Box<dyn BufRead>,
    tables: Option<HashSet<String>>,
    block: Option<CopyBlock>,
    line_buf: Vec<u8>,
    done: bool,
}

impl CopyRows {
    /// Open a dump file, transparently decompressing `.gz`.
    pub fn open(db_path: &Path, tables: Option<HashSet<String>>) -> Result<Self> {
        let file = File::open(db_path)?;
        let reader: Box<dyn BufRead> = if db_path.extension().is_some_and(|e| e == "gz") {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Ok(CopyRows {
            reader,
            tables,
            block: None,
            line_buf: Vec::new(),
            done: false,
        })
    }

    /// Next raw line with the trailing newline stripped, lossily decoded.
    fn next_line(&mut self) -> Result<Option<String>> {
        self.line_buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.line_buf)?;
        if n == 0 {
            return Ok(None);
        }
        let mut raw = &self.line_buf[..];
        if raw.ends_with(b"\n") {
            raw = &raw[..raw.len() - 1];
        }
        if raw.ends_with(b"\r") {
            raw = &raw[..raw.len() - 1];
        }
        Ok(Some(String::from_utf8_lossy(raw).into_owned()))
    }

    fn decode_row(block: &CopyBlock, line: &str) -> Result<(String, Row)> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != block.columns.len() {
            return Err(PlanError::CopyColumnMismatch {
                table: block.table.clone(),
                expected: block.columns.len(),
                got: fields.len(),
            });
        }

        let mut row = HashMap::with_capacity(fields.len());
        for (col, raw) in block.columns.iter().zip(fields) {
            let value = if raw == "\\N" {
                None
            } else {
                Some(decode_copy_field(raw))
            };
            row.insert(col.clone(), value);
        }
        Ok((block.table.clone(), Row::from_fields(row)))
    }
}

impl Iterator for CopyRows {
    type Item = Result<(String, Row)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            if self.block.is_none() {
                if line.starts_with(COPY_PREFIX) {
                    match parse_copy_header(&line) {
                        Ok((table, columns)) => {
                            let capture = self
                                .tables
                                .as_ref()
                                .map_or(true, |set| set.contains(&table));
                            self.block = Some(CopyBlock {
                                table,
                                columns,
                                capture,
                            });
                        }
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
                continue;
            }

            // Inside a COPY block.
            if line.starts_with("\\.") {
                self.block = None;
                continue;
            }
            let Some(block) = self.block.as_ref() else {
                continue;
            };
            if !block.capture {
                continue;
            }
            match Self::decode_row(block, &line) {
                Ok(pair) => return Some(Ok(pair)),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Convenience constructor for the table sets the plan builder passes use.
pub fn table_set(names: &[&str]) -> HashSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}
