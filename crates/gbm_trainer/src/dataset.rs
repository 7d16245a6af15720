//! CSV table loading
//!
//! Reads comma-separated numeric rows into memory. The first line is a
//! header and is always skipped. Each token is read from its longest numeric
//! prefix after leading whitespace, so `1.5abc` reads as `1.5`. Tokens with
//! no numeric prefix, or whose value overflows `f64`, become `0.0`; a
//! malformed token never fails the row or the load. A single trailing comma
//! ends the row without adding an empty field. Rows are not checked for
//! uniform length here.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use crate::errors::{Result, TrainerError};

/// One CSV row: element 0 is the label, the rest are features
pub type Row = Vec<f64>;

/// Rows in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub rows: Vec<Row>,
    /// Tokens that failed to parse and were replaced by `0.0`
    pub coerced_tokens: usize,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Value of the longest numeric prefix of `token`, after leading
/// whitespace. Accepts an optional sign, decimal digits with an optional
/// fraction and exponent, and `inf`/`infinity`/`nan` in any case. Hex
/// floats are not recognised. `None` when nothing numeric leads the token
/// or the value is out of `f64` range.
fn numeric_prefix(token: &str) -> Option<f64> {
    let s = token.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    let negative = match bytes.first() {
        Some(b'-') => {
            end = 1;
            true
        }
        Some(b'+') => {
            end = 1;
            false
        }
        _ => false,
    };

    let rest = &s[end..];
    let starts_with = |word: &str| {
        rest.get(..word.len())
            .map_or(false, |head| head.eq_ignore_ascii_case(word))
    };
    if starts_with("inf") {
        return Some(if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }
    if starts_with("nan") {
        return Some(f64::NAN);
    }

    let digits_from = |mut at: usize| {
        while bytes.get(at).map_or(false, u8::is_ascii_digit) {
            at += 1;
        }
        at
    };

    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - end - 1;
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return None;
    }
    let mantissa_nonzero = s[..end].bytes().any(|b| (b'1'..=b'9').contains(&b));

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut at = end + 1;
        if matches!(bytes.get(at), Some(b'+' | b'-')) {
            at += 1;
        }
        let exp_end = digits_from(at);
        if exp_end > at {
            end = exp_end;
        }
    }

    let value = s[..end].parse::<f64>().ok()?;
    if value.is_infinite() || value.is_subnormal() || (value == 0.0 && mantissa_nonzero) {
        return None;
    }
    Some(value)
}

/// Read a table from any buffered reader.
pub fn read_table<R: BufRead>(reader: R) -> std::io::Result<Table> {
    let mut table = Table::default();

    for line in reader.lines().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let mut tokens: Vec<&str> = line.split(',').collect();
        if line.ends_with(',') {
            tokens.pop();
        }

        let row: Row = tokens
            .into_iter()
            .map(|token| {
                numeric_prefix(token).unwrap_or_else(|| {
                    table.coerced_tokens += 1;
                    0.0
                })
            })
            .collect();
        table.rows.push(row);
    }

    Ok(table)
}

/// Load a CSV file. The header line is skipped unconditionally.
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| TrainerError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let table = read_table(BufReader::new(file)).map_err(|source| TrainerError::Io {
        path: path.display().to_string(),
        source,
    })?;

    if table.coerced_tokens > 0 {
        warn!(
            "{} unparseable values in {} were read as 0",
            table.coerced_tokens,
            path.display()
        );
    }
    debug!("Read {} rows from {}", table.len(), path.display());

    Ok(table)
}
