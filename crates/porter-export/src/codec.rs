//! Value escaping for the export text format
//!
//! Strings are quoted and every escape, delimiter, newline and quote character
//! inside them is prefixed with the escape character. Numbers are written bare,
//! NULL is the two character sentinel `\N`, which no quoted or numeric value can
//! ever equal.

use crate::value::Value;
use std::fmt::Write as _;
use thiserror::Error;

pub const COMMENT: &str = "//";
pub const DELIM: char = ',';
pub const ESCAPE: char = '\\';
pub const NEWLINE: char = '\n';
pub const QUOTE: char = '"';
pub const NULL: &str = "\\N";

/// Error raised while parsing a serialized record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unterminated quoted value at offset {0}")]
    UnterminatedQuote(usize),

    #[error("dangling escape character at offset {0}")]
    DanglingEscape(usize),

    #[error("unexpected character {found:?} after quoted value at offset {offset}")]
    TrailingGarbage { found: char, offset: usize },
}

fn needs_escape(c: char) -> bool {
    matches!(c, ESCAPE | DELIM | NEWLINE | QUOTE)
}

/// Escape a string body (without the surrounding quotes).
///
/// Equivalent to replacing escape, delimiter, newline and quote in that order,
/// each by escape + itself. Escape has to go first or the escapes added for the
/// other characters would be doubled.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    for c in input.chars() {
        if needs_escape(c) {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Reverse of [`escape`]: every escape character is dropped and the character
/// after it taken literally.
pub fn unescape(input: &str) -> Result<String, CodecError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices();
    while let Some((offset, c)) = chars.next() {
        if c == ESCAPE {
            match chars.next() {
                Some((_, next)) => out.push(next),
                None => return Err(CodecError::DanglingEscape(offset)),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Render one value in its serialized form.
///
/// Precedence: NULL, numeric, string, boolean. Anything else (blobs, non-finite
/// reals) degrades to the NULL sentinel so the stream is never corrupted.
///
/// Text that reads as a number (see [`is_numeric`]) counts as numeric and is
/// written bare, as the importer expects from database drivers that hand back
/// every column as a string.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => NULL.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) if r.is_finite() => r.to_string(),
        Value::Text(s) if is_numeric(s) => s.clone(),
        Value::Text(s) => {
            let mut out = String::with_capacity(s.len() + 2);
            out.push(QUOTE);
            out.push_str(&escape(s));
            out.push(QUOTE);
            out
        },
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Real(_) | Value::Blob(_) => NULL.to_string(),
    }
}

/// Decimal number syntax: optional sign, digits with an optional fraction,
/// optional exponent. Surrounding whitespace is not accepted.
pub fn is_numeric(text: &str) -> bool {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(i) => (&body[..i], Some(&body[i + 1..])),
        None => (body, None),
    };

    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int.len() + frac.len() == 0 || !all_digits(int) || !all_digits(frac) {
        return false;
    }

    match exponent {
        None => true,
        Some(exp) => {
            let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            !digits.is_empty() && all_digits(digits)
        },
    }
}

/// Render a full record line (without the trailing newline).
pub fn format_record<'a>(values: impl IntoIterator<Item = &'a Value>) -> String {
    let mut line = String::new();
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            line.push(DELIM);
        }
        line.push_str(&format_value(value));
    }
    line
}

/// Render an audit comment; embedded newlines continue on new comment lines.
pub fn format_comment(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 4);
    let _ = write!(out, "{} ", COMMENT);
    for (i, line) in message.split(NEWLINE).enumerate() {
        if i > 0 {
            let _ = write!(out, "{}{} ", NEWLINE, COMMENT);
        }
        out.push_str(line);
    }
    out
}

/// One parsed field of a serialized record
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    /// Unquoted text, normally a number
    Bare(String),
    /// Quoted string, already unescaped
    Quoted(String),
}

impl Field {
    /// Best-effort conversion back into a [`Value`]
    pub fn to_value(&self) -> Value {
        match self {
            Field::Null => Value::Null,
            Field::Quoted(s) => Value::Text(s.clone()),
            Field::Bare(s) => {
                if let Ok(i) = s.parse::<i64>() {
                    Value::Integer(i)
                } else if let Ok(r) = s.parse::<f64>() {
                    Value::Real(r)
                } else {
                    Value::Text(s.clone())
                }
            },
        }
    }
}

/// Parse one record from the front of `input`.
///
/// Returns the fields and the remaining input after the record's terminating
/// newline. A newline inside a quoted value is part of the value only when it
/// is escaped, which is what the writer always produces.
pub fn parse_record(input: &str) -> Result<(Vec<Field>, &str), CodecError> {
    let mut fields = Vec::new();
    let mut pos = 0;
    let bytes = input.as_bytes();

    loop {
        if bytes.get(pos) == Some(&(QUOTE as u8)) {
            let start = pos + 1;
            let mut end = start;
            let mut escaped = false;
            loop {
                match bytes.get(end) {
                    None => return Err(CodecError::UnterminatedQuote(pos)),
                    Some(_) if escaped => escaped = false,
                    Some(&b) if b == ESCAPE as u8 => escaped = true,
                    Some(&b) if b == QUOTE as u8 => break,
                    Some(_) => {},
                }
                end += 1;
            }
            fields.push(Field::Quoted(unescape(&input[start..end])?));
            pos = end + 1;
        } else {
            let end = input[pos..]
                .find([DELIM, NEWLINE])
                .map_or(input.len(), |i| pos + i);
            let raw = &input[pos..end];
            fields.push(if raw == NULL {
                Field::Null
            } else {
                Field::Bare(raw.to_string())
            });
            pos = end;
        }

        match input[pos..].chars().next() {
            Some(DELIM) => pos += 1,
            Some(NEWLINE) => return Ok((fields, &input[pos + 1..])),
            None => return Ok((fields, "")),
            Some(found) => return Err(CodecError::TrailingGarbage { found, offset: pos }),
        }
    }
}
