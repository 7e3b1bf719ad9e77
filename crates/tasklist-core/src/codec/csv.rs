//! Three-column CSV: `title,detail,checked`.
//!
//! Quoted fields use doubled quotes for a literal quote. Unquoted `true`
//! and `false` are booleans. A quoted field may span several lines; a
//! quote left open at end of input skips that one record.

use std::fmt;

use tracing::{debug, warn};

use super::{Decoded, ImportError};
use crate::task::Todo;

pub const HEADER: &str = "title,detail,checked";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Quoted(String),
    Bare(String),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    /// Something other than a separator followed a closing quote.
    TextAfterQuote { column: usize },
    /// A quote appeared inside an unquoted field.
    StrayQuote { column: usize },
    UnterminatedQuote,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextAfterQuote { column } => {
                write!(f, "unexpected text after closing quote at column {column}")
            }
            Self::StrayQuote { column } => {
                write!(f, "quote inside unquoted field at column {column}")
            }
            Self::UnterminatedQuote => f.write_str("unterminated quoted field"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    InQuoted,
    QuoteInQuoted,
    InUnquoted,
    FieldEnd,
}

pub fn tokenize_record(record: &str) -> Result<Vec<Token>, LineError> {
    let mut tokens = Vec::new();
    let mut buf = String::new();
    let mut state = State::FieldStart;

    for (idx, ch) in record.chars().enumerate() {
        let column = idx + 1;
        state = match (state, ch) {
            (State::FieldStart, ' ' | '\t') => State::FieldStart,
            (State::FieldStart, '"') => State::InQuoted,
            (State::FieldStart, ',') => {
                tokens.push(bare_token(&mut buf));
                State::FieldStart
            }
            (State::FieldStart, other) => {
                buf.push(other);
                State::InUnquoted
            }

            (State::InQuoted, '"') => State::QuoteInQuoted,
            (State::InQuoted, other) => {
                buf.push(other);
                State::InQuoted
            }

            (State::QuoteInQuoted, '"') => {
                buf.push('"');
                State::InQuoted
            }
            (State::QuoteInQuoted, ',') => {
                tokens.push(Token::Quoted(std::mem::take(&mut buf)));
                State::FieldStart
            }
            (State::QuoteInQuoted, ' ' | '\t') => {
                tokens.push(Token::Quoted(std::mem::take(&mut buf)));
                State::FieldEnd
            }
            (State::QuoteInQuoted, _) => return Err(LineError::TextAfterQuote { column }),

            (State::InUnquoted, ',') => {
                tokens.push(bare_token(&mut buf));
                State::FieldStart
            }
            (State::InUnquoted, '"') => return Err(LineError::StrayQuote { column }),
            (State::InUnquoted, other) => {
                buf.push(other);
                State::InUnquoted
            }

            (State::FieldEnd, ' ' | '\t') => State::FieldEnd,
            (State::FieldEnd, ',') => State::FieldStart,
            (State::FieldEnd, _) => return Err(LineError::TextAfterQuote { column }),
        };
    }

    match state {
        State::FieldStart | State::InUnquoted => tokens.push(bare_token(&mut buf)),
        State::QuoteInQuoted => tokens.push(Token::Quoted(buf)),
        State::InQuoted => return Err(LineError::UnterminatedQuote),
        State::FieldEnd => {}
    }

    Ok(tokens)
}

fn bare_token(buf: &mut String) -> Token {
    let raw = std::mem::take(buf);
    match raw.trim() {
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        text => Token::Bare(text.to_string()),
    }
}

fn text_of(token: &Token) -> Option<&str> {
    match token {
        Token::Quoted(text) | Token::Bare(text) => Some(text.as_str()),
        Token::Bool(_) => None,
    }
}

/// Title must be non-blank text, detail text (empty means absent),
/// checked a bare boolean.
pub fn row_to_todo(tokens: &[Token]) -> Option<Todo> {
    let [title, detail, checked] = tokens else {
        return None;
    };
    let title = text_of(title).filter(|t| !t.trim().is_empty())?;
    let detail = text_of(detail)?;
    let Token::Bool(checked) = checked else {
        return None;
    };

    let mut todo = Todo::new(title.to_string());
    todo.detail = (!detail.is_empty()).then(|| detail.to_string());
    todo.checked = *checked;
    Some(todo)
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

pub fn encode(todos: &[Todo]) -> String {
    let mut out = String::with_capacity(HEADER.len() + todos.len() * 32);
    out.push_str(HEADER);
    out.push('\n');
    for todo in todos {
        out.push_str(&format!(
            "{},{},{}\n",
            quote(&todo.title),
            quote(todo.detail_text()),
            todo.checked
        ));
    }
    out
}

#[tracing::instrument(skip(text))]
pub fn decode(text: &str) -> Result<Decoded, ImportError> {
    let mut lines = text.lines();
    let header = lines
        .next()
        .map(|line| line.trim_start_matches('\u{feff}').trim_end_matches('\r'))
        .unwrap_or_default();
    if header != HEADER {
        return Err(ImportError::CsvHeader {
            found: header.to_string(),
        });
    }

    let mut decoded = Decoded::default();
    // Physical lines are joined while a quoted field is still open.
    let mut open: Option<(usize, String)> = None;
    for (offset, raw) in lines.enumerate() {
        let line = raw.trim_end_matches('\r');
        let (line_no, record) = match open.take() {
            Some((start, mut record)) => {
                record.push('\n');
                record.push_str(line);
                (start, record)
            }
            None if line.trim().is_empty() => continue,
            None => (offset + 2, line.to_string()),
        };

        match tokenize_record(&record) {
            Err(LineError::UnterminatedQuote) => open = Some((line_no, record)),
            result => take_row(&mut decoded, line_no, result),
        }
    }
    if let Some((line_no, _)) = open {
        warn!(line = line_no, "skipping csv record with unterminated quote");
        decoded.skipped += 1;
    }

    Ok(decoded)
}

fn take_row(decoded: &mut Decoded, line_no: usize, result: Result<Vec<Token>, LineError>) {
    let tokens = match result {
        Ok(tokens) => tokens,
        Err(err) => {
            warn!(line = line_no, error = %err, "skipping malformed csv line");
            decoded.skipped += 1;
            return;
        }
    };
    if tokens.len() != 3 {
        warn!(line = line_no, fields = tokens.len(), "skipping csv line without 3 fields");
        decoded.skipped += 1;
        return;
    }

    match row_to_todo(&tokens) {
        Some(todo) => decoded.candidates.push(todo),
        None => {
            debug!(line = line_no, "csv row failed shape check");
            decoded.dropped += 1;
        }
    }
}
