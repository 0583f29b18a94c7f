// Model reply -> tagged result. Past this module nobody looks at string prefixes.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Prefix the prompt asks the model to use when it cannot find a statblock.
pub const ERROR_SENTINEL: &str = "error:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExtractionReply {
    Record(Vec<String>),
    Failure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyParseError {
    #[error("reply is empty")]
    Empty,
    #[error("unterminated quoted field starting at {0}")]
    UnterminatedQuote(Position),
    #[error("bare quote in unquoted field at {0}")]
    BareQuote(Position),
    #[error("unexpected {found:?} after closing quote at {at}")]
    TextAfterQuote { found: char, at: Position },
    #[error("expected a single record, found {0}")]
    MultipleRecords(usize),
}

pub fn parse(raw: &str) -> Result<ExtractionReply, ReplyParseError> {
    if let Some(reason) = raw.strip_prefix(ERROR_SENTINEL) {
        return Ok(ExtractionReply::Failure(reason.to_string()));
    }

    // same leniency as records: a fenced or padded refusal is still a refusal
    let body = strip_code_fence(raw);
    if let Some(reason) = body.strip_prefix(ERROR_SENTINEL) {
        return Ok(ExtractionReply::Failure(reason.to_string()));
    }

    let mut records = parse_records(body)?;
    match records.len() {
        0 => Err(ReplyParseError::Empty),
        1 => Ok(ExtractionReply::Record(records.remove(0))),
        n => Err(ReplyParseError::MultipleRecords(n)),
    }
}

/// Vision models like to wrap CSV in a ```csv fence.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else { return trimmed };
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => return trimmed,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    AfterQuote,
}

/// RFC 4180 records. Quoted fields may hold commas, newlines and `""`;
/// unquoted fields may not hold `"`. Lines holding only spaces or tabs are
/// skipped. Spaces before an opening quote and after a closing quote are ignored.
pub fn parse_records(input: &str) -> Result<Vec<Vec<String>>, ReplyParseError> {
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut pending_ws = String::new();
    let mut state = State::FieldStart;
    let mut touched = false;

    let mut pos = Position { line: 1, column: 0 };
    let mut quote_start = pos;

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        pos.column += 1;
        let newline = match c {
            '\n' => true,
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                true
            }
            _ => false,
        };

        match state {
            State::FieldStart => {
                if newline {
                    if touched {
                        field.push_str(&pending_ws);
                        record.push(std::mem::take(&mut field));
                        records.push(std::mem::take(&mut record));
                    }
                    pending_ws.clear();
                    touched = false;
                } else if c == ' ' || c == '\t' {
                    pending_ws.push(c);
                } else {
                    touched = true;
                    match c {
                        '"' => {
                            pending_ws.clear();
                            quote_start = pos;
                            state = State::Quoted;
                        }
                        ',' => {
                            field.push_str(&pending_ws);
                            pending_ws.clear();
                            record.push(std::mem::take(&mut field));
                        }
                        _ => {
                            field.push_str(&pending_ws);
                            pending_ws.clear();
                            field.push(c);
                            state = State::Unquoted;
                        }
                    }
                }
            }
            State::Unquoted => {
                if newline {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                    touched = false;
                    state = State::FieldStart;
                } else {
                    match c {
                        ',' => {
                            record.push(std::mem::take(&mut field));
                            state = State::FieldStart;
                        }
                        '"' => return Err(ReplyParseError::BareQuote(pos)),
                        _ => field.push(c),
                    }
                }
            }
            State::Quoted => {
                if newline {
                    field.push('\n');
                } else if c == '"' {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        pos.column += 1;
                        field.push('"');
                    } else {
                        state = State::AfterQuote;
                    }
                } else {
                    field.push(c);
                }
            }
            State::AfterQuote => {
                if newline {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                    touched = false;
                    state = State::FieldStart;
                } else {
                    match c {
                        ',' => {
                            record.push(std::mem::take(&mut field));
                            state = State::FieldStart;
                        }
                        ' ' | '\t' => {}
                        found => return Err(ReplyParseError::TextAfterQuote { found, at: pos }),
                    }
                }
            }
        }

        if newline {
            pos.line += 1;
            pos.column = 0;
        }
    }

    match state {
        State::Quoted => return Err(ReplyParseError::UnterminatedQuote(quote_start)),
        State::FieldStart if !touched => {}
        _ => {
            field.push_str(&pending_ws);
            record.push(field);
            records.push(record);
        }
    }

    Ok(records)
}
