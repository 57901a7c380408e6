//! Named placeholder binding
//!
//! SQL is authored with `@name` placeholders. [`bind`] rewrites them into the
//! target dialect's style and collects the matching values in bind order.
//! Text inside quotes and comments is copied through untouched, `@@name`
//! (server variables) is left alone, and the literal `<DBLINK>` token becomes
//! `@` after translation so Oracle database links survive.

use super::dialect::{Dialect, PlaceholderStyle};
use super::error::{DatabaseError, Result};
use super::parameter::Parameter;
use super::value::DatabaseValue;

const DBLINK_TOKEN: &str = "<DBLINK>";

/// SQL rendered for a dialect together with its bind values
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSql {
    pub sql: String,
    /// Parameter name for each entry of `values`
    pub names: Vec<String>,
    pub values: Vec<DatabaseValue>,
}

#[derive(Clone, Copy)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
}

/// Render `sql` for `dialect`, resolving every `@name` against `params`.
///
/// Names match case-insensitively. A placeholder with no parameter is a
/// `MissingParameter` error; one matched by two parameters is a
/// `DuplicateParameter` error. Named and numbered styles bind each distinct name
/// once in first-use order; the positional style binds once per occurrence.
pub fn bind(sql: &str, params: &[Parameter], dialect: Dialect) -> Result<BoundSql> {
    let style = dialect.placeholder_style();
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut names: Vec<String> = Vec::new();
    let mut values: Vec<DatabaseValue> = Vec::new();
    let mut state = State::Normal;
    let mut last = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'<' if sql[idx..].starts_with(DBLINK_TOKEN) => {
                    out.push_str(&sql[last..idx]);
                    out.push('@');
                    idx += DBLINK_TOKEN.len();
                    last = idx;
                    continue;
                }
                b'@' if bytes.get(idx + 1) == Some(&b'@') => {
                    idx = scan_identifier(bytes, idx + 2);
                    continue;
                }
                b'@' => {
                    let end = scan_identifier(bytes, idx + 1);
                    if end == idx + 1 {
                        idx += 1;
                        continue;
                    }
                    let name = &sql[idx + 1..end];
                    let mut matches = params.iter().filter(|p| p.name().eq_ignore_ascii_case(name));
                    let param = matches
                        .next()
                        .ok_or_else(|| DatabaseError::MissingParameter(name.to_string()))?;
                    if matches.next().is_some() {
                        return Err(DatabaseError::DuplicateParameter(name.to_string()));
                    }

                    out.push_str(&sql[last..idx]);
                    render(&mut out, style, param, &mut names, &mut values);
                    idx = end;
                    last = end;
                    continue;
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
        }
        idx += 1;
    }

    out.push_str(&sql[last..]);
    Ok(BoundSql { sql: out, names, values })
}

fn render(
    out: &mut String,
    style: PlaceholderStyle,
    param: &Parameter,
    names: &mut Vec<String>,
    values: &mut Vec<DatabaseValue>,
) {
    match style {
        PlaceholderStyle::Positional => {
            out.push('?');
            names.push(param.name().to_string());
            values.push(param.value().clone());
        }
        PlaceholderStyle::Named(prefix) => {
            out.push(prefix);
            out.push_str(param.name());
            slot_for(param, names, values);
        }
        PlaceholderStyle::Numbered(prefix) => {
            let slot = slot_for(param, names, values);
            out.push(prefix);
            out.push_str(&(slot + 1).to_string());
        }
    }
}

/// Index of the parameter in the bind list, adding it on first use
fn slot_for(param: &Parameter, names: &mut Vec<String>, values: &mut Vec<DatabaseValue>) -> usize {
    match names.iter().position(|n| n == param.name()) {
        Some(slot) => slot,
        None => {
            names.push(param.name().to_string());
            values.push(param.value().clone());
            names.len() - 1
        }
    }
}

fn scan_identifier(bytes: &[u8], start: usize) -> usize {
    let mut idx = start;
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    idx
}
