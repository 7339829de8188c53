//! Filter expressions understood by the in-memory backend.
//!
//! Grammar: one or more clauses joined by `and`, where a clause is
//! `<path> exists`, `<path> contains "<text>"` or `<path> == "<text>"`.
//! Paths are dot-separated (`fb.parent.author.gender`). Matching of
//! `contains` is case-insensitive.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Expression has no clauses
    Empty,
    /// Quoted string is not terminated
    UnterminatedString(usize),
    /// Unexpected token at the given clause position
    UnexpectedToken { token: String, expected: String },
    /// Expression ended in the middle of a clause
    UnexpectedEnd { expected: String },
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::Empty => write!(f, "Empty filter expression"),
            FilterError::UnterminatedString(pos) => {
                write!(f, "Unterminated string starting at offset {}", pos)
            }
            FilterError::UnexpectedToken { token, expected } => {
                write!(f, "Unexpected token '{}', expected {}", token, expected)
            }
            FilterError::UnexpectedEnd { expected } => {
                write!(f, "Unexpected end of filter, expected {}", expected)
            }
        }
    }
}

impl std::error::Error for FilterError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
}

impl Token {
    fn text(&self) -> &str {
        match self {
            Token::Word(s) | Token::Quoted(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Clause {
    Exists(String),
    Contains(String, String),
    Equals(String, String),
}

/// Parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                match c {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            text.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => text.push(other),
                }
            }
            if !closed {
                return Err(FilterError::UnterminatedString(start));
            }
            tokens.push(Token::Quoted(text));
        } else {
            let mut word = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_whitespace() || c == '"' {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }

    Ok(tokens)
}

fn expect_value(tokens: &mut std::slice::Iter<'_, Token>) -> Result<String, FilterError> {
    match tokens.next() {
        Some(Token::Quoted(text)) => Ok(text.clone()),
        Some(other) => Err(FilterError::UnexpectedToken {
            token: other.text().to_string(),
            expected: "quoted string".to_string(),
        }),
        None => Err(FilterError::UnexpectedEnd {
            expected: "quoted string".to_string(),
        }),
    }
}

impl Filter {
    pub fn parse(expr: &str) -> Result<Self, FilterError> {
        let tokens = tokenize(expr)?;
        let mut iter = tokens.iter();
        let mut clauses = Vec::new();

        loop {
            let path = match iter.next() {
                Some(Token::Word(path)) => path.clone(),
                Some(other) => {
                    return Err(FilterError::UnexpectedToken {
                        token: other.text().to_string(),
                        expected: "field path".to_string(),
                    })
                }
                None if clauses.is_empty() => return Err(FilterError::Empty),
                None => {
                    return Err(FilterError::UnexpectedEnd {
                        expected: "field path".to_string(),
                    })
                }
            };

            let operator = iter.next().ok_or_else(|| FilterError::UnexpectedEnd {
                expected: "operator".to_string(),
            })?;
            let clause = match operator {
                Token::Word(op) if op.eq_ignore_ascii_case("exists") => Clause::Exists(path),
                Token::Word(op) if op.eq_ignore_ascii_case("contains") => {
                    Clause::Contains(path, expect_value(&mut iter)?.to_lowercase())
                }
                Token::Word(op) if op == "==" => Clause::Equals(path, expect_value(&mut iter)?),
                other => {
                    return Err(FilterError::UnexpectedToken {
                        token: other.text().to_string(),
                        expected: "exists, contains or ==".to_string(),
                    })
                }
            };
            clauses.push(clause);

            match iter.next() {
                None => break,
                Some(Token::Word(word)) if word.eq_ignore_ascii_case("and") => continue,
                Some(other) => {
                    return Err(FilterError::UnexpectedToken {
                        token: other.text().to_string(),
                        expected: "and".to_string(),
                    })
                }
            }
        }

        Ok(Filter { clauses })
    }

    /// Evaluates the filter against a document's fields.
    pub fn matches(&self, fields: &Value) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Exists(path) => lookup(fields, path).map_or(false, |v| !v.is_null()),
            Clause::Contains(path, needle) => lookup(fields, path)
                .map_or(false, |v| value_contains(v, needle)),
            Clause::Equals(path, expected) => lookup(fields, path)
                .and_then(scalar_text)
                .map_or(false, |text| text == *expected),
        })
    }
}

/// Resolves a dot-separated path inside a JSON document.
pub fn lookup<'a>(fields: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(fields, |current, segment| current.get(segment))
}

/// Text of a scalar JSON value; `None` for null, arrays and objects.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|item| value_contains(item, needle)),
        other => scalar_text(other).map_or(false, |text| text.to_lowercase().contains(needle)),
    }
}
