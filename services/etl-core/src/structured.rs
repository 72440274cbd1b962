//! Total decoding of embedded map/list fields.
//!
//! Source documents mix already-decoded structures with stringified ones:
//! the same field may arrive as a native map, as JSON text, or as the
//! source system's single-quoted literal dialect. `expect_map` /
//! `expect_list` never fail the row and never hand back a structure of the
//! wrong kind — anything unusable collapses to the empty structure.

use serde_json::{Map, Value};
use tracing::warn;

/// Outcome of decoding a textual structural expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Map(Map<String, Value>),
    List(Vec<Value>),
    Empty,
    Malformed,
}

/// Decodes text as a structural literal: strict JSON first, then the
/// single-quoted dialect (`{'k': 'v'}`, `True`/`False`/`None`).
/// A scalar literal is not a structure and counts as malformed.
pub fn decode_literal(text: &str) -> Decoded {
    let t = text.trim();
    if t.is_empty() {
        return Decoded::Empty;
    }
    let parsed = serde_json::from_str::<Value>(t)
        .ok()
        .or_else(|| literal::parse(t));
    match parsed {
        Some(Value::Object(map)) => Decoded::Map(map),
        Some(Value::Array(list)) => Decoded::List(list),
        Some(_) | None => Decoded::Malformed,
    }
}

/// Resolves a map-typed field. Wrong-shaped decodes are rejected, not
/// coerced: a list where a map is expected yields the empty map.
pub fn expect_map(value: Option<&Value>, field: &str) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) => match decode_literal(s) {
            Decoded::Map(map) => map,
            Decoded::Empty => Map::new(),
            Decoded::List(_) | Decoded::Malformed => {
                warn!("Erro ao converter campo {field} para dict");
                Map::new()
            }
        },
        _ => Map::new(),
    }
}

/// Resolves a list-typed field; same policy as `expect_map`.
pub fn expect_list(value: Option<&Value>, field: &str) -> Vec<Value> {
    match value {
        Some(Value::Array(list)) => list.clone(),
        Some(Value::String(s)) => match decode_literal(s) {
            Decoded::List(list) => list,
            Decoded::Empty => Vec::new(),
            Decoded::Map(_) | Decoded::Malformed => {
                warn!("Erro ao converter campo {field} para lista");
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}

/// Recursive-descent parser for the source system's literal dialect.
/// Deliberately small: maps, lists, single- or double-quoted strings,
/// numbers, booleans and `None`. Anything else fails the whole decode.
mod literal {
    use serde_json::{Map, Number, Value};

    pub fn parse(text: &str) -> Option<Value> {
        let chars: Vec<char> = text.chars().collect();
        let mut p = Parser { chars, pos: 0 };
        p.skip_ws();
        let value = p.value()?;
        p.skip_ws();
        if p.pos == p.chars.len() {
            Some(value)
        } else {
            None
        }
    }

    struct Parser {
        chars: Vec<char>,
        pos: usize,
    }

    impl Parser {
        fn peek(&self) -> Option<char> {
            self.chars.get(self.pos).copied()
        }

        fn bump(&mut self) -> Option<char> {
            let c = self.peek()?;
            self.pos += 1;
            Some(c)
        }

        fn eat(&mut self, c: char) -> bool {
            if self.peek() == Some(c) {
                self.pos += 1;
                true
            } else {
                false
            }
        }

        fn skip_ws(&mut self) {
            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                self.pos += 1;
            }
        }

        fn value(&mut self) -> Option<Value> {
            match self.peek()? {
                '{' => self.map(),
                '[' => self.list(),
                '\'' | '"' => self.string().map(Value::String),
                c if c.is_alphabetic() => self.word(),
                _ => self.number(),
            }
        }

        fn map(&mut self) -> Option<Value> {
            self.bump();
            let mut out = Map::new();
            self.skip_ws();
            if self.eat('}') {
                return Some(Value::Object(out));
            }
            loop {
                self.skip_ws();
                let key = match self.peek()? {
                    '\'' | '"' => self.string()?,
                    _ => return None,
                };
                self.skip_ws();
                if !self.eat(':') {
                    return None;
                }
                self.skip_ws();
                let value = self.value()?;
                out.insert(key, value);
                self.skip_ws();
                if self.eat(',') {
                    continue;
                }
                if self.eat('}') {
                    return Some(Value::Object(out));
                }
                return None;
            }
        }

        fn list(&mut self) -> Option<Value> {
            self.bump();
            let mut out = Vec::new();
            self.skip_ws();
            if self.eat(']') {
                return Some(Value::Array(out));
            }
            loop {
                self.skip_ws();
                out.push(self.value()?);
                self.skip_ws();
                if self.eat(',') {
                    continue;
                }
                if self.eat(']') {
                    return Some(Value::Array(out));
                }
                return None;
            }
        }

        fn string(&mut self) -> Option<String> {
            let quote = self.bump()?;
            let mut out = String::new();
            loop {
                match self.bump()? {
                    '\\' => {
                        let escaped = self.bump()?;
                        out.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            other => other,
                        });
                    }
                    c if c == quote => return Some(out),
                    c => out.push(c),
                }
            }
        }

        fn word(&mut self) -> Option<Value> {
            let start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_alphabetic()) {
                self.pos += 1;
            }
            let word: String = self.chars[start..self.pos].iter().collect();
            match word.as_str() {
                "True" | "true" => Some(Value::Bool(true)),
                "False" | "false" => Some(Value::Bool(false)),
                "None" | "null" => Some(Value::Null),
                _ => None,
            }
        }

        fn number(&mut self) -> Option<Value> {
            let start = self.pos;
            if matches!(self.peek(), Some('+' | '-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
            {
                self.pos += 1;
            }
            let text: String = self.chars[start..self.pos].iter().collect();
            if let Ok(i) = text.parse::<i64>() {
                return Some(Value::Number(i.into()));
            }
            text.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
