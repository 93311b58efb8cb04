//! Incremental JSON tokenizer for response bodies.
//!
//! Burrow responses are small and fully buffered before parsing, but they
//! are consumed as a stream of structural events so the per-command folds
//! in [`super::response`] can emit each element's callback the moment its
//! object closes, without an intermediate document tree.

use std::fmt;

/// One structural event pulled from the input.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Event {
    ArrayBegin,
    ArrayEnd,
    ObjectBegin,
    ObjectEnd,
    /// An object member name. The following event is its value.
    Key(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// A syntax error, with the byte offset it was detected at.
#[derive(Debug)]
pub(crate) struct ParseError {
    pub at: usize,
    pub what: &'static str,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.what, self.at)
    }
}

type ParseResult<T> = std::result::Result<T, ParseError>;

#[derive(Clone, Copy, Eq, PartialEq)]
enum Scope {
    /// `first` is true until the scope holds at least one element.
    Array { first: bool },
    Object { first: bool },
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum Mode {
    /// Expecting a value (document start, after `[`, `,`, or `:`).
    Value,
    /// Expecting a member name or `}`.
    Entry,
    /// Expecting `,` or the closer of the enclosing scope.
    AfterValue,
    /// Document complete; only trailing whitespace is legal.
    End,
}

/// Pull-tokenizer over one response body.
pub(crate) struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
    stack: Vec<Scope>,
    mode: Mode,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Tokenizer { input, pos: 0, stack: Vec::new(), mode: Mode::Value }
    }

    /// Pulls the next event, `Ok(None)` at a clean end of document.
    pub fn next_event(&mut self) -> ParseResult<Option<Event>> {
        self.skip_whitespace();
        match self.mode {
            Mode::Value => self.value().map(Some),
            Mode::Entry => self.entry().map(Some),
            Mode::AfterValue => self.after_value().map(Some),
            Mode::End => match self.peek() {
                None => Ok(None),
                Some(_) => Err(self.error("trailing characters")),
            },
        }
    }

    fn value(&mut self) -> ParseResult<Event> {
        match self.peek() {
            Some(b'[') => {
                self.pos += 1;
                self.stack.push(Scope::Array { first: true });
                Ok(Event::ArrayBegin)
            },
            Some(b']') => {
                // Only an immediate close of a fresh array: "[]".
                if self.stack.pop() == Some(Scope::Array { first: true }) {
                    self.pos += 1;
                    self.mode = self.landing_mode();
                    Ok(Event::ArrayEnd)
                } else {
                    Err(self.error("unexpected ']'"))
                }
            },
            Some(b'{') => {
                self.pos += 1;
                self.stack.push(Scope::Object { first: true });
                self.mode = Mode::Entry;
                Ok(Event::ObjectBegin)
            },
            Some(b'"') => {
                let s = self.string()?;
                self.mode = self.landing_mode();
                Ok(Event::Str(s))
            },
            Some(b'-' | b'0'..=b'9') => {
                let event = self.number()?;
                self.mode = self.landing_mode();
                Ok(event)
            },
            Some(b't') => {
                self.literal(b"true")?;
                self.mode = self.landing_mode();
                Ok(Event::Bool(true))
            },
            Some(b'f') => {
                self.literal(b"false")?;
                self.mode = self.landing_mode();
                Ok(Event::Bool(false))
            },
            Some(b'n') => {
                self.literal(b"null")?;
                self.mode = self.landing_mode();
                Ok(Event::Null)
            },
            Some(_) => Err(self.error("expected a value")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn entry(&mut self) -> ParseResult<Event> {
        match self.peek() {
            Some(b'}') => {
                match self.stack.pop() {
                    // A comma promised another member; "{," and "{...,}"
                    // are both malformed.
                    Some(Scope::Object { first: true }) => {},
                    _ => return Err(self.error("unexpected '}'")),
                }
                self.pos += 1;
                self.mode = self.landing_mode();
                Ok(Event::ObjectEnd)
            },
            Some(b'"') => {
                let key = self.string()?;
                self.skip_whitespace();
                if self.peek() != Some(b':') {
                    return Err(self.error("expected ':' after member name"));
                }
                self.pos += 1;
                self.mode = Mode::Value;
                Ok(Event::Key(key))
            },
            Some(_) => Err(self.error("expected a member name")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn after_value(&mut self) -> ParseResult<Event> {
        match (self.stack.last().copied(), self.peek()) {
            (Some(Scope::Array { .. }), Some(b',')) => {
                self.pos += 1;
                self.mark_nonempty();
                self.mode = Mode::Value;
                // The comma itself makes no event; recurse for the value.
                self.skip_whitespace();
                if self.peek() == Some(b']') {
                    return Err(self.error("trailing comma"));
                }
                self.value()
            },
            (Some(Scope::Array { .. }), Some(b']')) => {
                self.pos += 1;
                self.stack.pop();
                self.mode = self.landing_mode();
                Ok(Event::ArrayEnd)
            },
            (Some(Scope::Object { .. }), Some(b',')) => {
                self.pos += 1;
                self.mode = Mode::Entry;
                self.skip_whitespace();
                self.entry().and_then(|event| match event {
                    Event::ObjectEnd => Err(self.error("trailing comma")),
                    other => Ok(other),
                })
            },
            (Some(Scope::Object { .. }), Some(b'}')) => {
                self.pos += 1;
                self.stack.pop();
                self.mode = self.landing_mode();
                Ok(Event::ObjectEnd)
            },
            (_, None) => Err(self.error("unexpected end of input")),
            _ => Err(self.error("expected ',' or a closing bracket")),
        }
    }

    /// Where parsing continues once a value or closer has been consumed.
    fn landing_mode(&self) -> Mode {
        if self.stack.is_empty() {
            Mode::End
        } else {
            Mode::AfterValue
        }
    }

    fn mark_nonempty(&mut self) {
        if let Some(scope) = self.stack.last_mut() {
            *scope = match *scope {
                Scope::Array { .. } => Scope::Array { first: false },
                Scope::Object { .. } => Scope::Object { first: false },
            };
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn error(&self, what: &'static str) -> ParseError {
        ParseError { at: self.pos, what }
    }

    fn literal(&mut self, word: &'static [u8]) -> ParseResult<()> {
        if self.input[self.pos..].starts_with(word) {
            self.pos += word.len();
            Ok(())
        } else {
            Err(self.error("malformed literal"))
        }
    }

    fn string(&mut self) -> ParseResult<String> {
        debug_assert_eq!(self.peek(), Some(b'"'));
        self.pos += 1;

        let mut out: Vec<u8> = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some(b'"') => {
                    self.pos += 1;
                    return String::from_utf8(out)
                        .map_err(|_| self.error("invalid utf-8 in string"));
                },
                Some(b'\\') => {
                    self.pos += 1;
                    self.escape(&mut out)?;
                },
                Some(c) if c < 0x20 => {
                    return Err(self.error("control character in string"));
                },
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                },
            }
        }
    }

    fn escape(&mut self, out: &mut Vec<u8>) -> ParseResult<()> {
        let c = self.peek().ok_or(self.error("unterminated escape"))?;
        self.pos += 1;
        match c {
            b'"' => out.push(b'"'),
            b'\\' => out.push(b'\\'),
            b'/' => out.push(b'/'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'u' => {
                let unit = self.hex4()?;
                let ch = match unit {
                    // High surrogate: a low surrogate must follow.
                    0xd800..=0xdbff => {
                        if self.peek() != Some(b'\\') {
                            return Err(self.error("lone surrogate"));
                        }
                        self.pos += 1;
                        if self.peek() != Some(b'u') {
                            return Err(self.error("lone surrogate"));
                        }
                        self.pos += 1;
                        let low = self.hex4()?;
                        if !(0xdc00..=0xdfff).contains(&low) {
                            return Err(self.error("lone surrogate"));
                        }
                        let code = 0x10000
                            + ((u32::from(unit) - 0xd800) << 10)
                            + (u32::from(low) - 0xdc00);
                        char::from_u32(code)
                            .ok_or(self.error("invalid code point"))?
                    },
                    0xdc00..=0xdfff => {
                        return Err(self.error("lone surrogate"));
                    },
                    _ => char::from_u32(u32::from(unit))
                        .ok_or(self.error("invalid code point"))?,
                };
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            },
            _ => return Err(self.error("unknown escape")),
        }
        Ok(())
    }

    fn hex4(&mut self) -> ParseResult<u16> {
        let end = self.pos + 4;
        let digits = self
            .input
            .get(self.pos..end)
            .ok_or(self.error("truncated unicode escape"))?;
        let s = std::str::from_utf8(digits)
            .map_err(|_| self.error("malformed unicode escape"))?;
        let unit = u16::from_str_radix(s, 16)
            .map_err(|_| self.error("malformed unicode escape"))?;
        self.pos = end;
        Ok(unit)
    }

    fn number(&mut self) -> ParseResult<Event> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.pos == start
            || (self.pos == start + 1 && self.input[start] == b'-')
        {
            return Err(self.error("malformed number"));
        }

        let mut fractional = false;
        if self.peek() == Some(b'.') {
            fractional = true;
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            fractional = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }

        // Panic safety: everything consumed above is ASCII.
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap();
        if fractional {
            text.parse::<f64>()
                .map(Event::Float)
                .map_err(|_| self.error("malformed number"))
        } else {
            match text.parse::<i64>() {
                Ok(n) => Ok(Event::Int(n)),
                // Magnitude overflow; keep the value, lose precision.
                Err(_) => text
                    .parse::<f64>()
                    .map(Event::Float)
                    .map_err(|_| self.error("malformed number")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(input: &str) -> Vec<Event> {
        let mut tok = Tokenizer::new(input.as_bytes());
        let mut out = Vec::new();
        while let Some(event) = tok.next_event().unwrap() {
            out.push(event);
        }
        out
    }

    fn error_of(input: &str) -> ParseError {
        let mut tok = Tokenizer::new(input.as_bytes());
        loop {
            match tok.next_event() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("parsed cleanly: {input}"),
                Err(e) => return e,
            }
        }
    }

    #[test]
    fn message_array() {
        use Event::*;
        assert_eq!(
            events(
                r#"[{"id": "m1", "body": "hello", "ttl": 100, "hide": 0}]"#
            ),
            vec![
                ArrayBegin,
                ObjectBegin,
                Key("id".into()),
                Str("m1".into()),
                Key("body".into()),
                Str("hello".into()),
                Key("ttl".into()),
                Int(100),
                Key("hide".into()),
                Int(0),
                ObjectEnd,
                ArrayEnd,
            ]
        );
    }

    #[test]
    fn bare_object_and_empty_containers() {
        use Event::*;
        assert_eq!(
            events(r#"{"ttl": -1}"#),
            vec![ObjectBegin, Key("ttl".into()), Int(-1), ObjectEnd]
        );
        assert_eq!(events("[]"), vec![ArrayBegin, ArrayEnd]);
        assert_eq!(events(" [ { } ] "), vec![
            ArrayBegin,
            ObjectBegin,
            ObjectEnd,
            ArrayEnd
        ]);
    }

    #[test]
    fn string_list() {
        use Event::*;
        assert_eq!(events(r#"["acct%20one", "acct2"]"#), vec![
            ArrayBegin,
            Str("acct%20one".into()),
            Str("acct2".into()),
            ArrayEnd
        ]);
    }

    #[test]
    fn scalars_and_nesting() {
        use Event::*;
        assert_eq!(
            events(r#"[true, false, null, 1.5, [2]]"#),
            vec![
                ArrayBegin,
                Bool(true),
                Bool(false),
                Null,
                Float(1.5),
                ArrayBegin,
                Int(2),
                ArrayEnd,
                ArrayEnd
            ]
        );
    }

    #[test]
    fn escapes() {
        use Event::*;
        assert_eq!(
            events(r#"["a\"b\\c\/d\n\t", "Aé", "😀"]"#),
            vec![
                ArrayBegin,
                Str("a\"b\\c/d\n\t".into()),
                Str("Aé".into()),
                Str("😀".into()),
                ArrayEnd
            ]
        );
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(error_of("[1,]").what, "trailing comma");
        assert_eq!(error_of(r#"{"a": 1,}"#).what, "trailing comma");
        assert_eq!(error_of("[1 2]").what, "expected ',' or a closing bracket");
        assert_eq!(error_of("[1] x").what, "trailing characters");
        assert_eq!(error_of("{").what, "unexpected end of input");
        assert_eq!(error_of(r#"{"a" 1}"#).what, "expected ':' after member name");
        assert_eq!(error_of(r#"["ab"#).what, "unterminated string");
        assert_eq!(error_of(r#"["\ud800"]"#).what, "lone surrogate");
        assert_eq!(error_of("nul").what, "malformed literal");
        assert_eq!(error_of("}").what, "expected a value");
    }

    // The tokenizer and serde_json must agree on what round-trips.
    #[test]
    fn agrees_with_serde_json_rendering() {
        let doc = serde_json::json!([
            {"id": "m%2F1", "body": "payload", "ttl": 299, "hide": 0},
            {"id": "m2", "body": "", "ttl": 1, "hide": 9}
        ]);
        let text = serde_json::to_string(&doc).unwrap();
        let evts = events(&text);
        assert_eq!(
            evts.iter()
                .filter(|e| matches!(e, Event::ObjectBegin))
                .count(),
            2
        );
        assert!(evts.contains(&Event::Str("m%2F1".into())));
        assert!(evts.contains(&Event::Int(299)));
    }
}
