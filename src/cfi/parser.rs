//! CFI Parser
//!
//! Parses EPUB CFI strings into structured Cfi objects.
//!
//! Grammar (content-document subset):
//! ```text
//! cfi       = "epubcfi(" path ["," path "," path] ")"
//! path      = step+ [offset] | offset
//! step      = "/" number [assertion] | "!" [assertion]
//! offset    = ":" number [assertion]
//! assertion = "[" text ["," text] (";" key "=" value)* "]"
//! ```
//!
//! Inside assertions `^` escapes the next character.

use super::error::SyntaxError;
use super::types::*;

/// Bracketed assertion split on its unescaped separators
#[derive(Debug, Default)]
struct RawAssertion {
    fields: Vec<String>,
    has_comma: bool,
    parameters: Vec<(String, String)>,
}

impl RawAssertion {
    fn into_text_assertion(self) -> TextAssertion {
        let mut fields = self.fields.into_iter();
        let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };
        TextAssertion {
            prefix: fields.next().and_then(non_empty),
            suffix: fields.next().and_then(non_empty),
            parameters: self.parameters,
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_str(&mut self, s: &str) -> bool {
        if self.input[self.pos..].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn unexpected(&self) -> SyntaxError {
        match self.peek() {
            Some(ch) => SyntaxError::UnexpectedChar(ch, self.pos),
            None => SyntaxError::MissingClosingParen,
        }
    }

    fn parse_number(&mut self) -> Result<u32, SyntaxError> {
        let start = self.pos;
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
            self.advance();
        }
        if self.pos == start {
            return Err(SyntaxError::ExpectedNumber(start));
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| SyntaxError::ExpectedNumber(start))
    }

    /// Parse `[...]` if present. The opening bracket is consumed here.
    fn parse_assertion(&mut self) -> Result<Option<RawAssertion>, SyntaxError> {
        let open = self.pos;
        if !self.skip_if('[') {
            return Ok(None);
        }

        let mut raw = RawAssertion::default();
        let mut current = String::new();
        let mut in_parameters = false;
        let mut key: Option<String> = None;

        loop {
            let at = self.pos;
            let Some(ch) = self.advance() else {
                return Err(SyntaxError::UnclosedBracket(open));
            };
            match ch {
                '^' => match self.advance() {
                    Some(escaped) => current.push(escaped),
                    None => return Err(SyntaxError::UnclosedBracket(open)),
                },
                ']' => break,
                ',' if !in_parameters && !raw.has_comma => {
                    raw.has_comma = true;
                    raw.fields.push(std::mem::take(&mut current));
                }
                ';' => {
                    if in_parameters {
                        push_parameter(&mut raw, key.take(), &mut current);
                    } else {
                        raw.fields.push(std::mem::take(&mut current));
                        in_parameters = true;
                    }
                }
                '=' if in_parameters && key.is_none() => {
                    key = Some(std::mem::take(&mut current));
                }
                '[' | '(' | ')' | ',' | '=' => return Err(SyntaxError::UnexpectedChar(ch, at)),
                _ => current.push(ch),
            }
        }

        if in_parameters {
            push_parameter(&mut raw, key, &mut current);
        } else {
            raw.fields.push(current);
        }
        Ok(Some(raw))
    }

    fn parse_step(&mut self) -> Result<CfiStep, SyntaxError> {
        let mut step = if self.skip_if('/') {
            let at = self.pos;
            let index = self.parse_number()?;
            if index == 0 {
                return Err(SyntaxError::ZeroIndex(at));
            }
            CfiStep::index(index)
        } else if self.skip_if('!') {
            CfiStep::indirection()
        } else {
            return Err(SyntaxError::ExpectedStep(self.pos));
        };

        if let Some(raw) = self.parse_assertion()? {
            if raw.has_comma {
                step.text_assertion = Some(raw.into_text_assertion());
            } else {
                step.id_assertion = raw.fields.into_iter().next().filter(|id| !id.is_empty());
                step.parameters = raw.parameters;
            }
        }
        Ok(step)
    }

    fn parse_path(&mut self) -> Result<CfiPath, SyntaxError> {
        let start = self.pos;
        let mut path = CfiPath::new();

        while matches!(self.peek(), Some('/') | Some('!')) {
            path.push(self.parse_step()?);
        }

        if self.skip_if(':') {
            let offset = self.parse_number()?;
            let assertion = self.parse_assertion()?.map(RawAssertion::into_text_assertion);
            path.character_offset = Some(CharacterOffset { offset, assertion });
        }

        if path.is_empty() {
            return Err(SyntaxError::EmptyPath(start));
        }
        Ok(path)
    }

    fn parse_cfi(&mut self) -> Result<Cfi, SyntaxError> {
        if !self.skip_str("epubcfi(") {
            return Err(SyntaxError::MissingPrefix);
        }

        let path = self.parse_path()?;

        let range = if self.skip_if(',') {
            if path.character_offset.is_some() {
                return Err(SyntaxError::InvalidRange);
            }
            let start = self.parse_path()?;
            if !self.skip_if(',') {
                return Err(SyntaxError::InvalidRange);
            }
            let end = self.parse_path()?;
            Some(CfiRange { start, end })
        } else {
            None
        };

        if !self.skip_if(')') {
            return Err(self.unexpected());
        }

        Ok(Cfi { path, range })
    }
}

fn push_parameter(raw: &mut RawAssertion, key: Option<String>, current: &mut String) {
    let value = std::mem::take(current);
    if let Some(key) = key {
        let key = key.trim().to_string();
        if !key.is_empty() {
            raw.parameters.push((key, value.trim().to_string()));
        }
    }
}

/// Parse a CFI string into a Cfi struct
pub fn parse(input: &str) -> Result<Cfi, SyntaxError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SyntaxError::Empty);
    }

    let mut parser = Parser::new(input);
    let cfi = parser.parse_cfi()?;

    if !parser.at_end() {
        return Err(parser.unexpected());
    }

    Ok(cfi)
}

/// Parse a CFI string, discarding the error
pub fn try_parse(input: &str) -> Option<Cfi> {
    parse(input).ok()
}
