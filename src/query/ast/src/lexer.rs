// Copyright 2024 PPDS Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::ParseError;
use crate::token::classify_word;
use crate::token::Token;
use crate::token::TokenKind;

/// Hand-rolled tokenizer for the Dataverse-flavored T-SQL subset (spec §9
/// design note: "embed a comparable grammar or define a pragmatic
/// Dataverse-flavored subset ... and fall back to lexical tokens only for
/// highlighting"). Never fails: unrecognized characters become
/// `TokenKind::Error` tokens so the highlighter still gets full coverage;
/// only `Parser` turns malformed input into a `ParseError`.
pub struct Tokenizer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    line: u32,
    line_start: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        Tokenizer {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
            line: 1,
            line_start: 0,
        }
    }

    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).map(|(_, c)| *c)
    }

    fn byte_offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(o, _)| *o)
            .unwrap_or(self.src.len())
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char();
        if let Some(ch) = c {
            if ch == '\n' {
                self.line += 1;
                self.line_start = self.byte_offset() + ch.len_utf8();
            }
            self.pos += 1;
        }
        c
    }

    fn column_at(&self, offset: usize) -> u32 {
        (offset.saturating_sub(self.line_start) + 1) as u32
    }

    fn make(&self, kind: TokenKind, start: usize, start_line: u32, text: String) -> Token {
        let len = text.len();
        Token {
            kind,
            text,
            offset: start,
            len,
            line: start_line,
            column: self.column_at(start),
        }
    }

    fn next_token(&mut self) -> Token {
        let start = self.byte_offset();
        let start_line = self.line;

        let Some(c) = self.peek_char() else {
            return self.make(TokenKind::Eof, start, start_line, String::new());
        };

        if c.is_whitespace() {
            let mut text = String::new();
            while let Some(c) = self.peek_char() {
                if !c.is_whitespace() {
                    break;
                }
                text.push(c);
                self.advance();
            }
            return self.make(TokenKind::Whitespace, start, start_line, text);
        }

        if c == '-' && self.peek_at(1) == Some('-') {
            let mut text = String::new();
            while let Some(c) = self.peek_char() {
                if c == '\n' {
                    break;
                }
                text.push(c);
                self.advance();
            }
            return self.make(TokenKind::Comment, start, start_line, text);
        }

        if c == '/' && self.peek_at(1) == Some('*') {
            let mut text = String::new();
            text.push(self.advance().unwrap());
            text.push(self.advance().unwrap());
            loop {
                match self.peek_char() {
                    None => break,
                    Some('*') if self.peek_at(1) == Some('/') => {
                        text.push(self.advance().unwrap());
                        text.push(self.advance().unwrap());
                        break;
                    }
                    Some(c) => {
                        text.push(c);
                        self.advance();
                    }
                }
            }
            return self.make(TokenKind::Comment, start, start_line, text);
        }

        if c == '[' {
            let mut text = String::new();
            text.push(self.advance().unwrap());
            loop {
                match self.peek_char() {
                    None => break,
                    Some(']') => {
                        text.push(self.advance().unwrap());
                        break;
                    }
                    Some(c) => {
                        text.push(c);
                        self.advance();
                    }
                }
            }
            return self.make(TokenKind::QuotedIdentifier, start, start_line, text);
        }

        if c == '"' {
            return self.read_quoted(start, start_line, '"', TokenKind::QuotedIdentifier);
        }

        if c == '\'' || ((c == 'N' || c == 'n') && self.peek_at(1) == Some('\'')) {
            if c != '\'' {
                // N'...' unicode string prefix: consume the marker but keep
                // the quoted body as the literal text.
                self.advance();
            }
            return self.read_quoted(start, start_line, '\'', TokenKind::StringLiteral);
        }

        if c == '@' {
            let mut text = String::new();
            text.push(self.advance().unwrap());
            while let Some(c) = self.peek_char() {
                if c.is_alphanumeric() || c == '_' {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            return self.make(TokenKind::Variable, start, start_line, text);
        }

        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()))
        {
            let mut text = String::new();
            let mut seen_dot = false;
            let mut seen_exp = false;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else if c == '.' && !seen_dot && !seen_exp {
                    seen_dot = true;
                    text.push(c);
                    self.advance();
                } else if (c == 'e' || c == 'E') && !seen_exp {
                    seen_exp = true;
                    text.push(c);
                    self.advance();
                    if matches!(self.peek_char(), Some('+') | Some('-')) {
                        text.push(self.advance().unwrap());
                    }
                } else {
                    break;
                }
            }
            return self.make(TokenKind::NumericLiteral, start, start_line, text);
        }

        if c.is_alphabetic() || c == '_' || c == '#' {
            let mut text = String::new();
            while let Some(c) = self.peek_char() {
                if c.is_alphanumeric() || c == '_' || c == '#' || c == '$' {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            let kind = classify_word(&text);
            return self.make(kind, start, start_line, text);
        }

        // Multi-char operators before single-char ones/punctuation.
        for op in ["<>", "!=", "<=", ">=", "||"] {
            if self.src[start..].starts_with(op) {
                for _ in 0..op.chars().count() {
                    self.advance();
                }
                return self.make(TokenKind::Operator, start, start_line, op.to_string());
            }
        }

        if "=<>+-*/%".contains(c) {
            self.advance();
            return self.make(TokenKind::Operator, start, start_line, c.to_string());
        }

        if "(),.;".contains(c) {
            self.advance();
            return self.make(TokenKind::Punctuation, start, start_line, c.to_string());
        }

        self.advance();
        self.make(TokenKind::Error, start, start_line, c.to_string())
    }

    fn read_quoted(
        &mut self,
        start: usize,
        start_line: u32,
        quote: char,
        kind: TokenKind,
    ) -> Token {
        let mut text = String::new();
        text.push(self.advance().unwrap()); // opening quote
        loop {
            match self.peek_char() {
                None => break,
                Some(c) if c == quote => {
                    self.advance();
                    text.push(c);
                    // Doubled quote is an escaped literal quote, not the terminator.
                    if self.peek_char() == Some(quote) {
                        text.push(self.advance().unwrap());
                        continue;
                    }
                    break;
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
        self.make(kind, start, start_line, text)
    }
}

/// Convenience entry point used by the parser and by callers that only want
/// highlighting.
pub fn tokenize(src: &str) -> Vec<Token> {
    Tokenizer::new(src).tokenize()
}

/// Strict variant used internally before parsing: rejects input containing
/// lexical errors (unterminated quotes, stray characters) up front.
pub fn tokenize_checked(src: &str) -> Result<Vec<Token>, ParseError> {
    let tokens = tokenize(src);
    if let Some(bad) = tokens.iter().find(|t| t.kind == TokenKind::Error) {
        return Err(ParseError {
            line: bad.line,
            column: bad.column,
            offset: bad.offset,
            message: format!("unexpected character '{}'", bad.text),
        });
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_simple_select() {
        let tokens = tokenize("SELECT name FROM account");
        let kinds: Vec<_> = tokens
            .iter()
            .filter(|t| !t.is_trivia() && t.kind != TokenKind::Eof)
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::Keyword,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn quoted_identifier_with_brackets() {
        let tokens = tokenize("SELECT [order] FROM t");
        let quoted = tokens
            .iter()
            .find(|t| t.kind == TokenKind::QuotedIdentifier)
            .unwrap();
        assert_eq!(quoted.text, "[order]");
    }

    #[test]
    fn string_literal_with_escaped_quote() {
        let tokens = tokenize("SELECT 'it''s' FROM t");
        let lit = tokens
            .iter()
            .find(|t| t.kind == TokenKind::StringLiteral)
            .unwrap();
        assert_eq!(lit.text, "'it''s'");
    }

    #[test]
    fn variable_token() {
        let tokens = tokenize("SET @n = 1");
        let v = tokens.iter().find(|t| t.kind == TokenKind::Variable).unwrap();
        assert_eq!(v.text, "@n");
    }

    #[test]
    fn numeric_literal_with_exponent() {
        let tokens = tokenize("SELECT 1.5e-3");
        let n = tokens
            .iter()
            .find(|t| t.kind == TokenKind::NumericLiteral)
            .unwrap();
        assert_eq!(n.text, "1.5e-3");
    }

    #[test]
    fn line_and_column_track_newlines() {
        let tokens = tokenize("SELECT a\nFROM t");
        let from = tokens.iter().find(|t| t.is_keyword("FROM")).unwrap();
        assert_eq!(from.line, 2);
    }

    #[test]
    fn unrecognized_character_becomes_error_token() {
        let tokens = tokenize("SELECT a ~ b");
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Error));
        assert!(tokenize_checked("SELECT a ~ b").is_err());
    }
}
