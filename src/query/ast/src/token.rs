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

use std::fmt;

/// Highlight/structural classification of a lexed token (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Keyword,
    Identifier,
    QuotedIdentifier,
    Function,
    StringLiteral,
    NumericLiteral,
    Comment,
    Operator,
    Punctuation,
    Variable,
    Error,
    Whitespace,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
    pub len: usize,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    /// Case-insensitive keyword match, used pervasively by the parser.
    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text.eq_ignore_ascii_case(word)
    }

    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.text == p
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }
}

/// Recognized reserved words. Anything else lexing as an identifier-shaped
/// run of characters is `TokenKind::Identifier`.
pub const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "BY", "HAVING", "ORDER", "TOP", "DISTINCT", "AS", "JOIN",
    "INNER", "LEFT", "RIGHT", "OUTER", "ON", "AND", "OR", "NOT", "NULL", "IS", "IN", "LIKE",
    "BETWEEN", "CASE", "WHEN", "THEN", "ELSE", "END", "UNION", "ALL", "INSERT", "INTO", "VALUES",
    "UPDATE", "SET", "DELETE", "DECLARE", "IF", "WHILE", "BEGIN", "TRY", "CATCH", "OVER",
    "PARTITION", "ASC", "DESC", "OPTION", "EXISTS", "OUTPUT", "GO", "RETURN", "BREAK", "CONTINUE",
];

pub fn classify_word(word: &str) -> TokenKind {
    if KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word)) {
        TokenKind::Keyword
    } else {
        TokenKind::Identifier
    }
}

/// Removes whitespace and end-of-file tokens from a lexed stream (spec
/// §4.1: "whitespace and end-of-file tokens are filtered from the highlight
/// output").
pub fn highlight_tokens(tokens: &[Token]) -> Vec<Token> {
    tokens
        .iter()
        .filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Eof))
        .cloned()
        .collect()
}
