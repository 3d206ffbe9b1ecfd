// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Route pattern syntax
//!
//! A pattern is a path relative to the path start, a leading slash is optional. `:name` captures
//! a parameter, the name consists of ASCII letters only. The character directly following a
//! parameter name is always taken literally, a backslash there merely terminates the name. A `*`
//! as the last character captures the remainder of the path. Backslash escapes the next
//! character. `?` and `#` are not allowed anywhere, not even escaped.

use crate::error::Error;

pub(crate) const SLASH: u8 = b'/';
const ESCAPE: u8 = b'\\';
const PARAM: u8 = b':';
const WILDCARD: u8 = b'*';

/// Parameter name recorded for a wildcard capture
pub const WILDCARD_NAME: &str = "*";

/// A single element of a parsed pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Byte(u8),
    Param(String),
    Wildcard,
}

/// A parsed route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pattern {
    pub(crate) tokens: Vec<Token>,
}

impl Pattern {
    /// Parses a pattern, rejecting query and fragment delimiters.
    pub(crate) fn parse(pattern: &str) -> Result<Self, Error> {
        let bytes = pattern.as_bytes();
        let mut offset = match bytes {
            [SLASH, ..] => 1,
            [ESCAPE, SLASH, ..] => 2,
            _ => 0,
        };
        let mut escape = false;
        let mut tokens = Vec::new();

        while let Some(&byte) = bytes.get(offset) {
            if !escape {
                match byte {
                    ESCAPE => {
                        offset += 1;
                        escape = true;
                        continue;
                    }
                    PARAM => {
                        let length = bytes[offset + 1..]
                            .iter()
                            .take_while(|b| b.is_ascii_alphabetic())
                            .count();
                        if length > 0 {
                            let name = &pattern[offset + 1..offset + 1 + length];
                            tokens.push(Token::Param(name.to_owned()));
                            offset += 1 + length;
                            if bytes.get(offset) == Some(&ESCAPE) {
                                offset += 1;
                            }
                            escape = true;
                            continue;
                        }
                    }
                    WILDCARD if offset + 1 == bytes.len() => {
                        tokens.push(Token::Wildcard);
                        break;
                    }
                    _ => {}
                }
            }

            if matches!(byte, b'?' | b'#') {
                return Err(Error::IllegalCharacter {
                    pattern: pattern.to_owned(),
                    offset,
                    character: char::from(byte),
                });
            }

            tokens.push(Token::Byte(byte));
            offset += 1;
            escape = false;
        }

        Ok(Self { tokens })
    }

    /// Parameter names in capture order, wildcards are named `*`.
    pub(crate) fn names(&self) -> Vec<String> {
        self.tokens
            .iter()
            .filter_map(|token| match token {
                Token::Byte(_) => None,
                Token::Param(name) => Some(name.clone()),
                Token::Wildcard => Some(WILDCARD_NAME.to_owned()),
            })
            .collect()
    }

    /// Checks whether the pattern contains parameters or wildcards.
    pub(crate) fn is_static(&self) -> bool {
        self.tokens
            .iter()
            .all(|token| matches!(token, Token::Byte(_)))
    }
}

/// Produces a pattern string that parses back into the given tokens.
pub(crate) fn format(tokens: &[Token]) -> String {
    let mut pattern = vec![SLASH];
    let mut after_param = false;
    for token in tokens {
        match token {
            Token::Byte(byte) => {
                if matches!(*byte, ESCAPE | PARAM | WILDCARD)
                    || (after_param && byte.is_ascii_alphabetic())
                {
                    pattern.push(ESCAPE);
                }
                pattern.push(*byte);
                after_param = false;
            }
            Token::Param(name) => {
                pattern.push(PARAM);
                pattern.extend_from_slice(name.as_bytes());
                after_param = true;
            }
            Token::Wildcard => {
                pattern.push(WILDCARD);
                after_param = false;
            }
        }
    }
    String::from_utf8_lossy(&pattern).into_owned()
}
