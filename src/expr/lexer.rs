//! Tokenizer for the condition language.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ExprError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let two = if i + 1 < bytes.len() {
            Some((c, bytes[i + 1]))
        } else {
            None
        };
        let symbol = match two {
            Some((b'=', b'=')) => Some((Token::Eq, 2)),
            Some((b'!', b'=')) => Some((Token::Ne, 2)),
            Some((b'<', b'=')) => Some((Token::Le, 2)),
            Some((b'>', b'=')) => Some((Token::Ge, 2)),
            Some((b'&', b'&')) => Some((Token::And, 2)),
            Some((b'|', b'|')) => Some((Token::Or, 2)),
            _ => match c {
                b'<' => Some((Token::Lt, 1)),
                b'>' => Some((Token::Gt, 1)),
                b'!' => Some((Token::Not, 1)),
                b'(' => Some((Token::LParen, 1)),
                b')' => Some((Token::RParen, 1)),
                b'[' => Some((Token::LBracket, 1)),
                b']' => Some((Token::RBracket, 1)),
                b',' => Some((Token::Comma, 1)),
                b'.' => Some((Token::Dot, 1)),
                _ => None,
            },
        };
        if let Some((token, len)) = symbol {
            tokens.push(Spanned {
                token,
                offset: start,
            });
            i += len;
            continue;
        }

        if c == b'"' || c == b'\'' {
            let (value, end) = read_string(source, i)?;
            tokens.push(Spanned {
                token: Token::Str(value),
                offset: start,
            });
            i = end;
            continue;
        }

        let negative = c == b'-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
        if c.is_ascii_digit() || negative {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let text = &source[start..i];
            let value = text.parse().map_err(|_| ExprError::Syntax {
                offset: start,
                message: format!("integer literal out of range: {}", text),
            })?;
            tokens.push(Spanned {
                token: Token::Int(value),
                offset: start,
            });
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let token = match &source[start..i] {
                "true" | "True" => Token::True,
                "false" | "False" => Token::False,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                ident => Token::Ident(ident.to_string()),
            };
            tokens.push(Spanned {
                token,
                offset: start,
            });
            continue;
        }

        let ch = source[start..].chars().next().unwrap_or('?');
        return Err(ExprError::Syntax {
            offset: start,
            message: format!("unexpected character {:?}", ch),
        });
    }

    Ok(tokens)
}

/// Read a quoted string starting at `start`; returns the unescaped value and
/// the offset just past the closing quote.
fn read_string(source: &str, start: usize) -> Result<(String, usize), ExprError> {
    let mut chars = source[start..].char_indices();
    let Some((_, quote)) = chars.next() else {
        return Err(ExprError::Syntax {
            offset: start,
            message: "expected string literal".into(),
        });
    };
    let mut value = String::new();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            c if c == quote => return Ok((value, start + pos + c.len_utf8())),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, c @ ('\\' | '"' | '\''))) => value.push(c),
                Some((epos, other)) => {
                    return Err(ExprError::Syntax {
                        offset: start + epos,
                        message: format!("unknown escape \\{}", other),
                    })
                }
                None => break,
            },
            c => value.push(c),
        }
    }

    Err(ExprError::Syntax {
        offset: start,
        message: "unterminated string literal".into(),
    })
}
