//! Tokenizer for the test query dialect.

use std::fmt;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Param(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Comma,
    Dot,
    Semicolon,
    Star,
    Minus,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Token {
    /// Returns true if this is the keyword `kw` (case-insensitive).
    pub(crate) fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(kw))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => f.write_str(s),
            Token::Int(i) => write!(f, "{i}"),
            Token::Float(d) => write!(f, "{d}"),
            Token::Str(s) => write!(f, "'{s}'"),
            Token::Param(p) => write!(f, "${p}"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::LBrace => f.write_str("{"),
            Token::RBrace => f.write_str("}"),
            Token::LBracket => f.write_str("["),
            Token::RBracket => f.write_str("]"),
            Token::Colon => f.write_str(":"),
            Token::Comma => f.write_str(","),
            Token::Dot => f.write_str("."),
            Token::Semicolon => f.write_str(";"),
            Token::Star => f.write_str("*"),
            Token::Minus => f.write_str("-"),
            Token::Eq => f.write_str("="),
            Token::Ne => f.write_str("<>"),
            Token::Lt => f.write_str("<"),
            Token::Le => f.write_str("<="),
            Token::Gt => f.write_str(">"),
            Token::Ge => f.write_str(">="),
        }
    }
}

/// Splits `input` into tokens.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => push(&mut tokens, &mut i, Token::LParen),
            ')' => push(&mut tokens, &mut i, Token::RParen),
            '{' => push(&mut tokens, &mut i, Token::LBrace),
            '}' => push(&mut tokens, &mut i, Token::RBrace),
            '[' => push(&mut tokens, &mut i, Token::LBracket),
            ']' => push(&mut tokens, &mut i, Token::RBracket),
            ':' => push(&mut tokens, &mut i, Token::Colon),
            ',' => push(&mut tokens, &mut i, Token::Comma),
            '.' => push(&mut tokens, &mut i, Token::Dot),
            ';' => push(&mut tokens, &mut i, Token::Semicolon),
            '*' => push(&mut tokens, &mut i, Token::Star),
            '-' => push(&mut tokens, &mut i, Token::Minus),
            '=' => push(&mut tokens, &mut i, Token::Eq),
            '<' => match chars.get(i + 1) {
                Some('>') => {
                    tokens.push(Token::Ne);
                    i += 2;
                }
                Some('=') => {
                    tokens.push(Token::Le);
                    i += 2;
                }
                _ => push(&mut tokens, &mut i, Token::Lt),
            },
            '>' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Ge);
                    i += 2;
                }
                _ => push(&mut tokens, &mut i, Token::Gt),
            },
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end == chars.len() {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '$' => {
                let start = i + 1;
                let end = scan_word(&chars, start);
                if end == start {
                    return Err("expected parameter name after '$'".to_string());
                }
                tokens.push(Token::Param(chars[start..end].iter().collect()));
                i = end;
            }
            c if c.is_ascii_digit() => {
                let mut end = i;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                let is_float = chars.get(end) == Some(&'.')
                    && chars.get(end + 1).is_some_and(|c| c.is_ascii_digit());
                if is_float {
                    end += 1;
                    while end < chars.len() && chars[end].is_ascii_digit() {
                        end += 1;
                    }
                }
                let text: String = chars[i..end].iter().collect();
                let token = if is_float {
                    Token::Float(text.parse().map_err(|_| format!("invalid number {text}"))?)
                } else {
                    Token::Int(text.parse().map_err(|_| format!("integer {text} out of range"))?)
                };
                tokens.push(token);
                i = end;
            }
            c if c.is_alphabetic() || c == '_' => {
                let end = scan_word(&chars, i);
                tokens.push(Token::Ident(chars[i..end].iter().collect()));
                i = end;
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    Ok(tokens)
}

fn push(tokens: &mut Vec<Token>, i: &mut usize, token: Token) {
    tokens.push(token);
    *i += 1;
}

fn scan_word(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
        end += 1;
    }
    end
}
