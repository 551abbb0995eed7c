//! 查询语言的词法分析器
//!
//! 从左到右对输入做单遍扫描，不回溯。每个 token 都带有字节偏移的 span，
//! 错误信息和补全都依赖这些偏移。空白字符被跳过，但不影响 span 的正确性。

use std::borrow::Cow;

use thiserror::Error;

use crate::token::{Span, Token, TokenKind};

/// 词法错误的具体种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
}

/// 词法错误，带出错位置的字节偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub offset: usize,
}

pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    /// 返回当前位置的字符，不推进位置
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// 返回下一个位置的字符，不推进位置
    fn peek_next(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    /// 推进位置一个字符并返回该字符
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    /// 跳过空白字符
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// 读取数字字面量：可选负号、整数部分、可选的单个小数点加小数部分
    /// 注意：第一个字符（数字或负号）已经被调用者消费
    fn read_number(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.bump(); // 消费 '.'
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        let value_str = &self.input[start..self.position];
        let value = value_str.parse::<f64>().unwrap_or(0.0); // 按词法规则不会失败
        Token {
            kind: TokenKind::Number(value),
            span: Span::new(start, self.position),
        }
    }

    /// 读取引号包围的字符串字面量，支持 `\"`、`\'`、`\\` 转义
    /// 注意：开始的引号已经被调用者消费。未闭合的字符串产生 Illegal token，
    /// 其 span 一直延伸到输入末尾
    fn read_string(&mut self, start: usize, quote: char) -> Token<'a> {
        let content_start = self.position;
        // 只有遇到转义序列时才切换到自有缓冲区
        let mut unescaped: Option<String> = None;
        loop {
            let Some(c) = self.peek() else {
                self.position = self.input.len();
                return Token {
                    kind: TokenKind::Illegal,
                    span: Span::new(start, self.position),
                };
            };
            if c == quote {
                let content_end = self.position;
                self.bump(); // 消费结束引号
                let kind = match unescaped {
                    Some(s) => TokenKind::String(Cow::Owned(s)),
                    None => {
                        TokenKind::String(Cow::Borrowed(&self.input[content_start..content_end]))
                    }
                };
                return Token {
                    kind,
                    span: Span::new(start, self.position),
                };
            }
            if c == '\\' {
                let escape_pos = self.position;
                self.bump(); // 消费反斜杠
                match self.peek() {
                    Some(e) if e == quote || e == '\\' => {
                        let buf = unescaped.get_or_insert_with(|| {
                            self.input[content_start..escape_pos].to_string()
                        });
                        buf.push(e);
                        self.bump();
                    }
                    // 其他转义序列原样保留反斜杠
                    _ => {
                        if let Some(buf) = unescaped.as_mut() {
                            buf.push('\\');
                        }
                    }
                }
                continue;
            }
            if let Some(buf) = unescaped.as_mut() {
                buf.push(c);
            }
            self.bump();
        }
    }

    /// 读取一个单词：字段名（可带 `.` 连接的关系路径）或关键字
    /// 关键字在无点号的整词上匹配，因此 `intro` 不会被误读为 `in`
    fn read_word(&mut self, start: usize) -> Token<'a> {
        let mut has_dot = false;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else if c == '.' {
                has_dot = true;
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.position];
        let kind = if has_dot {
            TokenKind::Name(literal)
        } else {
            match_keyword(literal)
        };
        Token {
            kind,
            span: Span::new(start, self.position),
        }
    }
}

/// 关键字不区分大小写，且在泛化的名称匹配之前处理
fn match_keyword(s: &str) -> TokenKind<'_> {
    match s.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        "true" => TokenKind::Bool(true),
        "false" => TokenKind::Bool(false),
        "null" => TokenKind::Null,
        _ => TokenKind::Name(s),
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let Some(c) = self.bump() else {
            return None; // 到达输入末尾
        };

        let token = match c {
            '=' => Token {
                kind: TokenKind::Eq,
                span: Span::new(start, self.position),
            },
            '(' => Token {
                kind: TokenKind::LParen,
                span: Span::new(start, self.position),
            },
            ')' => Token {
                kind: TokenKind::RParen,
                span: Span::new(start, self.position),
            },
            '[' => Token {
                kind: TokenKind::LBracket,
                span: Span::new(start, self.position),
            },
            ']' => Token {
                kind: TokenKind::RBracket,
                span: Span::new(start, self.position),
            },
            ',' => Token {
                kind: TokenKind::Comma,
                span: Span::new(start, self.position),
            },
            '~' => Token {
                kind: TokenKind::Matches,
                span: Span::new(start, self.position),
            },
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Token {
                        kind: TokenKind::Lte,
                        span: Span::new(start, self.position),
                    }
                } else {
                    Token {
                        kind: TokenKind::Lt,
                        span: Span::new(start, self.position),
                    }
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Token {
                        kind: TokenKind::Gte,
                        span: Span::new(start, self.position),
                    }
                } else {
                    Token {
                        kind: TokenKind::Gt,
                        span: Span::new(start, self.position),
                    }
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Token {
                        kind: TokenKind::NotEq,
                        span: Span::new(start, self.position),
                    }
                } else if self.peek() == Some('~') {
                    self.bump();
                    Token {
                        kind: TokenKind::NotMatches,
                        span: Span::new(start, self.position),
                    }
                } else {
                    Token {
                        kind: TokenKind::Illegal,
                        span: Span::new(start, self.position),
                    }
                }
            }
            '"' | '\'' => self.read_string(start, c),
            '-' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number(start),
            c if c.is_ascii_digit() => self.read_number(start),
            c if c.is_alphabetic() || c == '_' => self.read_word(start),
            _ => Token {
                kind: TokenKind::Illegal,
                span: Span::new(start, self.position),
            },
        };
        Some(token)
    }
}

/// 对整段输入做严格的词法分析
///
/// 成功时返回以 End token 结尾的 token 序列；遇到非法字符或未闭合的
/// 字符串时在第一个错误处停止
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, LexError> {
    let mut tokens = Vec::new();
    for token in Lexer::new(input) {
        if token.kind == TokenKind::Illegal {
            let raw = &input[token.span.start..token.span.end];
            let kind = if raw.starts_with('"') || raw.starts_with('\'') {
                LexErrorKind::UnterminatedString
            } else {
                let c = raw.chars().next().unwrap_or('\0');
                LexErrorKind::UnexpectedChar(c)
            };
            return Err(LexError {
                kind,
                offset: token.span.start,
            });
        }
        tokens.push(token);
    }
    let end = input.len();
    tokens.push(Token {
        kind: TokenKind::End,
        span: Span::new(end, end),
    });
    Ok(tokens)
}

/// 光标处可能尚未输完的 token
#[derive(Debug, Clone, PartialEq)]
pub struct PartialToken<'a> {
    /// 原始文本。字符串 partial 含起始引号
    pub text: &'a str,
    pub span: Span,
}

/// 为补全做的宽容词法分析：只分析光标之前的文本，并把紧贴光标、
/// 可能还没输完的最后一个 token 单独拆出来
///
/// 词法器本身保持纯函数；遇到真正的非法字符时保留已产出的前缀，
/// 停止继续分析
pub fn lex_partial(input: &str, cursor: usize) -> (Vec<Token<'_>>, Option<PartialToken<'_>>) {
    let cursor = cursor.min(input.len());
    let prefix = &input[..cursor];
    let mut tokens = Vec::new();
    for token in Lexer::new(prefix) {
        if token.kind == TokenKind::Illegal {
            let raw = &prefix[token.span.start..token.span.end];
            // 紧贴光标的未闭合字符串视为正在输入的值
            if token.span.end == cursor && (raw.starts_with('"') || raw.starts_with('\'')) {
                return (
                    tokens,
                    Some(PartialToken {
                        text: raw,
                        span: token.span,
                    }),
                );
            }
            return (tokens, None);
        }
        tokens.push(token);
    }
    // 紧贴光标的单词可能是未输完的字段名或关键字
    if let Some(last) = tokens.last() {
        if last.span.end == cursor && last.kind.is_word() {
            let span = last.span;
            tokens.pop();
            return (
                tokens,
                Some(PartialToken {
                    text: &prefix[span.start..span.end],
                    span,
                }),
            );
        }
    }
    (tokens, None)
}
