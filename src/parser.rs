//! 查询语言的语法分析器
//!
//! ## 解析流程
//!
//! ```text
//! parse()
//!   └─ parse_or_expression() (递归下降解析)
//!        ├─ parse_and_expression()
//!        │    ├─ parse_not_expression()
//!        │    │    └─ parse_primary_expression()
//!        │    │         ├─ "(" → 分组表达式 (递归调用parse_or_expression)
//!        │    │         └─ NAME → parse_comparison()
//!        │    │              ├─ 拆分点分字段路径
//!        │    │              ├─ 比较运算符
//!        │    │              └─ 标量字面量, 或 in 后面的列表字面量
//!        │    │
//!        │    └─ 遇到AND时，继续解析右侧NOT表达式
//!        │
//!        └─ 遇到OR时，继续解析右侧AND表达式
//! ```
//!
//! ## 语法优先级（从高到低）
//!
//! 1. **括号分组** `(expression)`
//! 2. **NOT操作** `not expression`
//! 3. **比较操作** `field = value`, `field in [...]`
//! 4. **AND操作** `expr1 and expr2`
//! 5. **OR操作** `expr1 or expr2`
//!
//! 解析器完全不了解 schema：字段名是否存在、运算符对类型是否合法，
//! 都由 validate 阶段检查。这让补全和纯语法工具可以在没有 schema
//! 的情况下工作，语法和语义也能分开测试。
//!
//! ## 解析示例
//!
//! ```text
//! age > 18 and status = "active"
//! name ~ "^A" or not archived = true
//! author.country.code in ["cn", "jp"]; 空列表 [] 合法
//! ```

use std::error::Error;
use std::fmt;

use crate::ast::{CompOp, Expr, FieldPath, Literal, LiteralNode};
use crate::token::{Span, Token, TokenKind};

pub struct Parser<'a, 'b> {
    tokens: &'b [Token<'a>],
    position: usize,
}

/// 语法错误，遇到第一个错误即停止
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    fn new(message: String, span: Option<Span>) -> Self {
        Self { message, span }
    }

    fn at_position(message: String, span: Span) -> Self {
        Self {
            message,
            span: Some(span),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{} at offset {}", self.message, span.start),
            None => f.write_str(&self.message),
        }
    }
}

impl Error for ParseError {}

impl<'a, 'b> Parser<'a, 'b> {
    pub fn new(tokens: &'b [Token<'a>]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// 返回当前 token，不推进位置
    fn peek(&self) -> Option<&'b Token<'a>> {
        self.tokens.get(self.position)
    }

    /// 返回当前 token 并推进位置
    fn advance(&mut self) -> Option<&'b Token<'a>> {
        if self.position < self.tokens.len() {
            let token = &self.tokens[self.position];
            self.position += 1;
            Some(token)
        } else {
            None
        }
    }

    /// 期望特定类型的 token 并推进，否则返回错误
    fn expect(&mut self, expected: &TokenKind, description: &str) -> Result<&'b Token<'a>, ParseError> {
        if let Some(token) = self.peek() {
            if std::mem::discriminant(&token.kind) == std::mem::discriminant(expected) {
                self.position += 1;
                Ok(token)
            } else {
                Err(ParseError::at_position(
                    format!("expected {}, found {:?}", description, token.kind),
                    token.span,
                ))
            }
        } else {
            Err(ParseError::new(
                format!("expected {description}, but reached end of input"),
                None,
            ))
        }
    }

    /// 检查当前 token 是否匹配给定类型
    fn match_token(&self, kind: &TokenKind) -> bool {
        if let Some(token) = self.peek() {
            std::mem::discriminant(&token.kind) == std::mem::discriminant(kind)
        } else {
            false
        }
    }

    /// 解析整个 token 序列，要求以 End 结束
    pub fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_or_expression()?;
        match self.peek() {
            Some(token) if token.kind == TokenKind::End => Ok(expr),
            Some(token) => Err(ParseError::at_position(
                format!("unexpected token: {:?}", token.kind),
                token.span,
            )),
            None => Ok(expr),
        }
    }

    /// 解析OR表达式 (最低优先级)
    ///
    /// 语法: `and_expr (or and_expr)*`
    fn parse_or_expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_expression()?;

        while self.match_token(&TokenKind::Or) {
            self.advance(); // 消费 or
            let right = self.parse_and_expression()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    /// 解析AND表达式 (中等优先级)
    ///
    /// 语法: `not_expr (and not_expr)*`
    fn parse_and_expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not_expression()?;

        while self.match_token(&TokenKind::And) {
            self.advance(); // 消费 and
            let right = self.parse_not_expression()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    /// 解析NOT表达式 (较高优先级)
    ///
    /// 语法: `not* primary_expr`，允许 not 链式叠加
    fn parse_not_expression(&mut self) -> Result<Expr, ParseError> {
        if self.match_token(&TokenKind::Not) {
            self.advance(); // 消费 not
            let expr = self.parse_not_expression()?;
            Ok(Expr::Not(Box::new(expr)))
        } else {
            self.parse_primary_expression()
        }
    }

    /// 解析基础表达式 (最高优先级)
    ///
    /// - `(expression)` - 分组表达式，只影响树形，不产生节点
    /// - `NAME op value` - 比较叶子
    fn parse_primary_expression(&mut self) -> Result<Expr, ParseError> {
        if let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::LParen => {
                    self.advance(); // 消费 (
                    let expr = self.parse_or_expression()?;
                    self.expect(&TokenKind::RParen, "')'")?;
                    Ok(expr)
                }
                TokenKind::Name(_) => self.parse_comparison(),
                _ => Err(ParseError::at_position(
                    format!("expected field name or '(', found {:?}", token.kind),
                    token.span,
                )),
            }
        } else {
            Err(ParseError::new("unexpected end of input".to_string(), None))
        }
    }

    /// 解析比较叶子：`path op scalar` 或 `path in [list]`
    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let name_token = self.expect(&TokenKind::Name(""), "field name")?;
        let raw = match &name_token.kind {
            TokenKind::Name(raw) => *raw,
            _ => {
                return Err(ParseError::at_position(
                    "expected field name".to_string(),
                    name_token.span,
                ));
            }
        };
        let path = split_field_path(raw, name_token.span)?;

        let op = self.parse_comparison_operator()?;
        let value = if op == CompOp::In {
            self.parse_list_literal()?
        } else {
            self.parse_scalar_literal()?
        };

        Ok(Expr::Comparison { path, op, value })
    }

    fn parse_comparison_operator(&mut self) -> Result<CompOp, ParseError> {
        if let Some(token) = self.peek() {
            let op = match &token.kind {
                TokenKind::Eq => CompOp::Eq,
                TokenKind::NotEq => CompOp::NotEq,
                TokenKind::Gt => CompOp::Gt,
                TokenKind::Gte => CompOp::Gte,
                TokenKind::Lt => CompOp::Lt,
                TokenKind::Lte => CompOp::Lte,
                TokenKind::Matches => CompOp::Matches,
                TokenKind::NotMatches => CompOp::NotMatches,
                TokenKind::In => CompOp::In,
                _ => {
                    return Err(ParseError::at_position(
                        format!("expected comparison operator, found {:?}", token.kind),
                        token.span,
                    ));
                }
            };
            self.advance();
            Ok(op)
        } else {
            Err(ParseError::new(
                "expected comparison operator".to_string(),
                None,
            ))
        }
    }

    /// 解析标量字面量：字符串、数字、布尔或 null
    fn parse_scalar_literal(&mut self) -> Result<LiteralNode, ParseError> {
        if let Some(token) = self.advance() {
            let value = match &token.kind {
                TokenKind::String(s) => Literal::String(s.clone().into_owned()),
                TokenKind::Number(n) => Literal::Number(*n),
                TokenKind::Bool(b) => Literal::Bool(*b),
                TokenKind::Null => Literal::Null,
                _ => {
                    return Err(ParseError::at_position(
                        format!("expected literal value, found {:?}", token.kind),
                        token.span,
                    ));
                }
            };
            Ok(LiteralNode {
                value,
                span: token.span,
            })
        } else {
            Err(ParseError::new("expected literal value".to_string(), None))
        }
    }

    /// 解析 `in` 后面的列表字面量；元素按与标量相同的规则解析
    fn parse_list_literal(&mut self) -> Result<LiteralNode, ParseError> {
        let open = self.expect(&TokenKind::LBracket, "'[' after in")?;
        let start = open.span.start;
        let mut items = Vec::new();

        if !self.match_token(&TokenKind::RBracket) {
            loop {
                items.push(self.parse_scalar_literal()?.value);
                if self.match_token(&TokenKind::RBracket) {
                    break;
                }
                self.expect(&TokenKind::Comma, "',' or ']'")?;
            }
        }

        let close = self.expect(&TokenKind::RBracket, "']'")?;
        Ok(LiteralNode {
            value: Literal::List(items),
            span: Span::new(start, close.span.end),
        })
    }
}

/// 把点分的 NAME token 拆成路径段并校验每段的形状
///
/// 词法器把整个点分序列当作一个 token，段的合法性在这里检查：
/// 每段非空且以字母或下划线开头
fn split_field_path(raw: &str, span: Span) -> Result<FieldPath, ParseError> {
    let mut parts = Vec::new();
    for part in raw.split('.') {
        let valid = part
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_');
        if !valid {
            return Err(ParseError::at_position(
                format!("invalid field path \"{raw}\""),
                span,
            ));
        }
        parts.push(part.to_string());
    }
    Ok(FieldPath { parts, span })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_text(input: &str) -> Result<Expr, ParseError> {
        let tokens = tokenize(input).unwrap();
        Parser::new(&tokens).parse()
    }

    #[test]
    fn test_simple_comparison() {
        let expr = parse_text(r#"status = "active""#).unwrap();
        let Expr::Comparison { path, op, value } = expr else {
            panic!("expected comparison");
        };
        assert_eq!(path.parts, vec!["status"]);
        assert_eq!(op, CompOp::Eq);
        assert_eq!(value.value, Literal::String("active".to_string()));
    }

    #[test]
    fn test_dotted_path_is_split() {
        let expr = parse_text("author.country.name != 'fr'").unwrap();
        let Expr::Comparison { path, .. } = expr else {
            panic!("expected comparison");
        };
        assert_eq!(path.parts, vec!["author", "country", "name"]);
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let expr = parse_text("a = 1 or b = 2 and c = 3").unwrap();
        let Expr::Or(left, right) = expr else {
            panic!("expected or at the root");
        };
        assert!(matches!(*left, Expr::Comparison { .. }));
        assert!(matches!(*right, Expr::And(..)));
    }

    #[test]
    fn test_precedence_not_binds_tighter_than_and() {
        let expr = parse_text("not a = 1 and b = 2").unwrap();
        let Expr::And(left, right) = expr else {
            panic!("expected and at the root");
        };
        assert!(matches!(*left, Expr::Not(_)));
        assert!(matches!(*right, Expr::Comparison { .. }));
    }

    #[test]
    fn test_parens_override_precedence() {
        let expr = parse_text("a = 1 and (b = 2 or c = 3)").unwrap();
        let Expr::And(left, right) = expr else {
            panic!("expected and at the root");
        };
        assert!(matches!(*left, Expr::Comparison { .. }));
        assert!(matches!(*right, Expr::Or(..)));
    }

    #[test]
    fn test_or_chain_is_left_associative() {
        let expr = parse_text("a = 1 or b = 2 or c = 3").unwrap();
        let Expr::Or(left, _) = expr else {
            panic!("expected or at the root");
        };
        assert!(matches!(*left, Expr::Or(..)));
    }

    #[test]
    fn test_chained_not() {
        let expr = parse_text("not not a = 1").unwrap();
        let Expr::Not(inner) = expr else {
            panic!("expected not at the root");
        };
        assert!(matches!(*inner, Expr::Not(_)));
    }

    #[test]
    fn test_in_list() {
        let expr = parse_text(r#"tag in ["a", "b", "c"]"#).unwrap();
        let Expr::Comparison { op, value, .. } = expr else {
            panic!("expected comparison");
        };
        assert_eq!(op, CompOp::In);
        assert_eq!(
            value.value,
            Literal::List(vec![
                Literal::String("a".to_string()),
                Literal::String("b".to_string()),
                Literal::String("c".to_string()),
            ])
        );
    }

    #[test]
    fn test_in_empty_list() {
        let expr = parse_text("tag in []").unwrap();
        let Expr::Comparison { value, .. } = expr else {
            panic!("expected comparison");
        };
        assert_eq!(value.value, Literal::List(vec![]));
    }

    #[test]
    fn test_in_list_mixed_scalars() {
        let expr = parse_text("x in [1, true, null, \"s\"]").unwrap();
        let Expr::Comparison { value, .. } = expr else {
            panic!("expected comparison");
        };
        assert_eq!(
            value.value,
            Literal::List(vec![
                Literal::Number(1.0),
                Literal::Bool(true),
                Literal::Null,
                Literal::String("s".to_string()),
            ])
        );
    }

    #[test]
    fn test_in_list_trailing_comma_is_error() {
        assert!(parse_text(r#"tag in ["a",]"#).is_err());
    }

    #[test]
    fn test_in_requires_list() {
        assert!(parse_text("tag in 1").is_err());
    }

    #[test]
    fn test_nested_list_is_error() {
        assert!(parse_text("tag in [[1]]").is_err());
    }

    #[test]
    fn test_unmatched_paren_reports_end_offset() {
        let input = "(a = 1";
        let err = parse_text(input).unwrap_err();
        // 缺失的右括号在 End token 的位置被发现
        assert_eq!(err.span, Some(Span::new(input.len(), input.len())));
    }

    #[test]
    fn test_dangling_logical_keyword() {
        let err = parse_text("a = 1 and").unwrap_err();
        assert!(err.message.contains("field name"));
    }

    #[test]
    fn test_missing_operator() {
        assert!(parse_text("a 1").is_err());
        assert!(parse_text("a").is_err());
    }

    #[test]
    fn test_missing_value() {
        let err = parse_text("age >").unwrap_err();
        assert!(err.message.contains("literal value"));
    }

    #[test]
    fn test_invalid_path_segments() {
        assert!(parse_text("a. = 1").is_err());
        assert!(parse_text("a..b = 1").is_err());
        assert!(parse_text("a.1b = 1").is_err());
    }

    #[test]
    fn test_trailing_garbage() {
        let err = parse_text("a = 1 b = 2").unwrap_err();
        assert!(err.message.contains("unexpected token"));
    }

    #[test]
    fn test_value_keywords_as_literals() {
        let expr = parse_text("deleted = null").unwrap();
        let Expr::Comparison { value, .. } = expr else {
            panic!("expected comparison");
        };
        assert_eq!(value.value, Literal::Null);
    }

    #[test]
    fn test_render_reparse_is_structurally_equal() {
        // 渲染-再解析幂等性
        let inputs = [
            r#"age > 18 and status = "active""#,
            "a = 1 or (b = 2 or c = 3)",
            "not (a = 1 and b = 2) or c.d.e <= -1.5",
            r#"tag in ["a", "b"] and not flag = true"#,
            "x in []",
        ];
        for input in inputs {
            let first = parse_text(input).unwrap();
            let rendered = first.to_string();
            let second = parse_text(&rendered)
                .unwrap_or_else(|e| panic!("re-parse of {rendered:?} failed: {e}"));
            assert!(
                first.structurally_eq(&second),
                "{input:?} -> {rendered:?} changed structure"
            );
        }
    }
}
