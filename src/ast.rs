//! 过滤表达式的 AST 定义
//!
//! 解析器产出的语法树与 schema 无关：字段路径只是名字序列，字面量只带
//! 词法上的种类。类型检查与字段解析全部推迟到 validate 阶段。

use std::fmt;

use crate::token::Span;

/// 点分的字段路径, 例如：`author.country.name`
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPath {
    /// 按嵌套层级排列的名字序列
    pub parts: Vec<String>,
    pub span: Span,
}

impl FieldPath {
    pub fn joined(&self) -> String {
        self.parts.join(".")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.joined())
    }
}

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,         // =
    NotEq,      // !=
    Gt,         // >
    Gte,        // >=
    Lt,         // <
    Lte,        // <=
    Matches,    // ~
    NotMatches, // !~
    In,         // in
}

impl CompOp {
    pub const fn symbol(&self) -> &'static str {
        match self {
            CompOp::Eq => "=",
            CompOp::NotEq => "!=",
            CompOp::Gt => ">",
            CompOp::Gte => ">=",
            CompOp::Lt => "<",
            CompOp::Lte => "<=",
            CompOp::Matches => "~",
            CompOp::NotMatches => "!~",
            CompOp::In => "in",
        }
    }

    /// 排序类运算符：只对可排序的字段类型合法
    pub const fn is_ordering(&self) -> bool {
        matches!(self, CompOp::Gt | CompOp::Gte | CompOp::Lt | CompOp::Lte)
    }
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// 字面量值，只携带词法种类；具体类型在 validate 阶段确定
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    /// 列表字面量，元素一定是标量。空列表合法，语义是"不匹配任何记录"
    List(Vec<Literal>),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")
            }
            Literal::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Null => f.write_str("null"),
            Literal::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// 带源位置的字面量节点
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralNode {
    pub value: Literal,
    pub span: Span,
}

/// 条件表达式树
///
/// 括号只决定树的形状，不会产生单独的节点，因此翻译出的谓词树
/// 与 AST 严格同构
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// 逻辑与运算 (AND)
    And(Box<Expr>, Box<Expr>),
    /// 逻辑或运算 (OR)
    Or(Box<Expr>, Box<Expr>),
    /// 逻辑非运算 (NOT)
    Not(Box<Expr>),
    /// 基础比较运算, 这是条件的叶子节点
    Comparison {
        path: FieldPath,
        op: CompOp,
        value: LiteralNode,
    },
}

impl Expr {
    const fn precedence(&self) -> u8 {
        match self {
            Expr::Or(..) => 1,
            Expr::And(..) => 2,
            Expr::Not(..) => 3,
            Expr::Comparison { .. } => 4,
        }
    }

    /// 按优先级渲染；右子树在同级时加括号，保证重新解析得到相同的树形
    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
        let prec = self.precedence();
        let parens = prec < parent;
        if parens {
            f.write_str("(")?;
        }
        match self {
            Expr::Or(left, right) => {
                left.fmt_prec(f, prec)?;
                f.write_str(" or ")?;
                right.fmt_prec(f, prec + 1)?;
            }
            Expr::And(left, right) => {
                left.fmt_prec(f, prec)?;
                f.write_str(" and ")?;
                right.fmt_prec(f, prec + 1)?;
            }
            Expr::Not(inner) => {
                f.write_str("not ")?;
                inner.fmt_prec(f, prec)?;
            }
            Expr::Comparison { path, op, value } => {
                write!(f, "{path} {op} {}", value.value)?;
            }
        }
        if parens {
            f.write_str(")")?;
        }
        Ok(())
    }

    /// 忽略 span 的结构等价比较；幂等性测试用
    pub fn structurally_eq(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::And(l1, r1), Expr::And(l2, r2)) | (Expr::Or(l1, r1), Expr::Or(l2, r2)) => {
                l1.structurally_eq(l2) && r1.structurally_eq(r2)
            }
            (Expr::Not(a), Expr::Not(b)) => a.structurally_eq(b),
            (
                Expr::Comparison {
                    path: p1,
                    op: o1,
                    value: v1,
                },
                Expr::Comparison {
                    path: p2,
                    op: o2,
                    value: v2,
                },
            ) => p1.parts == p2.parts && o1 == o2 && v1.value == v2.value,
            _ => false,
        }
    }
}

/// 规范化渲染：`parse(render(ast))` 与原始 AST 结构等价
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}
