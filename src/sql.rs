//! SQL backend that renders validated predicates into queries using sea-query.
//!
//! This is one executor for the backend-neutral [`Predicate`]: it maps entity
//! names to tables, turns relation chains into inner joins, and compiles the
//! predicate tree into a WHERE condition. The engine itself stays storage
//! agnostic; callers with a different store can walk the predicate directly.

use std::collections::HashMap;
use std::fmt::Write;

use sea_query::{
    Asterisk, Expr, Func, Iden, JoinType, PostgresQueryBuilder, SelectStatement, SimpleExpr, Value,
};

use crate::ast::CompOp;
use crate::schema::SchemaModel;
use crate::validate::{CompareNode, Predicate, TypedValue};

/// Table identifier wrapper for sea-query.
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Column identifier wrapper.
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Compiles predicates into SQL for a conventional relational layout:
/// one table per entity, `<relation>_id` foreign keys, `id` primary keys.
#[derive(Debug, Clone, Default)]
pub struct SqlBackend {
    /// Maps entity names to table names; unmapped entities fall back to the
    /// lowercased entity name.
    table_mapping: HashMap<String, String>,
}

impl SqlBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mapping(table_mapping: HashMap<String, String>) -> Self {
        Self { table_mapping }
    }

    /// Get the actual table name for an entity.
    pub fn table_name(&self, entity: &str) -> String {
        self.table_mapping
            .get(entity)
            .cloned()
            .unwrap_or_else(|| entity.to_lowercase())
    }

    /// A `SELECT * FROM <root table>` to filter against.
    pub fn select_from(&self, model: &SchemaModel) -> SelectStatement {
        let mut select = SelectStatement::new();
        select.column(Asterisk);
        select.from(TableName(self.table_name(model.root_name())));
        select
    }

    /// Apply a predicate to an existing select: joins for every relation
    /// chain the predicate touches, then the compiled WHERE condition.
    pub fn apply(&self, select: &mut SelectStatement, predicate: &Predicate, model: &SchemaModel) {
        let base = self.table_name(model.root_name());
        let mut joined = Vec::new();
        self.add_joins(select, predicate, &base, &mut joined);
        select.and_where(self.condition(predicate, &base));
    }

    /// Compile from scratch: base select plus the applied predicate.
    pub fn compile(&self, predicate: &Predicate, model: &SchemaModel) -> SelectStatement {
        let mut select = self.select_from(model);
        self.apply(&mut select, predicate, model);
        select
    }

    /// Render a select with the Postgres builder.
    pub fn to_sql(select: &SelectStatement) -> String {
        select.to_string(PostgresQueryBuilder)
    }

    /// Walk the predicate and add one inner join per distinct relation step,
    /// aliased by the relation path so `author.country` and a plain `author`
    /// comparison share the `author` join.
    fn add_joins(
        &self,
        select: &mut SelectStatement,
        predicate: &Predicate,
        base: &str,
        joined: &mut Vec<String>,
    ) {
        match predicate {
            Predicate::And(left, right) | Predicate::Or(left, right) => {
                self.add_joins(select, left, base, joined);
                self.add_joins(select, right, base, joined);
            }
            Predicate::Not(inner) => self.add_joins(select, inner, base, joined),
            Predicate::Compare(node) => {
                let mut parent = base.to_string();
                let mut alias = String::new();
                for step in node.path.relations() {
                    if !alias.is_empty() {
                        alias.push_str("__");
                    }
                    alias.push_str(&step.name);
                    if !joined.contains(&alias) {
                        let target = step.relation.as_deref().unwrap_or_default();
                        select.join_as(
                            JoinType::InnerJoin,
                            TableName(self.table_name(target)),
                            TableName(alias.clone()),
                            Expr::col((
                                TableName(parent.clone()),
                                ColumnName(format!("{}_id", step.name)),
                            ))
                            .equals((TableName(alias.clone()), ColumnName("id".to_string()))),
                        );
                        joined.push(alias.clone());
                    }
                    parent = alias.clone();
                }
            }
        }
    }

    /// Compile a predicate subtree into a WHERE condition.
    fn condition(&self, predicate: &Predicate, base: &str) -> SimpleExpr {
        match predicate {
            Predicate::And(left, right) => {
                self.condition(left, base).and(self.condition(right, base))
            }
            Predicate::Or(left, right) => {
                self.condition(left, base).or(self.condition(right, base))
            }
            Predicate::Not(inner) => self.condition(inner, base).not(),
            Predicate::Compare(node) => self.comparison(node, base),
        }
    }

    fn comparison(&self, node: &CompareNode, base: &str) -> SimpleExpr {
        let qualifier = node
            .path
            .relations()
            .iter()
            .map(|step| step.name.as_str())
            .collect::<Vec<_>>()
            .join("__");
        let table = if qualifier.is_empty() {
            base.to_string()
        } else {
            qualifier
        };
        let col = || {
            Expr::col((
                TableName(table.clone()),
                ColumnName(node.path.target().name.clone()),
            ))
        };

        match node.op {
            CompOp::Eq => match &node.value {
                TypedValue::Null => col().is_null(),
                value => col().eq(scalar_value(value)),
            },
            CompOp::NotEq => match &node.value {
                TypedValue::Null => col().is_not_null(),
                value => col().ne(scalar_value(value)),
            },
            CompOp::Gt => col().gt(scalar_value(&node.value)),
            CompOp::Gte => col().gte(scalar_value(&node.value)),
            CompOp::Lt => col().lt(scalar_value(&node.value)),
            CompOp::Lte => col().lte(scalar_value(&node.value)),
            // case-insensitive containment, the backend rendering of `~`
            CompOp::Matches => {
                Expr::expr(Func::lower(col())).like(contains_pattern(&node.value))
            }
            CompOp::NotMatches => {
                Expr::expr(Func::lower(col())).not_like(contains_pattern(&node.value))
            }
            CompOp::In => match &node.value {
                TypedValue::List(items) if items.is_empty() => {
                    // IN () is not valid SQL; an empty list matches nothing
                    Expr::val(false).into()
                }
                TypedValue::List(items) => {
                    col().is_in(items.iter().map(scalar_value).collect::<Vec<_>>())
                }
                value => col().eq(scalar_value(value)),
            },
        }
    }
}

fn contains_pattern(value: &TypedValue) -> String {
    match value {
        TypedValue::Text(s) => format!("%{}%", s.to_lowercase()),
        _ => "%%".to_string(),
    }
}

/// Convert a coerced scalar to a sea-query value.
fn scalar_value(value: &TypedValue) -> Value {
    match value {
        TypedValue::Text(s) | TypedValue::Choice(s) => Value::String(Some(Box::new(s.clone()))),
        TypedValue::Date(s) | TypedValue::DateTime(s) => Value::String(Some(Box::new(s.clone()))),
        TypedValue::Number(n) => {
            if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 {
                Value::BigInt(Some(*n as i64))
            } else {
                Value::Double(Some(*n))
            }
        }
        TypedValue::Bool(b) => Value::Bool(Some(*b)),
        TypedValue::Null => Value::String(None),
        // lists never reach scalar position; `in` unpacks them above
        TypedValue::List(_) => Value::String(None),
    }
}
