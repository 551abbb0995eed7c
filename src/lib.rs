//! Schema-aware filter query engine: lexing, parsing, validation against an
//! entity schema, completion suggestions, and a sea-query SQL backend.

pub mod ast;
pub mod completion;
pub mod config;
pub mod lexer;
pub mod parser;
pub mod schema;
pub mod sql;
pub mod token;
pub mod validate;

pub use ast::{CompOp, Expr, FieldPath, Literal};
pub use completion::{suggest, Suggestion};
pub use config::SchemaConfig;
pub use lexer::{lex_partial, tokenize, LexError};
pub use parser::{ParseError, Parser};
pub use schema::{
    EntitySchema, FieldDescriptor, FieldType, SchemaCache, SchemaModel, DEFAULT_MAX_RELATION_DEPTH,
};
pub use sql::SqlBackend;
pub use token::{Span, Token, TokenKind};
pub use validate::{translate, Predicate, TranslateError, TypedValue};

use sea_query::SelectStatement;
use thiserror::Error;

/// Any failure on the way from query text to an executable predicate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Syntax(#[from] ParseError),
    #[error(transparent)]
    Translate(#[from] TranslateError),
}

/// Lex and parse query text into a schema-independent AST.
pub fn parse_query(text: &str) -> Result<Expr, QueryError> {
    let tokens = tokenize(text)?;
    let expr = Parser::new(&tokens).parse()?;
    Ok(expr)
}

/// Run the full pipeline: text -> tokens -> AST -> validated predicate.
pub fn translate_query(text: &str, model: &SchemaModel) -> Result<Predicate, QueryError> {
    let expr = parse_query(text)?;
    Ok(translate(&expr, model)?)
}

/// Result of the apply-search boundary: the (possibly emptied) select plus
/// at most one user-facing warning.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub select: SelectStatement,
    pub warning: Option<String>,
}

/// Filter a record collection by query text, failing open.
///
/// An empty or whitespace-only query leaves the collection untouched. Any
/// lexical, syntactic, or semantic error empties the result set (a constant
/// false WHERE clause) and reports one human-readable warning instead of
/// surfacing the error; a malformed query degrades to "no results" rather
/// than failing the surrounding request. Programmatic callers that need the
/// error itself use [`try_apply_search`].
pub fn apply_search(
    mut base: SelectStatement,
    query: &str,
    model: &SchemaModel,
    backend: &SqlBackend,
) -> SearchOutcome {
    if query.trim().is_empty() {
        return SearchOutcome {
            select: base,
            warning: None,
        };
    }
    match translate_query(query, model) {
        Ok(predicate) => {
            backend.apply(&mut base, &predicate, model);
            SearchOutcome {
                select: base,
                warning: None,
            }
        }
        Err(error) => {
            base.and_where(sea_query::Expr::val(false).into());
            SearchOutcome {
                select: base,
                warning: Some(error.to_string()),
            }
        }
    }
}

/// Structured-error variant of [`apply_search`] for callers that need to
/// distinguish failure kinds. The default boundary behavior stays fail-open.
pub fn try_apply_search(
    mut base: SelectStatement,
    query: &str,
    model: &SchemaModel,
    backend: &SqlBackend,
) -> Result<SelectStatement, QueryError> {
    if query.trim().is_empty() {
        return Ok(base);
    }
    let predicate = translate_query(query, model)?;
    backend.apply(&mut base, &predicate, model);
    Ok(base)
}

/// Introspection boundary: the serializable schema snapshot consumed by
/// client-side completion UIs. Read-only, no side effects.
pub fn describe(model: &SchemaModel) -> serde_json::Value {
    model.snapshot()
}
