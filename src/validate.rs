//! Validator/translator: checks an AST against a schema model and produces
//! the backend-neutral filter predicate.
//!
//! Translation preserves tree shape: the predicate mirrors the AST's logical
//! skeleton exactly, leaves gaining the resolved descriptor chain and a
//! coerced, type-checked value. No rewriting, folding, or pruning happens
//! here; that belongs to the executing backend.

use thiserror::Error;

use crate::ast::{CompOp, Expr, Literal};
use crate::schema::{FieldDescriptor, FieldType, ResolvedPath, SchemaModel};

/// Semantic errors raised while resolving and type-checking a query.
/// Resolution halts at the first failing node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslateError {
    #[error("cannot resolve field \"{segment}\" in \"{path}\"")]
    UnknownField { segment: String, path: String },
    #[error("relation path \"{path}\" exceeds the maximum depth of {max}")]
    PathTooDeep { path: String, max: usize },
    #[error("operator {op} is not valid for {field_type} field \"{field}\"")]
    InvalidOperatorForType {
        op: String,
        field: String,
        field_type: String,
    },
    #[error("expected a {expected} value for field \"{field}\", found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },
    #[error("\"{value}\" is not a valid choice for field \"{field}\"")]
    InvalidChoice { field: String, value: String },
    #[error("field \"{field}\" is not nullable")]
    NullNotAllowed { field: String },
}

/// A literal after coercion against the resolved field type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// Validated ISO `YYYY-MM-DD` string.
    Date(String),
    /// Validated ISO date or date-time string.
    DateTime(String),
    /// One of the field's declared choice values.
    Choice(String),
    Null,
    List(Vec<TypedValue>),
}

/// A validated comparison leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareNode {
    pub path: ResolvedPath,
    pub op: CompOp,
    pub value: TypedValue,
}

/// The backend-neutral filter predicate. Stateless and immutable once
/// produced; owned by the caller that requested translation.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Compare(CompareNode),
}

/// Translate a parsed expression against a schema model.
pub fn translate(expr: &Expr, model: &SchemaModel) -> Result<Predicate, TranslateError> {
    match expr {
        Expr::And(left, right) => Ok(Predicate::And(
            Box::new(translate(left, model)?),
            Box::new(translate(right, model)?),
        )),
        Expr::Or(left, right) => Ok(Predicate::Or(
            Box::new(translate(left, model)?),
            Box::new(translate(right, model)?),
        )),
        Expr::Not(inner) => Ok(Predicate::Not(Box::new(translate(inner, model)?))),
        Expr::Comparison { path, op, value } => {
            let resolved = model.resolve(path)?;
            check_operator(*op, resolved.target())?;
            let value = coerce_value(*op, &value.value, resolved.target())?;
            Ok(Predicate::Compare(CompareNode {
                path: resolved,
                op: *op,
                value,
            }))
        }
    }
}

/// Operator legality per field type. Equality is valid for every type,
/// ordering only for orderable types, matching only for text, `in` for any
/// scalar type. Exhaustive over [`CompOp`] so a new operator cannot slip
/// through unhandled.
fn check_operator(op: CompOp, field: &FieldDescriptor) -> Result<(), TranslateError> {
    let legal = match op {
        CompOp::Eq | CompOp::NotEq | CompOp::In => true,
        CompOp::Gt | CompOp::Gte | CompOp::Lt | CompOp::Lte => field.field_type.is_orderable(),
        CompOp::Matches | CompOp::NotMatches => field.field_type.supports_matching(),
    };
    if legal {
        Ok(())
    } else {
        Err(TranslateError::InvalidOperatorForType {
            op: op.symbol().to_string(),
            field: field.name.clone(),
            field_type: field.field_type.as_str().to_string(),
        })
    }
}

fn coerce_value(
    op: CompOp,
    literal: &Literal,
    field: &FieldDescriptor,
) -> Result<TypedValue, TranslateError> {
    if op == CompOp::In {
        let Literal::List(items) = literal else {
            return Err(mismatch(field, "list", literal));
        };
        let coerced = items
            .iter()
            .map(|item| coerce_scalar(op, item, field))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(TypedValue::List(coerced));
    }
    if matches!(literal, Literal::List(_)) {
        return Err(mismatch(field, field.field_type.as_str(), literal));
    }
    coerce_scalar(op, literal, field)
}

/// Coerce one scalar literal against the field type. Lossless coercions
/// only: numeric strings for number fields, ISO date/time strings for
/// date fields. Exhaustive over [`FieldType`].
fn coerce_scalar(
    op: CompOp,
    literal: &Literal,
    field: &FieldDescriptor,
) -> Result<TypedValue, TranslateError> {
    if let Literal::Null = literal {
        // null only combines with equality, and only on nullable fields
        if !matches!(op, CompOp::Eq | CompOp::NotEq | CompOp::In) {
            return Err(mismatch(field, field.field_type.as_str(), literal));
        }
        if !field.nullable {
            return Err(TranslateError::NullNotAllowed {
                field: field.name.clone(),
            });
        }
        return Ok(TypedValue::Null);
    }

    match field.field_type {
        FieldType::Text => match literal {
            Literal::String(s) => Ok(TypedValue::Text(s.clone())),
            _ => Err(mismatch(field, "text", literal)),
        },
        FieldType::Number => match literal {
            Literal::Number(n) => Ok(TypedValue::Number(*n)),
            Literal::String(s) if s.trim().parse::<f64>().is_ok() => {
                // numeric strings convert losslessly
                Ok(TypedValue::Number(s.trim().parse::<f64>().unwrap_or(0.0)))
            }
            _ => Err(mismatch(field, "number", literal)),
        },
        FieldType::Boolean => match literal {
            Literal::Bool(b) => Ok(TypedValue::Bool(*b)),
            _ => Err(mismatch(field, "boolean", literal)),
        },
        FieldType::Date => match literal {
            Literal::String(s) if is_iso_date(s) => Ok(TypedValue::Date(s.clone())),
            _ => Err(mismatch(field, "date", literal)),
        },
        FieldType::DateTime => match literal {
            Literal::String(s) if is_iso_date(s) || is_iso_datetime(s) => {
                Ok(TypedValue::DateTime(s.clone()))
            }
            _ => Err(mismatch(field, "datetime", literal)),
        },
        FieldType::Choice => match literal {
            Literal::String(s) => {
                if field.has_choice_value(s) {
                    Ok(TypedValue::Choice(s.clone()))
                } else {
                    Err(TranslateError::InvalidChoice {
                        field: field.name.clone(),
                        value: s.clone(),
                    })
                }
            }
            _ => Err(mismatch(field, "choice", literal)),
        },
        // resolve() never yields a relation as the comparable target
        FieldType::Relation => Err(TranslateError::UnknownField {
            segment: field.name.clone(),
            path: field.name.clone(),
        }),
    }
}

fn mismatch(field: &FieldDescriptor, expected: &str, literal: &Literal) -> TranslateError {
    TranslateError::TypeMismatch {
        field: field.name.clone(),
        expected: expected.to_string(),
        found: literal_kind(literal).to_string(),
    }
}

const fn literal_kind(literal: &Literal) -> &'static str {
    match literal {
        Literal::String(_) => "string",
        Literal::Number(_) => "number",
        Literal::Bool(_) => "boolean",
        Literal::Null => "null",
        Literal::List(_) => "list",
    }
}

/// `YYYY-MM-DD` with plausible month and day ranges.
fn is_iso_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }
    let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);
    if !digits(0..4) || !digits(5..7) || !digits(8..10) {
        return false;
    }
    let month: u8 = s[5..7].parse().unwrap_or(0);
    let day: u8 = s[8..10].parse().unwrap_or(0);
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

/// ISO date, a `T` or space separator, then `HH:MM` or `HH:MM:SS`.
fn is_iso_datetime(s: &str) -> bool {
    if s.len() < 16 || !s.is_char_boundary(10) {
        return false;
    }
    let (date, rest) = s.split_at(10);
    if !is_iso_date(date) {
        return false;
    }
    let mut chars = rest.chars();
    if !matches!(chars.next(), Some('T' | ' ')) {
        return false;
    }
    let time = &rest[1..];
    let parts: Vec<&str> = time.split(':').collect();
    if !(parts.len() == 2 || parts.len() == 3) {
        return false;
    }
    let in_range = |part: &str, max: u8| {
        part.len() == 2
            && part.bytes().all(|b| b.is_ascii_digit())
            && part.parse::<u8>().is_ok_and(|v| v < max)
    };
    in_range(parts[0], 24) && parts[1..].iter().all(|p| in_range(p, 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;
    use crate::schema::{EntitySchema, FieldDescriptor, SchemaModel};

    fn model() -> SchemaModel {
        SchemaModel::builder("book")
            .entity(EntitySchema::new(
                "book",
                vec![
                    FieldDescriptor::text("name"),
                    FieldDescriptor::number("age"),
                    FieldDescriptor::choice(
                        "status",
                        [("active", "Active"), ("inactive", "Inactive")],
                    ),
                    FieldDescriptor::choice("tag", [("a", "A"), ("b", "B"), ("c", "C")]),
                    FieldDescriptor::boolean("archived"),
                    FieldDescriptor::date("published"),
                    FieldDescriptor::datetime("updated_at"),
                    FieldDescriptor::text("notes").nullable(),
                    FieldDescriptor::relation("author", "author"),
                ],
            ))
            .entity(EntitySchema::new(
                "author",
                vec![FieldDescriptor::text("name"), FieldDescriptor::number("age")],
            ))
            .build()
            .unwrap()
    }

    fn translate_text(input: &str) -> Result<Predicate, TranslateError> {
        let tokens = tokenize(input).unwrap();
        let expr = Parser::new(&tokens).parse().unwrap();
        translate(&expr, &model())
    }

    fn shape(predicate: &Predicate) -> String {
        match predicate {
            Predicate::And(l, r) => format!("and({},{})", shape(l), shape(r)),
            Predicate::Or(l, r) => format!("or({},{})", shape(l), shape(r)),
            Predicate::Not(inner) => format!("not({})", shape(inner)),
            Predicate::Compare(_) => "cmp".to_string(),
        }
    }

    #[test]
    fn test_and_of_ordering_and_choice() {
        let predicate = translate_text(r#"age > 18 and status = "active""#).unwrap();
        assert_eq!(shape(&predicate), "and(cmp,cmp)");
        let Predicate::And(left, right) = predicate else {
            panic!("expected and");
        };
        let Predicate::Compare(age) = *left else {
            panic!("expected comparison");
        };
        assert_eq!(age.op, CompOp::Gt);
        assert_eq!(age.value, TypedValue::Number(18.0));
        let Predicate::Compare(status) = *right else {
            panic!("expected comparison");
        };
        assert_eq!(status.op, CompOp::Eq);
        assert_eq!(status.value, TypedValue::Choice("active".to_string()));
    }

    #[test]
    fn test_matches_on_text_ok_on_number_fails() {
        let predicate = translate_text(r#"name ~ "^A""#).unwrap();
        let Predicate::Compare(node) = predicate else {
            panic!("expected comparison");
        };
        assert_eq!(node.op, CompOp::Matches);
        assert_eq!(node.value, TypedValue::Text("^A".to_string()));

        let err = translate_text(r#"age ~ "^A""#).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::InvalidOperatorForType { .. }
        ));
    }

    #[test]
    fn test_in_choice_list() {
        let predicate = translate_text(r#"tag in ["a", "b"]"#).unwrap();
        let Predicate::Compare(node) = predicate else {
            panic!("expected comparison");
        };
        assert_eq!(
            node.value,
            TypedValue::List(vec![
                TypedValue::Choice("a".to_string()),
                TypedValue::Choice("b".to_string()),
            ])
        );
    }

    #[test]
    fn test_in_invalid_choice_names_value() {
        let err = translate_text(r#"tag in ["a", "z"]"#).unwrap_err();
        let TranslateError::InvalidChoice { value, .. } = err else {
            panic!("expected InvalidChoice, got {err:?}");
        };
        assert_eq!(value, "z");
    }

    #[test]
    fn test_empty_in_list_validates() {
        let predicate = translate_text("tag in []").unwrap();
        let Predicate::Compare(node) = predicate else {
            panic!("expected comparison");
        };
        assert_eq!(node.value, TypedValue::List(vec![]));
    }

    #[test]
    fn test_shape_is_isomorphic_to_ast() {
        let predicate =
            translate_text(r#"not (age > 1 and name = "x") or status != "active""#).unwrap();
        assert_eq!(shape(&predicate), "or(not(and(cmp,cmp)),cmp)");
    }

    #[test]
    fn test_unknown_field() {
        let err = translate_text("height = 1").unwrap_err();
        assert!(matches!(err, TranslateError::UnknownField { .. }));
    }

    #[test]
    fn test_numeric_string_coerces() {
        let predicate = translate_text(r#"age = "42""#).unwrap();
        let Predicate::Compare(node) = predicate else {
            panic!("expected comparison");
        };
        assert_eq!(node.value, TypedValue::Number(42.0));
    }

    #[test]
    fn test_number_against_text_is_mismatch() {
        let err = translate_text("name = 42").unwrap_err();
        let TranslateError::TypeMismatch { expected, found, .. } = err else {
            panic!("expected TypeMismatch, got {err:?}");
        };
        assert_eq!(expected, "text");
        assert_eq!(found, "number");
    }

    #[test]
    fn test_boolean_rules() {
        assert!(translate_text("archived = true").is_ok());
        assert!(translate_text("archived = 1").is_err());
        // booleans are not orderable
        assert!(matches!(
            translate_text("archived > false").unwrap_err(),
            TranslateError::InvalidOperatorForType { .. }
        ));
    }

    #[test]
    fn test_date_rules() {
        assert!(translate_text(r#"published >= "2024-01-31""#).is_ok());
        assert!(translate_text(r#"published = "31/01/2024""#).is_err());
        assert!(translate_text(r#"updated_at < "2024-01-31 12:30""#).is_ok());
        assert!(translate_text(r#"updated_at < "2024-01-31T12:30:59""#).is_ok());
        // a bare date is a lossless datetime
        assert!(translate_text(r#"updated_at >= "2024-01-31""#).is_ok());
        assert!(translate_text(r#"updated_at < "2024-01-31 25:00""#).is_err());
    }

    #[test]
    fn test_null_rules() {
        assert!(translate_text("notes = null").is_ok());
        assert!(matches!(
            translate_text("name = null").unwrap_err(),
            TranslateError::NullNotAllowed { .. }
        ));
        // null cannot be an ordering operand even on nullable fields
        assert!(translate_text("notes > null").is_err());
    }

    #[test]
    fn test_relation_path_resolves_into_related_entity() {
        let predicate = translate_text("author.age >= 30").unwrap();
        let Predicate::Compare(node) = predicate else {
            panic!("expected comparison");
        };
        assert_eq!(node.path.chain.len(), 2);
        assert_eq!(node.path.target().name, "age");
    }

    #[test]
    fn test_iso_helpers() {
        assert!(is_iso_date("2024-02-29"));
        assert!(!is_iso_date("2024-13-01"));
        assert!(!is_iso_date("2024-1-01"));
        assert!(is_iso_datetime("2024-02-29T23:59"));
        assert!(is_iso_datetime("2024-02-29 23:59:59"));
        assert!(!is_iso_datetime("2024-02-29"));
        assert!(!is_iso_datetime("2024-02-29T24:00"));
    }
}
