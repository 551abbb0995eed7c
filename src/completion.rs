//! Context-aware completion for partial query text.
//!
//! Completion re-lexes the text up to the cursor, tolerating one trailing
//! incomplete token, classifies the syntactic context from the last complete
//! tokens, and consults the schema model for what may come next. It is
//! advisory only: nothing here blocks or validates, and submitted text always
//! goes through the full lex/parse/translate pipeline.

use crate::lexer::lex_partial;
use crate::schema::{EntitySchema, FieldDescriptor, FieldType, SchemaModel};
use crate::token::{Span, Token, TokenKind};

/// One ranked completion candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    /// Human-readable label shown in the list.
    pub label: String,
    /// Text to insert over the replacement span.
    pub insert: String,
    /// The span of input the insertion replaces. Empty when the suggestion
    /// is a pure insertion at the cursor.
    pub replace: Span,
}

impl Suggestion {
    fn new(label: impl Into<String>, insert: impl Into<String>, replace: Span) -> Self {
        Self {
            label: label.into(),
            insert: insert.into(),
            replace,
        }
    }

    fn word(text: &str, replace: Span) -> Self {
        Self::new(text, text, replace)
    }
}

/// What the grammar expects at the cursor.
enum Context<'m> {
    /// A field name, `not`, or an opening parenthesis.
    Field,
    /// An operator legal for the already-typed field.
    Operator(&'m FieldDescriptor),
    /// A literal value for the field, possibly inside a list.
    Value {
        field: &'m FieldDescriptor,
        in_list: bool,
    },
    /// `[` right after `in`.
    ListOpen,
    /// A logical connector or a closing delimiter.
    Connector,
}

/// Produce ranked suggestions for `text` with the cursor at byte offset
/// `cursor`. Prefix matches rank first; declaration order breaks ties.
pub fn suggest(text: &str, cursor: usize, model: &SchemaModel) -> Vec<Suggestion> {
    let cursor = cursor.min(text.len());
    let (tokens, partial) = lex_partial(text, cursor);

    let (replace, prefix) = match &partial {
        Some(p) => {
            // a partial string keeps its opening quote in the raw text
            let prefix = p.text.trim_start_matches(['"', '\'']);
            (p.span, prefix)
        }
        None => (Span::new(cursor, cursor), ""),
    };

    let Some(context) = classify(&tokens, model) else {
        return Vec::new();
    };

    let mut suggestions = match context {
        Context::Field => field_suggestions(model, prefix, replace),
        Context::Operator(field) => operator_suggestions(field, replace),
        Context::Value { field, in_list } => value_suggestions(field, in_list, replace),
        Context::ListOpen => vec![Suggestion::word("[", replace)],
        Context::Connector => connector_suggestions(&tokens, replace),
    };

    // a dotted partial ranks against its trailing segment only
    let rank_prefix = prefix.rsplit('.').next().unwrap_or(prefix);
    rank(&mut suggestions, rank_prefix);
    suggestions
}

/// Decide the syntactic context from the last complete token. Returns None
/// when the prefix is malformed beyond suggestion (e.g. an unknown field
/// before an operator).
fn classify<'m>(tokens: &[Token<'_>], model: &'m SchemaModel) -> Option<Context<'m>> {
    let Some(last) = tokens.last() else {
        return Some(Context::Field);
    };
    match &last.kind {
        TokenKind::And | TokenKind::Or | TokenKind::Not | TokenKind::LParen => {
            Some(Context::Field)
        }
        TokenKind::Name(raw) => {
            let field = resolve_dotted(model, raw)?;
            Some(Context::Operator(field))
        }
        TokenKind::In => Some(Context::ListOpen),
        TokenKind::Eq
        | TokenKind::NotEq
        | TokenKind::Gt
        | TokenKind::Gte
        | TokenKind::Lt
        | TokenKind::Lte
        | TokenKind::Matches
        | TokenKind::NotMatches => {
            let field = field_before_operator(tokens, tokens.len() - 1, model)?;
            Some(Context::Value {
                field,
                in_list: false,
            })
        }
        TokenKind::LBracket | TokenKind::Comma => {
            let in_index = tokens.iter().rposition(|t| t.kind == TokenKind::In)?;
            let field = field_before_operator(tokens, in_index, model)?;
            Some(Context::Value {
                field,
                in_list: true,
            })
        }
        TokenKind::String(_)
        | TokenKind::Number(_)
        | TokenKind::Bool(_)
        | TokenKind::Null
        | TokenKind::RParen
        | TokenKind::RBracket => Some(Context::Connector),
        TokenKind::Illegal | TokenKind::End => None,
    }
}

/// The Name token immediately before the operator at `op_index`, resolved.
fn field_before_operator<'m>(
    tokens: &[Token<'_>],
    op_index: usize,
    model: &'m SchemaModel,
) -> Option<&'m FieldDescriptor> {
    let previous = tokens.get(op_index.checked_sub(1)?)?;
    let TokenKind::Name(raw) = &previous.kind else {
        return None;
    };
    resolve_dotted(model, raw)
}

/// Resolve a complete dotted path to its final non-relation field.
fn resolve_dotted<'m>(model: &'m SchemaModel, raw: &str) -> Option<&'m FieldDescriptor> {
    let mut segments = raw.split('.');
    let last = segments.next_back()?;
    let entity = navigate(model, segments)?;
    let field = entity.field(last)?;
    (field.field_type != FieldType::Relation).then_some(field)
}

/// Follow a sequence of relation names from the root entity, bounded by the
/// model's maximum relation depth.
fn navigate<'m, 'i>(
    model: &'m SchemaModel,
    segments: impl Iterator<Item = &'i str>,
) -> Option<&'m EntitySchema> {
    let mut entity = model.root();
    for (hops, segment) in segments.enumerate() {
        if hops >= model.max_relation_depth() {
            return None;
        }
        let field = entity.field(segment)?;
        if field.field_type != FieldType::Relation {
            return None;
        }
        entity = model.entity(field.relation.as_deref()?)?;
    }
    Some(entity)
}

/// Suggest field names at the entity the dotted prefix navigates to, plus
/// `not` and `(` at the start of a clause.
fn field_suggestions(model: &SchemaModel, prefix: &str, replace: Span) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    match prefix.rfind('.') {
        Some(dot) => {
            // after a dotted relation prefix, suggest that relation's fields
            // and replace only the trailing segment
            let Some(entity) = navigate(model, prefix[..dot].split('.')) else {
                return suggestions;
            };
            let replace = Span::new(replace.start + dot + 1, replace.end);
            for field in &entity.fields {
                suggestions.push(Suggestion::word(&field.name, replace));
            }
        }
        None => {
            for field in &model.root().fields {
                suggestions.push(Suggestion::word(&field.name, replace));
            }
            suggestions.push(Suggestion::word("not", replace));
            suggestions.push(Suggestion::word("(", replace));
        }
    }
    suggestions
}

/// Only the operators legal for the field's type, equality first.
fn operator_suggestions(field: &FieldDescriptor, replace: Span) -> Vec<Suggestion> {
    let mut suggestions = vec![
        Suggestion::word("=", replace),
        Suggestion::word("!=", replace),
    ];
    if field.field_type.is_orderable() {
        for op in [">", ">=", "<", "<="] {
            suggestions.push(Suggestion::word(op, replace));
        }
    }
    if field.field_type.supports_matching() {
        suggestions.push(Suggestion::word("~", replace));
        suggestions.push(Suggestion::word("!~", replace));
    }
    suggestions.push(Suggestion::word("in", replace));
    suggestions
}

/// Concrete values the schema knows about: declared choices, booleans, and
/// `null` for nullable fields.
fn value_suggestions(field: &FieldDescriptor, in_list: bool, replace: Span) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();
    match field.field_type {
        FieldType::Choice => {
            for choice in &field.choices {
                suggestions.push(Suggestion::new(
                    &choice.value,
                    format!("\"{}\"", choice.value),
                    replace,
                ));
            }
        }
        FieldType::Boolean => {
            suggestions.push(Suggestion::word("true", replace));
            suggestions.push(Suggestion::word("false", replace));
        }
        FieldType::Text
        | FieldType::Number
        | FieldType::Date
        | FieldType::DateTime
        | FieldType::Relation => {}
    }
    if field.nullable && !in_list {
        suggestions.push(Suggestion::word("null", replace));
    }
    suggestions
}

/// Logical connectors, plus whichever closing delimiter is still open.
fn connector_suggestions(tokens: &[Token<'_>], replace: Span) -> Vec<Suggestion> {
    let open = |open_kind: TokenKind<'static>, close_kind: TokenKind<'static>| {
        let opened = tokens.iter().filter(|t| t.kind == open_kind).count();
        let closed = tokens.iter().filter(|t| t.kind == close_kind).count();
        opened > closed
    };
    if open(TokenKind::LBracket, TokenKind::RBracket) {
        return vec![
            Suggestion::word(",", replace),
            Suggestion::word("]", replace),
        ];
    }
    let mut suggestions = vec![
        Suggestion::word("and", replace),
        Suggestion::word("or", replace),
    ];
    if open(TokenKind::LParen, TokenKind::RParen) {
        suggestions.push(Suggestion::word(")", replace));
    }
    suggestions
}

/// Stable sort: prefix matches first, declaration order within each group.
fn rank(suggestions: &mut [Suggestion], prefix: &str) {
    if prefix.is_empty() {
        return;
    }
    let prefix = prefix.to_ascii_lowercase();
    suggestions.sort_by_key(|s| !s.label.to_ascii_lowercase().starts_with(&prefix));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, FieldDescriptor, SchemaModel};

    fn model() -> SchemaModel {
        SchemaModel::builder("book")
            .entity(EntitySchema::new(
                "book",
                vec![
                    FieldDescriptor::text("title"),
                    FieldDescriptor::number("price"),
                    FieldDescriptor::choice("genre", [("fiction", "Fiction"), ("essay", "Essay")]),
                    FieldDescriptor::boolean("available"),
                    FieldDescriptor::text("notes").nullable(),
                    FieldDescriptor::relation("author", "author"),
                ],
            ))
            .entity(EntitySchema::new(
                "author",
                vec![
                    FieldDescriptor::text("name"),
                    FieldDescriptor::number("age"),
                    FieldDescriptor::relation("country", "country"),
                ],
            ))
            .entity(EntitySchema::new(
                "country",
                vec![FieldDescriptor::text("name"), FieldDescriptor::text("code")],
            ))
            .build()
            .unwrap()
    }

    fn labels(suggestions: &[Suggestion]) -> Vec<&str> {
        suggestions.iter().map(|s| s.label.as_str()).collect()
    }

    #[test]
    fn test_empty_input_suggests_fields() {
        let suggestions = suggest("", 0, &model());
        assert_eq!(
            labels(&suggestions),
            vec!["title", "price", "genre", "available", "notes", "author", "not", "("]
        );
    }

    #[test]
    fn test_partial_field_prefix_ranks_matches_first() {
        let suggestions = suggest("ti", 2, &model());
        assert_eq!(suggestions[0].label, "title");
        assert_eq!(suggestions[0].replace, Span::new(0, 2));
        assert_eq!(suggestions[0].insert, "title");
    }

    #[test]
    fn test_relation_prefix_suggests_related_fields() {
        let text = "author.coun";
        let suggestions = suggest(text, text.len(), &model());
        // country ranks above the unrelated fields of the author entity
        assert_eq!(suggestions[0].label, "country");
        // only the trailing segment is replaced
        assert_eq!(suggestions[0].replace, Span::new(7, 11));
        assert!(labels(&suggestions).contains(&"name"));
    }

    #[test]
    fn test_trailing_dot_suggests_all_related_fields() {
        let text = "author.country.";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(labels(&suggestions), vec!["name", "code"]);
        assert_eq!(suggestions[0].replace, Span::new(15, 15));
    }

    #[test]
    fn test_operator_context_respects_field_type() {
        let text = "price ";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(
            labels(&suggestions),
            vec!["=", "!=", ">", ">=", "<", "<=", "in"]
        );

        let text = "title ";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(labels(&suggestions), vec!["=", "!=", "~", "!~", "in"]);
    }

    #[test]
    fn test_partial_operator_keyword() {
        let text = "price i";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(suggestions[0].label, "in");
    }

    #[test]
    fn test_choice_values_after_operator() {
        let text = "genre = ";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(labels(&suggestions), vec!["fiction", "essay"]);
        assert_eq!(suggestions[0].insert, "\"fiction\"");
    }

    #[test]
    fn test_partial_quoted_choice_value() {
        let text = "genre = \"es";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(suggestions[0].label, "essay");
        assert_eq!(suggestions[0].replace, Span::new(8, 11));
    }

    #[test]
    fn test_boolean_and_null_values() {
        let text = "available = ";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(labels(&suggestions), vec!["true", "false"]);

        let text = "notes = ";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(labels(&suggestions), vec!["null"]);
    }

    #[test]
    fn test_list_open_after_in() {
        let text = "genre in ";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(labels(&suggestions), vec!["["]);
    }

    #[test]
    fn test_choices_inside_list() {
        let text = "genre in [\"fiction\", ";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(labels(&suggestions), vec!["fiction", "essay"]);
    }

    #[test]
    fn test_connectors_after_value() {
        let text = "price > 10 ";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(labels(&suggestions), vec!["and", "or"]);
    }

    #[test]
    fn test_closing_paren_suggested_when_open() {
        let text = "(price > 10 ";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(labels(&suggestions), vec!["and", "or", ")"]);
    }

    #[test]
    fn test_closing_bracket_inside_list() {
        let text = "genre in [\"fiction\"";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(labels(&suggestions), vec![",", "]"]);
    }

    #[test]
    fn test_partial_connector() {
        let text = "price > 10 o";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(suggestions[0].label, "or");
    }

    #[test]
    fn test_unknown_field_yields_nothing() {
        let text = "ghost ";
        let suggestions = suggest(text, text.len(), &model());
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_advisory_on_lexically_broken_input() {
        // the already-lexed prefix is preserved, the broken tail ignored
        let text = "price # ";
        let suggestions = suggest(text, text.len(), &model());
        assert_eq!(labels(&suggestions)[0], "=");
    }

    #[test]
    fn test_cursor_mid_text_replaces_current_word() {
        let text = "ti > 10";
        let suggestions = suggest(text, 2, &model());
        assert_eq!(suggestions[0].label, "title");
        assert_eq!(suggestions[0].replace, Span::new(0, 2));
    }
}
