use sea_orm::{ColumnTrait, Condition, DatabaseBackend, EntityTrait};
use serde_json::Value;

use super::conditions::{contains_case_sensitive, contains_pattern, like_expr, resolve_column};
use crate::errors::ApiError;

// Basic safety limits
const MAX_SEARCH_QUERY_LENGTH: usize = 10_000;

/// Raw `q` parameter: one term or a list of terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchInput {
    Term(String),
    Terms(Vec<String>),
}

impl SearchInput {
    /// Read `q` from a decoded JSON value. Objects are kept as their JSON text so that an
    /// in-process `{"or": [...]}` behaves like the query-string form.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Self::Term(s.clone())),
            Value::Array(items) => Some(Self::Terms(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            )),
            other => Some(Self::Term(other.to_string())),
        }
    }
}

/// Parsed form of `q`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchExpression {
    /// OR of AND groups, each group a list of `(field, value)` case-sensitive substring matches.
    AnyOf(Vec<Vec<(String, String)>>),
    /// Every term must match some searchable field.
    AllTerms(Vec<String>),
    /// The term must match some searchable field.
    Term(String),
}

fn truncate(input: &str) -> &str {
    if input.len() <= MAX_SEARCH_QUERY_LENGTH {
        return input;
    }
    let mut end = MAX_SEARCH_QUERY_LENGTH;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}

/// The textual preconditions for attempting an OR expression.
fn looks_like_or_expression(term: &str) -> bool {
    term.contains("or") && term.starts_with('{') && term.ends_with('}')
}

fn group_pairs(element: &Value) -> Option<Vec<(String, String)>> {
    let decoded;
    let object = match element {
        Value::String(encoded) => {
            decoded = serde_json::from_str::<Value>(encoded).ok()?;
            decoded.as_object()?
        }
        Value::Object(object) => object,
        _ => return None,
    };
    object
        .iter()
        .map(|(field, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((field.clone(), text))
        })
        .collect()
}

fn parse_or_expression(term: &str) -> Option<Vec<Vec<(String, String)>>> {
    let parsed = serde_json::from_str::<Value>(term).ok()?;
    let elements = parsed.as_object()?.get("or")?.as_array()?;
    elements
        .iter()
        .map(group_pairs)
        .collect::<Option<Vec<_>>>()
        .map(|groups| groups.into_iter().filter(|g| !g.is_empty()).collect())
}

impl SearchExpression {
    #[must_use]
    pub fn parse(input: &SearchInput) -> Self {
        match input {
            SearchInput::Terms(terms) => {
                Self::AllTerms(terms.iter().map(|t| truncate(t).to_string()).collect())
            }
            SearchInput::Term(term) => {
                let term = truncate(term);
                if looks_like_or_expression(term) {
                    if let Some(groups) = parse_or_expression(term) {
                        return Self::AnyOf(groups);
                    }
                    tracing::debug!(
                        term,
                        "Malformed OR search expression, treating it as a plain term"
                    );
                }
                Self::Term(term.to_string())
            }
        }
    }

    /// Compile into one grouped clause. `Ok(None)` means the search adds nothing to the query.
    ///
    /// # Errors
    ///
    /// `ApiError::DataError` when an OR expression names a column the entity does not have.
    pub fn compile<E: EntityTrait>(
        &self,
        searchable: &[E::Column],
        backend: DatabaseBackend,
    ) -> Result<Option<Condition>, ApiError> {
        if searchable.is_empty() {
            return Ok(None);
        }

        let condition = match self {
            Self::AnyOf(groups) => {
                if groups.is_empty() {
                    return Ok(None);
                }
                let mut any = Condition::any();
                for group in groups {
                    let mut all = Condition::all();
                    for (field, value) in group {
                        let column = resolve_column::<E>(field)?;
                        let escaped = value.replace('\\', "\\\\");
                        all = all.add(contains_case_sensitive(column, &escaped, backend));
                    }
                    any = any.add(all);
                }
                any
            }
            Self::AllTerms(terms) => {
                if terms.is_empty() {
                    return Ok(None);
                }
                terms.iter().fold(Condition::all(), |all, term| {
                    all.add(match_any_field(searchable, term, backend))
                })
            }
            Self::Term(term) => match_any_field(searchable, term, backend),
        };
        Ok(Some(condition))
    }
}

fn match_any_field<C: ColumnTrait>(
    searchable: &[C],
    term: &str,
    backend: DatabaseBackend,
) -> Condition {
    searchable.iter().fold(Condition::any(), |any, column| {
        any.add(like_expr(*column, contains_pattern(term), backend))
    })
}

/// Parse and compile `q` in one step.
///
/// # Errors
///
/// See [`SearchExpression::compile`].
pub fn search_condition<E: EntityTrait>(
    input: Option<&SearchInput>,
    searchable: &[E::Column],
    backend: DatabaseBackend,
) -> Result<Option<Condition>, ApiError> {
    match input {
        Some(input) => SearchExpression::parse(input).compile::<E>(searchable, backend),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{part, sql_for};
    use serde_json::json;

    const FIELDS: [part::Column; 2] = [part::Column::Code, part::Column::Designation];

    fn compiled(input: SearchInput) -> String {
        let condition = search_condition::<part::Entity>(Some(&input), &FIELDS, DatabaseBackend::Sqlite)
            .unwrap()
            .unwrap();
        sql_for(condition)
    }

    #[test]
    fn test_or_expression_is_parsed() {
        let input = SearchInput::Term(r#"{"or":["{\"id\":\"2\"}","{\"id\":\"3\"}"]}"#.into());
        assert_eq!(
            SearchExpression::parse(&input),
            SearchExpression::AnyOf(vec![
                vec![("id".into(), "2".into())],
                vec![("id".into(), "3".into())],
            ])
        );
    }

    #[test]
    fn test_or_expression_compiles_to_disjunction() {
        let sql = compiled(SearchInput::Term(
            r#"{"or":["{\"id\":\"2\"}","{\"id\":\"3\"}"]}"#.into(),
        ));
        assert!(sql.contains("GLOB '*2*' OR"), "{sql}");
        assert!(sql.contains("GLOB '*3*'"), "{sql}");
    }

    #[test]
    fn test_or_group_is_a_conjunction() {
        let sql = compiled(SearchInput::Term(
            r#"{"or":[{"code":"A","owner":"bob"}]}"#.into(),
        ));
        assert!(
            sql.contains(r#""parts"."code" GLOB '*A*' AND "parts"."owner" GLOB '*bob*'"#),
            "{sql}"
        );
    }

    #[test]
    fn test_or_expression_doubles_backslashes() {
        let input = SearchInput::Term(r#"{"or":[{"code":"a\\b"}]}"#.into());
        let expression = SearchExpression::parse(&input);
        assert_eq!(
            expression,
            SearchExpression::AnyOf(vec![vec![("code".into(), "a\\b".into())]])
        );
        let condition = expression
            .compile::<part::Entity>(&FIELDS, DatabaseBackend::Postgres)
            .unwrap()
            .unwrap();
        let statement = {
            use sea_orm::{QueryFilter, QueryTrait};
            part::Entity::find()
                .filter(condition)
                .build(DatabaseBackend::Postgres)
        };
        assert_eq!(
            statement.values.unwrap().0,
            vec![sea_orm::Value::from("%a\\\\b%".to_string())]
        );
    }

    #[test]
    fn test_or_expression_with_unknown_column_is_data_error() {
        let input = SearchInput::Term(r#"{"or":[{"secret":"x"}]}"#.into());
        let result =
            search_condition::<part::Entity>(Some(&input), &FIELDS, DatabaseBackend::Sqlite);
        assert!(matches!(result, Err(ApiError::DataError { .. })));
    }

    #[test]
    fn test_malformed_or_expression_falls_back_to_term() {
        for raw in [
            r#"{"or": not json}"#,
            r#"{"or": "scalar"}"#,
            r#"{"or": [42]}"#,
            r#"{"color":"red"}"#,
        ] {
            assert_eq!(
                SearchExpression::parse(&SearchInput::Term(raw.into())),
                SearchExpression::Term(raw.into()),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_preconditions_are_all_required() {
        // contains "or" but is not braced
        assert_eq!(
            SearchExpression::parse(&SearchInput::Term("motor".into())),
            SearchExpression::Term("motor".into())
        );
        // braced JSON without the substring is never attempted
        assert_eq!(
            SearchExpression::parse(&SearchInput::Term(r#"{"code":"A"}"#.into())),
            SearchExpression::Term(r#"{"code":"A"}"#.into())
        );
    }

    #[test]
    fn test_term_list_is_and_of_ors() {
        let sql = compiled(SearchInput::Terms(vec!["foo".into(), "bar".into()]));
        assert!(
            sql.contains(
                r#"("parts"."code" LIKE '%foo%' OR "parts"."designation" LIKE '%foo%') AND ("parts"."code" LIKE '%bar%' OR "parts"."designation" LIKE '%bar%')"#
            ),
            "{sql}"
        );
    }

    #[test]
    fn test_scalar_term_is_or_across_fields() {
        let sql = compiled(SearchInput::Term("foo".into()));
        assert!(
            sql.contains(r#""parts"."code" LIKE '%foo%' OR "parts"."designation" LIKE '%foo%'"#),
            "{sql}"
        );
    }

    #[test]
    fn test_empty_searchable_is_noop() {
        for input in [
            SearchInput::Term("foo".into()),
            SearchInput::Terms(vec!["foo".into()]),
            SearchInput::Term(r#"{"or":[{"code":"A"}]}"#.into()),
        ] {
            let result =
                search_condition::<part::Entity>(Some(&input), &[], DatabaseBackend::Sqlite)
                    .unwrap();
            assert!(result.is_none());
        }
    }

    #[test]
    fn test_empty_or_array_is_noop() {
        let input = SearchInput::Term(r#"{"or":[]}"#.into());
        let result =
            search_condition::<part::Entity>(Some(&input), &FIELDS, DatabaseBackend::Sqlite)
                .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_from_json() {
        assert_eq!(SearchInput::from_json(&json!(null)), None);
        assert_eq!(
            SearchInput::from_json(&json!("bolt")),
            Some(SearchInput::Term("bolt".into()))
        );
        assert_eq!(
            SearchInput::from_json(&json!(["a", 2])),
            Some(SearchInput::Terms(vec!["a".into(), "2".into()]))
        );
        assert_eq!(
            SearchInput::from_json(&json!({"or": []})),
            Some(SearchInput::Term(r#"{"or":[]}"#.into()))
        );
    }

    #[test]
    fn test_long_terms_are_truncated() {
        let long = "é".repeat(MAX_SEARCH_QUERY_LENGTH);
        match SearchExpression::parse(&SearchInput::Term(long)) {
            SearchExpression::Term(term) => assert!(term.len() <= MAX_SEARCH_QUERY_LENGTH),
            other => panic!("unexpected expression: {other:?}"),
        }
    }
}
