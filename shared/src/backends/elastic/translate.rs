//! Translation of statements into Elasticsearch request bodies.
//!
//! A statement is either a projection (`SELECT a, b` or `SELECT *`) that
//! returns documents, or a single aggregate (`SELECT avg(price)`) that
//! returns an aggregation or a count. The WHERE clause becomes a `bool`
//! query built from `term` clauses.

use crate::backends::BackendError;
use crate::query::{Column, Columns, Predicate, Statement, Table, Value};
use serde_json::{json, Map};

/// Metric aggregations that can be requested through `SELECT fn(field)`.
pub const SUPPORTED_AGGREGATIONS: [&str; 7] = [
    "avg",
    "sum",
    "min",
    "max",
    "stats",
    "cardinality",
    "percentiles",
];

/// A translated request, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchRequest {
    /// `POST /{index}/_search`
    Search {
        /// Target index (or `_all`).
        index: String,
        /// Request body.
        body: serde_json::Value,
    },
    /// `POST /{index}/_count`
    Count {
        /// Target index (or `_all`).
        index: String,
        /// Request body, holding only the filter.
        body: serde_json::Value,
    },
}

impl SearchRequest {
    /// Returns the target index.
    #[must_use]
    pub fn index(&self) -> &str {
        match self {
            Self::Search { index, .. } | Self::Count { index, .. } => index,
        }
    }

    /// Returns the request body.
    #[must_use]
    pub fn body(&self) -> &serde_json::Value {
        match self {
            Self::Search { body, .. } | Self::Count { body, .. } => body,
        }
    }

    /// Returns the endpoint path, relative to the cluster URL.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Search { index, .. } => format!("/{index}/_search"),
            Self::Count { index, .. } => format!("/{index}/_count"),
        }
    }
}

/// What the SELECT list asks for.
#[derive(Debug, Clone, PartialEq)]
enum Selection {
    /// Whole documents.
    AllFields,
    /// Only these source fields.
    Fields(Vec<String>),
    /// One aggregate function over one field.
    Aggregate { function: String, field: String },
}

/// Translates a statement into a search or count request.
///
/// # Errors
///
/// Returns [`BackendError::Translation`] for column lists mixing fields with
/// functions, several functions, empty conjunctions or `fn(*)` on anything
/// but `count`, and [`BackendError::UnsupportedAggregation`] for functions
/// outside [`SUPPORTED_AGGREGATIONS`].
///
/// # Example
///
/// ```
/// use shared::backends::elastic::translate::translate;
/// use shared::query::parse_statement;
///
/// let statement = parse_statement("SELECT * FROM orders WHERE status = 'open' LIMIT 5").unwrap();
/// let request = translate(&statement).unwrap();
/// assert_eq!(request.path(), "/orders/_search");
/// assert_eq!(
///     request.body(),
///     &serde_json::json!({"query": {"term": {"status": "open"}}, "size": 5})
/// );
/// ```
pub fn translate(statement: &Statement) -> Result<SearchRequest, BackendError> {
    let index = match &statement.table {
        Table::All => "_all".to_string(),
        Table::Named(name) => name.clone(),
    };
    let query = translate_predicate(statement.predicate.as_ref())?;

    let mut body = Map::new();
    body.insert("query".to_string(), query);

    match resolve_selection(&statement.columns)? {
        Selection::Aggregate { function, .. } if function == "count" => {
            return Ok(SearchRequest::Count {
                index,
                body: body.into(),
            });
        }
        Selection::Aggregate { function, field } => {
            if !SUPPORTED_AGGREGATIONS.contains(&function.as_str()) {
                return Err(BackendError::UnsupportedAggregation(function));
            }
            if field == "*" {
                return Err(BackendError::Translation(format!(
                    "{function}(*) needs a field argument"
                )));
            }
            let name = format!("{function}_{field}");
            body.insert(
                "aggregations".to_string(),
                json!({ name: { function: { "field": field } } }),
            );
        }
        Selection::Fields(fields) => {
            body.insert("_source".to_string(), json!(fields));
        }
        Selection::AllFields => {}
    }

    if let Some(limit) = statement.limit {
        body.insert("size".to_string(), json!(limit));
    }

    Ok(SearchRequest::Search {
        index,
        body: body.into(),
    })
}

/// Translates an optional predicate into a query clause.
///
/// # Errors
///
/// Returns [`BackendError::Translation`] for an empty conjunction.
pub fn translate_predicate(
    predicate: Option<&Predicate>,
) -> Result<serde_json::Value, BackendError> {
    match predicate {
        None => Ok(json!({ "match_all": {} })),
        Some(predicate) => filter(predicate),
    }
}

fn filter(predicate: &Predicate) -> Result<serde_json::Value, BackendError> {
    match predicate {
        Predicate::Eq { field, value } => Ok(term(field, value)),
        Predicate::NotEq { field, value } => {
            Ok(json!({ "bool": { "must_not": [term(field, value)] } }))
        }
        Predicate::And(children) => {
            if children.is_empty() {
                return Err(BackendError::Translation(
                    "AND needs at least one condition".to_string(),
                ));
            }

            let mut must = Vec::new();
            let mut must_not = Vec::new();
            for child in children {
                match child {
                    Predicate::NotEq { field, value } => must_not.push(term(field, value)),
                    other => must.push(filter(other)?),
                }
            }

            let mut clause = Map::new();
            if !must.is_empty() {
                clause.insert("must".to_string(), must.into());
            }
            if !must_not.is_empty() {
                clause.insert("must_not".to_string(), must_not.into());
            }
            Ok(json!({ "bool": clause }))
        }
    }
}

fn term(field: &str, value: &Value) -> serde_json::Value {
    json!({ "term": { field: value.to_json() } })
}

fn resolve_selection(columns: &Columns) -> Result<Selection, BackendError> {
    let columns = match columns {
        Columns::All => return Ok(Selection::AllFields),
        Columns::List(columns) => columns,
    };

    let mut fields = Vec::new();
    let mut functions = Vec::new();
    for column in columns {
        match column {
            Column::Field(name) => fields.push(name.clone()),
            Column::Function { name, argument } => functions.push((name, argument)),
        }
    }

    match (fields.is_empty(), functions.as_slice()) {
        (false, []) => Ok(Selection::Fields(fields)),
        (true, [(name, argument)]) => Ok(Selection::Aggregate {
            function: name.to_lowercase(),
            field: (*argument).clone(),
        }),
        (true, []) => Err(BackendError::Translation(
            "the column list is empty".to_string(),
        )),
        (true, _) => Err(BackendError::Translation(
            "only one aggregate function per statement is supported".to_string(),
        )),
        (false, _) => Err(BackendError::Translation(
            "aggregate functions cannot be mixed with plain fields".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_statement;

    fn translated(sql: &str) -> SearchRequest {
        translate(&parse_statement(sql).unwrap()).unwrap()
    }

    fn open() -> Value {
        Value::String("open".to_string())
    }

    /// Evaluates the subset of the query DSL produced by `translate`.
    fn engine_matches(query: &serde_json::Value, doc: &serde_json::Value) -> bool {
        if query.get("match_all").is_some() {
            return true;
        }
        if let Some(term) = query.get("term").and_then(|t| t.as_object()) {
            return term.iter().all(|(field, value)| doc.get(field) == Some(value));
        }
        if let Some(clause) = query.get("bool") {
            let clauses = |key: &str| {
                clause
                    .get(key)
                    .and_then(|c| c.as_array())
                    .cloned()
                    .unwrap_or_default()
            };
            return clauses("must").iter().all(|q| engine_matches(q, doc))
                && !clauses("must_not").iter().any(|q| engine_matches(q, doc));
        }
        panic!("query clause not understood by the fake engine: {query}");
    }

    fn predicate_holds(predicate: &Predicate, doc: &serde_json::Value) -> bool {
        match predicate {
            Predicate::Eq { field, value } => doc.get(field) == Some(&value.to_json()),
            Predicate::NotEq { field, value } => doc.get(field) != Some(&value.to_json()),
            Predicate::And(children) => children.iter().all(|c| predicate_holds(c, doc)),
        }
    }

    fn documents() -> Vec<serde_json::Value> {
        vec![
            json!({"id": 1, "status": "open", "region": "eu", "priority": 1, "paid": true}),
            json!({"id": 2, "status": "open", "region": "us", "priority": 2, "paid": false}),
            json!({"id": 3, "status": "closed", "region": "eu", "priority": 1, "paid": true}),
            json!({"id": 4, "status": "closed", "region": "us", "priority": 3, "paid": true}),
            json!({"id": 5, "status": "open", "region": "eu", "priority": 3}),
        ]
    }

    #[test]
    fn test_scenario_term_with_limit() {
        let request = translated("SELECT * FROM orders WHERE status = 'open' LIMIT 5");

        assert_eq!(request.index(), "orders");
        assert_eq!(request.path(), "/orders/_search");
        assert_eq!(
            request.body(),
            &json!({"query": {"term": {"status": "open"}}, "size": 5})
        );
        assert!(request.body().get("_source").is_none());
    }

    #[test]
    fn test_no_predicate_matches_all_and_no_size() {
        let request = translated("SELECT * FROM orders");
        assert_eq!(request.body(), &json!({"query": {"match_all": {}}}));
    }

    #[test]
    fn test_wildcard_table_targets_all_indices() {
        let request = translated("SELECT * FROM *");
        assert_eq!(request.path(), "/_all/_search");
    }

    #[test]
    fn test_projection_sets_source() {
        let request = translated("SELECT status, region FROM orders");
        assert_eq!(request.body()["_source"], json!(["status", "region"]));
        assert!(request.body().get("aggregations").is_none());
    }

    #[test]
    fn test_not_eq_goes_under_must_not() {
        let request = translated("SELECT * FROM orders WHERE status != 'open'");
        assert_eq!(
            request.body()["query"],
            json!({"bool": {"must_not": [{"term": {"status": "open"}}]}})
        );
    }

    #[test]
    fn test_conjunction_splits_positive_and_negated() {
        let request = translated(
            "SELECT * FROM orders WHERE status = 'open' AND region != 'us' AND priority = 1",
        );
        assert_eq!(
            request.body()["query"],
            json!({"bool": {
                "must": [
                    {"term": {"status": "open"}},
                    {"term": {"priority": 1}}
                ],
                "must_not": [{"term": {"region": "us"}}]
            }})
        );
    }

    #[test]
    fn test_nested_conjunction_is_recursive() {
        let request = translated("SELECT * FROM t WHERE (a = 1 AND b != 2) AND c = true");
        assert_eq!(
            request.body()["query"],
            json!({"bool": {"must": [
                {"bool": {"must": [{"term": {"a": 1}}], "must_not": [{"term": {"b": 2}}]}},
                {"term": {"c": true}}
            ]}})
        );
    }

    #[test]
    fn test_empty_conjunction_fails() {
        let statement =
            Statement::new(Table::Named("t".to_string())).with_predicate(Predicate::And(vec![]));
        assert!(matches!(
            translate(&statement),
            Err(BackendError::Translation(_))
        ));
    }

    #[test]
    fn test_aggregation_body() {
        let request = translated("SELECT AVG(price) FROM orders WHERE status = 'open' LIMIT 3");

        assert_eq!(
            request,
            SearchRequest::Search {
                index: "orders".to_string(),
                body: json!({
                    "query": {"term": {"status": "open"}},
                    "aggregations": {"avg_price": {"avg": {"field": "price"}}},
                    "size": 3
                }),
            }
        );
    }

    #[test]
    fn test_every_supported_aggregation_translates() {
        for function in SUPPORTED_AGGREGATIONS {
            let request = translated(&format!("SELECT {function}(price) FROM orders"));
            let key = format!("{function}_price");
            assert_eq!(
                request.body()["aggregations"][key.as_str()][function]["field"],
                "price"
            );
        }
    }

    #[test]
    fn test_aggregation_and_projection_are_exclusive() {
        let aggregated = translated("SELECT max(total) FROM orders");
        assert!(aggregated.body().get("_source").is_none());
        assert!(aggregated.body().get("aggregations").is_some());

        for sql in ["SELECT * FROM orders", "SELECT total FROM orders"] {
            assert!(translated(sql).body().get("aggregations").is_none());
        }
    }

    #[test]
    fn test_count_builds_count_request_without_size() {
        let request = translated("SELECT count(*) FROM orders WHERE status = 'open' LIMIT 2");

        assert_eq!(
            request,
            SearchRequest::Count {
                index: "orders".to_string(),
                body: json!({"query": {"term": {"status": "open"}}}),
            }
        );
        assert_eq!(request.path(), "/orders/_count");
    }

    #[test]
    fn test_unsupported_aggregation_fails() {
        let statement = parse_statement("SELECT median(price) FROM orders").unwrap();
        match translate(&statement) {
            Err(BackendError::UnsupportedAggregation(name)) => assert_eq!(name, "median"),
            other => panic!("expected UnsupportedAggregation, got {other:?}"),
        }
    }

    #[test]
    fn test_star_argument_needs_count() {
        let statement = parse_statement("SELECT sum(*) FROM orders").unwrap();
        assert!(matches!(
            translate(&statement),
            Err(BackendError::Translation(_))
        ));
    }

    #[test]
    fn test_mixed_and_multiple_functions_fail() {
        for sql in [
            "SELECT status, count(*) FROM orders",
            "SELECT min(a), max(a) FROM orders",
        ] {
            let statement = parse_statement(sql).unwrap();
            assert!(
                matches!(translate(&statement), Err(BackendError::Translation(_))),
                "{sql}"
            );
        }
    }

    #[test]
    fn test_translated_filters_select_exactly_the_matching_documents() {
        let predicates = vec![
            None,
            Some(Predicate::eq("status", open())),
            Some(Predicate::not_eq("status", open())),
            Some(Predicate::And(vec![
                Predicate::eq("status", open()),
                Predicate::eq("region", Value::String("eu".to_string())),
            ])),
            Some(Predicate::And(vec![
                Predicate::eq("status", open()),
                Predicate::not_eq("priority", Value::Integer(3)),
            ])),
            Some(Predicate::And(vec![
                Predicate::not_eq("region", Value::String("us".to_string())),
                Predicate::not_eq("paid", Value::Boolean(false)),
            ])),
            Some(Predicate::And(vec![
                Predicate::And(vec![
                    Predicate::eq("paid", Value::Boolean(true)),
                    Predicate::not_eq("status", open()),
                ]),
                Predicate::eq("priority", Value::Integer(1)),
            ])),
            Some(Predicate::And(vec![Predicate::not_eq(
                "missing",
                Value::Integer(0),
            )])),
        ];

        let docs = documents();
        for predicate in predicates {
            let query = translate_predicate(predicate.as_ref()).unwrap();

            let via_engine: Vec<&serde_json::Value> = docs
                .iter()
                .filter(|doc| engine_matches(&query, doc))
                .collect();
            let expected: Vec<&serde_json::Value> = docs
                .iter()
                .filter(|doc| predicate.as_ref().map_or(true, |p| predicate_holds(p, doc)))
                .collect();

            assert_eq!(via_engine, expected, "predicate {predicate:?}");
        }
    }
}
