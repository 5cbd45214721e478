//! SQL-like statement parser using nom.
//!
//! Parses statements like:
//! - `SELECT * FROM orders`
//! - `SELECT name, size FROM "notes.txt"`
//! - `SELECT * FROM orders WHERE status = 'open' AND priority != 3 LIMIT 5`
//! - `SELECT avg(price) FROM orders`

use super::ast::{Column, Columns, Predicate, Statement, Table, Value};
use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag, tag_no_case, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, none_of},
    combinator::{map, map_res, opt, recognize, value},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use thiserror::Error;

/// Errors that can occur during statement parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The statement syntax is invalid.
    #[error("Invalid query syntax: {0}")]
    SyntaxError(String),

    /// The statement uses a construct no backend can translate.
    #[error("Unsupported construct: {0}")]
    Unsupported(String),

    /// The statement is empty.
    #[error("Empty query")]
    EmptyQuery,
}

/// Parses a SQL-like statement into a [`Statement`].
///
/// A single trailing `;` is ignored. The trimmed input text is kept in
/// [`Statement::raw`] so pass-through backends can use it verbatim.
///
/// # Errors
///
/// Returns a `ParseError` if:
/// - The statement is empty
/// - The syntax is invalid
/// - The WHERE clause uses `OR`
///
/// # Examples
///
/// ```
/// use shared::query::{parse_statement, Table};
///
/// let statement = parse_statement("SELECT * FROM orders WHERE status = 'open'").unwrap();
/// assert_eq!(statement.table, Table::Named("orders".to_string()));
/// ```
pub fn parse_statement(input: &str) -> Result<Statement, ParseError> {
    let input = input.trim();
    let input = input.strip_suffix(';').unwrap_or(input).trim_end();
    if input.is_empty() {
        return Err(ParseError::EmptyQuery);
    }

    match statement(input) {
        Ok((remaining, statement)) => {
            let remaining = remaining.trim();
            if remaining.is_empty() {
                Ok(statement.with_raw(input))
            } else if where_mentions_or(input) {
                Err(ParseError::Unsupported(
                    "OR is not supported, only AND-combined (in)equalities".to_string(),
                ))
            } else {
                Err(ParseError::SyntaxError(format!(
                    "Unexpected trailing content: '{remaining}'"
                )))
            }
        }
        Err(_) if where_mentions_or(input) => Err(ParseError::Unsupported(
            "OR is not supported, only AND-combined (in)equalities".to_string(),
        )),
        Err(e) => Err(ParseError::SyntaxError(format!("{e}"))),
    }
}

/// Returns `true` if an `OR` word follows a `WHERE` word outside of quotes.
fn where_mentions_or(input: &str) -> bool {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut quote = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(_) if c == '\\' => {
                chars.next();
            }
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c.is_alphanumeric() || c == '_' => word.push(c),
            None => words.push(std::mem::take(&mut word)),
        }
    }
    words.push(word);

    words
        .iter()
        .skip_while(|w| !w.eq_ignore_ascii_case("WHERE"))
        .any(|w| w.eq_ignore_ascii_case("OR"))
}

// ============================================================================
// Main statement parser
// ============================================================================

fn statement(input: &str) -> IResult<&str, Statement> {
    let (input, _) = multispace0(input)?;
    let (input, _) = tag_no_case("SELECT")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, columns) = columns(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = tag_no_case("FROM")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, table) = table(input)?;
    let (input, _) = multispace0(input)?;

    let (input, predicate) = opt(where_clause)(input)?;
    let (input, _) = multispace0(input)?;

    let (input, limit) = opt(limit_clause)(input)?;
    let (input, _) = multispace0(input)?;

    Ok((
        input,
        Statement {
            table,
            columns,
            predicate,
            limit,
            raw: None,
        },
    ))
}

// ============================================================================
// SELECT list
// ============================================================================

fn columns(input: &str) -> IResult<&str, Columns> {
    alt((
        value(Columns::All, char('*')),
        map(
            separated_list1(delimited(multispace0, char(','), multispace0), column),
            Columns::List,
        ),
    ))(input)
}

fn column(input: &str) -> IResult<&str, Column> {
    alt((function_column, map(identifier, Column::field)))(input)
}

fn function_column(input: &str) -> IResult<&str, Column> {
    let (input, name) = identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, argument) = delimited(
        pair(char('('), multispace0),
        alt((tag("*"), identifier)),
        pair(multispace0, char(')')),
    )(input)?;

    Ok((input, Column::function(name, argument)))
}

// ============================================================================
// FROM target
// ============================================================================

fn table(input: &str) -> IResult<&str, Table> {
    alt((
        map(quoted_string, Table::Named),
        map(table_name, |name: &str| {
            if name == "*" {
                Table::All
            } else {
                Table::Named(name.to_string())
            }
        }),
    ))(input)
}

fn table_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| {
        c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '*' | '?' | '/' | '~')
    })(input)
}

// ============================================================================
// WHERE clause parser
// ============================================================================

fn where_clause(input: &str) -> IResult<&str, Predicate> {
    let (input, _) = tag_no_case("WHERE")(input)?;
    let (input, _) = multispace1(input)?;
    and_expression(input)
}

fn and_expression(input: &str) -> IResult<&str, Predicate> {
    let (input, first) = primary_condition(input)?;
    let (input, rest) = many0(preceded(
        tuple((multispace1, tag_no_case("AND"), multispace1)),
        primary_condition,
    ))(input)?;

    if rest.is_empty() {
        return Ok((input, first));
    }

    let mut children = Vec::with_capacity(rest.len() + 1);
    children.push(first);
    children.extend(rest);
    Ok((input, Predicate::And(children)))
}

fn primary_condition(input: &str) -> IResult<&str, Predicate> {
    alt((grouped_condition, condition))(input)
}

fn grouped_condition(input: &str) -> IResult<&str, Predicate> {
    let (input, _) = char('(')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, expr) = and_expression(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(')')(input)?;

    Ok((input, expr))
}

fn condition(input: &str) -> IResult<&str, Predicate> {
    let (input, field) = identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, negated) = equality_op(input)?;
    let (input, _) = multispace0(input)?;
    let (input, value) = query_value(input)?;

    let predicate = if negated {
        Predicate::not_eq(field, value)
    } else {
        Predicate::eq(field, value)
    };
    Ok((input, predicate))
}

/// Returns `true` for the negated operators.
fn equality_op(input: &str) -> IResult<&str, bool> {
    alt((
        value(true, alt((tag("!="), tag("<>")))),
        value(false, char('=')),
    ))(input)
}

// ============================================================================
// Value parsers
// ============================================================================

fn query_value(input: &str) -> IResult<&str, Value> {
    alt((
        boolean_value,
        float_value,
        integer_value,
        map(quoted_string, Value::String),
    ))(input)
}

fn quoted_string(input: &str) -> IResult<&str, String> {
    alt((single_quoted_string, double_quoted_string))(input)
}

fn single_quoted_string(input: &str) -> IResult<&str, String> {
    delimited(
        char('\''),
        alt((
            escaped_transform(
                none_of("'\\"),
                '\\',
                alt((value("'", char('\'')), value("\\", char('\\')))),
            ),
            value(String::new(), tag("")),
        )),
        char('\''),
    )(input)
}

fn double_quoted_string(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        alt((
            escaped_transform(
                none_of("\"\\"),
                '\\',
                alt((value("\"", char('"')), value("\\", char('\\')))),
            ),
            value(String::new(), tag("")),
        )),
        char('"'),
    )(input)
}

fn integer_value(input: &str) -> IResult<&str, Value> {
    let (input, num) = map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| {
        s.parse::<i64>()
    })(input)?;
    Ok((input, Value::Integer(num)))
}

fn float_value(input: &str) -> IResult<&str, Value> {
    let (input, num) = map_res(
        recognize(tuple((opt(char('-')), digit1, char('.'), digit1))),
        |s: &str| s.parse::<f64>(),
    )(input)?;
    Ok((input, Value::Float(num)))
}

fn boolean_value(input: &str) -> IResult<&str, Value> {
    alt((
        value(Value::Boolean(true), tag_no_case("true")),
        value(Value::Boolean(false), tag_no_case("false")),
    ))(input)
}

// ============================================================================
// LIMIT clause
// ============================================================================

fn limit_clause(input: &str) -> IResult<&str, usize> {
    let (input, _) = tag_no_case("LIMIT")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, n) = map_res(digit1, |s: &str| s.parse::<usize>())(input)?;
    Ok((input, n))
}

// ============================================================================
// Identifier parser
// ============================================================================

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || matches!(c, '_' | '.' | '@'))(input)
}

// ============================================================================
// Tests
// ============================================================================
