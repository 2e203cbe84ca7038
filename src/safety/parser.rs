//! Parse-level read-only check.
//!
//! Uses sqlparser with the PostgreSQL dialect. The candidate must parse
//! to exactly one `Query` statement, and every CTE body, nested set
//! expression, and derived table must itself be read-only. Parse failure
//! rejects: the gate never accepts on ambiguity.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// Checks that `sql` is a single read-only query.
pub(super) fn check_read_only(sql: &str) -> Result<(), String> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| format!("statement could not be parsed: {e}"))?;

    match statements.as_slice() {
        [] => Err("statement is empty".to_string()),
        [statement] => statement_is_read_only(statement),
        _ => Err("multiple statements are not allowed".to_string()),
    }
}

fn statement_is_read_only(statement: &Statement) -> Result<(), String> {
    match statement {
        Statement::Query(query) => query_is_read_only(query),
        _ => Err("only SELECT statements are permitted".to_string()),
    }
}

/// Walks a query, including its WITH clause, for mutating operations.
fn query_is_read_only(query: &Query) -> Result<(), String> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            query_is_read_only(&cte.query)?;
        }
    }
    set_expr_is_read_only(&query.body)
}

fn set_expr_is_read_only(set_expr: &SetExpr) -> Result<(), String> {
    match set_expr {
        SetExpr::Select(select) => select_is_read_only(select),
        SetExpr::Query(query) => query_is_read_only(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_is_read_only(left)?;
            set_expr_is_read_only(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
        SetExpr::Insert(_) => Err("INSERT inside a query is not permitted".to_string()),
        SetExpr::Update(_) => Err("UPDATE inside a query is not permitted".to_string()),
        SetExpr::Delete(_) => Err("DELETE inside a query is not permitted".to_string()),
        SetExpr::Merge(_) => Err("MERGE inside a query is not permitted".to_string()),
    }
}

/// Checks the FROM clause of a SELECT for mutating derived tables.
fn select_is_read_only(select: &Select) -> Result<(), String> {
    for table_with_joins in &select.from {
        table_with_joins_is_read_only(table_with_joins)?;
    }
    Ok(())
}

fn table_with_joins_is_read_only(twj: &TableWithJoins) -> Result<(), String> {
    table_factor_is_read_only(&twj.relation)?;
    for join in &twj.joins {
        table_factor_is_read_only(&join.relation)?;
    }
    Ok(())
}

fn table_factor_is_read_only(factor: &TableFactor) -> Result<(), String> {
    match factor {
        TableFactor::Derived { subquery, .. } => query_is_read_only(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => table_with_joins_is_read_only(table_with_joins),
        // Plain tables and table functions cannot mutate.
        _ => Ok(()),
    }
}
