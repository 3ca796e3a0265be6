use serde_json::{Map, Value};
use sqlx::postgres::PgArguments;

use super::store::{validate_identifier, value_text, Filter, Order, StoreError};

/// A bound parameter. Filter values compare by text, records travel as JSONB.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Json(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub query: String,
    pub params: Vec<SqlParam>,
}

impl SqlQuery {
    pub fn bind(&self) -> sqlx::query::Query<'_, sqlx::Postgres, PgArguments> {
        let mut q = sqlx::query(&self.query);
        for p in self.params.iter() {
            q = match p {
                SqlParam::Text(s) => q.bind(s),
                SqlParam::Json(v) => q.bind(v),
            };
        }
        q
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

fn columns_of(record: &Map<String, Value>) -> Result<Vec<String>, StoreError> {
    if record.is_empty() {
        return Err(StoreError::InvalidRecord("record has no columns".to_string()));
    }
    record
        .keys()
        .map(|c| validate_identifier(c).map(|_| quote(c)))
        .collect()
}

/// SELECT rows as JSONB with equality filters and an optional ORDER BY
pub fn select_sql(table: &str, filter: &Filter, order: Option<&Order>) -> Result<SqlQuery, StoreError> {
    validate_identifier(table)?;
    let mut query = format!("SELECT to_jsonb(r) AS row FROM {} r", quote(table));
    let mut params = Vec::new();
    let mut clauses = Vec::new();

    for (column, value) in filter.conditions() {
        validate_identifier(column)?;
        if value.is_null() {
            clauses.push(format!("r.{} IS NULL", quote(column)));
        } else {
            params.push(SqlParam::Text(value_text(value)));
            clauses.push(format!("r.{}::text = ${}", quote(column), params.len()));
        }
    }

    if !clauses.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&clauses.join(" AND "));
    }

    if let Some(order) = order {
        validate_identifier(&order.column)?;
        let direction = if order.ascending { "ASC" } else { "DESC" };
        query.push_str(&format!(" ORDER BY r.{} {}", quote(&order.column), direction));
    }

    Ok(SqlQuery { query, params })
}

/// INSERT only the columns present in the record so table defaults still apply
pub fn insert_sql(table: &str, record: &Map<String, Value>) -> Result<SqlQuery, StoreError> {
    validate_identifier(table)?;
    let columns = columns_of(record)?.join(", ");
    let query = format!(
        "INSERT INTO {table} AS r ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1) RETURNING to_jsonb(r) AS row",
        table = quote(table),
        columns = columns,
    );
    Ok(SqlQuery { query, params: vec![SqlParam::Json(Value::Object(record.clone()))] })
}

/// UPDATE the row whose id matches; the id column itself is never patched
pub fn update_sql(table: &str, id: &str, patch: &Map<String, Value>) -> Result<SqlQuery, StoreError> {
    validate_identifier(table)?;
    let mut patch = patch.clone();
    patch.remove("id");
    let columns = columns_of(&patch)?;

    let target = if columns.len() == 1 {
        columns[0].clone()
    } else {
        format!("({})", columns.join(", "))
    };
    let query = format!(
        "UPDATE {table} AS r SET {target} = (SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1)) WHERE r.\"id\"::text = $2 RETURNING to_jsonb(r) AS row",
        table = quote(table),
        target = target,
        columns = columns.join(", "),
    );
    Ok(SqlQuery {
        query,
        params: vec![SqlParam::Json(Value::Object(patch)), SqlParam::Text(id.to_string())],
    })
}
