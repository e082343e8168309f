// Copyright 2020 - 2021 Alex Dukhno
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The executor: the fixed `SELECT` pipeline (from, join, where, order by,
//! project), and the two DML statements, `INSERT` and `DELETE`. Reads and
//! writes go straight to the `catalog`'s schemas and the `storage` trees
//! backing them; no executor-owned state survives a single statement.

use ast::{DeleteStmt, InsertStmt, SelectStmt};
use catalog::Catalog;
use predicate::{PredicateError, Tri};
use resolver::{Context, ResolveError, Scope};
use schema::TableDef;
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use storage::StorageError;
use value::{Value, ValueError};

#[derive(Debug, PartialEq)]
pub enum QueryError {
    NoSuchTable,
    TableDoesNotExist(String),
    ColumnNameDuplicated,
    ColumnDoesNotExist(String),
    Value(ValueError),
    Resolve(ResolveError),
    Predicate(PredicateError),
    Storage(StorageError),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::NoSuchTable => write!(f, "no such table"),
            QueryError::TableDoesNotExist(t) => write!(f, "'{}' does not exist", t),
            QueryError::ColumnNameDuplicated => write!(f, "Column name duplicated"),
            QueryError::ColumnDoesNotExist(c) => write!(f, "'{}' does not exist", c),
            QueryError::Value(e) => write!(f, "{}", e),
            QueryError::Resolve(e) => write!(f, "{}", e),
            QueryError::Predicate(e) => write!(f, "{}", e),
            QueryError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl From<ValueError> for QueryError {
    fn from(e: ValueError) -> Self {
        QueryError::Value(e)
    }
}

impl From<ResolveError> for QueryError {
    fn from(e: ResolveError) -> Self {
        QueryError::Resolve(e)
    }
}

impl From<PredicateError> for QueryError {
    fn from(e: PredicateError) -> Self {
        QueryError::Predicate(e)
    }
}

impl From<StorageError> for QueryError {
    fn from(e: StorageError) -> Self {
        QueryError::Storage(e)
    }
}

pub struct SelectResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

fn table_rows(catalog: &Catalog, name: &str) -> Result<Vec<Vec<Value>>, QueryError> {
    let tree = catalog.environment().open_or_create_tree(name)?;
    let mut rows = Vec::new();
    for (_, bytes) in tree.scan()? {
        rows.push(value::decode_record(&bytes));
    }
    Ok(rows)
}

/// Appends `def`'s `column_order` to `headers`, prefixed with `table`.
fn push_qualified_headers(headers: &mut Vec<String>, table: &str, def: &TableDef) {
    for column in &def.column_order {
        headers.push(format!("{}.{}", table, column));
    }
}

pub fn execute_select(catalog: &Catalog, stmt: &SelectStmt) -> Result<SelectResult, QueryError> {
    let from_def = catalog
        .get_schema(&stmt.from)
        .ok_or_else(|| QueryError::TableDoesNotExist(stmt.from.clone()))?;

    let mut scope = Scope::new();
    scope.push(stmt.from.clone(), from_def);
    let mut headers = Vec::new();
    push_qualified_headers(&mut headers, &stmt.from, from_def);

    let mut rows: Vec<Vec<Vec<Value>>> = table_rows(catalog, &stmt.from)?.into_iter().map(|row| vec![row]).collect();

    for join in &stmt.joins {
        let join_def = catalog
            .get_schema(&join.table)
            .ok_or_else(|| QueryError::TableDoesNotExist(join.table.clone()))?;
        scope.push(join.table.clone(), join_def);
        push_qualified_headers(&mut headers, &join.table, join_def);
        let join_rows = table_rows(catalog, &join.table)?;

        let mut joined = Vec::with_capacity(rows.len() * join_rows.len());
        for left in &rows {
            for right in &join_rows {
                let mut combined = left.clone();
                combined.push(right.clone());
                if predicate::evaluate(&join.on, &scope, &combined, Context::Predicate("Join"))?.is_true() {
                    joined.push(combined);
                }
            }
        }
        rows = joined;
    }

    if let Some(predicate) = &stmt.predicate {
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if predicate::evaluate(predicate, &scope, &row, Context::Predicate("Where"))?.is_true() {
                kept.push(row);
            }
        }
        rows = kept;
    }

    if let Some(order_by) = &stmt.order_by {
        let (table_index, column_index) = scope.resolve(&order_by.column, Context::Predicate("Order by"))?;
        rows.sort_by(|a, b| {
            let ordering = value::order_key_less(&a[table_index][column_index], &b[table_index][column_index]);
            if order_by.desc {
                reverse(ordering)
            } else {
                ordering
            }
        });
    }

    let projected_indices = if stmt.projection.is_empty() {
        let mut all = Vec::new();
        for (table_index, table_name) in scope.table_names().iter().enumerate() {
            let def = catalog.get_schema(table_name).expect("table resolved above");
            for column_index in 0..def.column_order.len() {
                all.push((table_index, column_index));
            }
        }
        all
    } else {
        stmt.projection
            .iter()
            .map(|reference| scope.resolve(reference, Context::Select))
            .collect::<Result<Vec<_>, _>>()?
    };

    let projected_headers = project_headers(&headers, &scope, &projected_indices);
    let projected_rows = rows
        .into_iter()
        .map(|row| {
            projected_indices
                .iter()
                .map(|(table_index, column_index)| row[*table_index][*column_index].clone())
                .collect()
        })
        .collect();

    Ok(SelectResult {
        headers: projected_headers,
        rows: projected_rows,
    })
}

fn reverse(ordering: Ordering) -> Ordering {
    ordering.reverse()
}

/// Bare column name unless the same bare name is projected more than once,
/// in which case every occurrence of that name is rendered `T.C`.
fn project_headers(full_headers: &[String], scope: &Scope, indices: &[(usize, usize)]) -> Vec<String> {
    let table_names = scope.table_names();
    let bare: Vec<&str> = indices
        .iter()
        .map(|(table_index, column_index)| {
            let qualified = &full_headers[scope.column_offset(*table_index) + *column_index];
            qualified.splitn(2, '.').nth(1).unwrap_or(qualified)
        })
        .collect();

    indices
        .iter()
        .zip(bare.iter())
        .map(|((table_index, _), name)| {
            let occurrences = bare.iter().filter(|other| *other == name).count();
            if occurrences > 1 {
                format!("{}.{}", table_names[*table_index], name)
            } else {
                (*name).to_owned()
            }
        })
        .collect()
}

pub fn execute_insert(catalog: &Catalog, stmt: &InsertStmt) -> Result<usize, QueryError> {
    let def = catalog.get_schema(&stmt.table).ok_or(QueryError::NoSuchTable)?;

    let columns: Vec<String> = match &stmt.columns {
        Some(cols) => cols.clone(),
        None => def.column_order.clone(),
    };

    if stmt.values.len() != columns.len() {
        return Err(QueryError::Value(ValueError::TypesNotMatched));
    }

    let mut seen = std::collections::HashSet::new();
    for c in &columns {
        if !seen.insert(c.to_uppercase()) {
            return Err(QueryError::ColumnNameDuplicated);
        }
        if !def.has_column(c) {
            return Err(QueryError::ColumnDoesNotExist(c.clone()));
        }
    }

    let mut record = vec![Value::Null; def.column_order.len()];
    let mut provided = vec![false; def.column_order.len()];
    for (column, literal) in columns.iter().zip(stmt.values.iter()) {
        let index = def.index_of(column).expect("checked above");
        let col_def = &def.columns[column];
        let value = value::coerce_insert(literal, column, col_def.data_type, col_def.not_null)?;
        record[index] = value;
        provided[index] = true;
    }

    for (index, column) in def.column_order.iter().enumerate() {
        if provided[index] {
            continue;
        }
        let col_def = &def.columns[column];
        if col_def.not_null {
            return Err(QueryError::Value(ValueError::NotNullable(column.clone())));
        }
    }

    let table = catalog.environment().open_or_create_tree(&stmt.table.to_uppercase())?;
    let key = table.next_id()?;
    table.put(&key.to_string(), value::encode_record(&record).as_bytes())?;
    Ok(1)
}

pub fn execute_delete(catalog: &Catalog, stmt: &DeleteStmt) -> Result<usize, QueryError> {
    let def = catalog.get_schema(&stmt.table).ok_or(QueryError::NoSuchTable)?;
    let table = catalog.environment().open_or_create_tree(&stmt.table.to_uppercase())?;

    match &stmt.predicate {
        None => Ok(table.truncate()?),
        Some(predicate) => {
            let mut scope = Scope::new();
            scope.push(stmt.table.clone(), def);
            let mut deleted = 0;
            for (key, bytes) in table.scan()? {
                let row = vec![value::decode_record(&bytes)];
                if predicate::evaluate(predicate, &scope, &row, Context::Predicate("Where"))?.is_true() {
                    table.delete(&key)?;
                    deleted += 1;
                }
            }
            Ok(deleted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{ColumnRef, ColumnSpec, CreateTableStmt, Expr, Operand, OrderBy};
    use tempfile::tempdir;
    use value::{CompareOp, Literal, SqlType};

    fn catalog() -> (tempfile::TempDir, Catalog) {
        let dir = tempdir().unwrap();
        let env = storage::Environment::open(dir.path()).unwrap();
        (dir, Catalog::open(env).unwrap())
    }

    fn column(name: &str, data_type: SqlType, not_null: bool) -> ColumnSpec {
        ColumnSpec {
            name: name.to_owned(),
            data_type,
            not_null,
        }
    }

    #[test]
    fn insert_then_select_all_round_trips() {
        let (_dir, mut catalog) = catalog();
        catalog
            .create_table(&CreateTableStmt {
                name: "FOO".to_owned(),
                columns: vec![column("ID", SqlType::Int, true), column("NAME", SqlType::Char(10), false)],
                primary_keys: vec![vec!["ID".to_owned()]],
                foreign_keys: vec![],
            })
            .unwrap();

        let inserted = execute_insert(
            &catalog,
            &InsertStmt {
                table: "FOO".to_owned(),
                columns: None,
                values: vec![Literal::Int(1), Literal::Str("abc".to_owned())],
            },
        )
        .unwrap();
        assert_eq!(inserted, 1);

        let result = execute_select(
            &catalog,
            &SelectStmt {
                projection: vec![],
                from: "FOO".to_owned(),
                joins: vec![],
                predicate: None,
                order_by: None,
            },
        )
        .unwrap();
        assert_eq!(result.headers, vec!["ID".to_owned(), "NAME".to_owned()]);
        assert_eq!(result.rows, vec![vec![Value::Int(1), Value::Char("abc".to_owned())]]);
    }

    #[test]
    fn insert_omitting_not_null_column_fails() {
        let (_dir, mut catalog) = catalog();
        catalog
            .create_table(&CreateTableStmt {
                name: "FOO".to_owned(),
                columns: vec![column("ID", SqlType::Int, true)],
                primary_keys: vec![],
                foreign_keys: vec![],
            })
            .unwrap();

        let err = execute_insert(
            &catalog,
            &InsertStmt {
                table: "FOO".to_owned(),
                columns: Some(vec![]),
                values: vec![],
            },
        )
        .unwrap_err();
        assert_eq!(err, QueryError::Value(ValueError::NotNullable("ID".to_owned())));
    }

    #[test]
    fn select_with_where_filters_rows() {
        let (_dir, mut catalog) = catalog();
        catalog
            .create_table(&CreateTableStmt {
                name: "FOO".to_owned(),
                columns: vec![column("ID", SqlType::Int, false)],
                primary_keys: vec![],
                foreign_keys: vec![],
            })
            .unwrap();
        for i in 1..=3 {
            execute_insert(
                &catalog,
                &InsertStmt {
                    table: "FOO".to_owned(),
                    columns: None,
                    values: vec![Literal::Int(i)],
                },
            )
            .unwrap();
        }

        let result = execute_select(
            &catalog,
            &SelectStmt {
                projection: vec![],
                from: "FOO".to_owned(),
                joins: vec![],
                predicate: Some(Expr::Compare(
                    CompareOp::Gt,
                    Operand::Column(ColumnRef { table: None, column: "ID".to_owned() }),
                    Operand::Literal(Literal::Int(1)),
                )),
                order_by: Some(OrderBy {
                    column: ColumnRef { table: None, column: "ID".to_owned() },
                    desc: true,
                }),
            },
        )
        .unwrap();
        assert_eq!(result.rows, vec![vec![Value::Int(3)], vec![Value::Int(2)]]);
    }

    #[test]
    fn order_by_puts_nulls_last_when_descending() {
        let (_dir, mut catalog) = catalog();
        catalog
            .create_table(&CreateTableStmt {
                name: "FOO".to_owned(),
                columns: vec![column("ID", SqlType::Int, false)],
                primary_keys: vec![],
                foreign_keys: vec![],
            })
            .unwrap();
        execute_insert(&catalog, &InsertStmt { table: "FOO".to_owned(), columns: None, values: vec![Literal::Int(1)] }).unwrap();
        execute_insert(&catalog, &InsertStmt { table: "FOO".to_owned(), columns: None, values: vec![Literal::Null] }).unwrap();

        let result = execute_select(
            &catalog,
            &SelectStmt {
                projection: vec![],
                from: "FOO".to_owned(),
                joins: vec![],
                predicate: None,
                order_by: Some(OrderBy {
                    column: ColumnRef { table: None, column: "ID".to_owned() },
                    desc: true,
                }),
            },
        )
        .unwrap();
        assert_eq!(result.rows, vec![vec![Value::Int(1)], vec![Value::Null]]);
    }

    #[test]
    fn join_combines_tables_and_qualifies_duplicate_headers() {
        let (_dir, mut catalog) = catalog();
        catalog
            .create_table(&CreateTableStmt {
                name: "FOO".to_owned(),
                columns: vec![column("ID", SqlType::Int, false)],
                primary_keys: vec![],
                foreign_keys: vec![],
            })
            .unwrap();
        catalog
            .create_table(&CreateTableStmt {
                name: "BAR".to_owned(),
                columns: vec![column("ID", SqlType::Int, false), column("FOO_ID", SqlType::Int, false)],
                primary_keys: vec![],
                foreign_keys: vec![],
            })
            .unwrap();
        execute_insert(&catalog, &InsertStmt { table: "FOO".to_owned(), columns: None, values: vec![Literal::Int(1)] }).unwrap();
        execute_insert(
            &catalog,
            &InsertStmt {
                table: "BAR".to_owned(),
                columns: None,
                values: vec![Literal::Int(10), Literal::Int(1)],
            },
        )
        .unwrap();

        let result = execute_select(
            &catalog,
            &SelectStmt {
                projection: vec![],
                from: "FOO".to_owned(),
                joins: vec![ast::JoinClause {
                    table: "BAR".to_owned(),
                    on: Expr::Compare(
                        CompareOp::Eq,
                        Operand::Column(ColumnRef { table: Some("FOO".to_owned()), column: "ID".to_owned() }),
                        Operand::Column(ColumnRef { table: Some("BAR".to_owned()), column: "FOO_ID".to_owned() }),
                    ),
                }],
                predicate: None,
                order_by: None,
            },
        )
        .unwrap();
        assert_eq!(result.headers, vec!["FOO.ID".to_owned(), "BAR.ID".to_owned(), "FOO_ID".to_owned()]);
        assert_eq!(result.rows, vec![vec![Value::Int(1), Value::Int(10), Value::Int(1)]]);
    }

    #[test]
    fn delete_without_where_truncates_all_rows() {
        let (_dir, mut catalog) = catalog();
        catalog
            .create_table(&CreateTableStmt {
                name: "FOO".to_owned(),
                columns: vec![column("ID", SqlType::Int, false)],
                primary_keys: vec![],
                foreign_keys: vec![],
            })
            .unwrap();
        execute_insert(&catalog, &InsertStmt { table: "FOO".to_owned(), columns: None, values: vec![Literal::Int(1)] }).unwrap();
        execute_insert(&catalog, &InsertStmt { table: "FOO".to_owned(), columns: None, values: vec![Literal::Int(2)] }).unwrap();

        let deleted = execute_delete(&catalog, &DeleteStmt { table: "FOO".to_owned(), predicate: None }).unwrap();
        assert_eq!(deleted, 2);
    }

    #[test]
    fn delete_with_where_removes_matching_rows_only() {
        let (_dir, mut catalog) = catalog();
        catalog
            .create_table(&CreateTableStmt {
                name: "FOO".to_owned(),
                columns: vec![column("ID", SqlType::Int, false)],
                primary_keys: vec![],
                foreign_keys: vec![],
            })
            .unwrap();
        execute_insert(&catalog, &InsertStmt { table: "FOO".to_owned(), columns: None, values: vec![Literal::Int(1)] }).unwrap();
        execute_insert(&catalog, &InsertStmt { table: "FOO".to_owned(), columns: None, values: vec![Literal::Int(2)] }).unwrap();

        let deleted = execute_delete(
            &catalog,
            &DeleteStmt {
                table: "FOO".to_owned(),
                predicate: Some(Expr::Compare(
                    CompareOp::Eq,
                    Operand::Column(ColumnRef { table: None, column: "ID".to_owned() }),
                    Operand::Literal(Literal::Int(1)),
                )),
            },
        )
        .unwrap();
        assert_eq!(deleted, 1);

        let remaining = execute_select(
            &catalog,
            &SelectStmt {
                projection: vec![],
                from: "FOO".to_owned(),
                joins: vec![],
                predicate: None,
                order_by: None,
            },
        )
        .unwrap();
        assert_eq!(remaining.rows, vec![vec![Value::Int(2)]]);
    }
}
