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

//! Ties the sub-crates together into one process: parses a statement,
//! dispatches it to `catalog` or `query`, and renders the result the way
//! the REPL prints it. `Engine` owns the one `Catalog` a process has.

use ast::{Stmt, TranslateError};
use catalog::{Catalog, CatalogError};
use query::QueryError;
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use storage::{Environment, StorageError};

#[derive(Debug, PartialEq)]
pub enum EngineError {
    Syntax,
    Unsupported(String),
    NoSuchTable,
    CreateTable(CatalogError),
    DropTable(CatalogError),
    Query(QueryError),
    Storage(StorageError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Syntax => write!(f, "Syntax error"),
            EngineError::Unsupported(msg) => write!(f, "{}", msg),
            EngineError::NoSuchTable => write!(f, "no such table"),
            EngineError::CreateTable(e) => write!(f, "Create table has failed: {}", e),
            EngineError::DropTable(e) => write!(f, "Drop table has failed: {}", drop_table_message(e)),
            EngineError::Query(e) => write!(f, "{}", e),
            EngineError::Storage(e) => write!(f, "{}", e),
        }
    }
}

/// `DROP TABLE`'s missing-table case drops the table name, matching every
/// other command's generic "no such table".
fn drop_table_message(error: &CatalogError) -> String {
    match error {
        CatalogError::TableDoesNotExist(_) => "no such table".to_owned(),
        other => other.to_string(),
    }
}

impl From<TranslateError> for EngineError {
    fn from(error: TranslateError) -> EngineError {
        match error {
            TranslateError::Parse(_) => EngineError::Syntax,
            TranslateError::Unsupported(msg) => EngineError::Unsupported(msg),
        }
    }
}

impl From<QueryError> for EngineError {
    fn from(error: QueryError) -> EngineError {
        EngineError::Query(error)
    }
}

impl From<StorageError> for EngineError {
    fn from(error: StorageError) -> EngineError {
        EngineError::Storage(error)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// What a single statement produces, before the REPL renders it.
pub enum Outcome {
    Table { headers: Vec<String>, rows: Vec<Vec<String>> },
    Message(String),
    Exit,
}

/// Owns the one `Catalog` (and the `Environment` beneath it) a process has.
pub struct Engine {
    catalog: Catalog,
}

impl Engine {
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Engine> {
        let env = Environment::open(path)?;
        let catalog = Catalog::open(env)?;
        Ok(Engine { catalog })
    }

    /// Flushes every pending write. Called once, on `EXIT`.
    pub fn close(&self) -> EngineResult<()> {
        self.catalog.environment().close()?;
        Ok(())
    }

    pub fn execute(&mut self, text: &str) -> EngineResult<Outcome> {
        let stmt = ast::parse_statement(text)?;
        match stmt {
            Stmt::CreateTable(stmt) => {
                let name = stmt.name.clone();
                self.catalog.create_table(&stmt).map_err(EngineError::CreateTable)?;
                Ok(Outcome::Message(format!("'{}' table is created", name)))
            }
            Stmt::DropTable(name) => {
                self.catalog.drop_table(&name).map_err(EngineError::DropTable)?;
                Ok(Outcome::Message(format!("'{}' table is dropped", name)))
            }
            Stmt::Insert(stmt) => {
                let inserted = query::execute_insert(&self.catalog, &stmt)?;
                Ok(Outcome::Message(format!("{} row inserted", inserted)))
            }
            Stmt::Delete(stmt) => {
                let deleted = query::execute_delete(&self.catalog, &stmt)?;
                Ok(Outcome::Message(row_count_message(deleted, "row deleted", "rows deleted")))
            }
            Stmt::Select(stmt) => {
                let result = query::execute_select(&self.catalog, &stmt)?;
                let rows: Vec<Vec<String>> = result.rows.iter().map(|row| row.iter().map(|v| v.to_string()).collect()).collect();
                Ok(Outcome::Table { headers: result.headers, rows })
            }
            Stmt::ShowTables => {
                let rows = self.catalog.list_tables().into_iter().map(|name| vec![name]).collect();
                Ok(Outcome::Table { headers: Vec::new(), rows })
            }
            Stmt::Describe(name) => {
                if !self.catalog.exists(&name) {
                    return Err(EngineError::NoSuchTable);
                }
                let rows = self
                    .catalog
                    .describe(&name)
                    .expect("existence just checked")
                    .into_iter()
                    .map(|(column, data_type, nullable, key)| vec![column, data_type, nullable.to_owned(), key.to_owned()])
                    .collect();
                Ok(Outcome::Table {
                    headers: vec!["COLUMN_NAME".to_owned(), "TYPE".to_owned(), "NULL".to_owned(), "KEY".to_owned()],
                    rows,
                })
            }
            Stmt::Exit => Ok(Outcome::Exit),
        }
    }
}

fn row_count_message(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("1 {}", singular)
    } else {
        format!("{} {}", count, plural)
    }
}

/// Per-column width starts at the header length (or 20 with no headers),
/// grows to fit every cell, then rounds up to the next multiple of 10.
fn column_widths(headers: &[String], rows: &[Vec<String>], columns: usize) -> Vec<usize> {
    let mut widths = vec![0usize; columns];
    for (i, width) in widths.iter_mut().enumerate() {
        *width = headers.get(i).map(|h| h.len()).unwrap_or(20);
    }
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }
    widths.iter().map(|w| (w + 9) / 10 * 10).collect()
}

fn padded_row(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths.iter())
        .map(|(cell, width)| format!("{:<width$}", cell, width = width))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Renders `headers`/`rows` the way the REPL prints a `SELECT`, `DESC`,
/// `SHOW TABLES` or `EXPLAIN` result, trailer included.
pub fn format_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let columns = if rows.is_empty() { headers.len() } else { rows[0].len() };
    if columns == 0 {
        return row_count_message(rows.len(), "row in set", "rows in set");
    }

    let widths = column_widths(headers, rows, columns);
    let separator = "-".repeat(widths.iter().sum::<usize>() + 10);

    let mut lines = vec![separator.clone()];
    if !headers.is_empty() {
        lines.push(padded_row(headers, &widths));
        lines.push(separator.clone());
    }
    for row in rows {
        lines.push(padded_row(row, &widths));
    }
    lines.push(separator);
    lines.push(row_count_message(rows.len(), "row in set", "rows in set"));
    lines.join("\n")
}
