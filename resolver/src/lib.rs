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

//! Resolves a `(maybe_table, column)` reference against an ordered list of
//! in-scope tables. The same ambiguity can be classified differently
//! depending on the clause it came from: `SELECT` collapses every failure
//! into `fail to resolve`, while `WHERE`/`ORDER BY`/`ON` distinguish a
//! missing table, a missing column and an ambiguous bare column.

use ast::ColumnRef;
use schema::TableDef;
use std::fmt::{self, Display, Formatter};
use value::SqlType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Select,
    /// Carries the clause name ("Where", "Join", "Order by") that is
    /// quoted verbatim in the resulting error, not the column or table.
    Predicate(&'static str),
}

#[derive(Debug, PartialEq)]
pub enum ResolveError {
    FailToResolve(String),
    NonExistingColumn(&'static str),
    AmbiguousColumnReference(&'static str),
    TableNotSpecified(&'static str),
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::FailToResolve(c) => write!(f, "fail to resolve '{}'", c),
            ResolveError::NonExistingColumn(clause) => write!(f, "{} clause trying to reference non existing column", clause),
            ResolveError::AmbiguousColumnReference(clause) => write!(f, "{} clause contains ambiguous column reference", clause),
            ResolveError::TableNotSpecified(clause) => write!(f, "{} clause trying to reference tables which are not specified", clause),
        }
    }
}

/// The ordered list of tables a query has brought into scope, in
/// declaration order (`FROM` table first, then each `JOIN` in order).
pub struct Scope<'a> {
    tables: Vec<(String, &'a TableDef)>,
}

impl<'a> Scope<'a> {
    pub fn new() -> Scope<'a> {
        Scope { tables: Vec::new() }
    }

    pub fn push(&mut self, name: String, def: &'a TableDef) {
        self.tables.push((name, def));
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Sum of `column_order.len()` for every table before `table_index`,
    /// i.e. its offset into a headers vector built by concatenating each
    /// table's qualified column names in scope order.
    pub fn column_offset(&self, table_index: usize) -> usize {
        self.tables[..table_index].iter().map(|(_, def)| def.column_order.len()).sum()
    }

    fn index_of_table(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|(n, _)| n == name)
    }

    /// The declared type of `row[table_index][column_index]`, used to give a
    /// literal operand a target type to coerce against before comparison.
    pub fn column_type(&self, table_index: usize, column_index: usize) -> SqlType {
        let (_, def) = &self.tables[table_index];
        let name = &def.column_order[column_index];
        def.columns[name].data_type
    }

    /// Resolves a reference to `(table_index, column_index)` in this scope.
    pub fn resolve(&self, reference: &ColumnRef, context: Context) -> Result<(usize, usize), ResolveError> {
        match &reference.table {
            Some(table) => self.resolve_qualified(table, &reference.column, context),
            None => self.resolve_bare(&reference.column, context),
        }
    }

    fn resolve_qualified(&self, table: &str, column: &str, context: Context) -> Result<(usize, usize), ResolveError> {
        let table_index = match self.index_of_table(table) {
            Some(i) => i,
            None => {
                return Err(match context {
                    Context::Select => ResolveError::FailToResolve(column.to_owned()),
                    Context::Predicate(clause) => ResolveError::TableNotSpecified(clause),
                })
            }
        };
        let (_, def) = &self.tables[table_index];
        match def.index_of(column) {
            Some(column_index) => Ok((table_index, column_index)),
            None => Err(match context {
                Context::Select => ResolveError::FailToResolve(column.to_owned()),
                Context::Predicate(clause) => ResolveError::NonExistingColumn(clause),
            }),
        }
    }

    fn resolve_bare(&self, column: &str, context: Context) -> Result<(usize, usize), ResolveError> {
        let matches: Vec<(usize, usize)> = self
            .tables
            .iter()
            .enumerate()
            .filter_map(|(table_index, (_, def))| def.index_of(column).map(|column_index| (table_index, column_index)))
            .collect();

        match matches.len() {
            0 => Err(match context {
                Context::Select => ResolveError::FailToResolve(column.to_owned()),
                Context::Predicate(clause) => ResolveError::NonExistingColumn(clause),
            }),
            1 => Ok(matches[0]),
            _ => Err(match context {
                Context::Select => ResolveError::FailToResolve(column.to_owned()),
                Context::Predicate(clause) => ResolveError::AmbiguousColumnReference(clause),
            }),
        }
    }
}

impl<'a> Default for Scope<'a> {
    fn default() -> Scope<'a> {
        Scope::new()
    }
}
