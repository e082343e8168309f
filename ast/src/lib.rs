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

//! The command language as a typed tree, and the translation from
//! `sqlparser`'s generic SQL grammar into it. Nothing downstream of this
//! crate ever matches on `sqlparser::ast` again.

mod translate;

use value::{CompareOp, Literal, SqlType};

pub use translate::{parse_statement, TranslateError};

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: SqlType,
    pub not_null: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyClause {
    pub fk_columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    /// Every `PRIMARY KEY` clause encountered, in textual order. More than
    /// one is a validation error the catalog reports, not a parse error.
    pub primary_keys: Vec<Vec<String>>,
    pub foreign_keys: Vec<ForeignKeyClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub values: Vec<Literal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(ColumnRef),
    Literal(Literal),
}

/// A predicate tree. Reuses `value::CompareOp` rather than inventing a
/// second copy of the same six operators.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare(CompareOp, Operand, Operand),
    IsNull { column: ColumnRef, negated: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub table: String,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub projection: Vec<ColumnRef>,
    pub from: String,
    pub joins: Vec<JoinClause>,
    pub predicate: Option<Expr>,
    pub order_by: Option<OrderBy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table: String,
    pub predicate: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    CreateTable(CreateTableStmt),
    DropTable(String),
    Insert(InsertStmt),
    Delete(DeleteStmt),
    Select(SelectStmt),
    ShowTables,
    Describe(String),
    Exit,
}
