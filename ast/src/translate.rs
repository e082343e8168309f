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

use crate::{
    ColumnRef, ColumnSpec, CreateTableStmt, DeleteStmt, Expr as AstExpr, ForeignKeyClause, InsertStmt, JoinClause,
    Operand, OrderBy, SelectStmt, Stmt,
};
use sqlparser::ast::{
    ColumnOption, DataType, Expr as SqlExpr, Ident, Join, JoinConstraint, JoinOperator, ObjectName, Query, SelectItem,
    SetExpr, Statement, TableConstraint, TableFactor, TableWithJoins, Value as SqlValue,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::fmt::{self, Display, Formatter};
use value::{CompareOp, Literal, SqlType};

#[derive(Debug, PartialEq)]
pub enum TranslateError {
    Parse(String),
    Unsupported(String),
}

impl Display for TranslateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TranslateError::Parse(msg) => write!(f, "{}", msg),
            TranslateError::Unsupported(what) => write!(f, "unsupported statement: {}", what),
        }
    }
}

/// Entry point. A handful of command forms (`EXIT`, `SHOW TABLES`,
/// `DESC`/`DESCRIBE`/`EXPLAIN <table>`) aren't standard SQL and are
/// recognized directly off the raw text before anything touches
/// `sqlparser`; everything else is parsed with the generic dialect and
/// translated below.
pub fn parse_statement(text: &str) -> Result<Stmt, TranslateError> {
    let trimmed = text.trim().trim_end_matches(';').trim();

    if trimmed.eq_ignore_ascii_case("exit") {
        return Ok(Stmt::Exit);
    }
    if trimmed.eq_ignore_ascii_case("show tables") {
        return Ok(Stmt::ShowTables);
    }
    let mut words = trimmed.split_whitespace();
    if let Some(first) = words.next() {
        if first.eq_ignore_ascii_case("desc") || first.eq_ignore_ascii_case("describe") || first.eq_ignore_ascii_case("explain") {
            let table = words
                .next()
                .ok_or_else(|| TranslateError::Parse(format!("expected table name after {}", first)))?;
            return Ok(Stmt::Describe(table.to_uppercase()));
        }
    }

    let dialect = GenericDialect {};
    let mut statements = Parser::parse_sql(&dialect, trimmed).map_err(|e| TranslateError::Parse(e.to_string()))?;
    if statements.len() != 1 {
        return Err(TranslateError::Parse("expected exactly one statement".to_owned()));
    }
    translate_statement(statements.remove(0))
}

fn object_name_to_string(name: &ObjectName) -> String {
    name.0.iter().map(ident_value).collect::<Vec<_>>().join(".")
}

/// Every identifier is folded to upper case the moment it leaves
/// `sqlparser`, so every later layer can compare names with plain `==`.
fn ident_value(ident: &Ident) -> String {
    ident.value.to_uppercase()
}

fn translate_data_type(data_type: &DataType) -> Result<SqlType, TranslateError> {
    match data_type {
        DataType::Int(_) | DataType::Integer(_) => Ok(SqlType::Int),
        DataType::Char(len) | DataType::Varchar(len) => {
            let n = len.map(char_len_to_u32).unwrap_or(1);
            Ok(SqlType::Char(n))
        }
        DataType::Date => Ok(SqlType::Date),
        other => Err(TranslateError::Unsupported(format!("data type {:?}", other))),
    }
}

fn char_len_to_u32(len: sqlparser::ast::CharacterLength) -> u32 {
    match len {
        sqlparser::ast::CharacterLength::IntegerLength { length, .. } => length as u32,
        _ => 1,
    }
}

fn translate_statement(statement: Statement) -> Result<Stmt, TranslateError> {
    match statement {
        Statement::CreateTable { name, columns, constraints, .. } => translate_create_table(name, columns, constraints),
        Statement::Drop { object_type, names, .. } => {
            if !matches!(object_type, sqlparser::ast::ObjectType::Table) {
                return Err(TranslateError::Unsupported("DROP of non-table object".to_owned()));
            }
            let name = names.first().ok_or_else(|| TranslateError::Parse("DROP requires a table name".to_owned()))?;
            Ok(Stmt::DropTable(object_name_to_string(name)))
        }
        Statement::Insert { table_name, columns, source, .. } => translate_insert(table_name, columns, *source),
        Statement::Delete { table_name, selection, .. } => translate_delete(table_name, selection),
        Statement::Query(query) => translate_select(*query).map(Stmt::Select),
        other => Err(TranslateError::Unsupported(format!("{:?}", other))),
    }
}

fn translate_create_table(
    name: ObjectName,
    columns: Vec<sqlparser::ast::ColumnDef>,
    constraints: Vec<TableConstraint>,
) -> Result<Stmt, TranslateError> {
    let mut column_specs = Vec::with_capacity(columns.len());
    let mut inline_primary_key = Vec::new();
    let mut foreign_keys = Vec::new();

    for column in columns {
        let data_type = translate_data_type(&column.data_type)?;
        let mut not_null = false;
        for option in &column.options {
            match &option.option {
                ColumnOption::NotNull => not_null = true,
                ColumnOption::Unique { is_primary: true } => {
                    not_null = true;
                    inline_primary_key.push(ident_value(&column.name));
                }
                ColumnOption::ForeignKey {
                    foreign_table,
                    referred_columns,
                    ..
                } => foreign_keys.push(ForeignKeyClause {
                    fk_columns: vec![ident_value(&column.name)],
                    ref_table: object_name_to_string(foreign_table),
                    ref_columns: referred_columns.iter().map(ident_value).collect(),
                }),
                _ => {}
            }
        }
        column_specs.push(ColumnSpec {
            name: ident_value(&column.name),
            data_type,
            not_null,
        });
    }

    let mut primary_keys = Vec::new();
    if !inline_primary_key.is_empty() {
        primary_keys.push(inline_primary_key);
    }

    for constraint in constraints {
        match constraint {
            TableConstraint::Unique { columns, is_primary: true, .. } => {
                primary_keys.push(columns.iter().map(ident_value).collect());
            }
            TableConstraint::ForeignKey {
                columns,
                foreign_table,
                referred_columns,
                ..
            } => foreign_keys.push(ForeignKeyClause {
                fk_columns: columns.iter().map(ident_value).collect(),
                ref_table: object_name_to_string(&foreign_table),
                ref_columns: referred_columns.iter().map(ident_value).collect(),
            }),
            _ => {}
        }
    }

    Ok(Stmt::CreateTable(CreateTableStmt {
        name: object_name_to_string(&name),
        columns: column_specs,
        primary_keys,
        foreign_keys,
    }))
}

fn translate_insert(table_name: ObjectName, columns: Vec<Ident>, source: Query) -> Result<Stmt, TranslateError> {
    let rows = match *source.body {
        SetExpr::Values(values) => values.rows,
        other => return Err(TranslateError::Unsupported(format!("INSERT source {:?}", other))),
    };
    if rows.len() != 1 {
        return Err(TranslateError::Unsupported("multi-row INSERT".to_owned()));
    }
    let mut literal_values = Vec::with_capacity(rows[0].len());
    for expr in &rows[0] {
        literal_values.push(expr_to_literal(expr)?);
    }
    Ok(Stmt::Insert(InsertStmt {
        table: object_name_to_string(&table_name),
        columns: if columns.is_empty() { None } else { Some(columns.iter().map(ident_value).collect()) },
        values: literal_values,
    }))
}

fn expr_to_literal(expr: &SqlExpr) -> Result<Literal, TranslateError> {
    match expr {
        SqlExpr::Value(value) => {
            Literal::from_sql_value(value).ok_or_else(|| TranslateError::Unsupported(format!("literal {:?}", value)))
        }
        SqlExpr::UnaryOp { op: sqlparser::ast::UnaryOperator::Minus, expr } => match expr.as_ref() {
            SqlExpr::Value(SqlValue::Number(n, _)) => n
                .parse::<i64>()
                .map(|i| Literal::Int(-i))
                .map_err(|_| TranslateError::Unsupported(format!("numeric literal {}", n))),
            other => Err(TranslateError::Unsupported(format!("expression {:?}", other))),
        },
        other => Err(TranslateError::Unsupported(format!("expression {:?}", other))),
    }
}

fn translate_delete(table_name: ObjectName, selection: Option<SqlExpr>) -> Result<Stmt, TranslateError> {
    let predicate = selection.as_ref().map(translate_expr).transpose()?;
    Ok(Stmt::Delete(DeleteStmt {
        table: object_name_to_string(&table_name),
        predicate,
    }))
}

fn table_factor_name(relation: &TableFactor) -> Result<String, TranslateError> {
    match relation {
        TableFactor::Table { name, .. } => Ok(object_name_to_string(name)),
        other => Err(TranslateError::Unsupported(format!("table expression {:?}", other))),
    }
}

fn translate_select(query: Query) -> Result<SelectStmt, TranslateError> {
    let select = match *query.body {
        SetExpr::Select(select) => select,
        other => return Err(TranslateError::Unsupported(format!("query body {:?}", other))),
    };

    if select.from.len() != 1 {
        return Err(TranslateError::Unsupported("SELECT must name exactly one FROM table".to_owned()));
    }
    let TableWithJoins { relation, joins } = select.from.into_iter().next().unwrap();
    let from = table_factor_name(&relation)?;
    let joins = joins.into_iter().map(translate_join).collect::<Result<Vec<_>, _>>()?;

    // An empty projection means "all columns of every in-scope table" per
    // the describing grammar; `SELECT *` is how that is spelled in standard
    // SQL, so a lone wildcard item collapses to an empty projection list.
    let projection = if let [SelectItem::Wildcard(_)] = select.projection.as_slice() {
        Vec::new()
    } else {
        select
            .projection
            .into_iter()
            .map(translate_select_item)
            .collect::<Result<Vec<_>, _>>()?
    };

    let predicate = select.selection.as_ref().map(translate_expr).transpose()?;

    let order_by = match query.order_by.len() {
        0 => None,
        1 => {
            let order = &query.order_by[0];
            let column = expr_to_column_ref(&order.expr)?;
            Some(OrderBy {
                column,
                desc: order.asc == Some(false),
            })
        }
        _ => return Err(TranslateError::Unsupported("ORDER BY with more than one key".to_owned())),
    };

    Ok(SelectStmt {
        projection,
        from,
        joins,
        predicate,
        order_by,
    })
}

fn translate_join(join: Join) -> Result<JoinClause, TranslateError> {
    let table = table_factor_name(&join.relation)?;
    let on = match join.join_operator {
        JoinOperator::Inner(JoinConstraint::On(expr)) => translate_expr(&expr)?,
        other => return Err(TranslateError::Unsupported(format!("join operator {:?}", other))),
    };
    Ok(JoinClause { table, on })
}

fn translate_select_item(item: SelectItem) -> Result<ColumnRef, TranslateError> {
    match item {
        SelectItem::UnnamedExpr(expr) => expr_to_column_ref(&expr),
        other => Err(TranslateError::Unsupported(format!("projection item {:?}", other))),
    }
}

fn expr_to_column_ref(expr: &SqlExpr) -> Result<ColumnRef, TranslateError> {
    match expr {
        SqlExpr::Identifier(ident) => Ok(ColumnRef {
            table: None,
            column: ident_value(ident),
        }),
        SqlExpr::CompoundIdentifier(parts) if parts.len() == 2 => Ok(ColumnRef {
            table: Some(ident_value(&parts[0])),
            column: ident_value(&parts[1]),
        }),
        other => Err(TranslateError::Unsupported(format!("column reference {:?}", other))),
    }
}

fn operand(expr: &SqlExpr) -> Result<Operand, TranslateError> {
    if let Ok(column) = expr_to_column_ref(expr) {
        return Ok(Operand::Column(column));
    }
    expr_to_literal(expr).map(Operand::Literal)
}

fn translate_expr(expr: &SqlExpr) -> Result<AstExpr, TranslateError> {
    use sqlparser::ast::BinaryOperator as B;
    match expr {
        SqlExpr::Nested(inner) => translate_expr(inner),
        SqlExpr::UnaryOp { op: sqlparser::ast::UnaryOperator::Not, expr } => Ok(AstExpr::Not(Box::new(translate_expr(expr)?))),
        SqlExpr::IsNull(inner) => Ok(AstExpr::IsNull {
            column: expr_to_column_ref(inner)?,
            negated: false,
        }),
        SqlExpr::IsNotNull(inner) => Ok(AstExpr::IsNull {
            column: expr_to_column_ref(inner)?,
            negated: true,
        }),
        SqlExpr::BinaryOp { left, op: B::And, right } => {
            Ok(AstExpr::And(Box::new(translate_expr(left)?), Box::new(translate_expr(right)?)))
        }
        SqlExpr::BinaryOp { left, op: B::Or, right } => {
            Ok(AstExpr::Or(Box::new(translate_expr(left)?), Box::new(translate_expr(right)?)))
        }
        SqlExpr::BinaryOp { left, op, right } => {
            let compare_op = match op {
                B::Eq => CompareOp::Eq,
                B::NotEq => CompareOp::NotEq,
                B::Lt => CompareOp::Lt,
                B::LtEq => CompareOp::LtEq,
                B::Gt => CompareOp::Gt,
                B::GtEq => CompareOp::GtEq,
                other => return Err(TranslateError::Unsupported(format!("operator {:?}", other))),
            };
            Ok(AstExpr::Compare(compare_op, operand(left)?, operand(right)?))
        }
        other => Err(TranslateError::Unsupported(format!("predicate expression {:?}", other))),
    }
}
