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

//! Three-valued predicate evaluation: `AND`/`OR`/`NOT` over `{true, false,
//! unknown}`, comparisons that turn null into `unknown`, and `IS [NOT]
//! NULL`. A comparability failure is a hard error, not a row rejection; a
//! row survives the top-level filter only if it evaluates to exactly
//! `Tri::True`.

use ast::{Expr, Operand};
use resolver::{Context, ResolveError, Scope};
use std::fmt::{self, Display, Formatter};
use value::{SqlType, Value, ValueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tri {
    True,
    False,
    Unknown,
}

impl Tri {
    pub fn from_bool(b: bool) -> Tri {
        if b {
            Tri::True
        } else {
            Tri::False
        }
    }

    pub fn from_option(value: Option<bool>) -> Tri {
        match value {
            Some(b) => Tri::from_bool(b),
            None => Tri::Unknown,
        }
    }

    pub fn and(self, other: Tri) -> Tri {
        match (self, other) {
            (Tri::False, _) | (_, Tri::False) => Tri::False,
            (Tri::True, Tri::True) => Tri::True,
            _ => Tri::Unknown,
        }
    }

    pub fn or(self, other: Tri) -> Tri {
        match (self, other) {
            (Tri::True, _) | (_, Tri::True) => Tri::True,
            (Tri::False, Tri::False) => Tri::False,
            _ => Tri::Unknown,
        }
    }

    pub fn not(self) -> Tri {
        match self {
            Tri::True => Tri::False,
            Tri::False => Tri::True,
            Tri::Unknown => Tri::Unknown,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Tri::True)
    }
}

#[derive(Debug, PartialEq)]
pub enum PredicateError {
    Resolve(ResolveError),
    Value(ValueError),
}

impl Display for PredicateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PredicateError::Resolve(e) => write!(f, "{}", e),
            PredicateError::Value(e) => write!(f, "{}", e),
        }
    }
}

impl From<ResolveError> for PredicateError {
    fn from(e: ResolveError) -> Self {
        PredicateError::Resolve(e)
    }
}

impl From<ValueError> for PredicateError {
    fn from(e: ValueError) -> Self {
        PredicateError::Value(e)
    }
}

/// `row[table_index][column_index]`, mirroring `scope`'s table ordering,
/// paired with the column's declared type (`None` for a literal operand) so
/// the other side of a comparison can coerce a literal against it.
fn operand_value<'a>(
    operand: &'a Operand,
    scope: &Scope,
    row: &'a [Vec<Value>],
    context: Context,
) -> Result<(Value, Option<SqlType>), PredicateError> {
    match operand {
        Operand::Column(reference) => {
            let (table_index, column_index) = scope.resolve(reference, context)?;
            let column_type = scope.column_type(table_index, column_index);
            Ok((row[table_index][column_index].clone(), Some(column_type)))
        }
        Operand::Literal(literal) => Ok((Value::from(literal), None)),
    }
}

pub fn evaluate(expr: &Expr, scope: &Scope, row: &[Vec<Value>], context: Context) -> Result<Tri, PredicateError> {
    match expr {
        Expr::And(left, right) => {
            let left = evaluate(left, scope, row, context)?;
            let right = evaluate(right, scope, row, context)?;
            Ok(left.and(right))
        }
        Expr::Or(left, right) => {
            let left = evaluate(left, scope, row, context)?;
            let right = evaluate(right, scope, row, context)?;
            Ok(left.or(right))
        }
        Expr::Not(inner) => Ok(evaluate(inner, scope, row, context)?.not()),
        Expr::Compare(op, left, right) => {
            let (left_value, left_type) = operand_value(left, scope, row, context)?;
            let (right_value, right_type) = operand_value(right, scope, row, context)?;
            let left_value = match left {
                Operand::Literal(literal) => value::literal_for_compare(literal, right_type),
                Operand::Column(_) => left_value,
            };
            let right_value = match right {
                Operand::Literal(literal) => value::literal_for_compare(literal, left_type),
                Operand::Column(_) => right_value,
            };
            let result = value::compare(*op, &left_value, &right_value)?;
            Ok(Tri::from_option(result))
        }
        Expr::IsNull { column, negated } => {
            let (table_index, column_index) = scope.resolve(column, context)?;
            let is_null = row[table_index][column_index].is_null();
            Ok(Tri::from_bool(is_null != *negated))
        }
    }
}
