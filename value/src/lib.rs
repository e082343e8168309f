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

//! Typed values (`INT`, `CHAR(n)`, `DATE`, `NULL`), their comparability rules
//! and their storage encoding.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Int,
    Char(u32),
    Date,
}

impl Display for SqlType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Int => write!(f, "INT"),
            SqlType::Char(n) => write!(f, "CHAR({})", n),
            SqlType::Date => write!(f, "DATE"),
        }
    }
}

/// A literal as handed to us from the parse tree, still carrying its lexical
/// tag rather than having been coerced into a column's declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Str(String),
    Date(NaiveDate),
    Null,
}

impl Literal {
    /// Classifies a parsed SQL literal. A quoted string is always tagged
    /// `Str`, whatever it looks like lexically — this surface has no
    /// distinct `DATE` token, so a date value is only ever a string that
    /// gets interpreted once its target type (a declared column, or the
    /// column it's compared against) is known.
    pub fn from_sql_value(value: &sqlparser::ast::Value) -> Option<Literal> {
        use sqlparser::ast::Value as V;
        match value {
            V::Number(n, _) => n.parse::<i64>().ok().map(Literal::Int),
            V::SingleQuotedString(s) | V::DoubleQuotedString(s) => Some(Literal::Str(s.clone())),
            V::Null => Some(Literal::Null),
            _ => None,
        }
    }
}

/// A typed, column-shaped value. Inhabits every declared type via `Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Char(String),
    Date(NaiveDate),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            Value::Int(_) => Some(SqlType::Int),
            Value::Char(s) => Some(SqlType::Char(s.len() as u32)),
            Value::Date(_) => Some(SqlType::Date),
            Value::Null => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Char(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Null => write!(f, "NULL"),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ValueError {
    NotNullable(String),
    TypesNotMatched,
    Incomparable,
}

impl Display for ValueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValueError::NotNullable(column) => write!(f, "'{}' is not nullable", column),
            ValueError::TypesNotMatched => write!(f, "types are not matched"),
            ValueError::Incomparable => write!(f, "Trying to compare incomparable columns or values"),
        }
    }
}

/// Coerces a parsed literal into column `name` of declared type `declared`,
/// per the insert coercion table: STR into CHAR(n) truncates; a tag equal to
/// the declared type is accepted as-is; NULL requires the column to be
/// nullable; anything else is a type mismatch.
pub fn coerce_insert(literal: &Literal, name: &str, declared: SqlType, not_null: bool) -> Result<Value, ValueError> {
    match (literal, declared) {
        (Literal::Str(s), SqlType::Char(n)) => {
            let truncated: String = s.chars().take(n as usize).collect();
            Ok(Value::Char(truncated))
        }
        (Literal::Str(s), SqlType::Date) => {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Value::Date).map_err(|_| ValueError::TypesNotMatched)
        }
        (Literal::Int(i), SqlType::Int) => Ok(Value::Int(*i)),
        (Literal::Date(d), SqlType::Date) => Ok(Value::Date(*d)),
        (Literal::Null, _) => {
            if not_null {
                Err(ValueError::NotNullable(name.to_owned()))
            } else {
                Ok(Value::Null)
            }
        }
        _ => Err(ValueError::TypesNotMatched),
    }
}

/// Coerces a literal against the declared type of the column it's being
/// compared to in a predicate, the same way `coerce_insert` does for an
/// `INSERT`. Unlike `coerce_insert` there is no not-null constraint to
/// enforce and no target type to fail against: a literal compared to a
/// column whose type is unknown (the other side is itself a literal) or
/// that can't be parsed as that type is left as its own lexical shape, so
/// `compare` reports the resulting mismatch as incomparable rather than
/// this function silently producing a wrong value.
pub fn literal_for_compare(literal: &Literal, column_type: Option<SqlType>) -> Value {
    match (literal, column_type) {
        (Literal::Str(s), Some(SqlType::Date)) => match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            Ok(date) => Value::Date(date),
            Err(_) => Value::Char(s.clone()),
        },
        _ => Value::from(literal),
    }
}

impl From<&Literal> for Value {
    /// Lossless: a literal compared against a column keeps its own shape,
    /// there is no declared type to truncate or reject against here.
    fn from(literal: &Literal) -> Value {
        match literal {
            Literal::Int(i) => Value::Int(*i),
            Literal::Str(s) => Value::Char(s.clone()),
            Literal::Date(d) => Value::Date(*d),
            Literal::Null => Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Null-aware comparison. `Ok(None)` means the predicate result is unknown
/// because one side was null; `Ok(Some(b))` is the classical boolean result.
/// A comparability violation (mixed types, or a disallowed operator on
/// strings) is a hard error, never a row rejection.
pub fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<Option<bool>, ValueError> {
    if left.is_null() || right.is_null() {
        return Ok(None);
    }
    let ordering = match (left, right) {
        (Value::Int(l), Value::Int(r)) => l.cmp(r),
        (Value::Date(l), Value::Date(r)) => l.cmp(r),
        (Value::Char(l), Value::Char(r)) => {
            if op != CompareOp::Eq && op != CompareOp::NotEq {
                return Err(ValueError::Incomparable);
            }
            l.cmp(r)
        }
        _ => return Err(ValueError::Incomparable),
    };
    Ok(Some(apply(op, ordering)))
}

fn apply(op: CompareOp, ordering: Ordering) -> bool {
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::NotEq => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::LtEq => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::GtEq => ordering != Ordering::Less,
    }
}

/// Total order used by `ORDER BY`: nulls sort before every non-null value,
/// regardless of direction (the direction flag only reverses the rest).
pub fn order_key_less(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Int(l), Value::Int(r)) => l.cmp(r),
        (Value::Date(l), Value::Date(r)) => l.cmp(r),
        (Value::Char(l), Value::Char(r)) => l.cmp(r),
        _ => Ordering::Equal,
    }
}

/// JSON-encodes a full record (a positional tuple of `Value`s aligned to a
/// table's `column_order`).
pub fn encode_record(values: &[Value]) -> String {
    serde_json::to_string(values).expect("Value serialization is infallible")
}

pub fn decode_record(bytes: &[u8]) -> Vec<Value> {
    serde_json::from_slice(bytes).expect("corrupt record in storage")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_truncates_on_insert() {
        let literal = Literal::Str("abcdef".to_owned());
        let value = coerce_insert(&literal, "N", SqlType::Char(3), false).unwrap();
        assert_eq!(value, Value::Char("abc".to_owned()));
    }

    #[test]
    fn str_into_int_is_type_mismatch() {
        let literal = Literal::Str("abc".to_owned());
        let err = coerce_insert(&literal, "X", SqlType::Int, false).unwrap_err();
        assert_eq!(err, ValueError::TypesNotMatched);
    }

    #[test]
    fn null_into_not_null_column_fails() {
        let err = coerce_insert(&Literal::Null, "ID", SqlType::Int, true).unwrap_err();
        assert_eq!(err, ValueError::NotNullable("ID".to_owned()));
    }

    #[test]
    fn null_into_nullable_column_succeeds() {
        let value = coerce_insert(&Literal::Null, "N", SqlType::Char(3), false).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn comparing_null_is_unknown() {
        let result = compare(CompareOp::Eq, &Value::Null, &Value::Int(1)).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn comparing_int_to_date_is_incomparable() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let err = compare(CompareOp::Eq, &Value::Int(1), &Value::Date(date)).unwrap_err();
        assert_eq!(err, ValueError::Incomparable);
    }

    #[test]
    fn string_ordering_operator_is_incomparable() {
        let err = compare(
            CompareOp::Lt,
            &Value::Char("a".to_owned()),
            &Value::Char("b".to_owned()),
        )
        .unwrap_err();
        assert_eq!(err, ValueError::Incomparable);
    }

    #[test]
    fn order_key_puts_null_first() {
        assert_eq!(order_key_less(&Value::Null, &Value::Int(1)), Ordering::Less);
        assert_eq!(order_key_less(&Value::Int(1), &Value::Null), Ordering::Greater);
    }

    #[test]
    fn record_roundtrips_through_json() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let record = vec![Value::Int(1), Value::Char("abc".to_owned()), Value::Date(date), Value::Null];
        let encoded = encode_record(&record);
        assert_eq!(decode_record(encoded.as_bytes()), record);
    }

    #[test]
    fn literal_classifies_date_shaped_strings_as_str() {
        let value = sqlparser::ast::Value::SingleQuotedString("2020-01-01".to_owned());
        assert_eq!(Literal::from_sql_value(&value), Some(Literal::Str("2020-01-01".to_owned())));
    }

    #[test]
    fn literal_converts_to_value_without_coercion() {
        assert_eq!(Value::from(&Literal::Int(5)), Value::Int(5));
        assert_eq!(Value::from(&Literal::Str("abcdef".to_owned())), Value::Char("abcdef".to_owned()));
        assert_eq!(Value::from(&Literal::Null), Value::Null);
    }

    #[test]
    fn literal_classifies_plain_strings() {
        let value = sqlparser::ast::Value::SingleQuotedString("hello".to_owned());
        assert_eq!(Literal::from_sql_value(&value), Some(Literal::Str("hello".to_owned())));
    }

    #[test]
    fn date_shaped_string_inserted_into_char_column_is_stored_verbatim() {
        let literal = Literal::Str("2020-01-01".to_owned());
        let value = coerce_insert(&literal, "N", SqlType::Char(20), false).unwrap();
        assert_eq!(value, Value::Char("2020-01-01".to_owned()));
    }

    #[test]
    fn date_shaped_string_inserted_into_date_column_parses() {
        let literal = Literal::Str("2020-01-01".to_owned());
        let value = coerce_insert(&literal, "D", SqlType::Date, false).unwrap();
        assert_eq!(value, Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()));
    }

    #[test]
    fn non_date_shaped_string_inserted_into_date_column_is_type_mismatch() {
        let literal = Literal::Str("not a date".to_owned());
        let err = coerce_insert(&literal, "D", SqlType::Date, false).unwrap_err();
        assert_eq!(err, ValueError::TypesNotMatched);
    }

    #[test]
    fn literal_for_compare_keeps_char_shape_against_a_char_column() {
        let literal = Literal::Str("2020-01-01".to_owned());
        assert_eq!(literal_for_compare(&literal, Some(SqlType::Char(20))), Value::Char("2020-01-01".to_owned()));
    }

    #[test]
    fn literal_for_compare_parses_against_a_date_column() {
        let literal = Literal::Str("2020-01-01".to_owned());
        assert_eq!(
            literal_for_compare(&literal, Some(SqlType::Date)),
            Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())
        );
    }

    #[test]
    fn literal_for_compare_with_unknown_partner_type_is_lossless() {
        let literal = Literal::Str("2020-01-01".to_owned());
        assert_eq!(literal_for_compare(&literal, None), Value::Char("2020-01-01".to_owned()));
    }
}
