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

//! The schema document: a table's column order, column definitions, primary
//! key, forward foreign keys and back-edges. Pure data, no behavior beyond
//! a handful of lookups the catalog and executor both need.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use value::SqlType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub data_type: SqlType,
    pub not_null: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub fk_columns: Vec<String>,
    pub fk_ref_table: String,
    pub fk_ref_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencedBy {
    pub referenced_columns: Vec<String>,
    pub referencing_table: String,
    pub referencing_column: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub column_order: Vec<String>,
    pub columns: BTreeMap<String, ColumnDef>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDef>,
    pub referenced_by: Vec<ReferencedBy>,
}

/// `key_role` as rendered by `DESC`/`DESCRIBE`/`EXPLAIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    None,
    Primary,
    Foreign,
    PrimaryAndForeign,
}

impl KeyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRole::None => "",
            KeyRole::Primary => "PRI",
            KeyRole::Foreign => "FOR",
            KeyRole::PrimaryAndForeign => "PRI/FOR",
        }
    }
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.column_order.iter().position(|c| c == name)
    }

    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_keys.iter().any(|c| c == name)
    }

    pub fn is_foreign_key(&self, name: &str) -> bool {
        self.foreign_keys.iter().any(|fk| fk.fk_columns.iter().any(|c| c == name))
    }

    pub fn key_role(&self, name: &str) -> KeyRole {
        match (self.is_primary_key(name), self.is_foreign_key(name)) {
            (true, true) => KeyRole::PrimaryAndForeign,
            (true, false) => KeyRole::Primary,
            (false, true) => KeyRole::Foreign,
            (false, false) => KeyRole::None,
        }
    }

    /// Rows for `DESC`/`DESCRIBE`/`EXPLAIN`: `(column_name, type, nullable, key_role)`.
    pub fn describe_rows(&self) -> Vec<(String, String, &'static str, &'static str)> {
        self.column_order
            .iter()
            .map(|name| {
                let col = &self.columns[name];
                let nullable = if col.not_null { "N" } else { "Y" };
                (name.clone(), col.data_type.to_string(), nullable, self.key_role(name).as_str())
            })
            .collect()
    }
}
