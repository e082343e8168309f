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

//! The schema owner: validates `CREATE TABLE` / `DROP TABLE` against the
//! DDL invariants and keeps every table's schema document, in memory and
//! in the `"metadata"` storage tree, in lock-step.

use ast::{CreateTableStmt, ForeignKeyClause};
use schema::{ColumnDef, ForeignKeyDef, ReferencedBy, TableDef};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};
use storage::{Environment, StorageError, METADATA};
use value::SqlType;

#[derive(Debug, PartialEq)]
pub enum CatalogError {
    TableAlreadyExists,
    CharLengthMustBePositive,
    ColumnDefinitionDuplicated,
    PrimaryKeyDuplicated,
    NonExistingColumnAsPrimaryKey(String),
    ForeignKeyColumnCountMismatch,
    NonExistingColumnAsForeignKey(String),
    ForeignKeyReferencesNonExistingTableOrColumn,
    ForeignKeyReferencesNonPrimaryKeyColumn,
    ForeignKeyReferencesWrongType,
    TableDoesNotExist(String),
    TableIsReferenced(String),
    Storage(StorageError),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::TableAlreadyExists => write!(f, "table with the same name already exists"),
            CatalogError::CharLengthMustBePositive => write!(f, "char length should be over 0"),
            CatalogError::ColumnDefinitionDuplicated => write!(f, "column definition is duplicated"),
            CatalogError::PrimaryKeyDuplicated => write!(f, "primary key definition is duplicated"),
            CatalogError::NonExistingColumnAsPrimaryKey(c) => {
                write!(f, "cannot define non-existing column '{}' as primary key", c)
            }
            CatalogError::ForeignKeyColumnCountMismatch => {
                write!(f, "Number of referencing columns must match referenced columns")
            }
            CatalogError::NonExistingColumnAsForeignKey(c) => {
                write!(f, "cannot define non-existing column '{}' as foreign key", c)
            }
            CatalogError::ForeignKeyReferencesNonExistingTableOrColumn => {
                write!(f, "foreign key references non existing table or column")
            }
            CatalogError::ForeignKeyReferencesNonPrimaryKeyColumn => {
                write!(f, "foreign key references non primary key column")
            }
            CatalogError::ForeignKeyReferencesWrongType => write!(f, "foreign key references wrong type"),
            CatalogError::TableDoesNotExist(name) => write!(f, "'{}' does not exist", name),
            CatalogError::TableIsReferenced(name) => write!(f, "'{}' is referenced by another table", name),
            CatalogError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl From<StorageError> for CatalogError {
    fn from(e: StorageError) -> Self {
        CatalogError::Storage(e)
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

fn normalize(name: &str) -> String {
    name.to_uppercase()
}

/// The authoritative in-memory owner of every table's schema, backed by the
/// `"metadata"` storage tree as the durable source of truth.
pub struct Catalog {
    env: Environment,
    tables: HashMap<String, TableDef>,
}

impl Catalog {
    /// Reconstructs the in-memory map from the metadata tree, opening every
    /// table the metadata enumerates.
    pub fn open(env: Environment) -> CatalogResult<Catalog> {
        let metadata = env.open_or_create_tree(METADATA)?;
        let mut tables = HashMap::new();
        for (name, bytes) in metadata.scan()? {
            let def: TableDef = serde_json::from_slice(&bytes).expect("corrupt schema document in metadata tree");
            env.open_or_create_tree(&name)?;
            tables.insert(name, def);
        }
        Ok(Catalog { env, tables })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.tables.contains_key(&normalize(name))
    }

    pub fn get_schema(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(&normalize(name))
    }

    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn describe(&self, name: &str) -> CatalogResult<Vec<(String, String, &'static str, &'static str)>> {
        let def = self
            .get_schema(name)
            .ok_or_else(|| CatalogError::TableDoesNotExist(name.to_owned()))?;
        Ok(def.describe_rows())
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    fn persist(&mut self, name: &str, def: &TableDef) -> CatalogResult<()> {
        let metadata = self.env.open_or_create_tree(METADATA)?;
        let bytes = serde_json::to_vec(def).expect("schema document serialization is infallible");
        metadata.put(name, bytes)?;
        Ok(())
    }

    pub fn create_table(&mut self, stmt: &CreateTableStmt) -> CatalogResult<()> {
        let name = normalize(&stmt.name);
        if self.tables.contains_key(&name) {
            return Err(CatalogError::TableAlreadyExists);
        }

        let mut column_order = Vec::with_capacity(stmt.columns.len());
        let mut columns = BTreeMap::new();
        let mut seen = std::collections::HashSet::new();
        for column in &stmt.columns {
            if let SqlType::Char(n) = column.data_type {
                if n < 1 {
                    return Err(CatalogError::CharLengthMustBePositive);
                }
            }
            if !seen.insert(normalize(&column.name)) {
                return Err(CatalogError::ColumnDefinitionDuplicated);
            }
            column_order.push(column.name.clone());
            columns.insert(
                column.name.clone(),
                ColumnDef {
                    data_type: column.data_type,
                    not_null: column.not_null,
                },
            );
        }

        if stmt.primary_keys.len() > 1 {
            return Err(CatalogError::PrimaryKeyDuplicated);
        }
        let primary_keys = match stmt.primary_keys.first() {
            Some(pk) => {
                for c in pk {
                    match columns.get_mut(c) {
                        Some(col) => col.not_null = true,
                        None => return Err(CatalogError::NonExistingColumnAsPrimaryKey(c.clone())),
                    }
                }
                pk.clone()
            }
            None => Vec::new(),
        };

        let mut foreign_keys = Vec::with_capacity(stmt.foreign_keys.len());
        for fk in &stmt.foreign_keys {
            self.validate_foreign_key(fk, &name, &columns, &primary_keys)?;
            foreign_keys.push(ForeignKeyDef {
                fk_columns: fk.fk_columns.clone(),
                fk_ref_table: normalize(&fk.ref_table),
                fk_ref_columns: fk.ref_columns.clone(),
            });
        }

        let def = TableDef {
            column_order,
            columns,
            primary_keys,
            foreign_keys: foreign_keys.clone(),
            referenced_by: Vec::new(),
        };

        self.env.open_or_create_tree(&name)?;
        self.persist(&name, &def)?;
        self.tables.insert(name.clone(), def);

        for fk in &foreign_keys {
            let back_edge = ReferencedBy {
                referenced_columns: fk.fk_ref_columns.clone(),
                referencing_table: name.clone(),
                referencing_column: fk.fk_columns.clone(),
            };
            if fk.fk_ref_table == name {
                let def = self.tables.get_mut(&name).expect("just inserted");
                def.referenced_by.push(back_edge);
                let def = def.clone();
                self.persist(&name, &def)?;
            } else {
                let referenced = self.tables.get_mut(&fk.fk_ref_table).expect("validated to exist");
                referenced.referenced_by.push(back_edge);
                let referenced = referenced.clone();
                self.persist(&fk.fk_ref_table, &referenced)?;
            }
        }

        Ok(())
    }

    fn validate_foreign_key(
        &self,
        fk: &ForeignKeyClause,
        table_being_created: &str,
        columns_being_created: &BTreeMap<String, ColumnDef>,
        primary_keys_being_created: &[String],
    ) -> CatalogResult<()> {
        if fk.fk_columns.len() != fk.ref_columns.len() {
            return Err(CatalogError::ForeignKeyColumnCountMismatch);
        }
        for c in &fk.fk_columns {
            if !columns_being_created.contains_key(c) {
                return Err(CatalogError::NonExistingColumnAsForeignKey(c.clone()));
            }
        }

        let ref_table_name = normalize(&fk.ref_table);
        let referenced_columns: &BTreeMap<String, ColumnDef>;
        let referenced_primary_keys: &[String];
        let self_reference = ref_table_name == normalize(table_being_created);
        let owned_ref;
        if self_reference {
            referenced_columns = columns_being_created;
            referenced_primary_keys = primary_keys_being_created;
        } else {
            match self.tables.get(&ref_table_name) {
                Some(def) => {
                    owned_ref = def.clone();
                    referenced_columns = &owned_ref.columns;
                    referenced_primary_keys = &owned_ref.primary_keys;
                }
                None => return Err(CatalogError::ForeignKeyReferencesNonExistingTableOrColumn),
            }
        }

        if fk.ref_columns.len() != referenced_primary_keys.len() {
            return Err(CatalogError::ForeignKeyReferencesNonExistingTableOrColumn);
        }
        for c in &fk.ref_columns {
            if !referenced_columns.contains_key(c) {
                return Err(CatalogError::ForeignKeyReferencesNonExistingTableOrColumn);
            }
            if !referenced_primary_keys.iter().any(|pk| pk == c) {
                return Err(CatalogError::ForeignKeyReferencesNonPrimaryKeyColumn);
            }
        }

        for (fk_col, ref_col) in fk.fk_columns.iter().zip(fk.ref_columns.iter()) {
            let fk_type = columns_being_created[fk_col].data_type;
            let ref_type = match referenced_columns.get(ref_col) {
                Some(col) => col.data_type,
                None => return Err(CatalogError::ForeignKeyReferencesNonExistingTableOrColumn),
            };
            if fk_type != ref_type {
                return Err(CatalogError::ForeignKeyReferencesWrongType);
            }
        }

        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> CatalogResult<()> {
        let name = normalize(name);
        let def = self
            .tables
            .get(&name)
            .ok_or_else(|| CatalogError::TableDoesNotExist(name.clone()))?
            .clone();

        if def.referenced_by.iter().any(|r| r.referencing_table != name) {
            return Err(CatalogError::TableIsReferenced(name));
        }

        for fk in &def.foreign_keys {
            if fk.fk_ref_table == name {
                continue;
            }
            if let Some(referenced) = self.tables.get_mut(&fk.fk_ref_table) {
                referenced.referenced_by.retain(|r| r.referencing_table != name);
                let referenced = referenced.clone();
                self.persist(&fk.fk_ref_table, &referenced)?;
            }
        }

        self.env.drop_tree(&name)?;
        let metadata = self.env.open_or_create_tree(METADATA)?;
        metadata.delete(&name)?;
        self.tables.remove(&name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::ColumnSpec;
    use tempfile::tempdir;

    fn catalog() -> (tempfile::TempDir, Catalog) {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path()).unwrap();
        (dir, Catalog::open(env).unwrap())
    }

    fn create_stmt(name: &str, columns: Vec<(&str, SqlType, bool)>, pk: Vec<Vec<&str>>) -> CreateTableStmt {
        CreateTableStmt {
            name: name.to_owned(),
            columns: columns
                .into_iter()
                .map(|(n, t, nn)| ColumnSpec {
                    name: n.to_owned(),
                    data_type: t,
                    not_null: nn,
                })
                .collect(),
            primary_keys: pk.into_iter().map(|v| v.into_iter().map(str::to_owned).collect()).collect(),
            foreign_keys: vec![],
        }
    }

    #[test]
    fn create_and_describe_round_trip() {
        let (_dir, mut catalog) = catalog();
        let stmt = create_stmt("FOO", vec![("ID", SqlType::Int, false), ("NAME", SqlType::Char(10), false)], vec![vec!["ID"]]);
        catalog.create_table(&stmt).unwrap();
        assert!(catalog.exists("foo"));
        let rows = catalog.describe("FOO").unwrap();
        assert_eq!(rows[0], ("ID".to_owned(), "INT".to_owned(), "N", "PRI"));
    }

    #[test]
    fn duplicate_table_name_is_rejected() {
        let (_dir, mut catalog) = catalog();
        let stmt = create_stmt("FOO", vec![("ID", SqlType::Int, false)], vec![]);
        catalog.create_table(&stmt).unwrap();
        let err = catalog.create_table(&stmt).unwrap_err();
        assert_eq!(err, CatalogError::TableAlreadyExists);
    }

    #[test]
    fn zero_length_char_is_rejected() {
        let (_dir, mut catalog) = catalog();
        let stmt = create_stmt("FOO", vec![("NAME", SqlType::Char(0), false)], vec![]);
        let err = catalog.create_table(&stmt).unwrap_err();
        assert_eq!(err, CatalogError::CharLengthMustBePositive);
    }

    #[test]
    fn duplicate_column_name_is_rejected() {
        let (_dir, mut catalog) = catalog();
        let stmt = create_stmt("FOO", vec![("ID", SqlType::Int, false), ("id", SqlType::Int, false)], vec![]);
        let err = catalog.create_table(&stmt).unwrap_err();
        assert_eq!(err, CatalogError::ColumnDefinitionDuplicated);
    }

    #[test]
    fn primary_key_on_missing_column_is_rejected() {
        let (_dir, mut catalog) = catalog();
        let stmt = create_stmt("FOO", vec![("ID", SqlType::Int, false)], vec![vec!["MISSING"]]);
        let err = catalog.create_table(&stmt).unwrap_err();
        assert_eq!(err, CatalogError::NonExistingColumnAsPrimaryKey("MISSING".to_owned()));
    }

    #[test]
    fn foreign_key_to_non_primary_key_column_is_rejected() {
        let (_dir, mut catalog) = catalog();
        let parent = create_stmt("PARENT", vec![("ID", SqlType::Int, false), ("OTHER", SqlType::Int, false)], vec![vec!["ID"]]);
        catalog.create_table(&parent).unwrap();

        let mut child = create_stmt("CHILD", vec![("PARENT_OTHER", SqlType::Int, false)], vec![]);
        child.foreign_keys.push(ForeignKeyClause {
            fk_columns: vec!["PARENT_OTHER".to_owned()],
            ref_table: "PARENT".to_owned(),
            ref_columns: vec!["OTHER".to_owned()],
        });
        let err = catalog.create_table(&child).unwrap_err();
        assert_eq!(err, CatalogError::ForeignKeyReferencesNonPrimaryKeyColumn);
    }

    #[test]
    fn self_referencing_foreign_key_to_non_primary_key_column_is_rejected() {
        let (_dir, mut catalog) = catalog();
        let mut stmt = create_stmt("TREE", vec![("ID", SqlType::Int, false), ("P", SqlType::Int, false)], vec![vec!["ID"]]);
        stmt.foreign_keys.push(ForeignKeyClause {
            fk_columns: vec!["P".to_owned()],
            ref_table: "TREE".to_owned(),
            ref_columns: vec!["P".to_owned()],
        });
        let err = catalog.create_table(&stmt).unwrap_err();
        assert_eq!(err, CatalogError::ForeignKeyReferencesNonPrimaryKeyColumn);
    }

    #[test]
    fn self_referencing_foreign_key_is_allowed() {
        let (_dir, mut catalog) = catalog();
        let mut stmt = create_stmt("TREE", vec![("ID", SqlType::Int, false), ("PARENT_ID", SqlType::Int, false)], vec![vec!["ID"]]);
        stmt.foreign_keys.push(ForeignKeyClause {
            fk_columns: vec!["PARENT_ID".to_owned()],
            ref_table: "TREE".to_owned(),
            ref_columns: vec!["ID".to_owned()],
        });
        catalog.create_table(&stmt).unwrap();
        let def = catalog.get_schema("TREE").unwrap();
        assert_eq!(def.referenced_by.len(), 1);
    }

    #[test]
    fn drop_referenced_table_is_rejected() {
        let (_dir, mut catalog) = catalog();
        let parent = create_stmt("PARENT", vec![("ID", SqlType::Int, false)], vec![vec!["ID"]]);
        catalog.create_table(&parent).unwrap();
        let mut child = create_stmt("CHILD", vec![("PARENT_ID", SqlType::Int, false)], vec![]);
        child.foreign_keys.push(ForeignKeyClause {
            fk_columns: vec!["PARENT_ID".to_owned()],
            ref_table: "PARENT".to_owned(),
            ref_columns: vec!["ID".to_owned()],
        });
        catalog.create_table(&child).unwrap();

        let err = catalog.drop_table("PARENT").unwrap_err();
        assert_eq!(err, CatalogError::TableIsReferenced("PARENT".to_owned()));

        catalog.drop_table("CHILD").unwrap();
        catalog.drop_table("PARENT").unwrap();
        assert!(!catalog.exists("PARENT"));
    }
}
