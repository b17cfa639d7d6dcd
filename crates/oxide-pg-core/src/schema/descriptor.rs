//! Table and column descriptors.

use crate::error::{Error, Result};
use crate::types::{quote_ident, ValueType};

/// Metadata binding a model field to a physical column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Host field name.
    pub field: &'static str,
    /// Physical column name.
    pub name: String,
    /// Resolved value type.
    pub ty: ValueType,
    /// Whether this column is the primary key.
    pub primary_key: bool,
    /// Whether the server generates this column's value.
    pub auto_increment: bool,
    /// Whether this column accepts NULL.
    pub nullable: bool,
}

impl ColumnDescriptor {
    /// Creates a column descriptor.
    #[must_use]
    pub fn new(field: &'static str, name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            field,
            name: name.into(),
            ty,
            primary_key: false,
            auto_increment: false,
            nullable: false,
        }
    }

    /// Marks the column as primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the column as server-generated.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Marks the column as nullable.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Returns the quoted column name.
    #[must_use]
    pub fn quoted(&self) -> String {
        quote_ident(&self.name)
    }
}

/// Metadata binding a model type to a physical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    /// Host type name of the model.
    pub model: &'static str,
    /// Physical table name.
    pub name: String,
    /// Schema name; filled with the registry default when absent.
    pub schema: Option<String>,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// Creates a descriptor without columns.
    #[must_use]
    pub fn new(model: &'static str, name: impl Into<String>) -> Self {
        Self {
            model,
            name: name.into(),
            schema: None,
            columns: Vec::new(),
        }
    }

    /// Sets the schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Appends a column.
    #[must_use]
    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// Returns the schema-qualified, quoted table name.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }

    /// Finds a column by host field name or physical name.
    #[must_use]
    pub fn find_column(&self, name: &str) -> Option<(usize, &ColumnDescriptor)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.field == name)
            .or_else(|| self.columns.iter().enumerate().find(|(_, c)| c.name == name))
    }

    /// Finds a column, failing with a mapping error when absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelMapping`] if the model has no such field.
    pub fn require_column(&self, name: &str) -> Result<(usize, &ColumnDescriptor)> {
        self.find_column(name).ok_or_else(|| {
            Error::mapping(format!("`{}` has no column mapped to `{name}`", self.model))
        })
    }

    /// Returns the primary key column, if any.
    #[must_use]
    pub fn primary_key(&self) -> Option<(usize, &ColumnDescriptor)> {
        self.columns.iter().enumerate().find(|(_, c)| c.primary_key)
    }

    /// Returns the indices of columns written by a default INSERT.
    #[must_use]
    pub fn insertable_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.auto_increment)
            .map(|(i, _)| i)
            .collect()
    }

    /// Validates the descriptor shape.
    ///
    /// # Errors
    ///
    /// Fails on tables without columns, duplicate column names, or more
    /// than one primary key.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::mapping(format!("`{}` declares no columns", self.model)));
        }
        for (i, column) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(Error::mapping(format!(
                    "`{}` maps column `{}` twice",
                    self.model, column.name
                )));
            }
        }
        if self.columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(Error::mapping(format!(
                "`{}` declares more than one primary key",
                self.model
            )));
        }
        Ok(())
    }
}
