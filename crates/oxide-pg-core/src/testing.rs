//! Hand-written models shared by the unit tests.

use crate::decode::RowReader;
use crate::error::{Error, Result};
use crate::schema::{ColumnDescriptor, Model, TableDescriptor};
use crate::types::{PgValue, ToPgValue, ValueType};

#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub tags: Vec<String>,
    pub profile: serde_json::Value,
}

impl Model for Author {
    fn describe() -> Result<TableDescriptor> {
        Ok(TableDescriptor::new("Author", "author")
            .schema("blog")
            .column(
                ColumnDescriptor::new("id", "id", ValueType::Integer64)
                    .primary_key()
                    .auto_increment(),
            )
            .column(ColumnDescriptor::new("name", "name", ValueType::String))
            .column(ColumnDescriptor::new(
                "tags",
                "tags",
                ValueType::array_of(ValueType::String),
            ))
            .column(ColumnDescriptor::new("profile", "profile", ValueType::json())))
    }

    fn column_value(&self, index: usize) -> Result<PgValue> {
        match index {
            0 => self.id.to_pg_value(),
            1 => self.name.to_pg_value(),
            2 => self.tags.to_pg_value(),
            3 => self.profile.to_pg_value(),
            _ => Err(Error::mapping(format!("`Author` has no column #{index}"))),
        }
    }

    fn from_row(row: &mut RowReader) -> Result<Self> {
        Ok(Self {
            id: row.read()?,
            name: row.read()?,
            tags: row.read()?,
            profile: row.read()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
}

impl Model for Post {
    fn describe() -> Result<TableDescriptor> {
        Ok(TableDescriptor::new("Post", "post")
            .schema("blog")
            .column(
                ColumnDescriptor::new("id", "id", ValueType::Integer64)
                    .primary_key()
                    .auto_increment(),
            )
            .column(ColumnDescriptor::new(
                "author_id",
                "author_id",
                ValueType::Integer64,
            ))
            .column(ColumnDescriptor::new("title", "title", ValueType::String)))
    }

    fn column_value(&self, index: usize) -> Result<PgValue> {
        match index {
            0 => self.id.to_pg_value(),
            1 => self.author_id.to_pg_value(),
            2 => self.title.to_pg_value(),
            _ => Err(Error::mapping(format!("`Post` has no column #{index}"))),
        }
    }

    fn from_row(row: &mut RowReader) -> Result<Self> {
        Ok(Self {
            id: row.read()?,
            author_id: row.read()?,
            title: row.read()?,
        })
    }
}

/// A keyless table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    pub path: String,
}

impl Model for Visit {
    fn describe() -> Result<TableDescriptor> {
        Ok(TableDescriptor::new("Visit", "visit")
            .schema("blog")
            .column(ColumnDescriptor::new("path", "path", ValueType::String)))
    }

    fn column_value(&self, index: usize) -> Result<PgValue> {
        match index {
            0 => self.path.to_pg_value(),
            _ => Err(Error::mapping(format!("`Visit` has no column #{index}"))),
        }
    }

    fn from_row(row: &mut RowReader) -> Result<Self> {
        Ok(Self { path: row.read()? })
    }
}
