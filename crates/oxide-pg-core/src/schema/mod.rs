//! Model metadata.
//!
//! A [`Model`] describes how a host struct maps onto a table. The
//! description is usually generated with `#[derive(Model)]`:
//!
//! ```ignore
//! #[derive(Model)]
//! #[model(table = "user", schema = "app")]
//! struct User {
//!     #[column(primary_key, autoincrement)]
//!     id: i64,
//!     name: String,
//!     #[column(ty = "jsonb")]
//!     settings: String,
//! }
//! ```

mod descriptor;
mod registry;

use std::sync::Arc;

pub use descriptor::{ColumnDescriptor, TableDescriptor};
pub use registry::{Registry, DEFAULT_SCHEMA};

use crate::decode::RowReader;
use crate::error::Result;
use crate::types::{PgValue, Typed};

/// A host type stored as rows of one table.
pub trait Model: Sized + Send + Sync + 'static {
    /// Builds the table descriptor.
    ///
    /// # Errors
    ///
    /// Fails when a field type has no PostgreSQL mapping.
    fn describe() -> Result<TableDescriptor>;

    /// Returns the wire value of the column at `index`.
    ///
    /// # Errors
    ///
    /// Fails when the field value cannot be converted.
    fn column_value(&self, index: usize) -> Result<PgValue>;

    /// Reads one instance from the current row position.
    ///
    /// # Errors
    ///
    /// Fails when a column value does not convert into its field.
    fn from_row(row: &mut RowReader) -> Result<Self>;

    /// Returns the registered descriptor.
    ///
    /// # Errors
    ///
    /// Propagates description errors.
    fn table() -> Result<Arc<TableDescriptor>> {
        Registry::global().table::<Self>()
    }

    /// Returns the column at `index` typed with its column descriptor.
    ///
    /// # Errors
    ///
    /// Fails when the column does not exist or does not convert.
    fn typed_column(&self, index: usize) -> Result<Typed> {
        let table = Self::table()?;
        let column = table.columns.get(index).ok_or_else(|| {
            crate::Error::mapping(format!("`{}` has no column #{index}", table.model))
        })?;
        Ok(Typed {
            value: self.column_value(index)?,
            ty: column.ty.clone(),
        })
    }
}
