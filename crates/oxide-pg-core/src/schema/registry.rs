//! Process-wide model metadata.
//!
//! Descriptors are built lazily from [`Model::describe`] the first time a
//! model is used and live for the rest of the process.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use super::descriptor::TableDescriptor;
use super::Model;
use crate::error::Result;

/// Schema applied to models that do not name one.
pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Default)]
struct Arena {
    tables: Vec<Arc<TableDescriptor>>,
    index: HashMap<TypeId, usize>,
}

/// Registry of table descriptors keyed by model type.
pub struct Registry {
    default_schema: RwLock<String>,
    arena: RwLock<Arena>,
}

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_schema: RwLock::new(String::from(DEFAULT_SCHEMA)),
            arena: RwLock::new(Arena::default()),
        }
    }

    /// Returns the process-wide registry.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Returns the descriptor of `M`, building it on first use.
    ///
    /// # Errors
    ///
    /// Propagates mapping and conversion errors from `M::describe`. A
    /// failed description is not cached.
    pub fn table<M: Model>(&self) -> Result<Arc<TableDescriptor>> {
        let key = TypeId::of::<M>();
        if let Some(table) = self.lookup(key) {
            return Ok(table);
        }

        let mut arena = self.arena.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(&slot) = arena.index.get(&key) {
            return Ok(Arc::clone(&arena.tables[slot]));
        }
        let mut table = M::describe()?;
        table.validate()?;
        if table.schema.is_none() {
            table.schema = Some(self.default_schema());
        }
        let table = Arc::new(table);
        let slot = arena.tables.len();
        arena.tables.push(Arc::clone(&table));
        arena.index.insert(key, slot);
        drop(arena);
        Ok(table)
    }

    fn lookup(&self, key: TypeId) -> Option<Arc<TableDescriptor>> {
        let arena = self.arena.read().unwrap_or_else(PoisonError::into_inner);
        arena.index.get(&key).map(|&slot| Arc::clone(&arena.tables[slot]))
    }

    /// Returns the schema given to models without one.
    #[must_use]
    pub fn default_schema(&self) -> String {
        self.default_schema
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Changes the default schema.
    ///
    /// Only affects models described after the call.
    pub fn set_default_schema(&self, schema: impl Into<String>) {
        *self
            .default_schema
            .write()
            .unwrap_or_else(PoisonError::into_inner) = schema.into();
    }

    /// Returns the number of described models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tables
            .len()
    }

    /// Returns whether no model was described yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
