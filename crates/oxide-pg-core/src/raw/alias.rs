//! Table slots and their per-render aliases.

use std::fmt;
use std::sync::Arc;

use crate::schema::TableDescriptor;
use crate::types::quote_ident;

/// A named placeholder for one table reference inside a statement.
///
/// Statements number their slots `t0`, `t1`, ... in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(Arc<str>);

impl Slot {
    /// Creates a slot with a caller-chosen name.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the slot for the table at `position`.
    #[must_use]
    pub fn at(position: usize) -> Self {
        Self::new(format!("t{position}"))
    }

    /// Returns the slot of a statement's first table.
    #[must_use]
    pub fn root() -> Self {
        Self::at(0)
    }

    /// Returns the slot name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    slot: Slot,
    alias: Arc<str>,
    table: Arc<str>,
}

/// Maps slots to the aliases they render as.
///
/// A reference whose alias equals its table's own name renders without a
/// qualifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    bindings: Vec<Binding>,
}

impl AliasMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `slot` to the table's own name, so it renders bare.
    #[must_use]
    pub fn single(slot: Slot, table: &TableDescriptor) -> Self {
        let mut map = Self::new();
        map.bind(slot, table.name.as_str(), table);
        map
    }

    /// Binds every slot to its own name.
    #[must_use]
    pub fn positional<'a, I>(slots: I) -> Self
    where
        I: IntoIterator<Item = (&'a Slot, &'a TableDescriptor)>,
    {
        let mut map = Self::new();
        for (slot, table) in slots {
            map.bind(slot.clone(), slot.name(), table);
        }
        map
    }

    /// Binds `slot` to `alias`, replacing an earlier binding.
    pub fn bind(&mut self, slot: Slot, alias: impl Into<Arc<str>>, table: &TableDescriptor) {
        self.bindings.retain(|b| b.slot != slot);
        self.bindings.push(Binding {
            slot,
            alias: alias.into(),
            table: Arc::from(table.name.as_str()),
        });
    }

    /// Returns the alias of `slot`.
    #[must_use]
    pub fn alias(&self, slot: &Slot) -> Option<&str> {
        self.binding(slot).map(|b| &*b.alias)
    }

    /// Returns whether `slot` is bound.
    #[must_use]
    pub fn contains(&self, slot: &Slot) -> bool {
        self.binding(slot).is_some()
    }

    fn binding(&self, slot: &Slot) -> Option<&Binding> {
        self.bindings.iter().find(|b| &b.slot == slot)
    }

    /// Returns the qualifier a column of `slot` renders with.
    ///
    /// `None` means the slot is not bound here; `Some(None)` means the
    /// column renders bare.
    pub(crate) fn qualifier(&self, slot: &Slot) -> Option<Option<String>> {
        self.binding(slot).map(|b| {
            if b.alias == b.table {
                None
            } else {
                Some(alias_ident(&b.alias))
            }
        })
    }

    /// Returns the alias suffix written after a table name, if any.
    pub(crate) fn table_suffix(&self, slot: &Slot) -> Option<String> {
        match self.binding(slot) {
            Some(b) if b.alias == b.table => None,
            Some(b) => Some(alias_ident(&b.alias)),
            None => Some(alias_ident(slot.name())),
        }
    }
}

/// Writes an alias bare when it is a plain lowercase identifier.
pub(crate) fn alias_ident(alias: &str) -> String {
    let plain = alias
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && alias
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if plain {
        String::from(alias)
    } else {
        quote_ident(alias)
    }
}
