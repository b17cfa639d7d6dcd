//! Rendering fragments into SQL text.
//!
//! Two modes exist:
//!
//! - **Bound**: NULL, booleans, integers and short strings are written as
//!   literals; every other value becomes a numbered placeholder with an
//!   explicit cast, e.g. `@1::text[]`, and is collected into
//!   [`Parameters`].
//! - **Simple**: every value is written as an escaped literal with an
//!   explicit cast. Used where placeholders are unavailable, such as
//!   multi-statement batches over the simple query protocol.
//!
//! Rendering is pure: the same fragment always renders to the same text
//! and parameter order.

use std::fmt::Write as _;

use super::alias::AliasMap;
use super::{Frame, Part, RawQuery};
use crate::types::{PgValue, Typed, ValueType};

/// Placeholder syntax for bound values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Placeholder {
    /// `@1`, `@2`, ...
    #[default]
    At,
    /// `$1`, `$2`, ... as expected by the PostgreSQL wire protocol.
    Dollar,
}

impl Placeholder {
    fn write(self, out: &mut String, index: usize) {
        let sigil = match self {
            Self::At => '@',
            Self::Dollar => '$',
        };
        let _ = write!(out, "{sigil}{index}");
    }
}

/// How values are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Values become placeholders unless they are trivially inlinable.
    Bound(Placeholder),
    /// Every value is an escaped literal.
    Simple,
}

/// Ordered values bound to a rendered query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: Vec<Typed>,
}

impl Parameters {
    /// Creates an empty container.
    #[must_use]
    pub const fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Adds a value and returns its 1-based position.
    pub fn push(&mut self, value: Typed) -> usize {
        self.values.push(value);
        self.values.len()
    }

    /// Returns the value at 1-based `position`.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Typed> {
        position.checked_sub(1).and_then(|i| self.values.get(i))
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether there are no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates the values in placeholder order.
    pub fn iter(&self) -> std::slice::Iter<'_, Typed> {
        self.values.iter()
    }

    /// Returns the values.
    #[must_use]
    pub fn into_vec(self) -> Vec<Typed> {
        self.values
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a Typed;
    type IntoIter = std::slice::Iter<'a, Typed>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// SQL text plus its parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Parameters,
}

/// Incremental renderer.
///
/// Several fragments written into one renderer share one [`Parameters`]
/// container and one placeholder numbering.
#[derive(Debug)]
pub struct Renderer {
    mode: RenderMode,
    sql: String,
    params: Parameters,
}

impl Renderer {
    /// Creates a renderer.
    #[must_use]
    pub const fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            sql: String::new(),
            params: Parameters::new(),
        }
    }

    /// Appends the rendering of `query`.
    pub fn write(&mut self, query: &RawQuery) {
        let mut scopes = Vec::new();
        self.write_parts(query, &mut scopes);
    }

    /// Appends SQL text verbatim.
    pub fn write_text(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Returns the rendered text and parameters.
    #[must_use]
    pub fn finish(self) -> RenderedQuery {
        RenderedQuery {
            sql: self.sql,
            params: self.params,
        }
    }

    fn write_parts<'q>(&mut self, query: &'q RawQuery, scopes: &mut Vec<&'q Frame>) {
        for part in query.parts() {
            match part {
                Part::Text(text) => self.sql.push_str(text),
                Part::Value(value) => self.write_value(value),
                Part::Column { slot, name } => {
                    if let Some(qualifier) = Self::column_qualifier(scopes, slot) {
                        self.sql.push_str(&qualifier);
                        self.sql.push('.');
                    }
                    self.sql.push_str(&crate::types::quote_ident(name));
                }
                Part::Table { slot, table } => {
                    self.sql.push_str(&table.qualified_name());
                    let suffix = scopes
                        .iter()
                        .rev()
                        .find(|f| f.aliases.contains(slot))
                        .map_or_else(
                            || AliasMap::new().table_suffix(slot),
                            |f| f.aliases.table_suffix(slot),
                        );
                    if let Some(alias) = suffix {
                        self.sql.push(' ');
                        self.sql.push_str(&alias);
                    }
                }
                Part::Nested(inner) => self.write_parts(inner, scopes),
                Part::Frame(frame) => {
                    scopes.push(frame);
                    self.write_parts(&frame.query, scopes);
                    scopes.pop();
                }
            }
        }
    }

    fn column_qualifier(scopes: &[&Frame], slot: &super::Slot) -> Option<String> {
        for (depth, frame) in scopes.iter().enumerate().rev() {
            if let Some(qualifier) = frame.aliases.qualifier(slot) {
                let innermost = depth + 1 == scopes.len();
                if innermost && frame.unqualified {
                    return None;
                }
                return qualifier;
            }
        }
        Some(super::alias::alias_ident(slot.name()))
    }

    fn write_value(&mut self, value: &Typed) {
        if let Some(literal) = value.value.inline_literal() {
            self.sql.push_str(&literal);
            return;
        }
        match self.mode {
            RenderMode::Bound(placeholder) => {
                let index = self.params.push(value.clone());
                placeholder.write(&mut self.sql, index);
            }
            RenderMode::Simple => self.sql.push_str(&value.value.to_sql_literal()),
        }
        if let Some(cast) = cast_of(&value.ty, &value.value) {
            self.sql.push_str("::");
            self.sql.push_str(&cast);
        }
    }
}

fn cast_of(ty: &ValueType, value: &PgValue) -> Option<String> {
    match (ty, value) {
        (ValueType::Null, PgValue::Array(_)) => Some(String::from("text[]")),
        (ValueType::Null, _) => None,
        (ty, _) => Some(ty.pg_cast()),
    }
}
