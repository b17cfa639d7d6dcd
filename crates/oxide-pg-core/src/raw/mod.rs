//! Structured SQL fragments.
//!
//! A [`RawQuery`] is a list of parts: SQL text, values, column and table
//! references over [`Slot`]s, and shared sub-fragments. Fragments are
//! immutable once built and are embedded into parents by reference, so one
//! compiled expression can appear in several statements.
//!
//! Rendering turns a fragment into SQL text. See [`render`].

mod alias;
mod render;

use std::borrow::Cow;
use std::sync::Arc;

pub use alias::{AliasMap, Slot};
pub use render::{Parameters, Placeholder, RenderMode, RenderedQuery, Renderer};

use crate::schema::TableDescriptor;
use crate::types::Typed;

/// A fragment rendered under its own alias map.
///
/// Each statement and each subquery is a frame. Lookups of slots missing
/// from the frame fall through to the enclosing frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub query: Arc<RawQuery>,
    pub aliases: AliasMap,
    /// Drops alias qualifiers from every column of this frame.
    pub unqualified: bool,
}

impl Frame {
    /// Creates a qualified frame.
    #[must_use]
    pub const fn new(query: Arc<RawQuery>, aliases: AliasMap) -> Self {
        Self {
            query,
            aliases,
            unqualified: false,
        }
    }

    /// Creates a frame whose columns render without qualifiers.
    #[must_use]
    pub const fn unqualified(query: Arc<RawQuery>, aliases: AliasMap) -> Self {
        Self {
            query,
            aliases,
            unqualified: true,
        }
    }
}

/// One element of a [`RawQuery`].
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Literal SQL text.
    Text(Cow<'static, str>),
    /// A value, inlined or bound depending on the render mode.
    Value(Typed),
    /// A column of the table in `slot`.
    Column { slot: Slot, name: Arc<str> },
    /// The table in `slot`, with its alias when it needs one.
    Table { slot: Slot, table: Arc<TableDescriptor> },
    /// A shared sub-fragment.
    Nested(Arc<RawQuery>),
    /// A sub-fragment with its own alias scope.
    Frame(Arc<Frame>),
}

/// A structured SQL fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQuery {
    parts: Vec<Part>,
}

impl RawQuery {
    /// Creates an empty fragment.
    #[must_use]
    pub const fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Appends SQL text.
    #[must_use]
    pub fn text(mut self, text: impl Into<Cow<'static, str>>) -> Self {
        self.push(Part::Text(text.into()));
        self
    }

    /// Appends a value.
    #[must_use]
    pub fn value(mut self, value: Typed) -> Self {
        self.push(Part::Value(value));
        self
    }

    /// Appends a column reference.
    #[must_use]
    pub fn column(mut self, slot: &Slot, name: &str) -> Self {
        self.push(Part::Column {
            slot: slot.clone(),
            name: Arc::from(name),
        });
        self
    }

    /// Appends a table reference.
    #[must_use]
    pub fn table(mut self, slot: &Slot, table: &Arc<TableDescriptor>) -> Self {
        self.push(Part::Table {
            slot: slot.clone(),
            table: Arc::clone(table),
        });
        self
    }

    /// Appends a shared sub-fragment.
    #[must_use]
    pub fn nested(mut self, query: &Arc<Self>) -> Self {
        self.push(Part::Nested(Arc::clone(query)));
        self
    }

    /// Appends a framed sub-fragment.
    #[must_use]
    pub fn frame(mut self, frame: Arc<Frame>) -> Self {
        self.push(Part::Frame(frame));
        self
    }

    /// Appends sub-fragments separated by `separator`.
    #[must_use]
    pub fn joined<'a, I>(mut self, items: I, separator: &'static str) -> Self
    where
        I: IntoIterator<Item = &'a Arc<Self>>,
    {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.push(Part::Text(Cow::Borrowed(separator)));
            }
            self.push(Part::Nested(Arc::clone(item)));
        }
        self
    }

    /// Appends a part.
    pub fn push(&mut self, part: Part) {
        if let (Some(Part::Text(prev)), Part::Text(next)) = (self.parts.last_mut(), &part) {
            prev.to_mut().push_str(next);
            return;
        }
        self.parts.push(part);
    }

    /// Returns the parts.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Returns whether the fragment has no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Wraps the fragment for sharing.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Renders with `@n` placeholders.
    #[must_use]
    pub fn render(&self) -> RenderedQuery {
        self.render_with(RenderMode::Bound(Placeholder::At))
    }

    /// Renders in the given mode.
    #[must_use]
    pub fn render_with(&self, mode: RenderMode) -> RenderedQuery {
        let mut renderer = Renderer::new(mode);
        renderer.write(self);
        renderer.finish()
    }

    /// Renders with every value inlined.
    #[must_use]
    pub fn render_simple(&self) -> String {
        self.render_with(RenderMode::Simple).sql
    }
}
