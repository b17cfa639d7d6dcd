//! Expression tree nodes.

use std::sync::Arc;

use crate::error::Error;
use crate::raw::{Frame, RawQuery, RenderedQuery, Slot};
use crate::types::{ToPgValue, Typed, ValueType};

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    /// Selects the table slot; only valid as the first step.
    Table(Slot),
    /// Selects a column by field or column name.
    Column(Arc<str>),
    /// `->'key'`, or `->>'key'` when `as_text` is set.
    JsonKey { key: Arc<str>, as_text: bool },
    /// `->n`, or `->>n` when `as_text` is set.
    JsonIndex { index: i32, as_text: bool },
    /// A registered pseudo-property such as `year` or `length`.
    Derived(Arc<str>),
}

/// A chain of member accesses rooted at a table slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath {
    pub steps: Vec<PathStep>,
}

/// Unary operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Cast(ValueType),
    ArrayLength,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl BinaryOp {
    /// Returns the SQL operator.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }

    pub(crate) const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Lt | Self::Lte | Self::Gt | Self::Gte
        )
    }
}

/// A method or function call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: Arc<str>,
    pub receiver: Option<Box<Expr>>,
    pub args: Vec<Expr>,
    /// Set for server-side SQL functions, which are never evaluated on
    /// the host.
    pub sql_function: bool,
}

/// An expression over table slots.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A column, optionally followed by JSON and derived steps.
    Field(FieldPath),
    /// A host value.
    Constant(Typed),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call(Call),
    /// A frozen SELECT used as a value set.
    Subquery(Subquery),
    /// An already compiled fragment.
    Compiled(TypedExpression),
    /// A construction error surfaced when the expression is compiled.
    Invalid(Error),
}

impl Expr {
    /// Creates a constant from a host value.
    ///
    /// Conversion failures are kept and reported at compile time.
    pub fn constant<T: ToPgValue + ?Sized>(value: &T) -> Self {
        Typed::from_host(value).map_or_else(Self::Invalid, Self::Constant)
    }

    /// Returns whether this is a NULL constant.
    #[must_use]
    pub fn is_null_constant(&self) -> bool {
        matches!(self, Self::Constant(t) if t.value.is_null())
    }

    pub(crate) fn unary(op: UnaryOp, operand: Self) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub(crate) fn binary(op: BinaryOp, left: Self, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub(crate) fn method(name: &str, receiver: Self, args: Vec<Self>) -> Self {
        Self::Call(Call {
            name: Arc::from(name),
            receiver: Some(Box::new(receiver)),
            args,
            sql_function: false,
        })
    }
}

/// Conversion into an expression operand.
///
/// Implemented for expressions themselves, subqueries, compiled fragments,
/// and every host value.
pub trait IntoExpr {
    fn into_expr(self) -> Expr;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl IntoExpr for Subquery {
    fn into_expr(self) -> Expr {
        Expr::Subquery(self)
    }
}

impl IntoExpr for TypedExpression {
    fn into_expr(self) -> Expr {
        Expr::Compiled(self)
    }
}

impl<T: ToPgValue> IntoExpr for T {
    fn into_expr(self) -> Expr {
        Expr::constant(&self)
    }
}

/// A compiled expression: a SQL fragment and its value type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpression {
    query: Arc<RawQuery>,
    ty: ValueType,
}

impl TypedExpression {
    /// Wraps a fragment.
    #[must_use]
    pub fn new(query: RawQuery, ty: ValueType) -> Self {
        Self {
            query: Arc::new(query),
            ty,
        }
    }

    /// Wraps a shared fragment.
    #[must_use]
    pub const fn from_shared(query: Arc<RawQuery>, ty: ValueType) -> Self {
        Self { query, ty }
    }

    /// Returns the fragment.
    #[must_use]
    pub const fn query(&self) -> &Arc<RawQuery> {
        &self.query
    }

    /// Returns the value type.
    #[must_use]
    pub const fn ty(&self) -> &ValueType {
        &self.ty
    }

    /// Renders the fragment on its own.
    #[must_use]
    pub fn render(&self) -> RenderedQuery {
        self.query.render()
    }
}

/// A frozen SELECT with its own alias scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    frame: Arc<Frame>,
    projected: Option<ValueType>,
}

impl Subquery {
    pub(crate) const fn new(frame: Arc<Frame>, projected: Option<ValueType>) -> Self {
        Self { frame, projected }
    }

    /// Returns the type of the single projected column, if there is one.
    #[must_use]
    pub const fn projected(&self) -> Option<&ValueType> {
        self.projected.as_ref()
    }

    /// Returns `(SELECT ...)` typed as an array of the projected type.
    ///
    /// # Errors
    ///
    /// Fails when the subquery does not project exactly one expression.
    pub fn expression(&self) -> crate::Result<TypedExpression> {
        let item = self.projected.clone().ok_or_else(|| {
            Error::compile("a subquery used as a value must project a single expression")
        })?;
        Ok(TypedExpression::new(
            self.derived_table(),
            ValueType::array_of(item),
        ))
    }

    /// Returns `(SELECT ...)` for use as a derived table.
    #[must_use]
    pub fn derived_table(&self) -> RawQuery {
        RawQuery::new()
            .text("(")
            .frame(Arc::clone(&self.frame))
            .text(")")
    }

    /// Renders the bare SELECT.
    #[must_use]
    pub fn render(&self) -> RenderedQuery {
        RawQuery::new().frame(Arc::clone(&self.frame)).render()
    }

    /// Renders the bare SELECT with every value inlined.
    #[must_use]
    pub fn render_simple(&self) -> String {
        RawQuery::new().frame(Arc::clone(&self.frame)).render_simple()
    }
}
