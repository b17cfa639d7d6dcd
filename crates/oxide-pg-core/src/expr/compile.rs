//! Compiling expressions into typed SQL fragments.

use std::sync::Arc;

use super::calls::CallRegistry;
use super::dsl::{lit, names};
use super::fold::fold;
use super::functions;
use super::node::{BinaryOp, Call, Expr, FieldPath, PathStep, TypedExpression, UnaryOp};
use crate::error::{Error, Result};
use crate::raw::{RawQuery, Slot};
use crate::schema::TableDescriptor;
use crate::types::{PgValue, TypeKind, Typed, ValueType};

/// The table slots an expression may reference.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    tables: Vec<(Slot, Arc<TableDescriptor>)>,
}

impl Scope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope over one table in the root slot.
    #[must_use]
    pub fn single(table: Arc<TableDescriptor>) -> Self {
        Self::new().with(Slot::root(), table)
    }

    /// Adds a slot.
    #[must_use]
    pub fn with(mut self, slot: Slot, table: Arc<TableDescriptor>) -> Self {
        self.tables.push((slot, table));
        self
    }

    /// Returns the first slot.
    ///
    /// # Errors
    ///
    /// Fails on an empty scope.
    pub fn root(&self) -> Result<&Slot> {
        self.tables
            .first()
            .map(|(slot, _)| slot)
            .ok_or_else(|| Error::mapping("expression has no table in scope"))
    }

    /// Returns the table bound to `slot`.
    ///
    /// # Errors
    ///
    /// Fails when the slot is not declared.
    pub fn table(&self, slot: &Slot) -> Result<&Arc<TableDescriptor>> {
        self.tables
            .iter()
            .find(|(s, _)| s == slot)
            .map(|(_, table)| table)
            .ok_or_else(|| Error::mapping(format!("slot `{slot}` is not declared")))
    }

    /// Iterates the declared slots.
    pub fn slots(&self) -> impl Iterator<Item = (&Slot, &Arc<TableDescriptor>)> {
        self.tables.iter().map(|(slot, table)| (slot, table))
    }
}

/// One step of a JSON document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonPathItem {
    Key(Arc<str>),
    Index(i32),
}

impl JsonPathItem {
    /// The element as written in a `text[]` path.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Key(key) => String::from(&**key),
            Self::Index(index) => index.to_string(),
        }
    }
}

/// A resolved field path.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    pub expr: TypedExpression,
    /// The column the path starts at, unless a derived step followed.
    pub column: Option<(Slot, usize)>,
    /// JSON steps after the column.
    pub json_path: Vec<JsonPathItem>,
}

/// Compiles expressions against a [`Scope`].
pub struct Compiler<'a> {
    scope: &'a Scope,
    calls: &'a CallRegistry,
}

impl<'a> Compiler<'a> {
    /// A compiler using the built-in call handlers.
    #[must_use]
    pub fn new(scope: &'a Scope) -> Self {
        Self::with_registry(scope, CallRegistry::builtin())
    }

    /// A compiler using a custom call registry.
    #[must_use]
    pub const fn with_registry(scope: &'a Scope, calls: &'a CallRegistry) -> Self {
        Self { scope, calls }
    }

    /// Returns the scope.
    #[must_use]
    pub const fn scope(&self) -> &Scope {
        self.scope
    }

    /// Folds and compiles an expression.
    ///
    /// # Errors
    ///
    /// Fails on unknown slots or columns, unsupported nodes, and type or
    /// arity mismatches.
    pub fn compile(&self, expr: &Expr) -> Result<TypedExpression> {
        self.node(&fold(expr))
    }

    /// Compiles an expression that must be boolean.
    ///
    /// # Errors
    ///
    /// As [`Compiler::compile`], and when the result is not boolean.
    pub fn compile_predicate(&self, expr: &Expr) -> Result<TypedExpression> {
        let compiled = self.compile(expr)?;
        match compiled.ty() {
            ValueType::Boolean | ValueType::Null => Ok(compiled),
            other => Err(Error::compile(format!(
                "predicate must be boolean, got {other}"
            ))),
        }
    }

    /// Resolves a field path.
    ///
    /// # Errors
    ///
    /// Fails on unknown slots or columns, misplaced steps, JSON steps on
    /// non-JSON values, and unknown derived properties.
    pub fn resolve(&self, path: &FieldPath) -> Result<ResolvedPath> {
        let mut steps = path.steps.iter();
        let mut next = steps.next();
        let slot = if let Some(PathStep::Table(slot)) = next {
            next = steps.next();
            slot.clone()
        } else {
            self.scope.root()?.clone()
        };
        let table = self.scope.table(&slot)?;
        let name = match next {
            Some(PathStep::Column(name)) => name,
            Some(PathStep::Table(_)) => {
                return Err(Error::compile("a table slot can only start a field path"));
            }
            _ => return Err(Error::compile("a field path must name a column first")),
        };
        let (index, column) = table.require_column(name)?;

        let mut resolved = ResolvedPath {
            expr: TypedExpression::new(
                RawQuery::new().column(&slot, &column.name),
                column.ty.clone(),
            ),
            column: Some((slot, index)),
            json_path: Vec::new(),
        };
        for step in steps {
            match step {
                PathStep::Table(_) => {
                    return Err(Error::compile("a table slot can only start a field path"));
                }
                PathStep::Column(name) => {
                    return Err(Error::compile(format!(
                        "`{name}` cannot follow another column; use a JSON step"
                    )));
                }
                PathStep::JsonKey { key, as_text } => {
                    let key_value = Typed::from_host(&**key)?;
                    resolved.expr = json_step(&resolved.expr, key_value, *as_text)?;
                    resolved.json_path.push(JsonPathItem::Key(Arc::clone(key)));
                }
                PathStep::JsonIndex { index, as_text } => {
                    let index_value = Typed::from_host(index)?;
                    resolved.expr = json_step(&resolved.expr, index_value, *as_text)?;
                    resolved.json_path.push(JsonPathItem::Index(*index));
                }
                PathStep::Derived(name) => {
                    let kind = resolved.expr.ty().kind();
                    let accessor = self.calls.accessor(kind, name).ok_or_else(|| {
                        Error::compile(format!(
                            "no property `{name}` on {}",
                            resolved.expr.ty()
                        ))
                    })?;
                    resolved.expr = accessor(resolved.expr)?;
                    resolved.column = None;
                    resolved.json_path.clear();
                }
            }
        }
        Ok(resolved)
    }

    fn node(&self, expr: &Expr) -> Result<TypedExpression> {
        match expr {
            Expr::Field(path) => Ok(self.resolve(path)?.expr),
            Expr::Constant(value) => Ok(TypedExpression::new(
                RawQuery::new().value(value.clone()),
                value.ty.clone(),
            )),
            Expr::Unary { op, operand } => self.unary(op, operand),
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Call(call) => self.call(call),
            Expr::Subquery(subquery) => subquery.expression(),
            Expr::Compiled(compiled) => Ok(compiled.clone()),
            Expr::Invalid(error) => Err(error.clone()),
        }
    }

    fn unary(&self, op: &UnaryOp, operand: &Expr) -> Result<TypedExpression> {
        let operand = self.node(operand)?;
        match op {
            UnaryOp::Not => {
                require_boolean("NOT", &operand)?;
                Ok(wrap("NOT (", &operand, ")", ValueType::Boolean))
            }
            UnaryOp::Cast(ty) => Ok(wrap("(", &operand, &format!(")::{}", ty.pg_cast()), ty.clone())),
            UnaryOp::ArrayLength => {
                if !operand.ty().is_array() {
                    return Err(Error::compile(format!(
                        "array length requires an array, got {}",
                        operand.ty()
                    )));
                }
                Ok(wrap("cardinality(", &operand, ")", ValueType::Integer))
            }
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<TypedExpression> {
        if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) {
            let subject = if right.is_null_constant() {
                Some(left)
            } else if left.is_null_constant() {
                Some(right)
            } else {
                None
            };
            if let Some(subject) = subject {
                let subject = self.node(subject)?;
                let test = if op == BinaryOp::Eq {
                    ") IS NULL"
                } else {
                    ") IS NOT NULL"
                };
                return Ok(wrap("(", &subject, test, ValueType::Boolean));
            }
        }

        let left = self.node(left)?;
        let right = self.operand(&left, right)?;
        match op {
            BinaryOp::And | BinaryOp::Or => {
                require_boolean(op.sql(), &left)?;
                require_boolean(op.sql(), &right)?;
                Ok(infix(&left, op.sql(), &right, ValueType::Boolean))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                arithmetic(op, &left, &right)
            }
            _ => {
                if left.ty().is_json() && !right.ty().is_json() {
                    let right = to_jsonb(&right);
                    return Ok(infix(&left, op.sql(), &right, ValueType::Boolean));
                }
                if right.ty().is_json() && !left.ty().is_json() {
                    let left = to_jsonb(&left);
                    return Ok(infix(&left, op.sql(), &right, ValueType::Boolean));
                }
                if !comparable(left.ty(), right.ty()) {
                    return Err(Error::compile(format!(
                        "cannot compare {} with {}",
                        left.ty(),
                        right.ty()
                    )));
                }
                Ok(infix(&left, op.sql(), &right, ValueType::Boolean))
            }
        }
    }

    /// Compiles a value stored into a column of type `target`.
    ///
    /// Text constants become enum labels for enum targets and non-JSON
    /// values are wrapped in `to_jsonb` for JSON targets.
    ///
    /// # Errors
    ///
    /// As [`Compiler::compile`], and when the value's type does not fit.
    pub fn compile_as(&self, target: &ValueType, expr: &Expr) -> Result<TypedExpression> {
        let folded = fold(expr);
        let value = match enum_label(target, &folded) {
            Some(label) => label,
            None => self.node(&folded)?,
        };
        if target.is_json() && !value.ty().is_json() && *value.ty() != ValueType::Null {
            return Ok(to_jsonb(&value));
        }
        if !comparable(target, value.ty()) {
            return Err(Error::compile(format!(
                "cannot store {} into a {target} column",
                value.ty()
            )));
        }
        Ok(value)
    }

    /// Compiles the right operand, retyping text constants compared
    /// against enum values.
    fn operand(&self, left: &TypedExpression, right: &Expr) -> Result<TypedExpression> {
        match enum_label(left.ty(), right) {
            Some(label) => Ok(label),
            None => self.node(right),
        }
    }

    fn call(&self, call: &Call) -> Result<TypedExpression> {
        let Some(receiver) = call.receiver.as_deref() else {
            return self.sql_function(&call.name, None, &call.args);
        };
        let receiver = self.node(receiver)?;
        let kind = receiver.ty().kind();

        if let Some(handler) = self.calls.method(kind, &call.name) {
            return handler(self, receiver, &call.args);
        }
        if call.args.is_empty() {
            if let Some(accessor) = self.calls.accessor(kind, &call.name) {
                return accessor(receiver);
            }
        }
        if let Some(native) = self.native(&call.name, &receiver, &call.args)? {
            return Ok(native);
        }
        if functions::lookup(&call.name).is_some() {
            return self.sql_function(&call.name, Some(receiver), &call.args);
        }
        Err(Error::compile(format!(
            "no method `{}` on {}",
            call.name,
            receiver.ty()
        )))
    }

    fn native(
        &self,
        name: &str,
        receiver: &TypedExpression,
        args: &[Expr],
    ) -> Result<Option<TypedExpression>> {
        let compiled = match name {
            names::CONTAINS => {
                let item = self.node(single_arg(name, args)?)?;
                let Some(element) = receiver.ty().item() else {
                    return Err(Error::compile(format!(
                        "`contains` requires a string or an array, got {}",
                        receiver.ty()
                    )));
                };
                if !comparable(element, item.ty()) {
                    return Err(Error::compile(format!(
                        "cannot look for {} in {}",
                        item.ty(),
                        receiver.ty()
                    )));
                }
                TypedExpression::new(
                    RawQuery::new()
                        .text("(")
                        .nested(item.query())
                        .text(") = ANY(")
                        .nested(receiver.query())
                        .text(")"),
                    ValueType::Boolean,
                )
            }
            names::INDEX => self.index(receiver, single_arg(name, args)?)?,
            names::PG_IN | names::PG_NOT_IN => {
                self.membership(receiver, single_arg(name, args)?, name == names::PG_NOT_IN)?
            }
            names::PG_CONTAINS_ANY => {
                let values = self.node(single_arg(name, args)?)?;
                if !receiver.ty().is_array() || !values.ty().is_array() {
                    return Err(Error::compile(format!(
                        "`pg_contains_any` requires arrays, got {} and {}",
                        receiver.ty(),
                        values.ty()
                    )));
                }
                infix(receiver, "&&", &values, ValueType::Boolean)
            }
            _ => return Ok(None),
        };
        Ok(Some(compiled))
    }

    fn index(&self, receiver: &TypedExpression, index: &Expr) -> Result<TypedExpression> {
        match receiver.ty() {
            ValueType::Array(item) => {
                let position = self.compile(&(index.clone() + lit(1)))?;
                if !matches!(position.ty(), ValueType::Integer | ValueType::Integer64) {
                    return Err(Error::compile(format!(
                        "array index must be an integer, got {}",
                        position.ty()
                    )));
                }
                Ok(TypedExpression::new(
                    RawQuery::new()
                        .text("(")
                        .nested(receiver.query())
                        .text(")[")
                        .nested(position.query())
                        .text("]"),
                    (**item).clone(),
                ))
            }
            ValueType::Json(_) => {
                let key = self.node(index)?;
                Ok(TypedExpression::new(
                    RawQuery::new()
                        .text("(")
                        .nested(receiver.query())
                        .text(")->")
                        .nested(key.query()),
                    ValueType::json(),
                ))
            }
            other => Err(Error::compile(format!(
                "indexing requires an array or a JSON value, got {other}"
            ))),
        }
    }

    fn membership(
        &self,
        receiver: &TypedExpression,
        values: &Expr,
        negated: bool,
    ) -> Result<TypedExpression> {
        match values {
            Expr::Constant(constant) if matches!(constant.value, PgValue::Array(_)) => {
                let mut constant = constant.clone();
                if matches!(receiver.ty(), ValueType::Enum(_))
                    && constant.ty.item() == Some(&ValueType::String)
                {
                    constant.ty = ValueType::array_of(receiver.ty().clone());
                }
                if let Some(item) = constant.ty.item() {
                    if !comparable(receiver.ty(), item) {
                        return Err(Error::compile(format!(
                            "cannot test {} for membership in {}",
                            receiver.ty(),
                            constant.ty
                        )));
                    }
                }
                let op = if negated { ") <> ALL(" } else { ") = ANY(" };
                Ok(TypedExpression::new(
                    RawQuery::new()
                        .text("(")
                        .nested(receiver.query())
                        .text(op)
                        .value(constant)
                        .text(")"),
                    ValueType::Boolean,
                ))
            }
            Expr::Subquery(subquery) => {
                let set = subquery.expression()?;
                let op = if negated { ") NOT IN " } else { ") IN " };
                Ok(TypedExpression::new(
                    RawQuery::new()
                        .text("(")
                        .nested(receiver.query())
                        .text(op)
                        .nested(set.query()),
                    ValueType::Boolean,
                ))
            }
            _ => Err(Error::compile(
                "membership requires a host collection or a subquery",
            )),
        }
    }

    fn sql_function(
        &self,
        name: &str,
        receiver: Option<TypedExpression>,
        args: &[Expr],
    ) -> Result<TypedExpression> {
        let function = functions::lookup(name)
            .ok_or_else(|| Error::compile(format!("unknown SQL function `{name}`")))?;
        let mut compiled: Vec<TypedExpression> = receiver.into_iter().collect();
        for arg in args {
            compiled.push(self.node(arg)?);
        }
        if !function.accepts(compiled.len()) {
            let expected = if function.variadic {
                format!("at least {}", function.required)
            } else if function.defaults.is_empty() {
                function.required.to_string()
            } else {
                format!(
                    "{} to {}",
                    function.required,
                    function.required + function.defaults.len()
                )
            };
            return Err(Error::compile(format!(
                "`{}` takes {expected} argument(s), got {}",
                function.name,
                compiled.len()
            )));
        }

        let mut query = RawQuery::new().text(format!("{}(", function.name));
        let mut written = 0;
        for arg in &compiled {
            if written > 0 {
                query = query.text(", ");
            }
            query = query.nested(arg.query());
            written += 1;
        }
        for default in function.missing_defaults(compiled.len()) {
            if written > 0 {
                query = query.text(", ");
            }
            query = query.text(*default);
            written += 1;
        }
        let types: Vec<ValueType> = compiled.iter().map(|c| c.ty().clone()).collect();
        Ok(TypedExpression::new(
            query.text(")"),
            function.returns.resolve(&types),
        ))
    }
}

/// Returns the single argument of a call.
///
/// # Errors
///
/// Fails when the call has a different number of arguments.
pub fn single_arg<'e>(name: &str, args: &'e [Expr]) -> Result<&'e Expr> {
    match args {
        [arg] => Ok(arg),
        _ => Err(Error::compile(format!(
            "`{name}` takes 1 argument, got {}",
            args.len()
        ))),
    }
}

/// `prefix` + fragment + `suffix`.
#[must_use]
pub fn wrap(prefix: &str, inner: &TypedExpression, suffix: &str, ty: ValueType) -> TypedExpression {
    TypedExpression::new(
        RawQuery::new()
            .text(String::from(prefix))
            .nested(inner.query())
            .text(String::from(suffix)),
        ty,
    )
}

/// `(left) op (right)`.
#[must_use]
pub fn infix(
    left: &TypedExpression,
    op: &str,
    right: &TypedExpression,
    ty: ValueType,
) -> TypedExpression {
    TypedExpression::new(
        RawQuery::new()
            .text("(")
            .nested(left.query())
            .text(format!(") {op} ("))
            .nested(right.query())
            .text(")"),
        ty,
    )
}

fn enum_label(target: &ValueType, expr: &Expr) -> Option<TypedExpression> {
    let (ValueType::Enum(_), Expr::Constant(constant)) = (target, expr) else {
        return None;
    };
    let PgValue::Text(label) = &constant.value else {
        return None;
    };
    let value = Typed {
        value: PgValue::Enum(label.clone()),
        ty: target.clone(),
    };
    Some(TypedExpression::new(
        RawQuery::new().value(value),
        target.clone(),
    ))
}

pub(crate) fn to_jsonb(value: &TypedExpression) -> TypedExpression {
    if *value.ty() == ValueType::String {
        wrap("to_jsonb((", value, ")::text)", ValueType::json())
    } else {
        wrap("to_jsonb(", value, ")", ValueType::json())
    }
}

fn json_step(base: &TypedExpression, key: Typed, as_text: bool) -> Result<TypedExpression> {
    if !base.ty().is_json() {
        return Err(Error::compile(format!(
            "JSON access requires a JSON value, got {}",
            base.ty()
        )));
    }
    let (op, ty) = if as_text {
        ("->>", ValueType::String)
    } else {
        ("->", ValueType::json())
    };
    Ok(TypedExpression::new(
        RawQuery::new().nested(base.query()).text(op).value(key),
        ty,
    ))
}

fn require_boolean(op: &str, operand: &TypedExpression) -> Result<()> {
    match operand.ty() {
        ValueType::Boolean | ValueType::Null => Ok(()),
        other => Err(Error::compile(format!(
            "`{op}` requires boolean operands, got {other}"
        ))),
    }
}

/// Returns whether values of the two types can be compared.
#[must_use]
pub fn comparable(a: &ValueType, b: &ValueType) -> bool {
    match (a.kind(), b.kind()) {
        (TypeKind::Null, _) | (_, TypeKind::Null) | (TypeKind::Json, TypeKind::Json) => true,
        (TypeKind::Enum, TypeKind::String) | (TypeKind::String, TypeKind::Enum) => true,
        (TypeKind::Enum, TypeKind::Enum) => a == b,
        (TypeKind::Array, TypeKind::Array) => a
            .item()
            .zip(b.item())
            .is_some_and(|(x, y)| comparable(x, y)),
        (x, y) => x == y,
    }
}

fn arithmetic(
    op: BinaryOp,
    left: &TypedExpression,
    right: &TypedExpression,
) -> Result<TypedExpression> {
    let (l, r) = (left.ty(), right.ty());
    if op == BinaryOp::Add {
        let textual = |t: &ValueType| matches!(t, ValueType::String | ValueType::Enum(_) | ValueType::Null);
        if (*l == ValueType::String || *r == ValueType::String) && textual(l) && textual(r) {
            return Ok(infix(left, "||", right, ValueType::String));
        }
        if l.is_array() && (r.is_array() || *r == ValueType::Null) {
            return Ok(infix(left, "||", right, l.clone()));
        }
    }
    let ty = arithmetic_type(op, l, r).ok_or_else(|| {
        Error::compile(format!("cannot apply `{}` to {l} and {r}", op.sql()))
    })?;
    Ok(infix(left, op.sql(), right, ty))
}

fn arithmetic_type(op: BinaryOp, l: &ValueType, r: &ValueType) -> Option<ValueType> {
    use ValueType as T;
    let additive = matches!(op, BinaryOp::Add | BinaryOp::Sub);
    match (l, r) {
        (T::Null, T::Null) => None,
        (T::Null, t) | (t, T::Null) if t.is_numeric() => Some(t.clone()),
        _ if l.is_numeric() && r.is_numeric() => Some(wider_numeric(l, r)),
        (T::Date | T::DateTime | T::Time, T::Interval) if additive => Some(l.clone()),
        (T::Interval, T::Date | T::DateTime | T::Time) if op == BinaryOp::Add => Some(r.clone()),
        (T::Interval, T::Interval) if additive => Some(T::Interval),
        (T::DateTime, T::DateTime) if op == BinaryOp::Sub => Some(T::Interval),
        (T::Date, T::Date) if op == BinaryOp::Sub => Some(T::Integer),
        (T::Interval, n) if matches!(op, BinaryOp::Mul | BinaryOp::Div) && n.is_numeric() => {
            Some(T::Interval)
        }
        _ => None,
    }
}

fn wider_numeric(a: &ValueType, b: &ValueType) -> ValueType {
    let floating = |t: &ValueType| matches!(t, ValueType::Float | ValueType::Double);
    if floating(a) || floating(b) {
        if *a == ValueType::Float && *b == ValueType::Float {
            ValueType::Float
        } else {
            ValueType::Double
        }
    } else if *a == ValueType::Decimal || *b == ValueType::Decimal {
        ValueType::Decimal
    } else if *a == ValueType::Integer64 || *b == ValueType::Integer64 {
        ValueType::Integer64
    } else {
        ValueType::Integer
    }
}
