//! UPDATE statements.
//!
//! Assignments are compiled as they are added. Each column keeps one
//! pending expression; helpers such as [`Update::add_to_list`] wrap the
//! pending expression instead of replacing it, so successive changes to
//! one column compose:
//!
//! ```ignore
//! Update::<Author>::new()
//!     .add_to_list("tags", vec!["new"])
//!     .remove_from_list("tags", "old")
//!     .filter(col("id").eq(1));
//! // SET "tags" = array_remove(array_cat("tags", @1::text[]), 'old')
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use super::statement::Statement;
use crate::decode::ResultSet;
use crate::error::{Error, Result};
use crate::expr::{
    CallRegistry, Compiler, Expr, IntoExpr, JsonPathItem, ResolvedPath, Scope, TypedExpression,
};
use crate::raw::{AliasMap, Frame, RawQuery, Slot};
use crate::schema::{ColumnDescriptor, Model, TableDescriptor};
use crate::types::{Typed, ValueType};

/// An UPDATE of one model's table.
#[derive(Debug, Clone)]
pub struct Update<M> {
    table: Option<Arc<TableDescriptor>>,
    scope: Scope,
    assignments: Vec<(usize, TypedExpression)>,
    filters: Vec<Expr>,
    calls: Arc<CallRegistry>,
    error: Option<Error>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Default for Update<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Update<M> {
    /// Creates an update with no assignments.
    #[must_use]
    pub fn new() -> Self {
        let (table, scope, error) = match M::table() {
            Ok(table) => (Some(Arc::clone(&table)), Scope::single(table), None),
            Err(e) => (None, Scope::new(), Some(e)),
        };
        Self {
            table,
            scope,
            assignments: Vec::new(),
            filters: Vec::new(),
            calls: CallRegistry::shared(),
            error,
            _model: PhantomData,
        }
    }

    /// Compiles method calls with a custom registry.
    #[must_use]
    pub fn with_registry(mut self, calls: Arc<CallRegistry>) -> Self {
        self.calls = calls;
        self
    }

    /// Assigns a value to a column.
    ///
    /// A later `set` on the same column replaces the pending expression;
    /// use [`Update::set_with`] to build on it instead.
    #[must_use]
    pub fn set(self, column: &str, value: impl IntoExpr) -> Self {
        let value = value.into_expr();
        self.modify(column, |compiler, descriptor, _| {
            compiler.compile_as(&descriptor.ty, &value)
        })
    }

    /// Assigns `f(current)`, where `current` is the pending expression of
    /// the column or the column itself.
    #[must_use]
    pub fn set_with<F>(self, column: &str, f: F) -> Self
    where
        F: FnOnce(Expr) -> Expr,
    {
        self.modify(column, |compiler, descriptor, current| {
            compiler.compile_as(&descriptor.ty, &f(Expr::Compiled(current)))
        })
    }

    /// Appends `values` to an array column.
    #[must_use]
    pub fn add_to_list(self, column: &str, values: impl IntoExpr) -> Self {
        let values = values.into_expr();
        self.modify(column, |compiler, descriptor, current| {
            require_list(descriptor)?;
            let values = compiler.compile_as(&descriptor.ty, &values)?;
            Ok(TypedExpression::new(
                RawQuery::new()
                    .text("array_cat(")
                    .nested(current.query())
                    .text(", ")
                    .nested(values.query())
                    .text(")"),
                descriptor.ty.clone(),
            ))
        })
    }

    /// Appends the elements of `values` not already in an array column.
    #[must_use]
    pub fn add_to_list_distinct(self, column: &str, values: impl IntoExpr) -> Self {
        let values = values.into_expr();
        self.modify(column, |compiler, descriptor, current| {
            require_list(descriptor)?;
            let values = compiler.compile_as(&descriptor.ty, &values)?;
            Ok(TypedExpression::new(
                RawQuery::new()
                    .text("array_cat(")
                    .nested(current.query())
                    .text(", ARRAY(SELECT e FROM unnest(")
                    .nested(values.query())
                    .text(") AS e WHERE NOT (e = ANY(COALESCE(")
                    .nested(current.query())
                    .text(", '{}')))))"),
                descriptor.ty.clone(),
            ))
        })
    }

    /// Removes every occurrence of `value` from an array column.
    #[must_use]
    pub fn remove_from_list(self, column: &str, value: impl IntoExpr) -> Self {
        let value = value.into_expr();
        self.modify(column, |compiler, descriptor, current| {
            let item = require_list(descriptor)?;
            let value = compiler.compile_as(item, &value)?;
            Ok(TypedExpression::new(
                RawQuery::new()
                    .text("array_remove(")
                    .nested(current.query())
                    .text(", ")
                    .nested(value.query())
                    .text(")"),
                descriptor.ty.clone(),
            ))
        })
    }

    /// Removes every element found in `values` from an array column.
    #[must_use]
    pub fn remove_all_from_list(self, column: &str, values: impl IntoExpr) -> Self {
        let values = values.into_expr();
        self.modify(column, |compiler, descriptor, current| {
            require_list(descriptor)?;
            let values = compiler.compile_as(&descriptor.ty, &values)?;
            Ok(TypedExpression::new(
                RawQuery::new()
                    .text("ARRAY(SELECT e FROM unnest(")
                    .nested(current.query())
                    .text(") AS e WHERE e <> ALL(")
                    .nested(values.query())
                    .text("))"),
                descriptor.ty.clone(),
            ))
        })
    }

    /// Sets the value at a JSON path such as `col("profile").json("city")`.
    ///
    /// Missing keys are created. A path without JSON steps replaces the
    /// whole document.
    #[must_use]
    pub fn json_set(self, path: Expr, value: impl IntoExpr) -> Self {
        let value = value.into_expr();
        self.modify_json(&path, |compiler, current, steps| {
            let value = json_value(compiler, &value)?;
            if steps.is_empty() {
                return Ok(value);
            }
            Ok(TypedExpression::new(
                RawQuery::new()
                    .text("jsonb_set(COALESCE(")
                    .nested(current.query())
                    .text(", '{}'::jsonb), ")
                    .nested(&path_array(steps)?)
                    .text(", ")
                    .nested(value.query())
                    .text(", true)"),
                ValueType::json(),
            ))
        })
    }

    /// Appends a value to the array at a JSON path, creating it when
    /// missing.
    #[must_use]
    pub fn json_append(self, path: Expr, value: impl IntoExpr) -> Self {
        let value = value.into_expr();
        self.modify_json(&path, |compiler, current, steps| {
            let value = json_value(compiler, &value)?;
            Ok(TypedExpression::new(
                RawQuery::new()
                    .text("jsonb_append_at_path(COALESCE(")
                    .nested(current.query())
                    .text(", '{}'::jsonb), ")
                    .nested(&path_array(steps)?)
                    .text(", ")
                    .nested(value.query())
                    .text(")"),
                ValueType::json(),
            ))
        })
    }

    /// Removes every element equal to `value` from the array at a JSON
    /// path.
    #[must_use]
    pub fn json_remove_value(self, path: Expr, value: impl IntoExpr) -> Self {
        let value = value.into_expr();
        self.modify_json(&path, |compiler, current, steps| {
            let value = json_value(compiler, &value)?;
            let elements = if steps.is_empty() {
                Arc::clone(current.query())
            } else {
                RawQuery::new()
                    .text("(")
                    .nested(current.query())
                    .text(" #> ")
                    .nested(&path_array(steps)?)
                    .text(")")
                    .shared()
            };
            let kept = RawQuery::new()
                .text("(SELECT COALESCE(jsonb_agg(e), '[]'::jsonb) FROM jsonb_array_elements(")
                .nested(&elements)
                .text(") AS e WHERE e <> ")
                .nested(value.query())
                .text(")")
                .shared();
            if steps.is_empty() {
                return Ok(TypedExpression::from_shared(kept, ValueType::json()));
            }
            Ok(TypedExpression::new(
                RawQuery::new()
                    .text("jsonb_set(")
                    .nested(current.query())
                    .text(", ")
                    .nested(&path_array(steps)?)
                    .text(", ")
                    .nested(&kept)
                    .text(")"),
                ValueType::json(),
            ))
        })
    }

    /// Adds a predicate. Predicates are combined with AND.
    #[must_use]
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filters.push(predicate);
        self
    }

    /// Adds a negated predicate.
    #[must_use]
    pub fn exclude(mut self, predicate: Expr) -> Self {
        self.filters.push(!predicate);
        self
    }

    /// Returns whether no assignment has been made.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Compiles the statement. Its output is the number of updated rows.
    ///
    /// # Errors
    ///
    /// Returns the first construction or compile error, and
    /// [`Error::EmptyMutation`] when nothing is assigned.
    pub fn build(&self) -> Result<Statement<u64>> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| Error::mapping("update has no table"))?;
        if self.assignments.is_empty() {
            return Err(Error::EmptyMutation(table.name.clone()));
        }

        let root = Slot::root();
        let sets: Vec<Arc<RawQuery>> = self
            .assignments
            .iter()
            .map(|(index, value)| {
                RawQuery::new()
                    .text(format!("{} = ", table.columns[*index].quoted()))
                    .nested(value.query())
                    .shared()
            })
            .collect();
        let mut query = RawQuery::new()
            .text("UPDATE ")
            .table(&root, table)
            .text(" SET ")
            .joined(&sets, ", ");
        if let Some(predicate) = self.filters.iter().cloned().reduce(|a, b| a.and(b)) {
            let compiled =
                Compiler::with_registry(&self.scope, &self.calls).compile_predicate(&predicate)?;
            query = query.text(" WHERE ").nested(compiled.query());
        }

        let frame = Frame::unqualified(query.shared(), AliasMap::single(root, table));
        Ok(Statement::new(
            RawQuery::new().frame(Arc::new(frame)).shared(),
            |result: ResultSet| Ok(result.rows_affected),
        ))
    }

    fn pending(&self, index: usize) -> Option<&TypedExpression> {
        self.assignments
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, value)| value)
    }

    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Replaces the pending expression of `column` with
    /// `build(current)`.
    fn modify<F>(mut self, column: &str, build: F) -> Self
    where
        F: FnOnce(&Compiler<'_>, &ColumnDescriptor, TypedExpression) -> Result<TypedExpression>,
    {
        if self.error.is_some() {
            return self;
        }
        let Some(table) = self.table.clone() else {
            return self;
        };
        let outcome = table.require_column(column).and_then(|(index, descriptor)| {
            let current = self.pending(index).cloned().unwrap_or_else(|| {
                TypedExpression::new(
                    RawQuery::new().column(&Slot::root(), &descriptor.name),
                    descriptor.ty.clone(),
                )
            });
            let compiler = Compiler::with_registry(&self.scope, &self.calls);
            build(&compiler, descriptor, current).map(|value| (index, value))
        });
        match outcome {
            Ok((index, value)) => {
                match self.assignments.iter_mut().find(|(i, _)| *i == index) {
                    Some(assignment) => assignment.1 = value,
                    None => self.assignments.push((index, value)),
                }
            }
            Err(e) => self.fail(e),
        }
        self
    }

    /// As [`Update::modify`], for a JSON column addressed by a path.
    fn modify_json<F>(mut self, path: &Expr, build: F) -> Self
    where
        F: FnOnce(&Compiler<'_>, TypedExpression, &[JsonPathItem]) -> Result<TypedExpression>,
    {
        let resolved = match path {
            Expr::Field(field) => Compiler::with_registry(&self.scope, &self.calls).resolve(field),
            _ => Err(Error::compile("JSON helpers take a column path")),
        };
        let (column, steps) = match resolved {
            Ok(ResolvedPath {
                column: Some((slot, index)),
                json_path,
                ..
            }) if slot == Slot::root() => {
                let Some(table) = &self.table else {
                    return self;
                };
                (table.columns[index].name.clone(), json_path)
            }
            Ok(_) => {
                self.fail(Error::compile(
                    "JSON helpers take a path to a column of the updated table",
                ));
                return self;
            }
            Err(e) => {
                self.fail(e);
                return self;
            }
        };
        self.modify(&column, |compiler, descriptor, current| {
            if !descriptor.ty.is_json() {
                return Err(Error::compile(format!(
                    "`{}` is {}, not JSON",
                    descriptor.name, descriptor.ty
                )));
            }
            build(compiler, current, &steps)
        })
    }
}

/// Returns the element type of an array column.
fn require_list(column: &ColumnDescriptor) -> Result<&ValueType> {
    column.ty.item().ok_or_else(|| {
        Error::compile(format!(
            "`{}` is {}, not an array",
            column.name, column.ty
        ))
    })
}

/// A JSON value, with NULL written as the JSON `null`.
fn json_value(compiler: &Compiler<'_>, value: &Expr) -> Result<TypedExpression> {
    let compiled = compiler.compile_as(&ValueType::json(), value)?;
    if *compiled.ty() == ValueType::Null {
        return Ok(TypedExpression::new(
            RawQuery::new().text("'null'::jsonb"),
            ValueType::json(),
        ));
    }
    Ok(compiled)
}

/// `ARRAY['a','0']::text[]`.
fn path_array(steps: &[JsonPathItem]) -> Result<Arc<RawQuery>> {
    let mut query = RawQuery::new().text("ARRAY[");
    for (i, step) in steps.iter().enumerate() {
        if i > 0 {
            query = query.text(",");
        }
        query = query.value(Typed::from_host(&step.as_text())?);
    }
    Ok(query.text("]::text[]").shared())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit, null};
    use crate::testing::Author;

    fn sql(update: &Update<Author>) -> String {
        update.build().unwrap().render().sql
    }

    #[test]
    fn test_set_and_filter() {
        let update = Update::<Author>::new()
            .set("name", "A")
            .filter(col("id").eq(1));
        assert_eq!(
            sql(&update),
            r#"UPDATE "blog"."author" SET "name" = 'A' WHERE ("id") = (1)"#
        );
    }

    #[test]
    fn test_empty_update_is_rejected() {
        let update = Update::<Author>::new().filter(col("id").eq(1));
        assert!(update.is_empty());
        assert_eq!(
            update.build().unwrap_err(),
            Error::EmptyMutation(String::from("author"))
        );
    }

    #[test]
    fn test_later_set_replaces_pending_value() {
        let update = Update::<Author>::new().set("name", "A").set("name", "B");
        assert_eq!(sql(&update), r#"UPDATE "blog"."author" SET "name" = 'B'"#);

        let update = Update::<Author>::new()
            .set("name", "A")
            .set_with("name", |current| current + "!")
            .set("name", "C")
            .set_with("name", |current| current + "?");
        assert_eq!(
            sql(&update),
            r#"UPDATE "blog"."author" SET "name" = ('C') || ('?')"#
        );
    }

    #[test]
    fn test_set_with_composes() {
        let update = Update::<Author>::new()
            .set("name", "A")
            .set_with("name", |current| current + "!");
        assert_eq!(
            sql(&update),
            r#"UPDATE "blog"."author" SET "name" = ('A') || ('!')"#
        );
        let update = Update::<Author>::new().set_with("name", Expr::to_upper);
        assert_eq!(sql(&update), r#"UPDATE "blog"."author" SET "name" = upper("name")"#);
    }

    #[test]
    fn test_set_type_mismatch() {
        let update = Update::<Author>::new().set("name", 5);
        assert!(matches!(update.build(), Err(Error::Compile(_))));
        let update = Update::<Author>::new().set("missing", 5);
        assert!(matches!(update.build(), Err(Error::ModelMapping(_))));
    }

    #[test]
    fn test_list_helpers_nest() {
        let update = Update::<Author>::new()
            .add_to_list("tags", vec!["a", "b"])
            .remove_from_list("tags", "x")
            .filter(col("id").eq(1));
        let rendered = update.build().unwrap().render();
        assert_eq!(
            rendered.sql,
            concat!(
                r#"UPDATE "blog"."author" SET "tags" = array_remove(array_cat("tags", @1::text[]), 'x') "#,
                r#"WHERE ("id") = (1)"#
            )
        );
        assert_eq!(rendered.params.len(), 1);
    }

    #[test]
    fn test_add_distinct_and_remove_all() {
        let update = Update::<Author>::new().add_to_list_distinct("tags", vec!["a"]);
        assert_eq!(
            sql(&update),
            concat!(
                r#"UPDATE "blog"."author" SET "tags" = array_cat("tags", ARRAY(SELECT e FROM "#,
                r#"unnest(@1::text[]) AS e WHERE NOT (e = ANY(COALESCE("tags", '{}')))))"#
            )
        );
        let update = Update::<Author>::new().remove_all_from_list("tags", vec!["a"]);
        assert_eq!(
            sql(&update),
            r#"UPDATE "blog"."author" SET "tags" = ARRAY(SELECT e FROM unnest("tags") AS e WHERE e <> ALL(@1::text[]))"#
        );
    }

    #[test]
    fn test_list_helpers_require_array() {
        let update = Update::<Author>::new().add_to_list("name", vec!["a"]);
        assert!(matches!(update.build(), Err(Error::Compile(_))));
        let update = Update::<Author>::new().remove_from_list("tags", 3);
        assert!(matches!(update.build(), Err(Error::Compile(_))));
    }

    #[test]
    fn test_json_set() {
        let update = Update::<Author>::new().json_set(col("profile").json("address").json("city"), "Oslo");
        assert_eq!(
            sql(&update),
            concat!(
                r#"UPDATE "blog"."author" SET "profile" = jsonb_set(COALESCE("profile", '{}'::jsonb), "#,
                r#"ARRAY['address','city']::text[], to_jsonb(('Oslo')::text), true)"#
            )
        );
        let update = Update::<Author>::new().json_set(col("profile").json("a"), null());
        assert!(sql(&update).contains("'null'::jsonb, true)"));
    }

    #[test]
    fn test_json_append_then_remove() {
        let update = Update::<Author>::new()
            .json_append(col("profile").json("ids"), lit(3))
            .json_remove_value(col("profile").json("ids"), lit(4));
        assert_eq!(
            sql(&update),
            concat!(
                r#"UPDATE "blog"."author" SET "profile" = jsonb_set("#,
                r#"jsonb_append_at_path(COALESCE("profile", '{}'::jsonb), ARRAY['ids']::text[], to_jsonb(3)), "#,
                r#"ARRAY['ids']::text[], (SELECT COALESCE(jsonb_agg(e), '[]'::jsonb) FROM jsonb_array_elements(("#,
                r#"jsonb_append_at_path(COALESCE("profile", '{}'::jsonb), ARRAY['ids']::text[], to_jsonb(3))"#,
                r#" #> ARRAY['ids']::text[])) AS e WHERE e <> to_jsonb(4)))"#
            )
        );
    }

    #[test]
    fn test_json_helpers_require_json_column() {
        let update = Update::<Author>::new().json_set(col("name"), "x");
        assert!(matches!(update.build(), Err(Error::Compile(_))));
        let update = Update::<Author>::new().json_set(lit(1), "x");
        assert!(matches!(update.build(), Err(Error::Compile(_))));
    }

    #[test]
    fn test_decode_rows_affected() {
        let statement = Update::<Author>::new().set("name", "A").build().unwrap();
        assert_eq!(statement.decode(ResultSet::affected(3)).unwrap(), 3);
    }
}
