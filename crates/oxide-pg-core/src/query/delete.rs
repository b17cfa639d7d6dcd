//! DELETE statements.

use std::marker::PhantomData;
use std::sync::Arc;

use super::statement::Statement;
use crate::decode::ResultSet;
use crate::error::{Error, Result};
use crate::expr::{CallRegistry, Compiler, Expr, Scope};
use crate::raw::{AliasMap, Frame, RawQuery, Slot};
use crate::schema::{Model, TableDescriptor};

/// A DELETE from one model's table. Without a filter every row goes.
#[derive(Debug, Clone)]
pub struct Delete<M> {
    table: Result<Arc<TableDescriptor>>,
    filters: Vec<Expr>,
    calls: Arc<CallRegistry>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Default for Delete<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Delete<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: M::table(),
            filters: Vec::new(),
            calls: CallRegistry::shared(),
            _model: PhantomData,
        }
    }

    /// Compiles method calls with a custom registry.
    #[must_use]
    pub fn with_registry(mut self, calls: Arc<CallRegistry>) -> Self {
        self.calls = calls;
        self
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

    /// Compiles the statement. Its output is the number of deleted rows.
    ///
    /// # Errors
    ///
    /// Returns mapping and compile errors.
    pub fn build(&self) -> Result<Statement<u64>> {
        let table = self.table.as_ref().map_err(Error::clone)?;
        let root = Slot::root();
        let mut query = RawQuery::new().text("DELETE FROM ").table(&root, table);
        if let Some(predicate) = self.filters.iter().cloned().reduce(|a, b| a.and(b)) {
            let scope = Scope::single(Arc::clone(table));
            let compiled = Compiler::with_registry(&scope, &self.calls).compile_predicate(&predicate)?;
            query = query.text(" WHERE ").nested(compiled.query());
        }
        let frame = Frame::unqualified(query.shared(), AliasMap::single(root, table));
        Ok(Statement::new(
            RawQuery::new().frame(Arc::new(frame)).shared(),
            |result: ResultSet| Ok(result.rows_affected),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::col;
    use crate::query::Select;
    use crate::testing::{Author, Post};

    #[test]
    fn test_delete_with_filter() {
        let statement = Delete::<Post>::new().filter(col("id").eq(3)).build().unwrap();
        assert_eq!(
            statement.render().sql,
            r#"DELETE FROM "blog"."post" WHERE ("id") = (3)"#
        );
    }

    #[test]
    fn test_delete_everything() {
        let statement = Delete::<Post>::new().build().unwrap();
        assert_eq!(statement.render().sql, r#"DELETE FROM "blog"."post""#);
    }

    #[test]
    fn test_delete_by_subquery() {
        let authors = Select::<Author>::new()
            .filter(col("name").eq("Spam"))
            .select_scalar::<i64>(col("id"))
            .into_subquery()
            .unwrap();
        let statement = Delete::<Post>::new()
            .filter(col("author_id").pg_in(authors))
            .build()
            .unwrap();
        assert_eq!(
            statement.render().sql,
            concat!(
                r#"DELETE FROM "blog"."post" WHERE ("author_id") IN "#,
                r#"(SELECT "id" FROM "blog"."author" WHERE ("name") = ('Spam'))"#
            )
        );
    }

    #[test]
    fn test_bad_filter() {
        let delete = Delete::<Post>::new().filter(col("title").gt(1));
        assert!(matches!(delete.build(), Err(Error::Compile(_))));
    }
}
