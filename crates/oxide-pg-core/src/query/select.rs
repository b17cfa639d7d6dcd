//! SELECT statements.

use std::fmt;
use std::sync::Arc;

use super::statement::{OrderBy, Statement};
use crate::decode::{read_nullable, ResultSet, Row, RowReader, ShapedRow, ShapedValue};
use crate::error::{Error, Result};
use crate::expr::{CallRegistry, Compiler, Expr, IntoExpr, Scope, SlotRef, Subquery};
use crate::raw::{AliasMap, Frame, RawQuery, RenderedQuery, Slot};
use crate::schema::{Model, TableDescriptor};
use crate::types::{FromPgValue, ValueType};

type RowDecoder<T> = Arc<dyn Fn(&mut RowReader) -> Result<T> + Send + Sync>;

#[derive(Debug, Clone)]
enum Projection {
    /// Every column of the slot's table.
    Columns(Slot),
    /// A null indicator followed by every column of the slot's table.
    Nullable(Slot),
    Expr(Expr),
}

#[derive(Debug, Clone)]
enum ShapeEntry {
    Model(Slot),
    Scalar(Expr),
}

/// A composite projection of named nested models and scalars.
///
/// ```ignore
/// let shape = Shape::new()
///     .model("post", &slot(0))
///     .model("author", &slot(1))
///     .scalar("title_length", slot(0).col("title").length());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Shape {
    entries: Vec<(Arc<str>, ShapeEntry)>,
}

impl Shape {
    /// Creates an empty shape.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the model in `slot` under `name`.
    #[must_use]
    pub fn model(mut self, name: &str, slot: &SlotRef) -> Self {
        self.entries
            .push((Arc::from(name), ShapeEntry::Model(slot.slot().clone())));
        self
    }

    /// Adds a scalar under `name`.
    #[must_use]
    pub fn scalar(mut self, name: &str, value: impl IntoExpr) -> Self {
        self.entries
            .push((Arc::from(name), ShapeEntry::Scalar(value.into_expr())));
        self
    }
}

/// A SELECT over a model, with optional LEFT JOINs.
///
/// The first table sits in slot `t0`; each join adds the next slot.
/// Predicates and projections are kept as expressions and compiled by
/// [`Select::build`].
///
/// ```ignore
/// let statement = Select::<Author>::new()
///     .filter(col("name").starts_with("A"))
///     .order_by("-id")
///     .limit(10)
///     .build()?;
/// ```
pub struct Select<Out> {
    tables: Vec<(Slot, Arc<TableDescriptor>)>,
    joins: Vec<Expr>,
    filters: Vec<Expr>,
    projection: Vec<Projection>,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
    decoder: RowDecoder<Out>,
    calls: Arc<CallRegistry>,
    error: Option<Error>,
}

impl<M: Model> Select<M> {
    /// Selects every column of `M`.
    #[must_use]
    pub fn new() -> Self {
        let mut select = Self {
            tables: Vec::new(),
            joins: Vec::new(),
            filters: Vec::new(),
            projection: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
            decoder: Arc::new(M::from_row),
            calls: CallRegistry::shared(),
            error: None,
        };
        match M::table() {
            Ok(table) => {
                select.tables.push((Slot::root(), table));
                select.projection.push(Projection::Columns(Slot::root()));
            }
            Err(e) => select.error = Some(e),
        }
        select
    }
}

impl<M: Model> Default for Select<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Out> Clone for Select<Out> {
    fn clone(&self) -> Self {
        Self {
            tables: self.tables.clone(),
            joins: self.joins.clone(),
            filters: self.filters.clone(),
            projection: self.projection.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
            offset: self.offset,
            distinct: self.distinct,
            decoder: Arc::clone(&self.decoder),
            calls: Arc::clone(&self.calls),
            error: self.error.clone(),
        }
    }
}

impl<Out> fmt::Debug for Select<Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("tables", &self.tables)
            .field("joins", &self.joins)
            .field("filters", &self.filters)
            .field("projection", &self.projection)
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("distinct", &self.distinct)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<Out: Send + 'static> Select<Out> {
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

    /// LEFT JOINs `B` in the next slot and appends it to the output.
    ///
    /// `on` may reference this slot and every earlier one. Rows without
    /// a match decode `B` as `None`.
    #[must_use]
    pub fn left_join<B: Model>(mut self, on: Expr) -> Select<(Out, Option<B>)> {
        let slot = Slot::at(self.tables.len());
        match B::table() {
            Ok(table) => {
                self.tables.push((slot.clone(), table));
                self.joins.push(on);
                self.projection.push(Projection::Nullable(slot));
            }
            Err(e) => self.fail(e),
        }
        let previous = Arc::clone(&self.decoder);
        let projection = std::mem::take(&mut self.projection);
        self.reshape(
            projection,
            Arc::new(move |row: &mut RowReader| {
                let left = previous(row)?;
                let right = read_nullable::<B>(row)?;
                Ok((left, right))
            }),
        )
    }

    /// Projects one expression.
    #[must_use]
    pub fn select_scalar<T>(self, value: impl IntoExpr) -> Select<T>
    where
        T: FromPgValue + Send + 'static,
    {
        self.reshape(
            vec![Projection::Expr(value.into_expr())],
            Arc::new(|row: &mut RowReader| row.read::<T>()),
        )
    }

    /// Projects a list of expressions.
    #[must_use]
    pub fn select_fields<I>(self, fields: I) -> Select<Row>
    where
        I: IntoIterator,
        I::Item: IntoExpr,
    {
        let projection: Vec<Projection> = fields
            .into_iter()
            .map(|field| Projection::Expr(field.into_expr()))
            .collect();
        let count = projection.len();
        self.reshape(
            projection,
            Arc::new(move |row: &mut RowReader| {
                let values = (0..count)
                    .map(|_| row.next_value())
                    .collect::<Result<Vec<_>>>()?;
                Ok(Row::new(values))
            }),
        )
    }

    /// Projects a composite shape.
    ///
    /// Model entries must name slots already declared by joins.
    #[must_use]
    pub fn select_shape(mut self, shape: Shape) -> Select<ShapedRow> {
        enum Reading {
            Model(usize),
            Scalar,
        }

        let mut projection = Vec::with_capacity(shape.entries.len());
        let mut readings = Vec::with_capacity(shape.entries.len());
        for (name, entry) in shape.entries {
            match entry {
                ShapeEntry::Model(slot) => match self.table_of(&slot) {
                    Ok(table) => {
                        readings.push((name, Reading::Model(table.columns.len())));
                        projection.push(Projection::Nullable(slot));
                    }
                    Err(e) => self.fail(e),
                },
                ShapeEntry::Scalar(expr) => {
                    readings.push((name, Reading::Scalar));
                    projection.push(Projection::Expr(expr));
                }
            }
        }
        self.reshape(
            projection,
            Arc::new(move |row: &mut RowReader| {
                let mut shaped = ShapedRow::default();
                for (name, reading) in &readings {
                    let value = match reading {
                        Reading::Scalar => ShapedValue::Scalar(row.next_value()?),
                        Reading::Model(count) => {
                            let present: Option<bool> = row.read()?;
                            if present.unwrap_or(false) {
                                let values = (0..*count)
                                    .map(|_| row.next_value())
                                    .collect::<Result<Vec<_>>>()?;
                                ShapedValue::Model(Some(values))
                            } else {
                                row.skip(*count)?;
                                ShapedValue::Model(None)
                            }
                        }
                    };
                    shaped.insert(Arc::clone(name), value);
                }
                Ok(shaped)
            }),
        )
    }

    /// Adds an ORDER BY item: an expression, or `"col"` / `"-col"`.
    #[must_use]
    pub fn order_by(mut self, order: impl Into<OrderBy>) -> Self {
        self.order_by.push(order.into());
        self
    }

    /// Adds a descending ORDER BY item.
    #[must_use]
    pub fn order_by_desc(mut self, expr: Expr) -> Self {
        self.order_by.push(OrderBy::desc(expr));
        self
    }

    /// Sets the LIMIT.
    #[must_use]
    pub const fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Sets the OFFSET.
    #[must_use]
    pub const fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Selects distinct rows.
    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Compiles the statement.
    ///
    /// # Errors
    ///
    /// Returns the first construction or compile error.
    pub fn build(&self) -> Result<Statement<Vec<Out>>> {
        let (body, _) = self.body()?;
        let decoder = Arc::clone(&self.decoder);
        Ok(Statement::new(self.framed(body), move |result: ResultSet| {
            result
                .rows
                .into_iter()
                .map(|values| decoder(&mut RowReader::new(values)))
                .collect()
        }))
    }

    /// Compiles a row count of this query.
    ///
    /// DISTINCT, LIMIT and OFFSET are honored by counting a derived table.
    ///
    /// # Errors
    ///
    /// As [`Select::build`].
    pub fn count(&self) -> Result<Statement<i64>> {
        let query = if self.distinct || self.limit.is_some() || self.offset.is_some() {
            let (body, _) = self.body()?;
            RawQuery::new()
                .text("SELECT COUNT(*) FROM (")
                .nested(&body.shared())
                .text(") AS counted")
        } else {
            self.check()?;
            let scope = self.scope(self.tables.len());
            let compiler = Compiler::with_registry(&scope, &self.calls);
            self.clauses(RawQuery::new().text("SELECT COUNT(*)"), &compiler)?
        };
        Ok(Statement::new(self.framed(query), |result: ResultSet| {
            let values = result
                .rows
                .into_iter()
                .next()
                .ok_or_else(|| Error::conversion("count returned no row"))?;
            RowReader::new(values).read::<i64>()
        }))
    }

    /// Freezes the query for use inside another statement.
    ///
    /// # Errors
    ///
    /// As [`Select::build`].
    pub fn into_subquery(self) -> Result<Subquery> {
        let (body, projected) = self.body()?;
        let frame = Frame::new(body.shared(), self.aliases());
        Ok(Subquery::new(Arc::new(frame), projected))
    }

    /// Renders the statement with `@n` placeholders.
    ///
    /// # Errors
    ///
    /// As [`Select::build`].
    pub fn to_sql(&self) -> Result<RenderedQuery> {
        Ok(self.build()?.render())
    }

    fn reshape<T>(self, projection: Vec<Projection>, decoder: RowDecoder<T>) -> Select<T> {
        Select {
            tables: self.tables,
            joins: self.joins,
            filters: self.filters,
            projection,
            order_by: self.order_by,
            limit: self.limit,
            offset: self.offset,
            distinct: self.distinct,
            decoder,
            calls: self.calls,
            error: self.error,
        }
    }

    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn check(&self) -> Result<()> {
        self.error.clone().map_or(Ok(()), Err)
    }

    fn table_of(&self, slot: &Slot) -> Result<Arc<TableDescriptor>> {
        self.tables
            .iter()
            .find(|(s, _)| s == slot)
            .map(|(_, table)| Arc::clone(table))
            .ok_or_else(|| Error::mapping(format!("slot `{slot}` is not declared")))
    }

    /// The first `count` slots.
    fn scope(&self, count: usize) -> Scope {
        self.tables
            .iter()
            .take(count)
            .fold(Scope::new(), |scope, (slot, table)| {
                scope.with(slot.clone(), Arc::clone(table))
            })
    }

    fn aliases(&self) -> AliasMap {
        match self.tables.as_slice() {
            [(slot, table)] => AliasMap::single(slot.clone(), table),
            tables => AliasMap::positional(tables.iter().map(|(slot, table)| (slot, &**table))),
        }
    }

    fn framed(&self, body: RawQuery) -> Arc<RawQuery> {
        let frame = Frame::new(body.shared(), self.aliases());
        RawQuery::new().frame(Arc::new(frame)).shared()
    }

    /// The full SELECT and the type of its single projected expression.
    fn body(&self) -> Result<(RawQuery, Option<ValueType>)> {
        self.check()?;
        let scope = self.scope(self.tables.len());
        let compiler = Compiler::with_registry(&scope, &self.calls);

        let mut items = Vec::new();
        let mut projected = None;
        for item in &self.projection {
            match item {
                Projection::Columns(slot) => {
                    items.extend(columns(slot, compiler.scope().table(slot)?));
                }
                Projection::Nullable(slot) => {
                    let table = compiler.scope().table(slot)?;
                    items.push(indicator(slot, table).shared());
                    items.extend(columns(slot, table));
                }
                Projection::Expr(expr) => {
                    let compiled = compiler.compile(expr)?;
                    projected = Some(compiled.ty().clone());
                    items.push(Arc::clone(compiled.query()));
                }
            }
        }
        if items.is_empty() {
            return Err(Error::compile("select has nothing to project"));
        }
        let single = matches!(self.projection.as_slice(), [Projection::Expr(_)]);

        let head = RawQuery::new()
            .text(if self.distinct {
                "SELECT DISTINCT "
            } else {
                "SELECT "
            })
            .joined(&items, ",");
        let mut query = self.clauses(head, &compiler)?;

        if !self.order_by.is_empty() {
            let mut order = Vec::with_capacity(self.order_by.len());
            for item in &self.order_by {
                let compiled = compiler.compile(&item.expr)?;
                order.push(
                    RawQuery::new()
                        .nested(compiled.query())
                        .text(item.keyword())
                        .shared(),
                );
            }
            query = query.text(" ORDER BY ").joined(&order, ", ");
        }
        if let Some(limit) = self.limit {
            query = query.text(format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            query = query.text(format!(" OFFSET {offset}"));
        }
        Ok((query, projected.filter(|_| single)))
    }

    /// FROM, JOIN and WHERE.
    fn clauses(&self, head: RawQuery, compiler: &Compiler<'_>) -> Result<RawQuery> {
        let mut tables = self.tables.iter();
        let (root, table) = tables
            .next()
            .ok_or_else(|| Error::mapping("select has no table"))?;
        let mut query = head.text(" FROM ").table(root, table);

        for (position, ((slot, table), on)) in tables.zip(&self.joins).enumerate() {
            let scope = self.scope(position + 2);
            let condition = Compiler::with_registry(&scope, &self.calls).compile_predicate(on)?;
            query = query
                .text(" LEFT JOIN ")
                .table(slot, table)
                .text(" ON (")
                .nested(condition.query())
                .text(")");
        }

        if let Some(predicate) = self.filters.iter().cloned().reduce(|a, b| a.and(b)) {
            let compiled = compiler.compile_predicate(&predicate)?;
            query = query.text(" WHERE ").nested(compiled.query());
        }
        Ok(query)
    }
}

fn columns<'a>(
    slot: &'a Slot,
    table: &'a TableDescriptor,
) -> impl Iterator<Item = Arc<RawQuery>> + 'a {
    table
        .columns
        .iter()
        .map(move |column| RawQuery::new().column(slot, &column.name).shared())
}

/// True when the slot's table matched a row.
fn indicator(slot: &Slot, table: &TableDescriptor) -> RawQuery {
    if let Some((_, key)) = table.primary_key() {
        return RawQuery::new()
            .column(slot, &key.name)
            .text(" IS NOT NULL");
    }
    let all: Vec<Arc<RawQuery>> = columns(slot, table).collect();
    RawQuery::new()
        .text("NOT ((")
        .joined(&all, ", ")
        .text(") IS NULL)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::ResultSet;
    use crate::expr::{col, lit, slot};
    use crate::testing::{Author, Post, Visit};
    use crate::types::PgValue;

    fn sql<T: Send + 'static>(select: &Select<T>) -> String {
        select.to_sql().unwrap().sql
    }

    fn author_row(id: i64, name: &str) -> Vec<PgValue> {
        vec![
            PgValue::BigInt(id),
            PgValue::Text(String::from(name)),
            PgValue::Array(Vec::new()),
            PgValue::Json(serde_json::json!({})),
        ]
    }

    // ===================================================================
    // SQL shape
    // ===================================================================

    #[test]
    fn test_select_all_columns() {
        assert_eq!(
            sql(&Select::<Post>::new()),
            r#"SELECT "id","author_id","title" FROM "blog"."post""#
        );
    }

    #[test]
    fn test_filter_by_id() {
        assert_eq!(
            sql(&Select::<Post>::new().filter(col("id").eq(2))),
            r#"SELECT "id","author_id","title" FROM "blog"."post" WHERE ("id") = (2)"#
        );
    }

    #[test]
    fn test_filters_are_anded() {
        let select = Select::<Post>::new()
            .filter(col("id").gt(1))
            .exclude(col("title").eq("x"));
        assert!(sql(&select).ends_with(r#"WHERE (("id") > (1)) AND (NOT (("title") = ('x')))"#));
    }

    #[test]
    fn test_order_limit_offset_distinct() {
        let select = Select::<Post>::new()
            .distinct()
            .order_by("-id")
            .order_by(col("title"))
            .limit(10)
            .offset(20);
        assert_eq!(
            sql(&select),
            r#"SELECT DISTINCT "id","author_id","title" FROM "blog"."post" ORDER BY "id" DESC, "title" ASC LIMIT 10 OFFSET 20"#
        );
    }

    #[test]
    fn test_left_join_uses_positional_aliases() {
        let select = Select::<Author>::new()
            .left_join::<Post>(slot(0).col("id").eq(slot(1).col("author_id")));
        assert_eq!(
            sql(&select),
            concat!(
                r#"SELECT t0."id",t0."name",t0."tags",t0."profile","#,
                r#"t1."id" IS NOT NULL,t1."id",t1."author_id",t1."title" "#,
                r#"FROM "blog"."author" t0 LEFT JOIN "blog"."post" t1 "#,
                r#"ON ((t0."id") = (t1."author_id"))"#
            )
        );
    }

    #[test]
    fn test_keyless_join_indicator() {
        let select = Select::<Post>::new().left_join::<Visit>(slot(1).col("path").eq(slot(0).col("title")));
        assert!(sql(&select).contains(r#"NOT ((t1."path") IS NULL)"#));
    }

    #[test]
    fn test_join_condition_cannot_see_later_slots() {
        let select = Select::<Author>::new()
            .left_join::<Post>(slot(0).col("id").eq(slot(2).col("author_id")))
            .left_join::<Post>(slot(1).col("id").eq(slot(2).col("id")));
        assert!(matches!(select.build(), Err(Error::ModelMapping(_))));
    }

    #[test]
    fn test_scalar_projection() {
        let select = Select::<Author>::new().select_scalar::<i32>(col("name").length());
        assert_eq!(
            sql(&select),
            r#"SELECT char_length("name") FROM "blog"."author""#
        );
    }

    #[test]
    fn test_count() {
        let select = Select::<Post>::new().filter(col("author_id").eq(3));
        assert_eq!(
            select.count().unwrap().render().sql,
            r#"SELECT COUNT(*) FROM "blog"."post" WHERE ("author_id") = (3)"#
        );
        let limited = select.limit(5);
        assert_eq!(
            limited.count().unwrap().render().sql,
            concat!(
                r#"SELECT COUNT(*) FROM (SELECT "id","author_id","title" FROM "blog"."post" "#,
                r#"WHERE ("author_id") = (3) LIMIT 5) AS counted"#
            )
        );
    }

    #[test]
    fn test_subquery_membership() {
        let authors = Select::<Author>::new()
            .filter(col("name").starts_with("A"))
            .select_scalar::<i64>(col("id"))
            .into_subquery()
            .unwrap();
        let select = Select::<Post>::new().filter(col("author_id").pg_in(authors));
        assert_eq!(
            sql(&select),
            concat!(
                r#"SELECT "id","author_id","title" FROM "blog"."post" WHERE ("author_id") IN "#,
                r#"(SELECT "id" FROM "blog"."author" WHERE ("name") LIKE (escape_like('A') || '%'))"#
            )
        );
    }

    #[test]
    fn test_subquery_without_single_projection_is_rejected() {
        let authors = Select::<Author>::new().into_subquery().unwrap();
        let select = Select::<Post>::new().filter(col("author_id").pg_in(authors));
        assert!(matches!(select.build(), Err(Error::Compile(_))));
    }

    #[test]
    fn test_parameters_are_numbered_across_statement() {
        let long = "x".repeat(40);
        let select = Select::<Author>::new()
            .filter(col("name").eq(long.as_str()))
            .filter(col("tags").pg_contains_any(vec!["a"]));
        let rendered = select.to_sql().unwrap();
        assert!(rendered.sql.contains("(\"name\") = (@1::text)"));
        assert!(rendered.sql.contains("(\"tags\") && (@2::text[])"));
        assert_eq!(rendered.params.len(), 2);
    }

    #[test]
    fn test_errors_surface_at_build() {
        let select = Select::<Post>::new().filter(col("missing").eq(1));
        assert!(matches!(select.build(), Err(Error::ModelMapping(_))));
        let select = Select::<Post>::new().filter(col("id").eq("a"));
        assert!(matches!(select.build(), Err(Error::Compile(_))));
        let select = Select::<Post>::new().filter(col("id"));
        assert!(matches!(select.build(), Err(Error::Compile(_))));
    }

    // ===================================================================
    // Decoding
    // ===================================================================

    #[test]
    fn test_decode_models() {
        let statement = Select::<Post>::new().build().unwrap();
        let rows = statement
            .decode(ResultSet::from_rows(vec![vec![
                PgValue::BigInt(1),
                PgValue::BigInt(7),
                PgValue::Text(String::from("hello")),
            ]]))
            .unwrap();
        assert_eq!(
            rows,
            vec![Post {
                id: 1,
                author_id: 7,
                title: String::from("hello"),
            }]
        );
    }

    #[test]
    fn test_decode_unmatched_join_as_none() {
        let statement = Select::<Author>::new()
            .left_join::<Post>(slot(0).col("id").eq(slot(1).col("author_id")))
            .build()
            .unwrap();
        let mut unmatched = author_row(1, "Ann");
        unmatched.extend([PgValue::Bool(false), PgValue::Null, PgValue::Null, PgValue::Null]);
        let mut matched = author_row(2, "Bob");
        matched.extend([
            PgValue::Bool(true),
            PgValue::BigInt(9),
            PgValue::BigInt(2),
            PgValue::Text(String::from("t")),
        ]);
        let rows = statement
            .decode(ResultSet::from_rows(vec![unmatched, matched]))
            .unwrap();
        assert_eq!(rows[0].0.name, "Ann");
        assert_eq!(rows[0].1, None);
        assert_eq!(rows[1].1.as_ref().map(|p| p.id), Some(9));
    }

    #[test]
    fn test_shape_projection() {
        let select = Select::<Post>::new()
            .left_join::<Author>(slot(0).col("author_id").eq(slot(1).col("id")))
            .select_shape(
                Shape::new()
                    .model("author", &slot(1))
                    .scalar("title", slot(0).col("title"))
                    .scalar("double", lit(2) * 3),
            );
        assert_eq!(
            sql(&select),
            concat!(
                r#"SELECT t1."id" IS NOT NULL,t1."id",t1."name",t1."tags",t1."profile",t0."title",6 "#,
                r#"FROM "blog"."post" t0 LEFT JOIN "blog"."author" t1 ON ((t0."author_id") = (t1."id"))"#
            )
        );

        let mut row = vec![PgValue::Bool(true)];
        row.extend(author_row(4, "Cy"));
        row.extend([PgValue::Text(String::from("T")), PgValue::Int(6)]);
        let shaped = select
            .build()
            .unwrap()
            .decode(ResultSet::from_rows(vec![row]))
            .unwrap();
        let author: Option<Author> = shaped[0].model("author").unwrap();
        assert_eq!(author.map(|a| a.id), Some(4));
        assert_eq!(shaped[0].get::<String>("title").unwrap(), "T");
        assert_eq!(shaped[0].get::<i32>("double").unwrap(), 6);
    }

    #[test]
    fn test_shape_with_unknown_slot_fails() {
        let select = Select::<Post>::new().select_shape(Shape::new().model("x", &slot(3)));
        assert!(matches!(select.build(), Err(Error::ModelMapping(_))));
    }

    #[test]
    fn test_select_fields_row() {
        let statement = Select::<Post>::new()
            .select_fields([col("id"), col("title")])
            .build()
            .unwrap();
        assert_eq!(
            statement.render().sql,
            r#"SELECT "id","title" FROM "blog"."post""#
        );
        let rows = statement
            .decode(ResultSet::from_rows(vec![vec![
                PgValue::BigInt(3),
                PgValue::Text(String::from("a")),
            ]]))
            .unwrap();
        assert_eq!(rows[0].get::<i64>(0).unwrap(), 3);
        assert_eq!(rows[0].get::<String>(1).unwrap(), "a");
    }

    #[test]
    fn test_count_decodes_first_value() {
        let statement = Select::<Post>::new().count().unwrap();
        let count = statement
            .decode(ResultSet::from_rows(vec![vec![PgValue::BigInt(12)]]))
            .unwrap();
        assert_eq!(count, 12);
    }
}
