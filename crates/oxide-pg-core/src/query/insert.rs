//! INSERT statements.

use std::marker::PhantomData;
use std::sync::Arc;

use super::statement::Statement;
use crate::decode::ResultSet;
use crate::error::{Error, Result};
use crate::expr::{comparable, Subquery};
use crate::raw::{AliasMap, Frame, RawQuery, Slot};
use crate::schema::{Model, TableDescriptor};
use crate::types::{quote_ident, quote_literal, PgValue, Typed};

/// The outcome of an INSERT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inserted {
    pub rows_affected: u64,
    /// Generated primary keys, in row order. Empty for keyless tables
    /// and for rows skipped by `ON CONFLICT DO NOTHING`.
    pub keys: Vec<PgValue>,
}

#[derive(Debug, Clone)]
enum Source {
    Subquery(Subquery),
    /// The current value of another table's key sequence.
    Sequence(Arc<TableDescriptor>),
}

#[derive(Debug, Clone)]
enum Conflict {
    Nothing,
    Update {
        target: Vec<String>,
        assign: Vec<String>,
    },
}

/// An INSERT of one or more model rows.
///
/// ```ignore
/// let statement = Insert::<Author>::new()
///     .row(&author)
///     .on_conflict_update(&["name"], &["tags"])
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct Insert<M> {
    table: Option<Arc<TableDescriptor>>,
    columns: Option<Vec<usize>>,
    rows: Vec<Vec<Typed>>,
    sources: Vec<(usize, Source)>,
    conflict: Option<Conflict>,
    error: Option<Error>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Default for Insert<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Insert<M> {
    /// Inserts into every column except auto-increment ones.
    #[must_use]
    pub fn new() -> Self {
        let (table, error) = match M::table() {
            Ok(table) => (Some(table), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            table,
            columns: None,
            rows: Vec::new(),
            sources: Vec::new(),
            conflict: None,
            error,
            _model: PhantomData,
        }
    }

    /// Inserts into a fixed list of columns, by field or column name.
    #[must_use]
    pub fn columns(mut self, names: &[&str]) -> Self {
        let resolved = self.with_table(|table| {
            names
                .iter()
                .map(|name| table.require_column(name).map(|(index, _)| index))
                .collect::<Result<Vec<_>>>()
        });
        if let Some(columns) = resolved {
            self.columns = Some(columns);
        }
        self
    }

    /// Appends one row.
    #[must_use]
    pub fn row(mut self, model: &M) -> Self {
        let converted = self.with_table(|table| {
            table
                .columns
                .iter()
                .enumerate()
                .map(|(index, column)| {
                    Ok(Typed {
                        value: model.column_value(index)?,
                        ty: column.ty.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()
        });
        if let Some(values) = converted {
            self.rows.push(values);
        }
        self
    }

    /// Appends several rows.
    #[must_use]
    pub fn rows<'a, I>(self, models: I) -> Self
    where
        I: IntoIterator<Item = &'a M>,
    {
        models.into_iter().fold(self, Self::row)
    }

    /// Takes `column` from a subquery projecting a single value.
    #[must_use]
    pub fn value_from_subquery(mut self, column: &str, subquery: Subquery) -> Self {
        let resolved = self.with_table(|table| {
            let (index, descriptor) = table.require_column(column)?;
            let projected = subquery.projected().ok_or_else(|| {
                Error::compile("a subquery used as a value must project a single expression")
            })?;
            if !comparable(&descriptor.ty, projected) {
                return Err(Error::compile(format!(
                    "cannot store {projected} into a {} column",
                    descriptor.ty
                )));
            }
            Ok(index)
        });
        if let Some(index) = resolved {
            self.set_source(index, Source::Subquery(subquery));
        }
        self
    }

    /// Takes `column` from the key just generated for `P` earlier in the
    /// same round trip.
    #[must_use]
    pub fn value_from_sequence<P: Model>(mut self, column: &str) -> Self {
        let resolved = self.with_table(|table| {
            let (index, _) = table.require_column(column)?;
            let parent = P::table()?;
            if parent.primary_key().is_none() {
                return Err(Error::mapping(format!(
                    "`{}` has no primary key sequence",
                    parent.model
                )));
            }
            Ok((index, parent))
        });
        if let Some((index, parent)) = resolved {
            self.set_source(index, Source::Sequence(parent));
        }
        self
    }

    /// Adds `ON CONFLICT DO NOTHING`.
    #[must_use]
    pub fn on_conflict_do_nothing(mut self) -> Self {
        self.conflict = Some(Conflict::Nothing);
        self
    }

    /// Adds `ON CONFLICT (target) DO UPDATE SET col = EXCLUDED.col` for
    /// every column in `assign`.
    #[must_use]
    pub fn on_conflict_update(mut self, target: &[&str], assign: &[&str]) -> Self {
        let resolved = self.with_table(|table| {
            let names = |list: &[&str]| {
                list.iter()
                    .map(|name| table.require_column(name).map(|(_, c)| c.name.clone()))
                    .collect::<Result<Vec<_>>>()
            };
            Ok((names(target)?, names(assign)?))
        });
        if let Some((target, assign)) = resolved {
            self.conflict = Some(Conflict::Update { target, assign });
        }
        self
    }

    /// Compiles the statement.
    ///
    /// # Errors
    ///
    /// Returns the first construction error, or a compile error when no
    /// row was added.
    pub fn build(&self) -> Result<Statement<Inserted>> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| Error::mapping("insert has no table"))?;
        if self.rows.is_empty() {
            return Err(Error::compile(format!(
                "insert into `{}` has no rows",
                table.name
            )));
        }

        let base = self
            .columns
            .clone()
            .unwrap_or_else(|| table.insertable_columns());
        let plain: Vec<usize> = base
            .into_iter()
            .filter(|index| !self.sources.iter().any(|(i, _)| i == index))
            .collect();
        let names: Vec<String> = plain
            .iter()
            .chain(self.sources.iter().map(|(i, _)| i))
            .map(|&index| table.columns[index].quoted())
            .collect();

        let root = Slot::root();
        let mut query = RawQuery::new()
            .text("INSERT INTO ")
            .table(&root, table)
            .text(format!("({}) VALUES ", names.join(",")));

        let sources = self
            .sources
            .iter()
            .map(|(_, source)| source_value(source))
            .collect::<Result<Vec<_>>>()?;
        for (n, row) in self.rows.iter().enumerate() {
            let mut values: Vec<Arc<RawQuery>> = plain
                .iter()
                .map(|&index| RawQuery::new().value(row[index].clone()).shared())
                .collect();
            values.extend(sources.iter().cloned());
            if n > 0 {
                query = query.text(",");
            }
            query = query.text("(").joined(&values, ",").text(")");
        }

        match &self.conflict {
            Some(Conflict::Nothing) => query = query.text(" ON CONFLICT DO NOTHING"),
            Some(Conflict::Update { target, assign }) => {
                let target: Vec<String> = target.iter().map(|c| quote_ident(c)).collect();
                query = query.text(format!(" ON CONFLICT ({})", target.join(",")));
                if assign.is_empty() {
                    query = query.text(" DO NOTHING");
                } else {
                    let sets: Vec<String> = assign
                        .iter()
                        .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
                        .collect();
                    query = query.text(format!(" DO UPDATE SET {}", sets.join(", ")));
                }
            }
            None => {}
        }

        let returning = table.primary_key().is_some();
        if let Some((_, key)) = table.primary_key() {
            query = query.text(format!(" RETURNING {}", key.quoted()));
        }

        let frame = Frame::new(query.shared(), AliasMap::single(root, table));
        Ok(Statement::new(
            RawQuery::new().frame(Arc::new(frame)).shared(),
            move |result: ResultSet| {
                let keys = if returning {
                    result
                        .rows
                        .into_iter()
                        .filter_map(|row| row.into_iter().next())
                        .collect()
                } else {
                    Vec::new()
                };
                Ok(Inserted {
                    rows_affected: result.rows_affected,
                    keys,
                })
            },
        ))
    }

    /// Runs `f` against the table unless an error is already recorded,
    /// recording its error.
    fn with_table<T>(&mut self, f: impl FnOnce(&TableDescriptor) -> Result<T>) -> Option<T> {
        if self.error.is_some() {
            return None;
        }
        let outcome = self
            .table
            .as_deref()
            .ok_or_else(|| Error::mapping("insert has no table"))
            .and_then(f);
        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                self.error = Some(e);
                None
            }
        }
    }

    fn set_source(&mut self, index: usize, source: Source) {
        self.sources.retain(|(i, _)| *i != index);
        self.sources.push((index, source));
    }
}

fn source_value(source: &Source) -> Result<Arc<RawQuery>> {
    match source {
        Source::Subquery(subquery) => Ok(Arc::clone(subquery.expression()?.query())),
        Source::Sequence(parent) => {
            let (_, key) = parent
                .primary_key()
                .ok_or_else(|| Error::mapping(format!("`{}` has no primary key", parent.model)))?;
            Ok(RawQuery::new()
                .text(format!(
                    "currval(pg_get_serial_sequence({}, {}))",
                    quote_literal(&parent.qualified_name()),
                    quote_literal(&key.name)
                ))
                .shared())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::col;
    use crate::query::Select;
    use crate::testing::{Author, Post, Visit};

    fn post(title: &str) -> Post {
        Post {
            id: 0,
            author_id: 1,
            title: String::from(title),
        }
    }

    #[test]
    fn test_insert_skips_auto_increment_and_returns_key() {
        let statement = Insert::<Post>::new().row(&post("a")).build().unwrap();
        assert_eq!(
            statement.render().sql,
            r#"INSERT INTO "blog"."post"("author_id","title") VALUES (1,'a') RETURNING "id""#
        );
    }

    #[test]
    fn test_fixed_columns_and_many_rows() {
        let statement = Insert::<Post>::new()
            .columns(&["id", "title"])
            .rows(&[post("a"), post("b")])
            .build()
            .unwrap();
        assert_eq!(
            statement.render().sql,
            r#"INSERT INTO "blog"."post"("id","title") VALUES (0,'a'),(0,'b') RETURNING "id""#
        );
    }

    #[test]
    fn test_keyless_table_has_no_returning() {
        let statement = Insert::<Visit>::new()
            .row(&Visit {
                path: String::from("/"),
            })
            .build()
            .unwrap();
        assert_eq!(
            statement.render().sql,
            r#"INSERT INTO "blog"."visit"("path") VALUES ('/')"#
        );
    }

    #[test]
    fn test_long_values_are_parameters() {
        let title = "t".repeat(45);
        let rendered = Insert::<Post>::new().row(&post(&title)).build().unwrap().render();
        assert!(rendered.sql.contains("VALUES (1,@1::text)"));
        assert_eq!(rendered.params.len(), 1);
    }

    #[test]
    fn test_on_conflict() {
        let nothing = Insert::<Post>::new()
            .row(&post("a"))
            .on_conflict_do_nothing()
            .build()
            .unwrap();
        assert!(nothing
            .render()
            .sql
            .ends_with(r#"VALUES (1,'a') ON CONFLICT DO NOTHING RETURNING "id""#));

        let update = Insert::<Post>::new()
            .row(&post("a"))
            .on_conflict_update(&["id"], &["title", "author_id"])
            .build()
            .unwrap();
        assert!(update.render().sql.contains(
            r#"ON CONFLICT ("id") DO UPDATE SET "title" = EXCLUDED."title", "author_id" = EXCLUDED."author_id""#
        ));
    }

    #[test]
    fn test_value_from_sequence() {
        let statement = Insert::<Post>::new()
            .row(&post("a"))
            .value_from_sequence::<Author>("author_id")
            .build()
            .unwrap();
        assert_eq!(
            statement.render().sql,
            concat!(
                r#"INSERT INTO "blog"."post"("title","author_id") VALUES ('a',"#,
                r#"currval(pg_get_serial_sequence('"blog"."author"', 'id'))) RETURNING "id""#
            )
        );
    }

    #[test]
    fn test_value_from_subquery() {
        let author = Select::<Author>::new()
            .filter(col("name").eq("Ann"))
            .select_scalar::<i64>(col("id"))
            .into_subquery()
            .unwrap();
        let statement = Insert::<Post>::new()
            .row(&post("a"))
            .value_from_subquery("author_id", author)
            .build()
            .unwrap();
        assert_eq!(
            statement.render().sql,
            concat!(
                r#"INSERT INTO "blog"."post"("title","author_id") VALUES ('a',"#,
                r#"(SELECT "id" FROM "blog"."author" WHERE ("name") = ('Ann'))) RETURNING "id""#
            )
        );
    }

    #[test]
    fn test_subquery_type_must_match() {
        let names = Select::<Author>::new()
            .select_scalar::<String>(col("name"))
            .into_subquery()
            .unwrap();
        let insert = Insert::<Post>::new()
            .row(&post("a"))
            .value_from_subquery("author_id", names);
        assert!(matches!(insert.build(), Err(Error::Compile(_))));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            Insert::<Post>::new().build(),
            Err(Error::Compile(_))
        ));
        assert!(matches!(
            Insert::<Post>::new().columns(&["nope"]).row(&post("a")).build(),
            Err(Error::ModelMapping(_))
        ));
    }

    #[test]
    fn test_decode_keys() {
        let statement = Insert::<Post>::new().row(&post("a")).build().unwrap();
        let inserted = statement
            .decode(ResultSet::from_rows(vec![vec![PgValue::BigInt(41)]]))
            .unwrap();
        assert_eq!(inserted.rows_affected, 1);
        assert_eq!(inserted.keys, vec![PgValue::BigInt(41)]);
    }
}
