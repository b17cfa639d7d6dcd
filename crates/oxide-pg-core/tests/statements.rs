//! End-to-end statement tests over derived models.
//!
//! These tests compile statements for `#[derive(Model)]` structs, check
//! the generated SQL text and parameters, and decode hand-built result
//! sets the way the server would return them.

use chrono::NaiveDate;
use oxide_pg_core::types::{from_pg, register_enum, to_pg, Binary, Interval};
use oxide_pg_core::{
    col, slot, Delete, Error, Insert, Json, PgValue, RenderMode, ResultSet, Select, Update,
};
use oxide_pg_derive::{Model, PgEnum};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Model)]
#[model(table = "model", schema = "s")]
pub struct Item {
    #[column(primary_key)]
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Model)]
#[model(table = "model2", schema = "s")]
pub struct Detail {
    #[column(primary_key, autoincrement)]
    pub id: i32,
    pub model_id: i32,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub city: String,
    pub zip: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PgEnum)]
#[pg_enum(name = "level")]
pub enum Level {
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq, Model)]
#[model(table = "profile", schema = "s")]
pub struct Profile {
    #[column(primary_key, autoincrement)]
    pub id: i64,
    pub tags: Vec<String>,
    pub address: Json<Address>,
    pub level: Level,
}

// =============================================================================
// Generated SQL shapes
// =============================================================================

#[test]
fn test_select_by_id() {
    let rendered = Select::<Item>::new()
        .filter(col("id").eq(2))
        .to_sql()
        .unwrap();
    assert_eq!(
        rendered.sql,
        r#"SELECT "id","name" FROM "s"."model" WHERE ("id") = (2)"#
    );
    assert!(rendered.params.is_empty());
}

#[test]
fn test_insert_returns_key() {
    let statement = Insert::<Item>::new()
        .columns(&["id"])
        .row(&Item {
            id: 4,
            name: String::new(),
        })
        .build()
        .unwrap();
    assert_eq!(
        statement.render().sql,
        r#"INSERT INTO "s"."model"("id") VALUES (4) RETURNING "id""#
    );
    let inserted = statement
        .decode(ResultSet::from_rows(vec![vec![PgValue::Int(4)]]))
        .unwrap();
    assert_eq!(inserted.rows_affected, 1);
    assert_eq!(inserted.keys, vec![PgValue::Int(4)]);
}

#[test]
fn test_update_by_id() {
    let statement = Update::<Item>::new()
        .set("name", "A")
        .filter(col("id").eq(1))
        .build()
        .unwrap();
    assert_eq!(
        statement.render().sql,
        r#"UPDATE "s"."model" SET "name" = 'A' WHERE ("id") = (1)"#
    );
    assert_eq!(statement.decode(ResultSet::affected(1)).unwrap(), 1);
}

#[test]
fn test_left_join_shape() {
    let rendered = Select::<Item>::new()
        .left_join::<Detail>(slot(0).col("id").eq(slot(1).col("model_id")))
        .to_sql()
        .unwrap();
    assert!(rendered.sql.ends_with(
        r#"FROM "s"."model" t0 LEFT JOIN "s"."model2" t1 ON ((t0."id") = (t1."model_id"))"#
    ));
}

#[test]
fn test_delete_by_name() {
    let statement = Delete::<Item>::new()
        .filter(col("name").starts_with("A"))
        .build()
        .unwrap();
    assert_eq!(
        statement.render().sql,
        r#"DELETE FROM "s"."model" WHERE ("name") LIKE (escape_like('A') || '%')"#
    );
}

// =============================================================================
// Parameters and inlining
// =============================================================================

#[test]
fn test_inline_boundary() {
    let short = "a".repeat(29);
    let rendered = Select::<Item>::new()
        .filter(col("name").eq(short.as_str()))
        .to_sql()
        .unwrap();
    assert!(rendered.sql.ends_with(&format!("(\"name\") = ('{short}')")));
    assert!(rendered.params.is_empty());

    let long = "a".repeat(30);
    let rendered = Select::<Item>::new()
        .filter(col("name").eq(long.as_str()))
        .to_sql()
        .unwrap();
    assert!(rendered.sql.ends_with("(\"name\") = (@1::text)"));
    assert_eq!(rendered.params.len(), 1);
}

#[test]
fn test_pg_in_binds_one_array() {
    let rendered = Select::<Item>::new()
        .filter(col("name").pg_in(vec!["x", "y", "z"]))
        .to_sql()
        .unwrap();
    assert!(rendered.sql.ends_with("(\"name\") = ANY(@1::text[])"));
    assert_eq!(rendered.params.len(), 1);
}

#[test]
fn test_rendering_is_repeatable() {
    let statement = Select::<Item>::new()
        .filter(col("name").pg_in(vec!["x"]))
        .filter(col("name").ne("b".repeat(40).as_str()))
        .build()
        .unwrap();
    assert_eq!(statement.render(), statement.render());
    let first = statement.render_with(RenderMode::Simple);
    let second = statement.render_with(RenderMode::Simple);
    assert_eq!(first, second);
    assert!(first.params.is_empty());
}

// =============================================================================
// Decoding
// =============================================================================

#[test]
fn test_unmatched_join_decodes_none() {
    let statement = Select::<Item>::new()
        .left_join::<Detail>(slot(0).col("id").eq(slot(1).col("model_id")))
        .build()
        .unwrap();
    let rows = statement
        .decode(ResultSet::from_rows(vec![
            vec![
                PgValue::Int(1),
                PgValue::Text(String::from("a")),
                PgValue::Bool(false),
                PgValue::Null,
                PgValue::Null,
                PgValue::Null,
            ],
            vec![
                PgValue::Int(2),
                PgValue::Text(String::from("b")),
                PgValue::Bool(true),
                PgValue::Int(10),
                PgValue::Int(2),
                PgValue::Null,
            ],
        ]))
        .unwrap();
    assert_eq!(rows[0].1, None);
    assert_eq!(
        rows[1].1,
        Some(Detail {
            id: 10,
            model_id: 2,
            note: None,
        })
    );
}

#[test]
fn test_json_and_enum_columns() {
    register_enum::<Level>();
    let profile = Profile {
        id: 0,
        tags: vec![String::from("x")],
        address: Json(Address {
            city: String::from("Oslo"),
            zip: None,
        }),
        level: Level::High,
    };
    let rendered = Insert::<Profile>::new().row(&profile).build().unwrap().render();
    assert_eq!(
        rendered.sql,
        r#"INSERT INTO "s"."profile"("tags","address","level") VALUES (@1::text[],@2::jsonb,@3::"level") RETURNING "id""#
    );
    assert_eq!(rendered.params.len(), 3);

    let rows = Select::<Profile>::new()
        .filter(col("address").json_text("city").eq("Oslo"))
        .build()
        .unwrap()
        .decode(ResultSet::from_rows(vec![vec![
            PgValue::BigInt(7),
            PgValue::Array(vec![PgValue::Text(String::from("x"))]),
            PgValue::Json(serde_json::json!({"city": "Oslo", "zip": null})),
            PgValue::Enum(String::from("high")),
        ]]))
        .unwrap();
    assert_eq!(rows[0].address.0.city, "Oslo");
    assert_eq!(rows[0].level, Level::High);
}

#[test]
fn test_list_helpers_nest() {
    register_enum::<Level>();
    let rendered = Update::<Profile>::new()
        .add_to_list("tags", vec!["a"])
        .remove_from_list("tags", "b")
        .build()
        .unwrap()
        .render();
    assert_eq!(
        rendered.sql,
        r#"UPDATE "s"."profile" SET "tags" = array_remove(array_cat("tags", @1::text[]), 'b')"#
    );
}

#[test]
fn test_empty_update_fails_before_rendering() {
    let err = Update::<Item>::new().filter(col("id").eq(1)).build().unwrap_err();
    assert_eq!(err, Error::EmptyMutation(String::from("model")));
}

// =============================================================================
// Value round trips
// =============================================================================

fn roundtrip<T>(value: T)
where
    T: oxide_pg_core::ToPgValue + oxide_pg_core::FromPgValue + PartialEq + std::fmt::Debug,
{
    let (wire, ty) = to_pg(&value).unwrap();
    assert_eq!(from_pg::<T>(&ty, wire).unwrap(), value);
}

#[test]
fn test_value_roundtrips() {
    register_enum::<Level>();
    roundtrip(true);
    roundtrip(42_i32);
    roundtrip(-7_i64);
    roundtrip(String::from("hello"));
    roundtrip(None::<String>);
    roundtrip(Some(3_i64));
    roundtrip(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    roundtrip(Interval::new(1, 2, 3));
    roundtrip(Binary(vec![0, 1, 255]));
    roundtrip(vec![vec![1_i32, 2], vec![3]]);
    roundtrip(Level::Low);
    roundtrip(vec![Level::High, Level::Low]);
    roundtrip(Json(Address {
        city: String::from("Rome"),
        zip: Some(String::from("00100")),
    }));
    roundtrip(serde_json::json!({"a": [1, 2, {"b": null}]}));
}

#[test]
fn test_subquery_insert_source() {
    let ids = Select::<Item>::new()
        .filter(col("name").eq("a"))
        .select_scalar::<i32>(col("id"))
        .limit(1)
        .into_subquery()
        .unwrap();
    let rendered = Insert::<Detail>::new()
        .row(&Detail {
            id: 0,
            model_id: 0,
            note: None,
        })
        .value_from_subquery("model_id", ids)
        .build()
        .unwrap()
        .render();
    assert_eq!(
        rendered.sql,
        concat!(
            r#"INSERT INTO "s"."model2"("note","model_id") VALUES "#,
            r#"(NULL,(SELECT "id" FROM "s"."model" WHERE ("name") = ('a') LIMIT 1)) RETURNING "id""#
        )
    );
    assert!(matches!(
        Insert::<Detail>::new().build(),
        Err(Error::Compile(_))
    ));
}
