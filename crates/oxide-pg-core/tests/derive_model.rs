//! Tests for the `#[derive(Model)]` and `#[derive(PgEnum)]` macro output.
//!
//! These tests verify that the derive macros generate correct:
//! - Table descriptors (names, schema, column flags and types)
//! - Column values in declaration order
//! - Row decoding in declaration order
//! - Enum labels and conversions

use oxide_pg_core::decode::RowReader;
use oxide_pg_core::schema::Model;
use oxide_pg_core::types::{register_enum, PgEnum, PgType, ToPgValue, ValueType};
use oxide_pg_core::{Error, PgValue};
use oxide_pg_derive::{Model, PgEnum};

// =============================================================================
// Test: Basic struct with default table name (snake_case)
// =============================================================================

#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Model)]
pub struct BlogPost {
    #[column(primary_key, autoincrement)]
    pub id: i64,
    pub title: String,
    pub subtitle: Option<String>,
}

#[test]
fn test_default_table_name() {
    let table = BlogPost::table().unwrap();
    assert_eq!(table.name, "blog_post");
    assert_eq!(table.model, "BlogPost");
    assert_eq!(table.qualified_name(), "\"public\".\"blog_post\"");
}

#[test]
fn test_column_flags() {
    let table = BlogPost::table().unwrap();
    let (index, id) = table.primary_key().unwrap();
    assert_eq!(index, 0);
    assert!(id.auto_increment);
    assert!(!id.nullable);
    let (_, subtitle) = table.require_column("subtitle").unwrap();
    assert!(subtitle.nullable);
    assert_eq!(subtitle.ty, ValueType::String);
    assert_eq!(table.insertable_columns(), vec![1, 2]);
}

#[test]
fn test_column_values_in_order() {
    let post = BlogPost {
        id: 3,
        title: String::from("Hello"),
        subtitle: None,
    };
    assert_eq!(post.column_value(0).unwrap(), PgValue::BigInt(3));
    assert_eq!(
        post.column_value(1).unwrap(),
        PgValue::Text(String::from("Hello"))
    );
    assert_eq!(post.column_value(2).unwrap(), PgValue::Null);
    assert!(matches!(post.column_value(3), Err(Error::ModelMapping(_))));
}

#[test]
fn test_from_row() {
    let mut row = RowReader::new(vec![
        PgValue::BigInt(9),
        PgValue::Text(String::from("T")),
        PgValue::Text(String::from("S")),
    ]);
    let post = BlogPost::from_row(&mut row).unwrap();
    assert_eq!(
        post,
        BlogPost {
            id: 9,
            title: String::from("T"),
            subtitle: Some(String::from("S")),
        }
    );
    assert_eq!(row.remaining(), 0);
}

// =============================================================================
// Test: Explicit table, schema, column names and declared types
// =============================================================================

#[allow(dead_code)]
#[derive(Debug, Clone, Model)]
#[model(table = "accounts", schema = "billing")]
pub struct Account {
    #[column(primary_key, name = "account_id")]
    pub id: uuid::Uuid,
    #[column(ty = "jsonb")]
    pub settings: String,
    #[column(nullable)]
    pub balance: rust_decimal::Decimal,
    pub labels: Vec<String>,
}

#[test]
fn test_explicit_names() {
    let table = Account::table().unwrap();
    assert_eq!(table.qualified_name(), "\"billing\".\"accounts\"");
    let (_, key) = table.primary_key().unwrap();
    assert_eq!(key.name, "account_id");
    assert_eq!(key.field, "id");
}

#[test]
fn test_declared_and_inferred_types() {
    let table = Account::table().unwrap();
    assert!(table.require_column("settings").unwrap().1.ty.is_json());
    assert_eq!(table.require_column("balance").unwrap().1.ty, ValueType::Decimal);
    assert!(table.require_column("balance").unwrap().1.nullable);
    assert_eq!(
        table.require_column("labels").unwrap().1.ty,
        ValueType::array_of(ValueType::String)
    );
}

// =============================================================================
// Test: Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PgEnum)]
#[pg_enum(name = "mood", schema = "app")]
pub enum Mood {
    Calm,
    #[pg_enum(rename = "so-happy")]
    VeryHappy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PgEnum)]
pub enum TicketState {
    Open,
    Closed,
}

#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Model)]
#[model(schema = "app")]
pub struct Person {
    #[column(primary_key)]
    pub id: i32,
    pub mood: Mood,
    pub history: Vec<Mood>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Model)]
pub struct Ticket {
    #[column(primary_key)]
    pub id: i32,
    pub state: TicketState,
}

#[test]
fn test_enum_labels() {
    assert_eq!(Mood::NAME, "mood");
    assert_eq!(Mood::SCHEMA, Some("app"));
    assert_eq!(Mood::LABELS, &["calm", "so-happy"]);
    assert_eq!(Mood::VeryHappy.label(), "so-happy");
    assert_eq!(Mood::from_label("calm"), Some(Mood::Calm));
    assert_eq!(Mood::from_label("sad"), None);
    assert_eq!(TicketState::NAME, "ticket_state");
}

#[test]
fn test_registered_enum_type() {
    register_enum::<Mood>();
    let ty = Mood::value_type().unwrap();
    assert_eq!(ty.pg_cast(), "\"app\".\"mood\"");
    assert_eq!(
        Mood::VeryHappy.to_pg_value().unwrap(),
        PgValue::Enum(String::from("so-happy"))
    );
}

#[test]
fn test_model_with_enum_columns() {
    register_enum::<Mood>();
    let table = Person::table().unwrap();
    assert_eq!(
        table.require_column("history").unwrap().1.ty.pg_cast(),
        "\"app\".\"mood\"[]"
    );
    let mut row = RowReader::new(vec![
        PgValue::Int(1),
        PgValue::Enum(String::from("calm")),
        PgValue::Array(vec![PgValue::Text(String::from("so-happy"))]),
    ]);
    let person = Person::from_row(&mut row).unwrap();
    assert_eq!(person.history, vec![Mood::VeryHappy]);
}

#[test]
fn test_unregistered_enum_fails_description() {
    let err = Ticket::table().unwrap_err();
    assert!(matches!(err, Error::Conversion(msg) if msg.contains("TicketState")));
}
