//! Derive macros for oxide-pg.
//!
//! This crate provides `#[derive(Model)]`, which maps a struct onto a
//! table, and `#[derive(PgEnum)]`, which maps a fieldless enum onto a
//! PostgreSQL enum type.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Expr, Fields, Ident, Lit, LitStr, Meta,
    Type,
};

/// Derives `oxide_pg_core::schema::Model` for a struct with named fields.
///
/// # Attributes
///
/// - `#[model(table = "table_name")]` - Specifies the SQL table name
///   (optional, defaults to snake_case of struct name)
/// - `#[model(schema = "schema_name")]` - Specifies the schema (optional,
///   defaults to the registry's default schema)
///
/// # Field Attributes
///
/// - `#[column(primary_key)]` - Marks the field as primary key
/// - `#[column(autoincrement)]` - Leaves the column out of default inserts
/// - `#[column(name = "column_name")]` - Specifies the SQL column name
///   (optional, defaults to field name)
/// - `#[column(ty = "jsonb")]` - Declares the column type instead of
///   inferring it from the field type
/// - `#[column(nullable)]` - Marks the column as nullable; `Option` fields
///   are nullable without it
///
/// Columns are numbered in field order; rows decode in the same order.
#[proc_macro_derive(Model, attributes(model, column))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_model_impl(&input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derives `PgEnum` and the value conversion traits for a fieldless enum.
///
/// # Attributes
///
/// - `#[pg_enum(name = "type_name")]` - Specifies the SQL type name
///   (optional, defaults to snake_case of enum name)
/// - `#[pg_enum(schema = "schema_name")]` - Specifies the schema
///
/// # Variant Attributes
///
/// - `#[pg_enum(rename = "label")]` - Specifies the label (optional,
///   defaults to snake_case of variant name)
///
/// The enum must still be registered with `register_enum` before use.
#[proc_macro_derive(PgEnum, attributes(pg_enum))]
pub fn derive_pg_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_pg_enum_impl(&input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_model_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let model_attrs = parse_named_attrs(&input.attrs, "model", &["table", "schema"])?;
    let table_name = model_attrs
        .get("table")
        .map_or_else(|| to_snake_case(&struct_name.to_string()), LitStr::value);

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Model derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Model derive only supports structs",
            ));
        }
    };

    let mut columns = Vec::new();
    for field in fields {
        let Some(field_name) = field.ident.clone() else {
            continue;
        };
        let attrs = parse_column_attrs(&field.attrs)?;
        columns.push(ColumnInfo {
            column_name: attrs.name.unwrap_or_else(|| field_name.to_string()),
            field_name,
            nullable: attrs.nullable || is_option(&field.ty),
            field_type: field.ty.clone(),
            primary_key: attrs.primary_key,
            autoincrement: attrs.autoincrement,
            declared_type: attrs.declared_type,
        });
    }

    if columns.iter().filter(|c| c.primary_key).count() > 1 {
        return Err(syn::Error::new_spanned(
            input,
            "Model derive allows at most one primary key",
        ));
    }

    let struct_label = struct_name.to_string();
    let schema = model_attrs.get("schema").map(|schema| {
        quote! { let table = table.schema(#schema); }
    });

    let descriptors = columns.iter().map(|info| {
        let field_label = info.field_name.to_string();
        let column_name = &info.column_name;
        let field_type = &info.field_type;
        let ty = match &info.declared_type {
            Some(decl) => quote! { ::oxide_pg_core::types::ValueType::parse(#decl)? },
            None => quote! {
                <#field_type as ::oxide_pg_core::types::PgType>::value_type()?
            },
        };
        let primary_key = info.primary_key.then(|| quote! { .primary_key() });
        let autoincrement = info.autoincrement.then(|| quote! { .auto_increment() });
        let nullable = info.nullable.then(|| quote! { .nullable() });
        quote! {
            let table = table.column(
                ::oxide_pg_core::schema::ColumnDescriptor::new(#field_label, #column_name, #ty)
                    #primary_key
                    #autoincrement
                    #nullable
            );
        }
    });

    let value_arms = columns.iter().enumerate().map(|(index, info)| {
        let field_name = &info.field_name;
        quote! {
            #index => ::oxide_pg_core::types::ToPgValue::to_pg_value(&self.#field_name),
        }
    });

    let field_names: Vec<&Ident> = columns.iter().map(|c| &c.field_name).collect();

    Ok(quote! {
        impl ::oxide_pg_core::schema::Model for #struct_name {
            fn describe() -> ::oxide_pg_core::Result<::oxide_pg_core::schema::TableDescriptor> {
                let table = ::oxide_pg_core::schema::TableDescriptor::new(#struct_label, #table_name);
                #schema
                #(#descriptors)*
                Ok(table)
            }

            fn column_value(
                &self,
                index: usize,
            ) -> ::oxide_pg_core::Result<::oxide_pg_core::types::PgValue> {
                match index {
                    #(#value_arms)*
                    _ => Err(::oxide_pg_core::Error::ModelMapping(format!(
                        "`{}` has no column #{}",
                        #struct_label,
                        index
                    ))),
                }
            }

            fn from_row(
                row: &mut ::oxide_pg_core::decode::RowReader,
            ) -> ::oxide_pg_core::Result<Self> {
                Ok(Self {
                    #(#field_names: row.read()?,)*
                })
            }
        }
    })
}

fn derive_pg_enum_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let enum_name = &input.ident;
    let enum_attrs = parse_named_attrs(&input.attrs, "pg_enum", &["name", "schema"])?;
    let type_name = enum_attrs
        .get("name")
        .map_or_else(|| to_snake_case(&enum_name.to_string()), LitStr::value);
    let schema = match enum_attrs.get("schema") {
        Some(schema) => quote! { Some(#schema) },
        None => quote! { None },
    };

    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "PgEnum derive only supports enums",
        ));
    };

    let mut variants = Vec::new();
    let mut labels = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "PgEnum derive only supports fieldless variants",
            ));
        }
        let attrs = parse_named_attrs(&variant.attrs, "pg_enum", &["rename"])?;
        let label = attrs
            .get("rename")
            .map_or_else(|| to_snake_case(&variant.ident.to_string()), LitStr::value);
        if labels.contains(&label) {
            return Err(syn::Error::new_spanned(
                variant,
                format!("duplicate enum label `{label}`"),
            ));
        }
        variants.push(&variant.ident);
        labels.push(label);
    }

    Ok(quote! {
        impl ::oxide_pg_core::types::PgEnum for #enum_name {
            const NAME: &'static str = #type_name;
            const SCHEMA: Option<&'static str> = #schema;
            const LABELS: &'static [&'static str] = &[#(#labels),*];

            fn label(&self) -> &'static str {
                match self {
                    #(Self::#variants => #labels,)*
                }
            }

            fn from_label(label: &str) -> Option<Self> {
                match label {
                    #(#labels => Some(Self::#variants),)*
                    _ => None,
                }
            }
        }

        impl ::oxide_pg_core::types::PgType for #enum_name {
            fn value_type() -> ::oxide_pg_core::Result<::oxide_pg_core::types::ValueType> {
                ::oxide_pg_core::types::enum_value_type::<Self>()
            }
        }

        impl ::oxide_pg_core::types::ToPgValue for #enum_name {
            fn to_pg_value(&self) -> ::oxide_pg_core::Result<::oxide_pg_core::types::PgValue> {
                ::oxide_pg_core::types::encode_enum(self)
            }
        }

        impl ::oxide_pg_core::types::FromPgValue for #enum_name {
            fn from_pg_value(
                value: ::oxide_pg_core::types::PgValue,
            ) -> ::oxide_pg_core::Result<Self> {
                ::oxide_pg_core::types::decode_enum(value)
            }
        }
    })
}

struct ColumnInfo {
    field_name: Ident,
    field_type: Type,
    column_name: String,
    primary_key: bool,
    autoincrement: bool,
    nullable: bool,
    declared_type: Option<LitStr>,
}

#[derive(Default)]
struct ColumnAttrs {
    name: Option<String>,
    primary_key: bool,
    autoincrement: bool,
    nullable: bool,
    declared_type: Option<LitStr>,
}

/// Parses `#[attr(key = "value", ...)]` pairs, rejecting unknown keys.
fn parse_named_attrs(
    attrs: &[Attribute],
    attr_name: &str,
    keys: &[&str],
) -> syn::Result<std::collections::HashMap<String, LitStr>> {
    let mut values = std::collections::HashMap::new();
    for attr in attrs {
        if !attr.path().is_ident(attr_name) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let key = keys
                .iter()
                .find(|key| meta.path.is_ident(key))
                .ok_or_else(|| meta.error(format!("unknown `{attr_name}` attribute")))?;
            values.insert(String::from(*key), string_value(&meta)?);
            Ok(())
        })?;
    }
    Ok(values)
}

fn parse_column_attrs(attrs: &[Attribute]) -> syn::Result<ColumnAttrs> {
    let mut result = ColumnAttrs::default();

    for attr in attrs {
        if attr.path().is_ident("column") {
            // Handle empty attribute like #[column]
            if matches!(attr.meta, Meta::Path(_)) {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("primary_key") {
                    result.primary_key = true;
                } else if meta.path.is_ident("nullable") {
                    result.nullable = true;
                } else if meta.path.is_ident("autoincrement") {
                    result.autoincrement = true;
                } else if meta.path.is_ident("name") {
                    result.name = Some(string_value(&meta)?.value());
                } else if meta.path.is_ident("ty") {
                    result.declared_type = Some(string_value(&meta)?);
                } else {
                    return Err(meta.error("unknown `column` attribute"));
                }
                Ok(())
            })?;
        }
    }

    Ok(result)
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<LitStr> {
    let value: Expr = meta.value()?.parse()?;
    if let Expr::Lit(lit) = &value {
        if let Lit::Str(s) = &lit.lit {
            return Ok(s.clone());
        }
    }
    Err(syn::Error::new_spanned(value, "expected a string literal"))
}

fn is_option(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Option"),
        _ => false,
    }
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}
