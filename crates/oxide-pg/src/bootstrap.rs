//! Server-side helper functions used by generated SQL.
//!
//! - `escape_like(text)` escapes `\`, `%` and `_` for LIKE patterns.
//! - `escape_regexp(text)` escapes regular expression metacharacters.
//! - `jsonb_append_at_path(jsonb, text[], jsonb)` appends a value to the
//!   array at a path, creating the array when the path is missing.

use oxide_pg_core::RawQuery;

use crate::transport::Command;

/// Installs the helper functions. Safe to run repeatedly.
pub const BOOTSTRAP_SQL: [&str; 3] = [
    r"CREATE OR REPLACE FUNCTION escape_like(value text) RETURNS text
    LANGUAGE sql IMMUTABLE STRICT PARALLEL SAFE
    AS $$ SELECT replace(replace(replace(value, '\', '\\'), '%', '\%'), '_', '\_') $$",
    r"CREATE OR REPLACE FUNCTION escape_regexp(value text) RETURNS text
    LANGUAGE sql IMMUTABLE STRICT PARALLEL SAFE
    AS $$ SELECT regexp_replace(value, '([.^$*+?()\[\]{}|\\-])', '\\\1', 'g') $$",
    r"CREATE OR REPLACE FUNCTION jsonb_append_at_path(target jsonb, path text[], value jsonb)
    RETURNS jsonb
    LANGUAGE sql IMMUTABLE PARALLEL SAFE
    AS $$ SELECT jsonb_set(
        COALESCE(target, '{}'::jsonb),
        path,
        COALESCE(target #> path, '[]'::jsonb) || jsonb_build_array(value),
        true
    ) $$",
];

/// Returns the bootstrap statements as one command.
#[must_use]
pub fn command() -> Command {
    let mut command = Command::new();
    for sql in BOOTSTRAP_SQL {
        command.push(RawQuery::new().text(sql).shared());
    }
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_pg_core::RenderMode;

    #[test]
    fn test_bootstrap_command() {
        let command = command();
        assert_eq!(command.len(), 3);
        let sql = command.render(RenderMode::Simple).sql;
        assert!(sql.contains("FUNCTION escape_like(value text)"));
        assert!(sql.contains("FUNCTION escape_regexp(value text)"));
        assert!(sql.contains("FUNCTION jsonb_append_at_path(target jsonb, path text[], value jsonb)"));
        assert_eq!(sql.matches(";CREATE OR REPLACE").count(), 2);
    }
}
