//! Catalog of SQL functions callable from expressions.

use crate::types::ValueType;

/// How a function's result type is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    Boolean,
    Integer,
    Integer64,
    Double,
    String,
    Uuid,
    DateTime,
    Interval,
    Json,
    /// Same type as the argument at this position.
    Arg(usize),
}

impl Returns {
    /// Resolves the result type from the argument types.
    #[must_use]
    pub fn resolve(self, args: &[ValueType]) -> ValueType {
        match self {
            Self::Boolean => ValueType::Boolean,
            Self::Integer => ValueType::Integer,
            Self::Integer64 => ValueType::Integer64,
            Self::Double => ValueType::Double,
            Self::String => ValueType::String,
            Self::Uuid => ValueType::Uuid,
            Self::DateTime => ValueType::DateTime,
            Self::Interval => ValueType::Interval,
            Self::Json => ValueType::json(),
            Self::Arg(i) => args.get(i).cloned().unwrap_or(ValueType::Null),
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlFunction {
    pub name: &'static str,
    /// Arguments the caller must supply.
    pub required: usize,
    /// SQL text of the trailing arguments that may be omitted.
    pub defaults: &'static [&'static str],
    /// Accepts any number of arguments beyond `required`.
    pub variadic: bool,
    pub returns: Returns,
}

impl SqlFunction {
    const fn fixed(name: &'static str, required: usize, returns: Returns) -> Self {
        Self {
            name,
            required,
            defaults: &[],
            variadic: false,
            returns,
        }
    }

    const fn with_defaults(
        name: &'static str,
        required: usize,
        defaults: &'static [&'static str],
        returns: Returns,
    ) -> Self {
        Self {
            name,
            required,
            defaults,
            variadic: false,
            returns,
        }
    }

    const fn variadic(name: &'static str, required: usize, returns: Returns) -> Self {
        Self {
            name,
            required,
            defaults: &[],
            variadic: true,
            returns,
        }
    }

    /// Returns whether `count` arguments are acceptable.
    #[must_use]
    pub const fn accepts(&self, count: usize) -> bool {
        count >= self.required && (self.variadic || count <= self.required + self.defaults.len())
    }

    /// Returns the default SQL for the arguments the caller left out.
    #[must_use]
    pub fn missing_defaults(&self, count: usize) -> &'static [&'static str] {
        let supplied = count.saturating_sub(self.required).min(self.defaults.len());
        &self.defaults[supplied..]
    }
}

static CATALOG: &[SqlFunction] = &[
    SqlFunction::fixed("lower", 1, Returns::String),
    SqlFunction::fixed("upper", 1, Returns::String),
    SqlFunction::fixed("trim", 1, Returns::String),
    SqlFunction::fixed("length", 1, Returns::Integer),
    SqlFunction::fixed("md5", 1, Returns::String),
    SqlFunction::fixed("replace", 3, Returns::String),
    SqlFunction::fixed("left", 2, Returns::String),
    SqlFunction::fixed("right", 2, Returns::String),
    SqlFunction::fixed("strpos", 2, Returns::Integer),
    SqlFunction::fixed("split_part", 3, Returns::String),
    SqlFunction::with_defaults("lpad", 2, &["' '"], Returns::String),
    SqlFunction::with_defaults("rpad", 2, &["' '"], Returns::String),
    SqlFunction::variadic("concat", 1, Returns::String),
    SqlFunction::fixed("abs", 1, Returns::Arg(0)),
    SqlFunction::fixed("ceil", 1, Returns::Arg(0)),
    SqlFunction::fixed("floor", 1, Returns::Arg(0)),
    SqlFunction::fixed("random", 0, Returns::Double),
    SqlFunction::variadic("coalesce", 1, Returns::Arg(0)),
    SqlFunction::variadic("greatest", 1, Returns::Arg(0)),
    SqlFunction::variadic("least", 1, Returns::Arg(0)),
    SqlFunction::fixed("nullif", 2, Returns::Arg(0)),
    SqlFunction::fixed("now", 0, Returns::DateTime),
    SqlFunction::fixed("date_trunc", 2, Returns::Arg(1)),
    SqlFunction::fixed("date_part", 2, Returns::Double),
    SqlFunction::with_defaults("age", 1, &["now()"], Returns::Interval),
    SqlFunction::fixed("gen_random_uuid", 0, Returns::Uuid),
    SqlFunction::with_defaults("array_length", 1, &["1"], Returns::Integer),
    SqlFunction::fixed("cardinality", 1, Returns::Integer),
    SqlFunction::fixed("array_append", 2, Returns::Arg(0)),
    SqlFunction::fixed("array_remove", 2, Returns::Arg(0)),
    SqlFunction::fixed("array_cat", 2, Returns::Arg(0)),
    SqlFunction::fixed("to_jsonb", 1, Returns::Json),
    SqlFunction::fixed("jsonb_array_length", 1, Returns::Integer),
    SqlFunction::fixed("jsonb_typeof", 1, Returns::String),
    SqlFunction::fixed("escape_like", 1, Returns::String),
    SqlFunction::fixed("escape_regexp", 1, Returns::String),
    SqlFunction::fixed("count", 1, Returns::Integer64),
];

/// Looks up a function by case-insensitive name.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static SqlFunction> {
    CATALOG.iter().find(|f| f.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup("Lower").map(|f| f.name), Some("lower"));
        assert!(lookup("soundex").is_none());
    }

    #[test]
    fn test_arity() {
        let lpad = lookup("lpad").unwrap();
        assert!(!lpad.accepts(1));
        assert!(lpad.accepts(2));
        assert!(lpad.accepts(3));
        assert!(!lpad.accepts(4));
        assert_eq!(lpad.missing_defaults(2), &["' '"]);
        assert!(lpad.missing_defaults(3).is_empty());
        assert!(lookup("coalesce").unwrap().accepts(5));
    }

    #[test]
    fn test_result_types() {
        let args = [ValueType::Integer64, ValueType::Integer];
        assert_eq!(Returns::Arg(0).resolve(&args), ValueType::Integer64);
        assert_eq!(Returns::Json.resolve(&args), ValueType::json());
    }
}
