//! Statement templating and client-side parameter binding.
//!
//! The remote execute call only accepts SQL text, so arguments are rendered
//! into literals here. [`Template::parse`] finds the placeholders once;
//! [`bind`] substitutes a set of arguments into it.

use std::collections::{BTreeSet, HashMap};

mod parsers;
mod scanner;

use parsers::{
    is_block_comment_end, is_block_comment_start, is_cast, is_escaped, is_json_path,
    is_line_comment_start,
};
use scanner::{State, scan_ident};

use crate::error::DbSqlError;
use crate::types::{NamedValue, Value, format_timestamp};

/// One piece of a parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// A `?` placeholder; the index counts positional placeholders from zero.
    Positional(usize),
    /// A `:name` placeholder.
    Named(String),
}

/// SQL text split into literal text and placeholders.
///
/// Quoted strings, backticked identifiers and comments are copied through
/// untouched, so a `?` or `:x` inside them is not a placeholder.
///
/// ```rust
/// use databricks_sql::prelude::*;
///
/// let tmpl = Template::parse("SELECT * FROM t WHERE id = ? AND name = '?'");
/// assert_eq!(tmpl.num_input(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
    positional: usize,
    names: BTreeSet<String>,
}

impl Template {
    /// Split `sql` into segments. This never fails and does not look at arguments.
    #[must_use]
    pub fn parse(sql: &str) -> Template {
        let bytes = sql.as_bytes();
        let mut segments = Vec::new();
        let mut names = BTreeSet::new();
        let mut positional = 0;
        let mut state = State::Normal;
        let mut text_start = 0;
        let mut idx = 0;

        while idx < bytes.len() {
            let b = bytes[idx];
            match state {
                State::Normal => match b {
                    b'\'' => state = State::SingleQuoted,
                    b'"' => state = State::DoubleQuoted,
                    b'`' => state = State::Backticked,
                    _ if is_line_comment_start(bytes, idx) => {
                        state = State::LineComment;
                        idx += 1;
                    }
                    _ if is_block_comment_start(bytes, idx) => {
                        state = State::BlockComment(1);
                        idx += 1;
                    }
                    b'?' => {
                        push_text(&mut segments, &sql[text_start..idx]);
                        segments.push(Segment::Positional(positional));
                        positional += 1;
                        text_start = idx + 1;
                    }
                    b':' if !is_cast(bytes, idx) && !is_json_path(bytes, idx) => {
                        if let Some((end, name)) = scan_ident(bytes, idx + 1) {
                            push_text(&mut segments, &sql[text_start..idx]);
                            names.insert(name.to_string());
                            segments.push(Segment::Named(name.to_string()));
                            text_start = end;
                            idx = end - 1;
                        }
                    }
                    _ => {}
                },
                State::SingleQuoted => {
                    if b == b'\'' && !is_escaped(bytes, idx) {
                        state = State::Normal;
                    }
                }
                State::DoubleQuoted => {
                    if b == b'"' && !is_escaped(bytes, idx) {
                        state = State::Normal;
                    }
                }
                State::Backticked => {
                    if b == b'`' {
                        state = State::Normal;
                    }
                }
                State::LineComment => {
                    if b == b'\n' {
                        state = State::Normal;
                    }
                }
                State::BlockComment(depth) => {
                    if is_block_comment_start(bytes, idx) {
                        state = State::BlockComment(depth + 1);
                        idx += 1;
                    } else if is_block_comment_end(bytes, idx) {
                        state = if depth == 1 {
                            State::Normal
                        } else {
                            State::BlockComment(depth - 1)
                        };
                        idx += 1;
                    }
                }
            }
            idx += 1;
        }

        push_text(&mut segments, &sql[text_start.min(sql.len())..]);

        Template {
            segments,
            positional,
            names,
        }
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of arguments the template expects.
    #[must_use]
    pub fn num_input(&self) -> usize {
        self.positional + self.names.len()
    }

    #[must_use]
    pub fn has_placeholders(&self) -> bool {
        self.num_input() > 0
    }
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Text(prev)) = segments.last_mut() {
        prev.push_str(text);
    } else {
        segments.push(Segment::Text(text.to_string()));
    }
}

/// Substitute `args` into `template`, returning the final statement text.
///
/// Positional placeholders take the unnamed arguments in ordinal order;
/// named placeholders take the argument with the same name.
///
/// # Errors
/// Returns `DbSqlError::BindingError` when arguments and placeholders do not
/// line up, and `DbSqlError::Skip` when a value has no SQL literal form.
pub fn bind(template: &Template, args: &[NamedValue]) -> Result<String, DbSqlError> {
    if template.positional > 0 && !template.names.is_empty() {
        return Err(DbSqlError::BindingError(
            "statement mixes positional and named parameters".to_string(),
        ));
    }

    let mut positional: Vec<&NamedValue> = args.iter().filter(|a| a.name.is_none()).collect();
    positional.sort_by_key(|a| a.ordinal);
    let named: HashMap<&str, &NamedValue> = args
        .iter()
        .filter_map(|a| a.name.as_deref().map(|n| (n, a)))
        .collect();

    if positional.len() != template.positional {
        return Err(DbSqlError::BindingError(format!(
            "expected {} positional arguments, got {}",
            template.positional,
            positional.len()
        )));
    }
    if let Some(unused) = named.keys().find(|n| !template.names.contains(**n)) {
        return Err(DbSqlError::BindingError(format!(
            "argument :{unused} does not match any parameter"
        )));
    }

    let mut out = String::new();
    for segment in &template.segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Positional(i) => out.push_str(&render_literal(&positional[*i].value)?),
            Segment::Named(name) => {
                let arg = named.get(name.as_str()).ok_or_else(|| {
                    DbSqlError::BindingError(format!("missing argument for :{name}"))
                })?;
                out.push_str(&render_literal(&arg.value)?);
            }
        }
    }
    Ok(out)
}

/// Render one value as a SQL literal.
///
/// # Errors
/// Non-finite floats are a `BindingError`; blobs return `Skip`.
pub fn render_literal(value: &Value) -> Result<String, DbSqlError> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(true) => Ok("TRUE".to_string()),
        Value::Bool(false) => Ok("FALSE".to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) if f.is_finite() => Ok(format!("{f:?}")),
        Value::Float(f) => Err(DbSqlError::BindingError(format!(
            "cannot bind non-finite float {f}"
        ))),
        Value::Text(s) => Ok(quote(s)),
        Value::Timestamp(ts) => Ok(quote(&format_timestamp(ts))),
        Value::Json(json) => Ok(quote(&json.to_string())),
        Value::Blob(_) => Err(DbSqlError::Skip(format!(
            "no literal rendering for {} values",
            value.type_name()
        ))),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{parse_timestamp, positional_args};
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn binds_positional_in_order() {
        let tmpl = Template::parse("select * from t where a = ? and b = ?");
        let sql = bind(&tmpl, &positional_args(vec![Value::Int(1), "x".into()])).unwrap();
        assert_eq!(sql, "select * from t where a = 1 and b = 'x'");
    }

    #[test]
    fn positional_uses_ordinals_not_slice_order() {
        let tmpl = Template::parse("values (?, ?)");
        let args = vec![
            NamedValue::positional(2, Value::Int(2)),
            NamedValue::positional(1, Value::Int(1)),
        ];
        assert_eq!(bind(&tmpl, &args).unwrap(), "values (1, 2)");
    }

    #[test]
    fn binds_named_and_reuses_names() {
        let tmpl = Template::parse("select :id, :name, :id");
        assert_eq!(tmpl.num_input(), 2);
        let args = vec![
            NamedValue::named(1, "id", 7),
            NamedValue::named(2, "name", "bob"),
        ];
        assert_eq!(bind(&tmpl, &args).unwrap(), "select 7, 'bob', 7");
    }

    #[test]
    fn skips_inside_literals_and_comments() {
        let sql = "select '?', \"?\", `a?b`, x::int -- ?\n/* :y */ from t where a = ?";
        let tmpl = Template::parse(sql);
        assert_eq!(tmpl.num_input(), 1);
        let bound = bind(&tmpl, &positional_args(vec![Value::Null])).unwrap();
        assert_eq!(
            bound,
            "select '?', \"?\", `a?b`, x::int -- ?\n/* :y */ from t where a = NULL"
        );
    }

    #[test]
    fn json_paths_are_not_parameters() {
        let sql = "SELECT raw:owner, raw:store.bicycle, tags[0]:name, `col`:x, f(a):b FROM store_data";
        let tmpl = Template::parse(sql);
        assert!(!tmpl.has_placeholders());
        assert_eq!(bind(&tmpl, &[]).unwrap(), sql);
    }

    #[test]
    fn json_path_next_to_real_parameter() {
        let tmpl = Template::parse("SELECT raw:owner FROM t WHERE id = :id AND (:flag)");
        assert_eq!(tmpl.num_input(), 2);
        let args = vec![
            NamedValue::named(1, "id", 3i64),
            NamedValue::named(2, "flag", true),
        ];
        assert_eq!(
            bind(&tmpl, &args).unwrap(),
            "SELECT raw:owner FROM t WHERE id = 3 AND (TRUE)"
        );
    }

    #[test]
    fn escaped_quote_does_not_end_literal() {
        let tmpl = Template::parse(r"select 'it\'s ?' , ?");
        assert_eq!(tmpl.num_input(), 1);
    }

    #[test]
    fn parse_does_not_depend_on_args() {
        let tmpl = Template::parse("select ?, ?, ?");
        assert_eq!(tmpl.num_input(), 3);
        assert!(Template::parse("select 1").segments().len() == 1);
        assert!(!Template::parse("").has_placeholders());
    }

    #[test]
    fn count_mismatch_is_binding_error() {
        let tmpl = Template::parse("select ?");
        assert!(matches!(
            bind(&tmpl, &[]),
            Err(DbSqlError::BindingError(_))
        ));
        assert!(matches!(
            bind(&tmpl, &positional_args(vec![Value::Int(1), Value::Int(2)])),
            Err(DbSqlError::BindingError(_))
        ));
    }

    #[test]
    fn name_mismatch_is_binding_error() {
        let tmpl = Template::parse("select :a");
        let missing = bind(&tmpl, &[NamedValue::named(1, "b", 1)]);
        assert!(matches!(missing, Err(DbSqlError::BindingError(_))));

        let mixed = Template::parse("select :a, ?");
        let err = bind(
            &mixed,
            &[NamedValue::named(1, "a", 1), NamedValue::positional(2, 2)],
        );
        assert!(matches!(err, Err(DbSqlError::BindingError(_))));
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(
            render_literal(&Value::Text(r"O'Brien \ co".into())).unwrap(),
            r"'O\'Brien \\ co'"
        );
    }

    #[test]
    fn timestamp_literal_round_trips() {
        let ts = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2022, 11, 30, 23, 59, 58)
            .unwrap();
        let lit = render_literal(&Value::Timestamp(ts)).unwrap();
        assert_eq!(lit, "'2022-11-30 23:59:58+01:00'");
        let inner = lit.trim_matches('\'');
        assert_eq!(parse_timestamp(inner).unwrap(), ts);
    }

    #[test]
    fn scalar_rendering() {
        assert_eq!(render_literal(&Value::Bool(true)).unwrap(), "TRUE");
        assert_eq!(render_literal(&Value::Int(-3)).unwrap(), "-3");
        assert_eq!(render_literal(&Value::Float(1.5)).unwrap(), "1.5");
        assert_eq!(
            render_literal(&Value::Json(serde_json::json!({"a": 1}))).unwrap(),
            "'{\"a\":1}'"
        );
        assert!(render_literal(&Value::Float(f64::NAN)).is_err());
    }

    #[test]
    fn blobs_are_deferred() {
        let err = render_literal(&Value::Blob(vec![1, 2])).unwrap_err();
        assert!(err.is_skip());
    }
}
