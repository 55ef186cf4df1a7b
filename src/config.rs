use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use url::Url;

use crate::driver::DRIVER_NAME;
use crate::error::DbSqlError;

/// Where the connection sends its diagnostic events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// Emit nothing.
    #[default]
    Discard,
    /// Emit `tracing` events; whichever subscriber the application installed receives them.
    Tracing,
}

impl LogOutput {
    #[must_use]
    pub fn is_enabled(self) -> bool {
        matches!(self, LogOutput::Tracing)
    }
}

/// Connection options, usually produced by [`parse_uri`].
///
/// Two options compare equal when every field does; the location is compared
/// by its IANA name.
#[derive(Clone, PartialEq)]
pub struct Options {
    pub host: String,
    pub port: String,
    pub token: String,
    pub http_path: String,
    pub max_rows: i64,
    /// Seconds; 0 or less means no timeout.
    pub timeout: i64,
    pub location: Tz,
    pub user_agent_entry: String,
    pub log_output: LogOutput,
}

pub const DEFAULT_PORT: &str = "443";
pub const DEFAULT_MAX_ROWS: i64 = 10_000;

impl Default for Options {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT.to_string(),
            token: String::new(),
            http_path: String::new(),
            max_rows: DEFAULT_MAX_ROWS,
            timeout: 0,
            location: Tz::UTC,
            user_agent_entry: String::new(),
            log_output: LogOutput::Discard,
        }
    }
}

// The token stays out of debug output.
impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("token", &"<redacted>")
            .field("http_path", &self.http_path)
            .field("max_rows", &self.max_rows)
            .field("timeout", &self.timeout)
            .field("location", &self.location.name())
            .field("user_agent_entry", &self.user_agent_entry)
            .field("log_output", &self.log_output)
            .finish()
    }
}

impl Options {
    #[must_use]
    pub fn timeout_duration(&self) -> Option<Duration> {
        u64::try_from(self.timeout)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Serialise the recognised fields back into a connection URI.
    ///
    /// Default-valued query parameters are left out, so
    /// `parse_uri(&opts.to_uri())` gives back `opts`.
    #[must_use]
    pub fn to_uri(&self) -> String {
        let mut uri = format!(
            "{DRIVER_NAME}://token:{}@{}",
            encode_component(&self.token),
            self.host
        );
        if self.port != DEFAULT_PORT {
            uri.push(':');
            uri.push_str(&self.port);
        }
        uri.push_str(&self.http_path);

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        if self.timeout != 0 {
            query.append_pair("timeout", &self.timeout.to_string());
        }
        if self.max_rows != DEFAULT_MAX_ROWS {
            query.append_pair("maxRows", &self.max_rows.to_string());
        }
        if !self.user_agent_entry.is_empty() {
            query.append_pair("userAgentEntry", &self.user_agent_entry);
        }
        if self.location != Tz::UTC {
            query.append_pair("tz", self.location.name());
        }
        let query = query.finish();
        if !query.is_empty() {
            uri.push('?');
            uri.push_str(&query);
        }
        uri
    }

    /// Return a copy with a different log output.
    #[must_use]
    pub fn with_log_output(mut self, log_output: LogOutput) -> Self {
        self.log_output = log_output;
        self
    }
}

impl FromStr for Options {
    type Err = DbSqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_uri(s)
    }
}

/// Parse a `databricks://token:<token>@<host>[:<port>]/<http-path>?...` URI.
///
/// Recognised query parameters are `timeout`, `maxRows`, `userAgentEntry`
/// and `tz`; others are ignored.
///
/// `token:@host` yields an empty token; `token@host` has none and is rejected.
///
/// # Errors
/// Returns `DbSqlError::ParseError` for a wrong scheme, a missing token, an
/// empty path, a non-integer `timeout`/`maxRows`, or an unknown timezone.
pub fn parse_uri(uri: &str) -> Result<Options, DbSqlError> {
    let parsed = Url::parse(uri).map_err(|e| DbSqlError::ParseError(e.to_string()))?;

    if parsed.scheme() != DRIVER_NAME {
        return Err(DbSqlError::ParseError(format!(
            "scheme {} not recognized",
            parsed.scheme()
        )));
    }

    let mut opts = Options::default();

    opts.host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| DbSqlError::ParseError("host is required".to_string()))?
        .to_string();
    if let Some(port) = parsed.port() {
        opts.port = port.to_string();
    }

    // `url` reports `token:@host` as having no password; an explicit empty
    // token is still accepted.
    opts.token = match parsed.password() {
        Some(token) => decode_component(token)?,
        None if has_password_separator(uri) => String::new(),
        None => return Err(DbSqlError::ParseError("token is required".to_string())),
    };

    let path = parsed.path();
    if path.is_empty() || path == "/" {
        return Err(DbSqlError::ParseError("http path is required".to_string()));
    }
    opts.http_path = path.to_string();

    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "timeout" => {
                opts.timeout = value.parse().map_err(|e| {
                    DbSqlError::ParseError(format!("timeout {value:?} is not an integer: {e}"))
                })?;
            }
            "maxRows" => {
                opts.max_rows = value.parse().map_err(|e| {
                    DbSqlError::ParseError(format!("maxRows {value:?} is not an integer: {e}"))
                })?;
            }
            "userAgentEntry" => opts.user_agent_entry = value.into_owned(),
            "tz" if value.is_empty() => opts.location = Tz::UTC,
            "tz" => {
                opts.location = value.parse::<Tz>().map_err(|e| {
                    DbSqlError::ParseError(format!("unknown timezone {value:?}: {e}"))
                })?;
            }
            _ => {}
        }
    }

    Ok(opts)
}

/// Whether the raw authority's userinfo contains a `:`.
fn has_password_separator(uri: &str) -> bool {
    let rest = uri.split_once("://").map_or(uri, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    authority
        .rsplit_once('@')
        .is_some_and(|(userinfo, _)| userinfo.contains(':'))
}

fn decode_component(s: &str) -> Result<String, DbSqlError> {
    percent_decode_str(s)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| DbSqlError::ParseError(format!("invalid token encoding: {e}")))
}

fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}
