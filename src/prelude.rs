//! Convenient imports for common functionality.

pub use crate::config::{LogOutput, Options};
pub use crate::connection::Connection;
pub use crate::driver::{Driver, DriverRegistry};
pub use crate::error::DbSqlError;
pub use crate::hooks::{Context, OperationMetadata};
pub use crate::results::{ExecResult, ResultSet, Row};
pub use crate::statement::PreparedStatement;
pub use crate::translation::Template;
pub use crate::types::{NamedValue, Value, positional_args};
