use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::path::Path;

use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;
use ts_rs::TS;

/// Error type shared by the store, the registry and the CLI.
///
/// `code` is a stable `AREA/REASON` string (`FLEET_STORE/CORRUPT`,
/// `IO/PermissionDenied`, ...). `context` carries the failing step and path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    #[ts(optional, as = "Option<HashMap<String, String>>")]
    pub context: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub cause: Option<Box<AppError>>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Code for foreign errors that carry no code of their own.
    pub const UNKNOWN_CODE: &'static str = "FLEET/UNKNOWN";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: HashMap::new(),
            cause: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Tags the error with the filesystem step that failed and the path it touched.
    pub fn with_operation(self, operation: &str, path: &Path) -> Self {
        self.with_context("operation", operation)
            .with_context("path", path.display().to_string())
    }

    pub fn with_cause(mut self, cause: impl Into<AppError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            let mut pairs: Vec<_> = self.context.iter().collect();
            pairs.sort();
            write!(f, "[{}] {} ({:?})", self.code, self.message, pairs)
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Walks a foreign error chain, keeping any [`AppError`] found in it intact.
fn from_chain(err: &(dyn StdError + 'static)) -> AppError {
    if let Some(app) = err.downcast_ref::<AppError>() {
        return app.clone();
    }
    let mut converted = AppError::new(AppError::UNKNOWN_CODE, err.to_string());
    converted.cause = err.source().map(|source| Box::new(from_chain(source)));
    converted
}

impl From<AnyhowError> for AppError {
    fn from(error: AnyhowError) -> Self {
        from_chain(error.as_ref())
    }
}

impl From<IoError> for AppError {
    fn from(error: IoError) -> Self {
        let app_error = AppError::new(format!("IO/{:?}", error.kind()), error.to_string());
        match error.raw_os_error() {
            Some(os_code) => app_error.with_context("os_code", os_code.to_string()),
            None => app_error,
        }
    }
}

/// Attaches the store step and the path it touched to an I/O failure.
pub trait IoStep<T> {
    fn io_step(self, operation: &str, path: &Path) -> AppResult<T>;
}

impl<T> IoStep<T> for std::io::Result<T> {
    fn io_step(self, operation: &str, path: &Path) -> AppResult<T> {
        self.map_err(|err| AppError::from(err).with_operation(operation, path))
    }
}

impl From<SerdeJsonError> for AppError {
    fn from(error: SerdeJsonError) -> Self {
        let code = match error.classify() {
            Category::Io => "JSON/IO",
            Category::Syntax => "JSON/SYNTAX",
            Category::Data => "JSON/DATA",
            Category::Eof => "JSON/EOF",
        };
        let (line, column) = (error.line(), error.column());
        let app_error = AppError::new(code, error.to_string());
        if line == 0 {
            return app_error;
        }
        app_error
            .with_context("line", line.to_string())
            .with_context("column", column.to_string())
    }
}
