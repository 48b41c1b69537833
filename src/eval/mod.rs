//! Evaluation engine interface.
//!
//! The service never evaluates flags itself. It calls an [`Evaluator`] with a
//! correlation id, a flag key and the caller's context, and gets back a typed
//! value with its variant and reason, or a domain error code.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller-supplied attributes used to select a variant.
pub type EvaluationContext = Map<String, Value>;

/// Structured flag value.
pub type ObjectValue = Map<String, Value>;

/// Why a variant was chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    Static,
    Default,
    TargetingMatch,
    Split,
    Cached,
    Disabled,
    #[default]
    Unknown,
    Error,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Static => "STATIC",
            Reason::Default => "DEFAULT",
            Reason::TargetingMatch => "TARGETING_MATCH",
            Reason::Split => "SPLIT",
            Reason::Cached => "CACHED",
            Reason::Disabled => "DISABLED",
            Reason::Unknown => "UNKNOWN",
            Reason::Error => "ERROR",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain error codes reported by an evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FlagNotFound,
    TypeMismatch,
    Disabled,
    ParseError,
    /// Any code outside the known set, kept as reported.
    General(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::FlagNotFound => "FLAG_NOT_FOUND",
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::Disabled => "DISABLED",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::General(code) => code,
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "FLAG_NOT_FOUND" => ErrorCode::FlagNotFound,
            "TYPE_MISMATCH" => ErrorCode::TypeMismatch,
            "DISABLED" => ErrorCode::Disabled,
            "PARSE_ERROR" => ErrorCode::ParseError,
            other => ErrorCode::General(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed evaluation. Displays as its bare code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}")]
pub struct EvaluationError {
    pub code: ErrorCode,
}

impl EvaluationError {
    pub fn new(code: impl Into<ErrorCode>) -> Self {
        Self { code: code.into() }
    }
}

impl From<ErrorCode> for EvaluationError {
    fn from(code: ErrorCode) -> Self {
        Self { code }
    }
}

/// A successful evaluation of one flag to a `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<T> {
    pub value: T,
    pub variant: String,
    pub reason: Reason,
}

pub type ResolveResult<T> = Result<Resolution<T>, EvaluationError>;

/// Value of a flag in a bulk resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum FlagValue {
    Boolean(bool),
    String(String),
    Integer(i64),
    Float(f64),
    Object(ObjectValue),
}

/// One entry of [`Evaluator::resolve_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnyResolution {
    pub flag_key: String,
    pub variant: String,
    pub reason: Reason,
    pub value: FlagValue,
}

/// Flag evaluation engine.
///
/// Implementations must be safe for concurrent calls from many request tasks.
pub trait Evaluator: Send + Sync {
    fn resolve_boolean(
        &self,
        request_id: &str,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> ResolveResult<bool>;

    fn resolve_string(
        &self,
        request_id: &str,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> ResolveResult<String>;

    fn resolve_int(
        &self,
        request_id: &str,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> ResolveResult<i64>;

    fn resolve_float(
        &self,
        request_id: &str,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> ResolveResult<f64>;

    fn resolve_object(
        &self,
        request_id: &str,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> ResolveResult<ObjectValue>;

    /// Resolve every known flag.
    fn resolve_all(&self, request_id: &str, context: &EvaluationContext) -> Vec<AnyResolution>;
}
