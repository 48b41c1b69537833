//! Evaluation error to RPC error mapping.
//!
//! | domain code      | rpc code           |
//! |------------------|--------------------|
//! | `FLAG_NOT_FOUND` | `not_found`        |
//! | `TYPE_MISMATCH`  | `invalid_argument` |
//! | `DISABLED`       | `unavailable`      |
//! | `PARSE_ERROR`    | `data_loss`        |
//!
//! Mapped errors carry the message `"FlagdError:, <CODE>"`, which clients
//! match on. Any other code is returned as `internal` with its text unchanged.

use super::connect::{Code, RpcError};
use crate::eval::{ErrorCode, EvaluationError};

/// Prefix of every mapped error message.
pub const ERROR_PREFIX: &str = "FlagdError:";

/// Translate an evaluation failure into the error returned to the client.
pub fn map_error(err: &EvaluationError) -> RpcError {
    let code = match &err.code {
        ErrorCode::FlagNotFound => Code::NotFound,
        ErrorCode::TypeMismatch => Code::InvalidArgument,
        ErrorCode::Disabled => Code::Unavailable,
        ErrorCode::ParseError => Code::DataLoss,
        ErrorCode::General(message) => return RpcError::internal(message.clone()),
    };
    RpcError::new(code, format!("{ERROR_PREFIX}, {}", err.code))
}
