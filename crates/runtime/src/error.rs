//! Error taxonomy of the embedding layer.
//!
//! Every fallible operation returns [`Result`]; conditions are classified
//! and raised synchronously at the point of detection, and nothing is
//! retried internally. A protected call that fails leaves the state itself
//! usable; only the in-flight call is abandoned.

use core::ffi::c_int;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Classified failure conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// The engine could not be opened. Not recoverable by retry.
    #[error("error initializing the Lua subsystem")]
    Init,

    /// Operation attempted on a closed state or a dead coroutine.
    #[error("lifecycle violation: {0}")]
    Lifecycle(&'static str),

    /// A chunk failed to compile. Carries the engine-reported message.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A protected call or resume returned a failure status.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Stack growth or allocation failure.
    #[error("resource exhausted: {0}")]
    Resource(&'static str),

    /// Declarative library marker missing or malformed, or a library entry
    /// that cannot be bound.
    #[error("library configuration: {0}")]
    Configuration(String),

    /// Null, empty, or otherwise invalid argument.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A value of a type the target operation does not support.
    #[error("type mismatch: {0}")]
    Type(String),

    /// Stack slot, snapshot position, or call-stack level out of range.
    #[error("index {0} out of range")]
    Index(c_int),

    /// The engine reported a status word this layer does not recognize.
    /// Always a defect, never a recoverable condition.
    #[error("unknown engine status {0}")]
    UnknownStatus(c_int),

    /// The engine reported a type tag this layer does not recognize.
    /// Always a defect, never a recoverable condition.
    #[error("unknown engine type tag {0}")]
    UnknownTypeTag(c_int),
}
