//! Error types for the luarecord bridge.

use thiserror::Error;

/// The result type used throughout luarecord.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for bridge operations.
///
/// Every failure a script can observe is one of these variants. Errors raised
/// inside Lua callbacks travel through the runtime as external errors and are
/// recovered to the original variant when the script fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// No registered entity class has the requested name.
    #[error("unknown entity type : {0}")]
    UnknownEntityType(String),

    /// The entity class has not opted into the bridge.
    #[error("{action} {class} : not allowed")]
    NotAllowed {
        /// The action that was refused.
        action: String,
        /// The name of the entity class.
        class: String,
    },

    /// The raw input failed structural validation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No persisted record has the requested id.
    #[error("Couldn't find {class} with 'id'={id}")]
    RecordNotFound {
        /// The name of the entity class.
        class: String,
        /// The requested id.
        id: i64,
    },

    /// The underlying host operation raised.
    #[error("Host operation failed: {0}")]
    HostOperationFailed(String),

    /// A row could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The Lua runtime reported an error that did not originate in the host.
    #[error("Script error: {0}")]
    Script(String),
}

impl Error {
    /// Creates a new not-allowed error.
    pub fn not_allowed(action: impl Into<String>, class: impl Into<String>) -> Self {
        Error::NotAllowed { action: action.into(), class: class.into() }
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new host operation error.
    pub fn host(msg: impl Into<String>) -> Self {
        Error::HostOperationFailed(msg.into())
    }

    /// Creates a new script error.
    pub fn script(msg: impl Into<String>) -> Self {
        Error::Script(msg.into())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
