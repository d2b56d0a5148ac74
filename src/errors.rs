//! Subscription Service Error Hierarchy
//!
//! Errors are grouped by the layer that raises them: the remote resource
//! store, per-domain plugins, the subscription core, and the network front
//! end. Failures are isolated to the smallest affected unit (one item, one
//! update cycle, one link), so most of these are logged and dropped rather
//! than propagated to the process.

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Remote resource store failures (list/watch)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Decode/encode failures inside a resource type plugin
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Registry and subscription lifecycle failures
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Transport level failures (gRPC server, TLS, sockets)
    #[error(transparent)]
    Network(#[from] NetworkError),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Initial list or relist failed
    #[error("List of {kind} failed: {reason}")]
    ListFailed { kind: String, reason: String },

    /// Watch could not be opened from the given cursor
    #[error("Watch of {kind} from resource version {resource_version} failed: {reason}")]
    WatchFailed {
        kind: String,
        resource_version: String,
        reason: String,
    },

    /// The store reported an ERROR action on an open watch
    #[error("Watch stream of {kind} reported an error: {reason}")]
    WatchError { kind: String, reason: String },

    /// Seed data for the in-memory store could not be read
    #[error("Invalid seed data: {0}")]
    InvalidSeed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// A single raw item could not be projected into a typed value
    #[error("Decode of {kind}/{name} failed: {reason}")]
    Decode {
        kind: String,
        name: String,
        reason: String,
    },

    /// A value set could not be encoded into a wire payload
    #[error("Encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// A domain binding names a plugin type nobody registered
    #[error("Unknown plugin type: {0}")]
    UnknownPlugin(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// No domain is bound to the requested address
    #[error("Unknown resource domain: {0}")]
    UnknownDomain(String),

    /// The registry was closed and no longer accepts subscribers
    #[error("Resource database is closed")]
    DatabaseClosed,

    /// The manager task of an entry is gone
    #[error("Subscription manager for {domain} stopped")]
    ManagerStopped { domain: String },

    /// Delivery to a single subscriber failed
    #[error("Push to subscriber {subscriber_id} failed")]
    PushFailed { subscriber_id: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Malformed endpoint addresses
    #[error("Invalid URI format: {0}")]
    InvalidURI(String),

    /// Accepted sockets could not be configured
    #[error("Listener setup failed: {0}")]
    ListenerSetup(String),

    /// TLS material could not be loaded or generated
    #[error("TLS setup failed: {0}")]
    TlsSetup(String),

    /// gRPC transport layer errors
    #[error(transparent)]
    TonicError(#[from] Box<tonic::transport::Error>),

    /// gRPC status code errors
    #[error(transparent)]
    TonicStatusError(#[from] Box<tonic::Status>),

    /// Local socket and file I/O
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),
}

// ============== Conversion Implementations ============== //

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        NetworkError::TonicError(Box::new(err)).into()
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        NetworkError::TonicStatusError(Box::new(status)).into()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        NetworkError::IoError(err).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        NetworkError::TaskFailed(err).into()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        PluginError::Encode(err).into()
    }
}

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Subscription(SubscriptionError::UnknownDomain(domain)) => {
                tonic::Status::not_found(format!("unknown resource domain: {domain}"))
            }
            Error::Subscription(SubscriptionError::DatabaseClosed) => {
                tonic::Status::unavailable("service is shutting down")
            }
            Error::Subscription(e @ SubscriptionError::ManagerStopped { .. }) => {
                tonic::Status::unavailable(e.to_string())
            }
            other => tonic::Status::internal(other.to_string()),
        }
    }
}
