//! Error types for the lazy-deserialization grid

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the grid
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file parse error
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    // =========================================================================
    // Marshalling Errors
    // =========================================================================
    /// No codec covers the object being written
    #[error("Object of type {type_name} is not serializable: {reason}")]
    NonSerializable {
        type_name: &'static str,
        reason: String,
    },

    /// A stream referenced a type tag with no registered codec
    #[error("No codec registered for type tag 0x{tag:02x}")]
    CodecMissing { tag: u8 },

    /// Truncated or otherwise corrupt stream
    #[error("Malformed stream: {0}")]
    MalformedStream(String),

    /// Stream written by an unknown marshaller version
    #[error("Incompatible marshaller version: found 0x{found:04x}, expected 0x{expected:04x}")]
    IncompatibleVersion { found: u16, expected: u16 },

    // =========================================================================
    // Cache Errors
    // =========================================================================
    /// Mutation attempted on an unmodifiable view
    #[error("Unsupported operation on unmodifiable view: {0}")]
    UnsupportedOperation(&'static str),

    /// Invocation on a cache that is not running
    #[error("Cache {name} is not running (status: {status})")]
    CacheNotRunning { name: String, status: String },

    /// Cache not defined on this node
    #[error("Cache not defined: {0}")]
    CacheNotDefined(String),

    // =========================================================================
    // Loader Errors
    // =========================================================================
    /// Several peers returned distinct successful responses
    #[error("Loader divergence for key {key}: {count} distinct successful responses, refusing to pick one")]
    LoaderDivergence { key: String, count: usize },

    /// Remote call issued by the cluster loader failed
    #[error("Cluster loader remote call failed: {source}")]
    LoaderTransport {
        #[source]
        source: Box<Error>,
    },

    /// Loader returned a response it does not understand
    #[error("Unexpected response from remote cache: {0}")]
    UnexpectedResponse(String),

    // =========================================================================
    // Remoting Errors
    // =========================================================================
    /// Synchronous remote call did not complete in time
    #[error("Remote call timed out after {timeout_ms}ms waiting on {pending} member(s)")]
    RpcTimeout { timeout_ms: u64, pending: usize },

    /// Remote node failed while handling a command
    #[error("Remote exception from {sender}: {message}")]
    RemoteException { sender: String, message: String },

    /// Target is not reachable through the transport
    #[error("Member {0} is not reachable")]
    MemberUnreachable(String),
}

impl Error {
    /// Build a non-serializable error for the given type
    pub fn non_serializable(type_name: &'static str, reason: impl Into<String>) -> Self {
        Error::NonSerializable {
            type_name,
            reason: reason.into(),
        }
    }

    /// Build a malformed-stream error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedStream(reason.into())
    }

    /// Whether this error was raised while decoding a stream
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Error::CodecMissing { .. }
                | Error::MalformedStream(_)
                | Error::IncompatibleVersion { .. }
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::CodecMissing { tag: 0x4f };
        assert_eq!(err.to_string(), "No codec registered for type tag 0x4f");

        let err = Error::IncompatibleVersion {
            found: 0x1234,
            expected: 0x4c01,
        };
        assert!(err.to_string().contains("0x1234"));
        assert!(err.to_string().contains("0x4c01"));
    }

    #[test]
    fn test_decode_error_classification() {
        assert!(Error::malformed("short read").is_decode_error());
        assert!(Error::CodecMissing { tag: 1 }.is_decode_error());
        assert!(!Error::non_serializable("Foo", "no codec").is_decode_error());
        assert!(!Error::UnsupportedOperation("add").is_decode_error());
    }

    #[test]
    fn test_loader_transport_keeps_source() {
        use std::error::Error as _;

        let err = Error::LoaderTransport {
            source: Box::new(Error::MemberUnreachable("node-b".into())),
        };
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Member node-b is not reachable"));
    }
}
