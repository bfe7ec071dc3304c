//! Error types for toolgate operations
//!
//! Call-time failures never surface as these errors: the gateway encodes them
//! in [`ToolResult`](crate::tools::ToolResult). `GatewayError` covers the
//! construction-time and ambient failures (contracts, configuration, fixture
//! files, serialization).

/// Result type for toolgate operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error types for the toolgate framework
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Contract failed validation at construction time
    #[error("Invalid contract: {0}")]
    InvalidContract(String),

    /// A provider already registered a tool with this name
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Fixture file could not be used
    #[error("Fixture error: {0}")]
    Fixture(String),

    /// Remote transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] crate::mcp::McpTransportError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// Shorthand for an [`GatewayError::InvalidContract`]
    pub fn invalid_contract(message: impl Into<String>) -> Self {
        GatewayError::InvalidContract(message.into())
    }
}

impl From<String> for GatewayError {
    fn from(s: String) -> Self {
        GatewayError::Other(s)
    }
}

impl From<&str> for GatewayError {
    fn from(s: &str) -> Self {
        GatewayError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        GatewayError::Other(err.to_string())
    }
}

impl From<figment::Error> for GatewayError {
    fn from(err: figment::Error) -> Self {
        GatewayError::Configuration(err.to_string())
    }
}
