//! Error types for npmrc-auth-rs.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while refreshing npmrc credentials.
#[derive(Error, Debug)]
pub enum Error {
    /// The source (project) config file does not exist or cannot be read.
    #[error("config file not found or unreadable: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The target (credential) config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to atomically replace a config file.
    #[error("failed to write config file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The user's home directory could not be determined.
    #[error("could not determine the home directory for the default credential config")]
    HomeDirNotFound,

    /// No token source produced a token.
    #[error(
        "failed to get credentials. Please run:\n\
         `gcloud auth application-default login` or\n\
         `export GOOGLE_APPLICATION_CREDENTIALS=<path/to/service/account/key>`\n\
         attempted: {attempted}"
    )]
    CredentialsNotFound { attempted: String },

    /// Failed to read a credentials file.
    #[error("failed to read credentials file {path}: {source}")]
    ReadCredentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The credentials file holds a type this crate cannot exchange itself.
    #[error("unsupported credential type '{0}'")]
    UnsupportedCredentialType(String),

    /// The token lacks the cloud-platform scope.
    #[error(
        "token has insufficient authentication scopes (got: {scopes}). Please configure access \
         scopes following https://cloud.google.com/artifact-registry/docs/access-control#compute"
    )]
    InsufficientScopes { scopes: String },

    /// A required binary was not found on `$PATH`.
    #[error("{0} binary not found on PATH")]
    BinaryNotFound(String),

    /// An external command exited unsuccessfully.
    #[error("{program} failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    /// A token endpoint or metadata server returned an error status.
    #[error("token request to {url} failed with HTTP {status}: {body}")]
    TokenEndpoint {
        url: String,
        status: u16,
        body: String,
    },

    /// A token source returned an empty token.
    #[error("{0} returned an empty token")]
    EmptyToken(&'static str),

    /// A token that cannot be written as a single `.npmrc` value.
    #[error("invalid access token: {0}")]
    InvalidToken(&'static str),

    /// A service account private key could not be loaded or used for signing.
    #[error("failed to sign service account assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// Invalid URL in a credentials file or environment override.
    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON in a credentials file or token response.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Other I/O failure while running a token source.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for npmrc-auth-rs operations.
pub type Result<T> = std::result::Result<T, Error>;
