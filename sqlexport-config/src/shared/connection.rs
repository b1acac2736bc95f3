use serde::{Deserialize, Serialize};

use crate::SerializableSecretString;

/// Connection settings for the source database server.
///
/// The engine itself is source-agnostic; these settings are handed verbatim
/// to the connector implementation that builds the connection pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqlConnectionConfig {
    /// Hostname or address of the source server.
    pub host: String,
    /// Port of the source server.
    pub port: u16,
    /// Name of the database to export from.
    pub database: String,
    /// Username for authentication.
    pub username: String,
    /// Optional password for authentication, kept redacted outside serde.
    pub password: Option<SerializableSecretString>,
}
