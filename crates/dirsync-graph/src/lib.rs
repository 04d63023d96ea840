//! Microsoft Graph directory gateway for dirsync.
//!
//! Implements [`dirsync_reconcile::DirectoryGateway`] on top of the Graph REST
//! API. Mutations go through `$batch` in chunks of at most
//! [`MAX_BATCH_REQUESTS`]; throttled and transient responses are retried by
//! [`GraphClient`] according to its [`RetryPolicy`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use dirsync_graph::{GraphConfig, GraphGateway, StaticTokenProvider};
//! use secrecy::SecretString;
//!
//! # fn main() -> dirsync_graph::GraphResult<()> {
//! let credentials = Arc::new(StaticTokenProvider::new(SecretString::from("token".to_string())));
//! let gateway = GraphGateway::new(credentials, GraphConfig::default())?;
//! # let _ = gateway;
//! # Ok(())
//! # }
//! ```

mod auth;
mod batch;
mod config;
mod error;
mod gateway;
mod graph_client;
mod roles;
mod schema;
mod throttle;
mod users;

pub use auth::{
    ClientCredentials, ClientCredentialsProvider, CredentialProvider, StaticTokenProvider,
};
pub use batch::{execute_batch, BatchRequestItem, BatchResponseItem, MAX_BATCH_REQUESTS};
pub use config::{GraphCloud, GraphConfig};
pub use error::{GraphError, GraphResult};
pub use gateway::GraphGateway;
pub use graph_client::{GraphClient, ODataError, ODataErrorBody, ODataResponse};
pub use roles::fetch_role_memberships;
pub use schema::{standard_field, StandardField, STANDARD_FIELDS};
pub use throttle::RetryPolicy;
pub use users::{
    create_user_body, extension_property_name, generate_initial_password, mail_nickname,
    map_user, update_user_body, ExtensionMap,
};
