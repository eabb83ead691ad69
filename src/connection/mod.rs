//! Connection management for the audited server
//!
//! This module provides the [`Session`] every check runs against:
//! - Connection establishment, TLS first and cleartext on reconnect
//! - Cached server introspection (`buildInfo`) with bounded retries
//! - Lazily authenticated database handle, cached only on success
//! - Raw socket and certificate probes
//! - Exactly-once teardown

pub mod tls;

use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{
    AuthMechanism, ClientOptions, Credential as DriverCredential, ServerAddress, Tls, TlsOptions,
};
use mongodb::{Client, Database};
use std::fmt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::catalog::ServerVersion;
use crate::config::ConnectionConfig;
use crate::error::mongo::is_connection_failure;
use crate::error::{ConnectionError, Result};
use crate::uri::Credential;

pub use tls::CertificateStatus;

/// Name reported to the server in the handshake
const APP_NAME: &str = "mongoaudit";

/// Transport of the live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// TLS without certificate verification
    Tls,

    /// Cleartext
    Plain,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tls => write!(f, "tls"),
            Transport::Plain => write!(f, "plain"),
        }
    }
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// A client exists and may be used
    Connected(Transport),

    /// Resources were released; the session cannot be used again
    Closed,
}

/// What `buildInfo` disclosed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Version string, absent when the server hides it
    pub version: Option<String>,

    /// Installed modules, e.g. `enterprise`
    pub modules: Vec<String>,

    /// TLS library the server runs with, absent when built without one
    pub tls_library: Option<String>,
}

impl ServerInfo {
    /// Extract the fields the checks need from a `buildInfo` reply
    ///
    /// Older servers report `OpenSSLVersion`, newer ones an `openssl`
    /// sub-document whose `running` field is `disabled` without TLS support.
    pub fn from_build_info(reply: &Document) -> Self {
        let version = reply.get_str("version").ok().map(str::to_string);

        let modules = reply
            .get_array("modules")
            .map(|modules| {
                modules
                    .iter()
                    .filter_map(Bson::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let tls_library = match reply.get_str("OpenSSLVersion") {
            Ok(library) => Some(library.to_string()),
            Err(_) => reply
                .get_document("openssl")
                .ok()
                .and_then(|openssl| openssl.get_str("running").ok())
                .map(str::to_string),
        }
        .filter(|library| !library.is_empty());

        Self {
            version,
            modules,
            tls_library,
        }
    }

    /// Whether the server binary supports TLS
    pub fn tls_available(&self) -> bool {
        self.tls_library
            .as_deref()
            .is_some_and(|library| !library.eq_ignore_ascii_case("disabled"))
    }

    /// Version parsed for comparisons, if disclosed and well-formed
    pub fn parsed_version(&self) -> Option<ServerVersion> {
        self.version.as_deref().and_then(|v| v.parse().ok())
    }
}

/// Introspection cache
#[derive(Debug, Clone)]
enum InfoState {
    Unfetched,
    Known(ServerInfo),
    Unknown,
}

/// Client authenticated with the target's credentials
struct Authenticated {
    client: Client,
    database: Database,
}

/// Connection to the audited server, shared by all checks of one run
pub struct Session {
    credential: Credential,
    config: ConnectionConfig,
    client: Option<Client>,
    state: SessionState,
    info: InfoState,
    retries: u32,
    auth: Option<Authenticated>,
}

impl Session {
    /// Open a session to the target's first host
    ///
    /// No I/O happens here; the first command decides whether the TLS
    /// transport works.
    ///
    /// # Arguments
    /// * `credential` - Validated connection string
    /// * `config` - Connection configuration
    ///
    /// # Returns
    /// * `Result<Session>` - Session using the TLS transport, or error
    pub async fn connect(credential: Credential, config: ConnectionConfig) -> Result<Self> {
        let client = build_client(&credential, &config, Transport::Tls, None)?;
        info!("Opened session to {}", credential.sanitized());

        Ok(Self {
            credential,
            config,
            client: Some(client),
            state: SessionState::Connected(Transport::Tls),
            info: InfoState::Unfetched,
            retries: 0,
            auth: None,
        })
    }

    /// Target of the session
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transport of the live client, `None` once closed
    pub fn transport(&self) -> Option<Transport> {
        match self.state {
            SessionState::Connected(transport) => Some(transport),
            SessionState::Closed => None,
        }
    }

    /// Unauthenticated client
    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    /// Number of failed introspection attempts so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Server introspection, fetched once and cached
    ///
    /// A connection failure reconnects in cleartext and tries again, at
    /// most `max_retries` times over the session's lifetime. After that the
    /// information is unknown for good.
    ///
    /// # Returns
    /// * `Option<&ServerInfo>` - Introspection result, `None` when unknown
    pub async fn server_info(&mut self) -> Option<&ServerInfo> {
        while matches!(self.info, InfoState::Unfetched) {
            if self.retries >= self.config.max_retries {
                warn!("Giving up on server introspection after {} attempts", self.retries);
                self.info = InfoState::Unknown;
                break;
            }

            let Some(client) = self.client.clone() else {
                self.info = InfoState::Unknown;
                break;
            };

            let reply = client
                .database("admin")
                .run_command(doc! { "buildInfo": 1 })
                .await;
            drop(client);

            match reply {
                Ok(reply) => {
                    let info = ServerInfo::from_build_info(&reply);
                    debug!("Server version: {:?}", info.version);
                    self.info = InfoState::Known(info);
                }
                Err(e) if is_connection_failure(&e) => {
                    self.retries += 1;
                    debug!("buildInfo attempt {} failed: {}", self.retries, e);
                    if let Err(e) = self.reconnect().await {
                        warn!("Reconnect failed: {}", e);
                        self.info = InfoState::Unknown;
                    }
                }
                Err(e) => {
                    warn!("Server refused buildInfo: {}", e);
                    self.info = InfoState::Unknown;
                }
            }
        }

        match &self.info {
            InfoState::Known(info) => Some(info),
            _ => None,
        }
    }

    /// Authenticated handle on the target database
    ///
    /// Authentication is attempted on every call until it succeeds once.
    ///
    /// # Returns
    /// * `Option<Database>` - Handle, `None` without credentials or when
    ///   authentication fails
    pub async fn database(&mut self) -> Option<Database> {
        if let Some(auth) = &self.auth {
            return Some(auth.database.clone());
        }

        // Settles the transport before authenticating over it.
        self.server_info().await;

        let client = match self.authenticated_client(None) {
            Ok(Some(client)) => client,
            Ok(None) => return None,
            Err(e) => {
                debug!("Cannot build authenticated client: {}", e);
                return None;
            }
        };

        match client
            .database(self.credential.auth_database())
            .run_command(doc! { "ping": 1 })
            .await
        {
            Ok(_) => {
                let database = client.database(self.credential.database().unwrap_or("admin"));
                info!("Authenticated as {:?}", self.credential.username());
                self.auth = Some(Authenticated {
                    client,
                    database: database.clone(),
                });
                Some(database)
            }
            Err(e) => {
                debug!("Authentication failed: {}", e);
                client.shutdown().await;
                None
            }
        }
    }

    /// Database the user was created in, once authenticated
    pub fn auth_database(&self) -> Option<Database> {
        self.auth
            .as_ref()
            .map(|auth| auth.client.database(self.credential.auth_database()))
    }

    /// The authenticated user's `usersInfo` entry
    ///
    /// # Returns
    /// * `Result<Document>` - First user document of the reply, or error
    pub async fn user_roles(&mut self) -> Result<Document> {
        let username = self
            .credential
            .username()
            .map(str::to_string)
            .ok_or(ConnectionError::NotAuthenticated)?;

        if self.database().await.is_none() {
            return Err(ConnectionError::NotAuthenticated.into());
        }
        let database = self
            .auth_database()
            .ok_or(ConnectionError::NotAuthenticated)?;

        let reply = database
            .run_command(doc! { "usersInfo": username.as_str() })
            .await?;
        let users = reply
            .get_array("users")
            .map_err(|e| ConnectionError::UnexpectedResponse(e.to_string()))?;

        match users.first() {
            Some(Bson::Document(user)) => Ok(user.clone()),
            _ => Err(ConnectionError::UnexpectedResponse(format!(
                "no user entry for {username}"
            ))
            .into()),
        }
    }

    /// Authenticate again with a fixed mechanism
    ///
    /// # Arguments
    /// * `mechanism` - Mechanism to force, e.g. SCRAM-SHA-1
    ///
    /// # Returns
    /// * `bool` - True if the server accepted the credentials
    pub async fn authenticate_with(&mut self, mechanism: AuthMechanism) -> bool {
        self.server_info().await;

        let client = match self.authenticated_client(Some(mechanism.clone())) {
            Ok(Some(client)) => client,
            Ok(None) => return false,
            Err(e) => {
                debug!("Cannot build {:?} client: {}", mechanism, e);
                return false;
            }
        };

        let result = client
            .database(self.credential.auth_database())
            .run_command(doc! { "ping": 1 })
            .await;
        client.shutdown().await;

        match result {
            Ok(_) => true,
            Err(e) => {
                debug!("{:?} authentication failed: {}", mechanism, e);
                false
            }
        }
    }

    /// List databases over the unauthenticated client
    ///
    /// # Returns
    /// * `Result<Vec<String>>` - Database names, or the server's refusal
    pub async fn list_databases_unauthenticated(&mut self) -> Result<Vec<String>> {
        self.server_info().await;
        let client = self.client.as_ref().ok_or(ConnectionError::NotConnected)?;
        Ok(client.list_database_names().await?)
    }

    /// Whether the credentials are accepted with SCRAM-SHA-1
    pub async fn reauthenticate_scram_sha1(&mut self) -> bool {
        self.authenticate_with(AuthMechanism::ScramSha1).await
    }

    /// Whether a raw TCP connection to `port` on the first host succeeds
    ///
    /// # Arguments
    /// * `port` - Port to probe
    ///
    /// # Returns
    /// * `bool` - True if the port accepted the connection
    pub async fn probe_socket(&self, port: u16) -> bool {
        let host = self.credential.primary().host.as_str();
        match tokio::time::timeout(self.config.socket_timeout(), TcpStream::connect((host, port)))
            .await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Port {} on {} refused: {}", port, host, e);
                false
            }
            Err(_) => {
                debug!("Port {} on {} timed out", port, host);
                false
            }
        }
    }

    /// Inspect the certificate on the first host's port
    pub async fn probe_certificate(&self) -> CertificateStatus {
        let target = self.credential.primary();
        tls::probe_certificate(&target.host, target.port, self.config.socket_timeout()).await
    }

    /// Release every client; later calls do nothing
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Some(Authenticated { client, database }) = self.auth.take() {
            drop(database);
            client.shutdown().await;
        }
        if let Some(client) = self.client.take() {
            client.shutdown().await;
        }

        self.state = SessionState::Closed;
        info!("Closed session to {}", self.credential.sanitized());
    }

    /// Replace the client with a cleartext one
    async fn reconnect(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.shutdown().await;
        }
        let client = build_client(&self.credential, &self.config, Transport::Plain, None)?;
        self.client = Some(client);
        self.state = SessionState::Connected(Transport::Plain);
        debug!("Reconnected to {} without TLS", self.credential.sanitized());
        Ok(())
    }

    fn authenticated_client(&self, mechanism: Option<AuthMechanism>) -> Result<Option<Client>> {
        let (Some(username), Some(password)) =
            (self.credential.username(), self.credential.password())
        else {
            return Ok(None);
        };
        let transport = self.transport().ok_or(ConnectionError::NotConnected)?;

        let mut driver_credential = DriverCredential::default();
        driver_credential.username = Some(username.to_string());
        driver_credential.password = Some(password.to_string());
        driver_credential.source = Some(self.credential.auth_database().to_string());
        driver_credential.mechanism = mechanism;

        build_client(&self.credential, &self.config, transport, Some(driver_credential)).map(Some)
    }
}

/// Build a driver client pinned to the first host
///
/// # Arguments
/// * `credential` - Target
/// * `config` - Timeouts
/// * `transport` - TLS (any certificate accepted) or cleartext
/// * `auth` - Driver credential for authenticated clients
///
/// # Returns
/// * `Result<Client>` - Client that connects lazily
fn build_client(
    credential: &Credential,
    config: &ConnectionConfig,
    transport: Transport,
    auth: Option<DriverCredential>,
) -> Result<Client> {
    let primary = credential.primary();
    let address = ServerAddress::Tcp {
        host: primary.host.clone(),
        port: Some(primary.port),
    };

    let mut options = ClientOptions::builder().hosts(vec![address]).build();
    options.app_name = Some(APP_NAME.to_string());
    options.direct_connection = Some(true);
    options.server_selection_timeout = Some(config.server_selection_timeout());
    options.connect_timeout = Some(config.connect_timeout());
    options.credential = auth;
    options.tls = Some(match transport {
        Transport::Tls => {
            let mut tls_options = TlsOptions::default();
            tls_options.allow_invalid_certificates = Some(true);
            Tls::Enabled(tls_options)
        }
        Transport::Plain => Tls::Disabled,
    });

    Client::with_options(options)
        .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::parse_uri;
    use tokio::net::TcpListener;

    fn fast_config() -> ConnectionConfig {
        ConnectionConfig {
            server_selection_timeout_ms: 100,
            connect_timeout_ms: 100,
            socket_timeout_secs: 1,
            max_retries: 3,
        }
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_build_info_modern_shape() {
        let reply = doc! {
            "version": "6.0.5",
            "modules": ["enterprise"],
            "openssl": { "running": "OpenSSL 3.0.2", "compiled": "OpenSSL 3.0.2" },
        };
        let info = ServerInfo::from_build_info(&reply);
        assert_eq!(info.version.as_deref(), Some("6.0.5"));
        assert_eq!(info.modules, vec!["enterprise".to_string()]);
        assert!(info.tls_available());
        assert_eq!(info.parsed_version(), Some(ServerVersion::new(6, 0, 5)));
    }

    #[test]
    fn test_build_info_legacy_and_disabled_tls() {
        let legacy = doc! { "version": "2.4.9", "OpenSSLVersion": "OpenSSL 1.0.1" };
        assert!(ServerInfo::from_build_info(&legacy).tls_available());

        let disabled = doc! { "version": "4.0.0", "openssl": { "running": "disabled" } };
        assert!(!ServerInfo::from_build_info(&disabled).tls_available());

        let hidden = doc! { "ok": 1 };
        let info = ServerInfo::from_build_info(&hidden);
        assert!(info.version.is_none());
        assert!(info.modules.is_empty());
        assert!(!info.tls_available());
    }

    #[tokio::test]
    async fn test_unreachable_server_info_is_unknown_after_bounded_retries() {
        let port = closed_port().await;
        let credential = parse_uri(&format!("127.0.0.1:{port}")).await.unwrap();
        let mut session = Session::connect(credential, fast_config()).await.unwrap();
        assert_eq!(session.transport(), Some(Transport::Tls));

        assert!(session.server_info().await.is_none());
        assert_eq!(session.retries(), 3);
        assert_eq!(session.transport(), Some(Transport::Plain));

        // Cached: no further attempts.
        assert!(session.server_info().await.is_none());
        assert_eq!(session.retries(), 3);

        session.close().await;
    }

    #[tokio::test]
    async fn test_database_without_username_is_none() {
        let port = closed_port().await;
        let credential = parse_uri(&format!("127.0.0.1:{port}")).await.unwrap();
        let mut session = Session::connect(credential, fast_config()).await.unwrap();

        assert!(session.database().await.is_none());
        assert!(session.user_roles().await.is_err());
        assert!(!session.authenticate_with(AuthMechanism::ScramSha1).await);
        session.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let port = closed_port().await;
        let credential = parse_uri(&format!("127.0.0.1:{port}")).await.unwrap();
        let mut session = Session::connect(credential, fast_config()).await.unwrap();

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.client().is_none());
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.transport(), None);
    }

    #[tokio::test]
    async fn test_probe_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = closed_port().await;

        let credential = parse_uri(&format!("127.0.0.1:{open}")).await.unwrap();
        let mut session = Session::connect(credential, fast_config()).await.unwrap();

        assert!(session.probe_socket(open).await);
        assert!(!session.probe_socket(closed).await);
        session.close().await;
    }
}
