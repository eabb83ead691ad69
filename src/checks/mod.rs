//! Check procedures
//!
//! Every [`CheckKind`] of the catalog maps to one procedure here through a
//! single exhaustive match. Procedures run against a [`Session`] and report a
//! [`CheckOutcome`]; an `Err` means the procedure itself broke, which the
//! runner turns into a failed result.
//!
//! Several perimeter checks read a refused connection or command as the
//! secure outcome, so driver errors are classified rather than propagated.

use async_trait::async_trait;
use mongodb::bson::{Document, doc};
use tracing::debug;

use crate::catalog::{CheckKind, ServerVersion, VersionRange};
use crate::catalog::version::is_affected;
use crate::connection::{CertificateStatus, ServerInfo, Session, Transport};
use crate::error::{AuditError, ConnectionError, Result};
use crate::error::mongo::{ErrorClass, classify};
use crate::roles::{self, DatabaseRoleExpander};
use crate::runner::CheckOutcome;
use crate::uri;

/// Query used to detect server-side JavaScript
const JAVASCRIPT_PROBE: &str = "function() { return true;}";

/// Something that can run checks and must be released afterwards
#[async_trait]
pub trait CheckExecutor: Send {
    /// Run one check
    ///
    /// # Arguments
    /// * `check` - Check to run, with its parameters
    ///
    /// # Returns
    /// * `Result<CheckOutcome>` - Outcome, or error if the procedure broke
    async fn execute(&mut self, check: &CheckKind) -> Result<CheckOutcome>;

    /// Release every resource; called exactly once per run
    async fn close(&mut self);
}

#[async_trait]
impl CheckExecutor for Session {
    async fn execute(&mut self, check: &CheckKind) -> Result<CheckOutcome> {
        match check {
            CheckKind::DomainExists => domain_exists(self).await,
            CheckKind::NonDefaultPort { default_port } => {
                non_default_port(self, *default_port).await
            }
            CheckKind::SocketClosed { port } => socket_closed(self, *port).await,
            CheckKind::VersionHidden => Ok(version_hidden(self.server_info().await)),
            CheckKind::VersionAtLeast { minimum } => {
                Ok(version_at_least(self.server_info().await, minimum))
            }
            CheckKind::TlsAvailable => Ok(tls_available(self.server_info().await)),
            CheckKind::TlsEnabled => {
                let known = self.server_info().await.is_some();
                Ok(tls_enabled(known, self.transport()))
            }
            CheckKind::TlsCertificate => tls_certificate(self).await,
            CheckKind::RejectsUnauthenticated => rejects_unauthenticated(self).await,
            CheckKind::ValidCredentials => {
                Ok(CheckOutcome::from_bool(self.database().await.is_some()))
            }
            CheckKind::JavascriptDisabled => javascript_disabled(self).await,
            CheckKind::Roles => role_permissions(self).await,
            CheckKind::DedicatedUser => dedicated_user(self).await,
            CheckKind::ScramSha1 => Ok(CheckOutcome::from_bool(
                self.reauthenticate_scram_sha1().await,
            )),
            CheckKind::Advisory { affected, module } => Ok(advisory(
                self.server_info().await,
                affected,
                module.as_deref(),
            )),
        }
    }

    async fn close(&mut self) {
        Session::close(self).await;
    }
}

async fn domain_exists(session: &mut Session) -> Result<CheckOutcome> {
    let primary = session.credential().primary();
    let found = uri::resolve_domain(&primary.host, primary.port).await;
    Ok(CheckOutcome::from_bool(found))
}

/// Passes on a non-default port, or when the server could not be introspected
async fn non_default_port(session: &mut Session, default_port: u16) -> Result<CheckOutcome> {
    let port = session.credential().primary().port;
    if port != default_port {
        return Ok(CheckOutcome::pass());
    }
    Ok(CheckOutcome::from_bool(session.server_info().await.is_none()))
}

/// Connection success means the port is exposed
async fn socket_closed(session: &mut Session, port: Option<u16>) -> Result<CheckOutcome> {
    let port = port.unwrap_or(session.credential().primary().port);
    let open = session.probe_socket(port).await;
    Ok(CheckOutcome::from_bool(!open))
}

fn version_hidden(info: Option<&ServerInfo>) -> CheckOutcome {
    let Some(info) = info else {
        return CheckOutcome::omitted();
    };
    match &info.version {
        None => CheckOutcome::pass(),
        Some(version) => CheckOutcome::fail().with_extra(version.clone()),
    }
}

fn version_at_least(info: Option<&ServerInfo>, minimum: &ServerVersion) -> CheckOutcome {
    let Some(raw) = info.and_then(|info| info.version.as_deref()) else {
        return CheckOutcome::omitted();
    };
    match raw.parse::<ServerVersion>() {
        Ok(version) => CheckOutcome::from_bool(version >= *minimum).with_extra(raw),
        Err(_) => CheckOutcome::warning(format!("Unrecognized version string {raw}")),
    }
}

fn tls_available(info: Option<&ServerInfo>) -> CheckOutcome {
    match info {
        Some(info) => CheckOutcome::from_bool(info.tls_available()),
        None => CheckOutcome::omitted(),
    }
}

fn tls_enabled(info_known: bool, transport: Option<Transport>) -> CheckOutcome {
    match (info_known, transport) {
        (true, Some(Transport::Tls)) => CheckOutcome::pass(),
        (true, Some(Transport::Plain)) => CheckOutcome::fail(),
        _ => CheckOutcome::omitted(),
    }
}

async fn tls_certificate(session: &mut Session) -> Result<CheckOutcome> {
    let known = session.server_info().await.is_some();
    if !known || session.transport() != Some(Transport::Tls) {
        return Ok(CheckOutcome::omitted());
    }
    Ok(certificate_outcome(session.probe_certificate().await))
}

fn certificate_outcome(status: CertificateStatus) -> CheckOutcome {
    match status {
        CertificateStatus::Trusted => CheckOutcome::pass(),
        CertificateStatus::Untrusted => CheckOutcome::warning(
            "Your server is presenting a self-signed or otherwise untrusted certificate.",
        ),
        CertificateStatus::NoCertificate => {
            CheckOutcome::warning("Your server is not presenting any certificate.")
        }
        CertificateStatus::Unreachable => CheckOutcome::omitted(),
    }
}

/// Listing databases without credentials must be refused
async fn rejects_unauthenticated(session: &mut Session) -> Result<CheckOutcome> {
    match session.list_databases_unauthenticated().await {
        Ok(names) => {
            debug!("Listed {} databases without credentials", names.len());
            Ok(CheckOutcome::fail())
        }
        Err(AuditError::MongoDb(e)) => match classify(&e) {
            ErrorClass::Other => Err(AuditError::MongoDb(e)),
            class => {
                debug!("Unauthenticated listing refused ({:?}): {}", class, e);
                Ok(CheckOutcome::pass())
            }
        },
        Err(AuditError::Connection(ConnectionError::NotConnected)) => Ok(CheckOutcome::omitted()),
        Err(e) => Err(e),
    }
}

/// A `$where` query must be rejected by the server
async fn javascript_disabled(session: &mut Session) -> Result<CheckOutcome> {
    let Some(database) = session.database().await else {
        return Ok(CheckOutcome::omitted());
    };

    let probe = database
        .collection::<Document>("test")
        .find_one(doc! { "$where": JAVASCRIPT_PROBE })
        .await;

    match probe {
        Ok(_) => Ok(CheckOutcome::fail()),
        Err(e) => match classify(&e) {
            ErrorClass::Command | ErrorClass::Unauthorized => {
                debug!("$where rejected: {}", e);
                Ok(CheckOutcome::pass())
            }
            _ => Err(e.into()),
        },
    }
}

async fn role_permissions(session: &mut Session) -> Result<CheckOutcome> {
    let user = session.user_roles().await?;
    let Some(database) = session.auth_database() else {
        return Ok(CheckOutcome::omitted());
    };

    let expander = DatabaseRoleExpander::new(database);
    let evaluation = roles::evaluate_roles(&user, &expander)
        .await
        .map_err(|e| AuditError::Generic(e.to_string()))?;
    Ok(roles::verdict(&evaluation))
}

/// Roles must be bound to exactly one database
async fn dedicated_user(session: &mut Session) -> Result<CheckOutcome> {
    let user = session.user_roles().await?;
    let databases = roles::role_databases(&user);
    Ok(CheckOutcome::from_bool(databases.len() == 1).with_extra(roles::format_set(&databases)))
}

fn advisory(
    info: Option<&ServerInfo>,
    affected: &[VersionRange],
    module: Option<&str>,
) -> CheckOutcome {
    let Some(info) = info else {
        return CheckOutcome::omitted();
    };
    let Some(raw) = info.version.as_deref() else {
        return CheckOutcome::omitted();
    };
    let Ok(version) = raw.parse::<ServerVersion>() else {
        return CheckOutcome::warning(format!("Unrecognized version string {raw}"));
    };

    if is_affected(affected, module, &version, &info.modules) {
        CheckOutcome::fail().with_extra(raw)
    } else {
        CheckOutcome::pass()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::runner::ResultCode;
    use crate::uri::parse_uri;
    use tokio::net::TcpListener;

    fn info(version: Option<&str>, modules: &[&str]) -> ServerInfo {
        ServerInfo {
            version: version.map(str::to_string),
            modules: modules.iter().map(|m| m.to_string()).collect(),
            tls_library: None,
        }
    }

    #[test]
    fn test_version_hidden() {
        assert_eq!(version_hidden(None).code, ResultCode::Omitted);
        assert_eq!(version_hidden(Some(&info(None, &[]))).code, ResultCode::Pass);

        let outcome = version_hidden(Some(&info(Some("4.4.1"), &[])));
        assert_eq!(outcome.code, ResultCode::Fail);
        assert_eq!(outcome.extra.as_deref(), Some("4.4.1"));
    }

    #[test]
    fn test_version_at_least_is_numeric() {
        let minimum: ServerVersion = "2.4.0".parse().unwrap();

        let recent = version_at_least(Some(&info(Some("2.10.1"), &[])), &minimum);
        assert_eq!(recent.code, ResultCode::Pass);
        assert_eq!(recent.extra.as_deref(), Some("2.10.1"));

        let old = version_at_least(Some(&info(Some("2.2.7"), &[])), &minimum);
        assert_eq!(old.code, ResultCode::Fail);

        assert_eq!(
            version_at_least(Some(&info(None, &[])), &minimum).code,
            ResultCode::Omitted
        );
        assert_eq!(
            version_at_least(Some(&info(Some("banana"), &[])), &minimum).code,
            ResultCode::Warning
        );
    }

    #[test]
    fn test_tls_enabled_follows_transport() {
        assert_eq!(tls_enabled(true, Some(Transport::Tls)).code, ResultCode::Pass);
        assert_eq!(tls_enabled(true, Some(Transport::Plain)).code, ResultCode::Fail);
        assert_eq!(tls_enabled(false, Some(Transport::Plain)).code, ResultCode::Omitted);
        assert_eq!(tls_enabled(true, None).code, ResultCode::Omitted);
    }

    #[test]
    fn test_certificate_problems_are_warnings() {
        assert_eq!(certificate_outcome(CertificateStatus::Trusted).code, ResultCode::Pass);
        assert_eq!(
            certificate_outcome(CertificateStatus::Untrusted).code,
            ResultCode::Warning
        );
        assert_eq!(
            certificate_outcome(CertificateStatus::NoCertificate).code,
            ResultCode::Warning
        );
        assert_eq!(
            certificate_outcome(CertificateStatus::Unreachable).code,
            ResultCode::Omitted
        );
    }

    #[test]
    fn test_advisory_reports_version_on_failure() {
        let affected = vec![VersionRange {
            min: Some("3.0.0".parse().unwrap()),
            max: Some("3.0.6".parse().unwrap()),
        }];

        let enterprise = info(Some("3.0.3"), &["enterprise"]);
        let vulnerable = advisory(Some(&enterprise), &affected, Some("enterprise"));
        assert_eq!(vulnerable.code, ResultCode::Fail);
        assert_eq!(vulnerable.extra.as_deref(), Some("3.0.3"));

        let community = info(Some("3.0.3"), &[]);
        let community = advisory(Some(&community), &affected, Some("enterprise"));
        assert_eq!(community.code, ResultCode::Pass);

        assert_eq!(advisory(None, &affected, None).code, ResultCode::Omitted);
        assert_eq!(
            advisory(Some(&info(None, &[])), &affected, None).code,
            ResultCode::Omitted
        );
    }

    fn fast_config() -> ConnectionConfig {
        ConnectionConfig {
            server_selection_timeout_ms: 100,
            connect_timeout_ms: 100,
            socket_timeout_secs: 1,
            max_retries: 1,
        }
    }

    #[tokio::test]
    async fn test_checks_against_unreachable_server() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let credential = parse_uri(&format!("127.0.0.1:{port}")).await.unwrap();
        let mut session = Session::connect(credential, fast_config()).await.unwrap();

        let outcome = session.execute(&CheckKind::DomainExists).await.unwrap();
        assert_eq!(outcome.code, ResultCode::Pass);

        let outcome = session
            .execute(&CheckKind::SocketClosed { port: None })
            .await
            .unwrap();
        assert_eq!(outcome.code, ResultCode::Pass);

        let outcome = session
            .execute(&CheckKind::NonDefaultPort { default_port: port })
            .await
            .unwrap();
        assert_eq!(outcome.code, ResultCode::Pass, "unknown info counts as a pass");

        for check in [
            CheckKind::VersionHidden,
            CheckKind::TlsAvailable,
            CheckKind::TlsEnabled,
            CheckKind::TlsCertificate,
            CheckKind::JavascriptDisabled,
        ] {
            let outcome = session.execute(&check).await.unwrap();
            assert_eq!(outcome.code, ResultCode::Omitted, "{check:?}");
        }

        let outcome = session.execute(&CheckKind::ValidCredentials).await.unwrap();
        assert_eq!(outcome.code, ResultCode::Fail);
        assert!(session.execute(&CheckKind::Roles).await.is_err());

        CheckExecutor::close(&mut session).await;
    }
}
