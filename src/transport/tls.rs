//! TLS support for secure transports.

use std::io;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use super::ConnectError;

/// Client TLS configuration trusting the platform's root certificates.
pub fn default_tls_config() -> Result<ClientConfig, ConnectError> {
    let mut roots = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for error in &native.errors {
        tracing::warn!("loading platform certificates: {error}");
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    tracing::trace!(added, ignored, "loaded platform root certificates");

    if roots.is_empty() {
        return Err(ConnectError::new("no platform root certificates available").permanent());
    }

    Ok(ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// Run the client side of the TLS handshake over a connected TCP stream.
pub(super) async fn handshake(
    stream: TcpStream,
    tls_target_host: &str,
    config: Arc<ClientConfig>,
) -> Result<TlsStream<TcpStream>, ConnectError> {
    let domain = ServerName::try_from(tls_target_host.to_owned())
        .map_err(|error| ConnectError::build("invalid tls target host", error).permanent())?;

    let stream = TlsConnector::from(config)
        .connect(domain, stream)
        .await
        .map_err(classify)?;

    tracing::trace!(server.name = %tls_target_host, "tls handshake complete");
    Ok(stream)
}

fn classify(error: io::Error) -> ConnectError {
    let permanent = error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some_and(|error| {
            matches!(
                error,
                rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented
            )
        });

    let error = ConnectError::build("tls handshake error", error);
    if permanent {
        error.permanent()
    } else {
        error
    }
}
