//! Shared rustls client configuration.

use std::sync::{Arc, OnceLock};

use rustls::crypto::ring::default_provider;
use rustls::{ClientConfig, RootCertStore};

use crate::error_handling::InitializationError;

static CLIENT_CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();

/// Returns the TLS client configuration shared by every secure socket.
///
/// The configuration is built on first use with the ring crypto provider,
/// the provider's safe default protocol versions and the Mozilla root set
/// from `webpki-roots`. No client certificate is offered.
///
/// # Errors
///
/// Returns `InitializationError::TlsConfigError` if the provider rejects the
/// default protocol versions.
pub fn tls_client_config() -> Result<Arc<ClientConfig>, InitializationError> {
    if let Some(config) = CLIENT_CONFIG.get() {
        return Ok(Arc::clone(config));
    }

    let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::clone(CLIENT_CONFIG.get_or_init(|| Arc::new(config))))
}
