//! rustls configuration from PEM material.
//!
//! A [`TlsConfig`] carries a client side (needs a CA bundle) and/or a server
//! side (needs a certificate chain and private key). When both are supplied
//! each side also authenticates its peer against the CA bundle.

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};

use crate::error::{Result, WireError};

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| WireError::TlsConfig(format!("invalid certificate PEM: {e}")))
}

fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| WireError::TlsConfig(format!("invalid private key PEM: {e}")))?
        .ok_or_else(|| WireError::TlsConfig("no private key found".into()))
}

/// Client and server rustls configurations.
#[derive(Clone, Default)]
pub struct TlsConfig {
    client: Option<Arc<ClientConfig>>,
    server: Option<Arc<ServerConfig>>,
}

impl TlsConfig {
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::new()
    }

    /// Wrap an existing client configuration.
    pub fn from_client_config(config: Arc<ClientConfig>) -> Self {
        Self {
            client: Some(config),
            server: None,
        }
    }

    /// Wrap an existing server configuration.
    pub fn from_server_config(config: Arc<ServerConfig>) -> Self {
        Self {
            client: None,
            server: Some(config),
        }
    }

    pub fn client_config(&self) -> Result<Arc<ClientConfig>> {
        self.client
            .clone()
            .ok_or_else(|| WireError::TlsConfig("no client configuration (CA required)".into()))
    }

    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        self.server.clone().ok_or_else(|| {
            WireError::TlsConfig("no server configuration (certificate and key required)".into())
        })
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("client", &self.client.is_some())
            .field("server", &self.server.is_some())
            .finish()
    }
}

/// Builder for [`TlsConfig`].
#[derive(Default)]
pub struct TlsConfigBuilder {
    ca_cert_pem: Option<Vec<u8>>,
    cert_pem: Option<Vec<u8>>,
    key_pem: Option<Vec<u8>>,
}

impl TlsConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// CA bundle used to verify the peer.
    pub fn ca_cert_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.ca_cert_pem = Some(pem.into());
        self
    }

    /// Own certificate chain, leaf first.
    pub fn cert_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.cert_pem = Some(pem.into());
        self
    }

    pub fn key_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.key_pem = Some(pem.into());
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::TlsConfig`] if PEM material is missing, empty or
    /// rejected by rustls.
    pub fn build(self) -> Result<TlsConfig> {
        let roots = match &self.ca_cert_pem {
            Some(pem) => {
                let ca_certs = parse_certificates(pem)?;
                if ca_certs.is_empty() {
                    return Err(WireError::TlsConfig("no CA certificates found".into()));
                }
                let mut store = RootCertStore::empty();
                for cert in ca_certs {
                    store.add(cert).map_err(|e| {
                        WireError::TlsConfig(format!("failed to add CA certificate: {e}"))
                    })?;
                }
                Some(Arc::new(store))
            }
            None => None,
        };

        let identity = match (&self.cert_pem, &self.key_pem) {
            (Some(cert), Some(key)) => {
                let chain = parse_certificates(cert)?;
                if chain.is_empty() {
                    return Err(WireError::TlsConfig("no certificates found".into()));
                }
                Some((chain, parse_private_key(key)?))
            }
            (None, None) => None,
            _ => {
                return Err(WireError::TlsConfig(
                    "certificate and private key must be supplied together".into(),
                ))
            }
        };

        if roots.is_none() && identity.is_none() {
            return Err(WireError::TlsConfig(
                "CA certificate or certificate and key required".into(),
            ));
        }

        let client = match &roots {
            Some(roots) => Some(Arc::new(build_client(roots, identity.as_ref())?)),
            None => None,
        };
        let server = match &identity {
            Some(identity) => Some(Arc::new(build_server(roots.as_ref(), identity)?)),
            None => None,
        };

        Ok(TlsConfig { client, server })
    }
}

type Identity = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>);

fn build_client(roots: &Arc<RootCertStore>, identity: Option<&Identity>) -> Result<ClientConfig> {
    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots.clone());

    match identity {
        Some((chain, key)) => builder
            .with_client_auth_cert(chain.clone(), key.clone_key())
            .map_err(|e| WireError::TlsConfig(format!("client config error: {e}"))),
        None => Ok(builder.with_no_client_auth()),
    }
}

fn build_server(roots: Option<&Arc<RootCertStore>>, identity: &Identity) -> Result<ServerConfig> {
    let builder =
        ServerConfig::builder_with_provider(provider()).with_safe_default_protocol_versions()?;
    let (chain, key) = identity;

    let builder = match roots {
        Some(roots) => {
            let verifier = WebPkiClientVerifier::builder_with_provider(roots.clone(), provider())
                .build()
                .map_err(|e| WireError::TlsConfig(format!("client verifier error: {e}")))?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    builder
        .with_single_cert(chain.clone(), key.clone_key())
        .map_err(|e| WireError::TlsConfig(format!("server config error: {e}")))
}

#[cfg(test)]
mod tests {
    use crate::tls::test_ca::TestCa;
    use super::*;

    #[test]
    fn test_client_only() {
        let ca = TestCa::new();
        let config = TlsConfig::builder().ca_cert_pem(ca.pem()).build().unwrap();
        assert!(config.client_config().is_ok());
        assert!(matches!(config.server_config(), Err(WireError::TlsConfig(_))));
    }

    #[test]
    fn test_server_only() {
        let ca = TestCa::new();
        let (cert, key) = ca.issue("localhost");
        let config = TlsConfig::builder().cert_pem(cert).key_pem(key).build().unwrap();
        assert!(config.server_config().is_ok());
        assert!(config.client_config().is_err());
    }

    #[test]
    fn test_mutual() {
        let ca = TestCa::new();
        let (cert, key) = ca.issue("localhost");
        let config = TlsConfig::builder()
            .ca_cert_pem(ca.pem())
            .cert_pem(cert)
            .key_pem(key)
            .build()
            .unwrap();
        assert!(config.client_config().is_ok());
        assert!(config.server_config().is_ok());
    }

    #[test]
    fn test_missing_material() {
        assert!(matches!(
            TlsConfig::builder().build(),
            Err(WireError::TlsConfig(_))
        ));

        let ca = TestCa::new();
        let (cert, _) = ca.issue("localhost");
        assert!(TlsConfig::builder().cert_pem(cert).build().is_err());
    }

    #[test]
    fn test_garbage_pem() {
        let result = TlsConfig::builder()
            .ca_cert_pem(b"not a certificate".to_vec())
            .build();
        assert!(matches!(result, Err(WireError::TlsConfig(_))));
    }
}
