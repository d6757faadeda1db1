//! Shared test fixtures.

#![allow(dead_code)]

use enclave_wire::TlsConfig;

#[path = "../../src/tls/test_ca.rs"]
mod test_ca;

pub use test_ca::TestCa;

/// Client and server configs; `mutual` makes both sides present certificates.
pub fn tls_configs(ca: &TestCa, mutual: bool) -> (TlsConfig, TlsConfig) {
    let (server_cert, server_key) = ca.issue("localhost");
    let server = TlsConfig::builder().cert_pem(server_cert).key_pem(server_key);
    let client = TlsConfig::builder().ca_cert_pem(ca.pem());

    if mutual {
        let (client_cert, client_key) = ca.issue("client.local");
        (
            client.cert_pem(client_cert).key_pem(client_key).build().unwrap(),
            server.ca_cert_pem(ca.pem()).build().unwrap(),
        )
    } else {
        (client.build().unwrap(), server.build().unwrap())
    }
}

/// Route `tracing` output to the test harness when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
