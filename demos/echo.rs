//! Echo responder - request/response over a Unix-domain socket.
//!
//! This demo shows:
//! - Binding an [`IpcListener`] and serving one thread per connection
//! - Reading transactions with a bounded timeout
//! - Replying with the request's elements plus a status
//!
//! # Running
//!
//! ```text
//! RUST_LOG=debug cargo run --example echo -- /tmp/echo.sock
//! ```
//!
//! With no argument the socket path is generated and printed. The demo
//! connects to itself once, prints the reply, and keeps serving.

use std::thread;
use std::time::Duration;

use enclave_wire::transport::{connect_ipc, generate_socket_path, IpcListener};
use enclave_wire::{transaction, Buffer, ByteChannel, WireError};
use tracing_subscriber::EnvFilter;

const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

fn serve(mut channel: ByteChannel<std::os::unix::net::UnixStream>) {
    loop {
        let request = match transaction::get_transaction(&mut channel, IDLE_TIMEOUT) {
            Ok(Some(request)) => request,
            Ok(None) => {
                tracing::info!("connection idle, closing");
                return;
            }
            Err(e) if e.is_fatal() => {
                tracing::info!("connection ended: {}", e);
                return;
            }
            Err(e) => {
                tracing::warn!("skipping bad request: {}", e);
                continue;
            }
        };

        tracing::debug!(request = %request.to_json(), "request");
        let mut reply = Buffer::new();
        reply.put("Status", "ok");
        reply.put("Echo", &request);

        if let Err(e) = transaction::put_transaction(&mut channel, &reply) {
            tracing::info!("reply failed: {}", e);
            return;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .map(Into::into)
        .unwrap_or_else(|| generate_socket_path("echo"));
    let listener = IpcListener::bind(&path)?;
    println!("listening on {}", path.display());

    let self_test = {
        let path = path.clone();
        thread::spawn(move || -> Result<(), WireError> {
            let mut channel = connect_ipc(&path)?;
            let mut request = Buffer::new();
            request.put("Message", "hello");
            let reply = transaction::put_transaction_and_get_response(
                &mut channel,
                &request,
                Duration::from_secs(5),
            )?;
            println!("reply: {}", reply.to_json());
            Ok(())
        })
    };

    let mut self_test = Some(self_test);
    loop {
        let channel = listener.accept()?;
        thread::spawn(move || serve(channel));

        if let Some(handle) = self_test.take() {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => return Err("self-test thread panicked".into()),
            }
        }
    }
}
