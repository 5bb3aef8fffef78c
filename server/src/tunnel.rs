//! Tunnel acceptor (§4.4): classifies each freshly accepted connection on
//! the tunnel port by its first frame and dispatches it to control-session
//! creation or proxy registration.

use crate::control::{handle_reg_proxy, Control};
use crate::registry::ControlRegistry;
use common::read_msg;
use protocol::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// At least 10 s per §5; the first frame is small so this is generous.
const FIRST_FRAME_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle one accepted tunnel-port connection end to end.
pub async fn handle_tunnel_connection(mut stream: TcpStream, registry: Arc<ControlRegistry>) {
    let first_message = match timeout(FIRST_FRAME_READ_TIMEOUT, read_msg(&mut stream)).await {
        Ok(Ok(message)) => message,
        Ok(Err(e)) => {
            debug!(error = %e, "tunnel connection failed before its first frame, closing");
            let _ = stream.shutdown().await;
            return;
        }
        Err(_) => {
            debug!("tunnel connection's first frame did not arrive in time, closing");
            let _ = stream.shutdown().await;
            return;
        }
    };

    match first_message {
        Message::Auth(_auth) => {
            Control::spawn(stream, &registry).await;
        }
        Message::RegProxy(reg_proxy) => {
            handle_reg_proxy(&registry, &reg_proxy.client_id, stream).await;
        }
        other => {
            warn!(
                type_name = other.type_name(),
                "unexpected first frame on tunnel connection, closing"
            );
            let _ = stream.shutdown().await;
        }
    }
}
