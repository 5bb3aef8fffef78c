use common::{build_server_runtime, init_log, start_server, ServerState};
use server::config::get_config;
use server::error::Error;
use server::{registry, socks5, tunnel};
use tokio::signal;
use tracing::{debug, error, info};

/// Handle one accepted tunnel-port connection (control or proxy registration).
async fn handle_tunnel_connection(server_state: ServerState) -> Result<(), Error> {
    debug!("Handling tunnel connection: {server_state:?}.");
    tunnel::handle_tunnel_connection(server_state.incoming_stream, registry::global()).await;
    Ok(())
}

/// Handle one accepted SOCKS5 user connection.
async fn handle_socks5_connection(server_state: ServerState) -> Result<(), Error> {
    debug!("Handling socks5 connection: {server_state:?}.");
    socks5::handle_socks5_connection(server_state.incoming_stream, registry::global()).await;
    Ok(())
}

/// Start the reverse tunnel server: the tunnel-port listener (control +
/// proxy connections) and the SOCKS5 front door, both stopped gracefully on
/// `ctrl_c` (§6 graceful shutdown).
fn main() -> Result<(), Error> {
    let _log_guard = init_log(get_config().common())?;
    let server_runtime = build_server_runtime(get_config().common())?;
    server_runtime.block_on(async move {
        let tunnel_guard = start_server(
            get_config().tunnel_listening_address(),
            get_config().common().client_max_connections(),
            handle_tunnel_connection,
        );
        let socks_guard = start_server(
            get_config().socks_listening_address(),
            get_config().common().client_max_connections(),
            handle_socks5_connection,
        );
        if let Err(e) = signal::ctrl_c().await {
            error!("Error happen when listening stop signal: {}", e);
            return;
        }
        info!("Receive stop signal, going to stop server gracefully.");
        tunnel_guard.stop_signal.cancel();
        socks_guard.stop_signal.cancel();
    });
    Ok(())
}
