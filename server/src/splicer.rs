//! Bidirectional byte copy between the SOCKS5 user socket and a pooled
//! proxy socket (§4.6). One task per direction; each task closes its
//! destination on any error or EOF, so both sockets end up shut down
//! exactly once regardless of which direction fails first. No read/write
//! deadlines are set here — once splicing starts the connection is expected
//! to carry traffic indefinitely.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

pub async fn splice(user: TcpStream, proxy: TcpStream) {
    let (mut user_read, mut user_write) = user.into_split();
    let (mut proxy_read, mut proxy_write) = proxy.into_split();

    let user_to_proxy = tokio::spawn(async move {
        let _ = tokio::io::copy(&mut user_read, &mut proxy_write).await;
        let _ = proxy_write.shutdown().await;
    });
    let proxy_to_user = tokio::spawn(async move {
        let _ = tokio::io::copy(&mut proxy_read, &mut user_write).await;
        let _ = user_write.shutdown().await;
    });

    let _ = tokio::join!(user_to_proxy, proxy_to_user);
    debug!("splice finished, both halves closed");
}
