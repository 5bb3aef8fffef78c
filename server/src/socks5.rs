//! SOCKS5 front door (§4.5): RFC 1928 greeting + CONNECT request, RFC 1929
//! username/password sub-negotiation (password carries the target
//! ClientId). Parsed by hand rather than through a SOCKS5 crate, matching
//! the framed codec's hand-rolled style and because the password field's
//! semantics (ClientId, not a credential) don't fit a generic auth crate.

use crate::control::PROXY_MAX_POOL_SIZE;
use crate::error::Error;
use crate::registry::ControlRegistry;
use crate::splicer::splice;
use common::write_msg;
use protocol::{Message, StartProxy, TargetAddress};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_VERSION: u8 = 0x01;
const METHOD_USERNAME_PASSWORD: u8 = 0x02;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;
const MAX_USERNAME_LEN: usize = 31;
const MAX_PASSWORD_LEN: usize = 64;
const SUCCESS_REPLY: [u8; 10] = [0x05, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x08, 0x43];

/// Handle one accepted SOCKS5 user connection end to end: greeting,
/// sub-negotiation, CONNECT parsing, pool handoff, and splicing.
pub async fn handle_socks5_connection(mut stream: TcpStream, registry: Arc<ControlRegistry>) {
    if let Err(e) = greeting(&mut stream).await {
        debug!(error = %e, "socks5 greeting failed, closing");
        let _ = stream.shutdown().await;
        return;
    }
    let client_id = match sub_negotiation(&mut stream).await {
        Ok(client_id) => client_id,
        Err(e) => {
            debug!(error = %e, "socks5 sub-negotiation failed, closing");
            let _ = stream.shutdown().await;
            return;
        }
    };
    let target = match connect_request(&mut stream).await {
        Ok(target) => target,
        Err(e) => {
            debug!(error = %e, "socks5 request parsing failed, closing");
            let _ = stream.shutdown().await;
            return;
        }
    };

    let control = match registry.get(&client_id) {
        Some(control) => control,
        None => {
            debug!(client_id, "no control session for socks5 client id, closing silently");
            let _ = stream.shutdown().await;
            return;
        }
    };

    if let Err(e) = stream.write_all(&SUCCESS_REPLY).await {
        debug!(error = %e, "failed to write socks5 success reply");
        return;
    }

    let proxy = match fetch_and_announce_proxy(&control, &target).await {
        Ok(proxy) => proxy,
        Err(e) => {
            warn!(client_id, error = %e, "failed to obtain a proxy connection");
            let _ = stream.shutdown().await;
            return;
        }
    };

    splice(stream, proxy).await;
}

async fn greeting(stream: &mut TcpStream) -> Result<(), Error> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    let (version, nmethods) = (header[0], header[1]);
    if version != SOCKS5_VERSION {
        return Err(Error::ProtocolVer(version));
    }
    let mut methods = vec![0u8; nmethods as usize];
    stream.read_exact(&mut methods).await?;
    stream
        .write_all(&[SOCKS5_VERSION, METHOD_USERNAME_PASSWORD])
        .await?;
    Ok(())
}

async fn sub_negotiation(stream: &mut TcpStream) -> Result<String, Error> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    let (version, ulen) = (header[0], header[1] as usize);
    if version != AUTH_VERSION {
        return Err(Error::ProtocolVer(version));
    }
    if ulen >= MAX_USERNAME_LEN + 1 {
        return Err(Error::AuthLength);
    }
    let mut username = vec![0u8; ulen];
    stream.read_exact(&mut username).await?;

    let mut plen_buf = [0u8; 1];
    stream.read_exact(&mut plen_buf).await?;
    let plen = plen_buf[0] as usize;
    if plen == 0 || plen > MAX_PASSWORD_LEN {
        return Err(Error::AuthExtra);
    }
    let mut password = vec![0u8; plen];
    stream.read_exact(&mut password).await?;

    debug!(
        username = %String::from_utf8_lossy(&username),
        "socks5 sub-negotiation username (ignored for authentication)"
    );
    stream.write_all(&[AUTH_VERSION, 0x00]).await?;
    Ok(String::from_utf8_lossy(&password).into_owned())
}

async fn connect_request(stream: &mut TcpStream) -> Result<TargetAddress, Error> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let (version, cmd, _rsv, atyp) = (header[0], header[1], header[2], header[3]);
    if version != SOCKS5_VERSION {
        return Err(Error::ProtocolVer(version));
    }
    if cmd != CMD_CONNECT {
        return Err(Error::Cmd(cmd));
    }
    match atyp {
        ATYP_IPV4 => {
            let mut buf = [0u8; 6];
            stream.read_exact(&mut buf).await?;
            let addr = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
            let port = u16::from_be_bytes([buf[4], buf[5]]);
            Ok(TargetAddress::Ipv4 { addr, port })
        }
        ATYP_DOMAIN => {
            let mut len_buf = [0u8; 1];
            stream.read_exact(&mut len_buf).await?;
            let mut host_buf = vec![0u8; len_buf[0] as usize];
            stream.read_exact(&mut host_buf).await?;
            let mut port_buf = [0u8; 2];
            stream.read_exact(&mut port_buf).await?;
            Ok(TargetAddress::Domain {
                host: String::from_utf8_lossy(&host_buf).into_owned(),
                port: u16::from_be_bytes(port_buf),
            })
        }
        ATYP_IPV6 => {
            let mut buf = [0u8; 18];
            stream.read_exact(&mut buf).await?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[..16]);
            let addr = Ipv6Addr::from(octets);
            let port = u16::from_be_bytes([buf[16], buf[17]]);
            Ok(TargetAddress::Ipv6 { addr, port })
        }
        other => Err(Error::AddressType(other)),
    }
}

/// `GetProxy` then `StartProxy`, retried up to `proxyMaxPoolSize` times,
/// discarding any proxy socket whose `StartProxy` write fails.
async fn fetch_and_announce_proxy(
    control: &crate::control::Control,
    target: &TargetAddress,
) -> Result<TcpStream, Error> {
    let mut last_error = Error::PoolTimeout;
    for _ in 0..PROXY_MAX_POOL_SIZE {
        let mut proxy = control.get_proxy().await?;
        let start_proxy = Message::StartProxy(StartProxy {
            url: String::new(),
            client_addr: target.to_string(),
        });
        match write_msg(&mut proxy, &start_proxy).await {
            Ok(()) => return Ok(proxy),
            Err(e) => {
                debug!(error = %e, "StartProxy write failed on a pooled socket, discarding and retrying");
                let _ = proxy.shutdown().await;
                last_error = Error::Common(e);
            }
        }
    }
    Err(last_error)
}
