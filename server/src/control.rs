//! One `Control` per authenticated client: the control socket, its proxy
//! pool, and the three cooperating tasks (writer/reader/manager) that own
//! them (§4.3).

use crate::error::Error;
use crate::registry::ControlRegistry;
use common::{read_msg, read_msg_into, write_msg};
use protocol::{AuthResp, Message, Ping, Pong, ReqProxy};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// `pingTimeoutInterval` — server-side heartbeat loss threshold, and also
/// the bound `GetProxy` waits on an empty pool.
pub const PING_TIMEOUT_INTERVAL: Duration = Duration::from_secs(30);
/// `connReapInterval` — cadence of the manager's heartbeat-reaping ticker.
pub const CONN_REAP_INTERVAL: Duration = Duration::from_secs(10);
/// `proxyStaleDuration` — time a registered proxy socket may sit unused.
pub const PROXY_STALE_DURATION: Duration = Duration::from_secs(60);
/// `proxyMaxPoolSize` — capacity of the proxy pool, and the number of
/// `ReqProxy` retries `GetProxy` performs (and SOCKS5's StartProxy retries).
pub const PROXY_MAX_POOL_SIZE: usize = 10;
/// `out` queue capacity, per §3's "capacity >= 8".
const OUT_QUEUE_CAPACITY: usize = 8;
/// Capacity of the manager's inbox; the spec leaves this unspecified.
const IN_QUEUE_CAPACITY: usize = 32;

struct ProxySlot {
    stream: TcpStream,
    deadline: Instant,
}

enum Popped {
    Empty,
    Fresh(TcpStream),
    Stale,
}

struct ProxyPool {
    slots: Mutex<VecDeque<ProxySlot>>,
    notify: Notify,
    capacity: usize,
}

impl ProxyPool {
    fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueue, unless the pool is at capacity, in which case the socket is
    /// handed back to the caller to close.
    fn register(&self, stream: TcpStream) -> Option<TcpStream> {
        let mut slots = self.slots.lock().expect("proxy pool mutex poisoned");
        if slots.len() >= self.capacity {
            return Some(stream);
        }
        slots.push_back(ProxySlot {
            stream,
            deadline: Instant::now() + PROXY_STALE_DURATION,
        });
        None
    }

    /// Pop one slot off the front, reporting whether it was already past its
    /// deadline. Never blocks.
    fn pop(&self) -> Popped {
        let mut slots = self.slots.lock().expect("proxy pool mutex poisoned");
        match slots.pop_front() {
            None => Popped::Empty,
            Some(slot) if Instant::now() >= slot.deadline => Popped::Stale,
            Some(slot) => Popped::Fresh(slot.stream),
        }
    }

    /// Drain everything, shutting each socket down. Used during teardown.
    async fn drain(&self) {
        let drained: Vec<TcpStream> = {
            let mut slots = self.slots.lock().expect("proxy pool mutex poisoned");
            slots.drain(..).map(|slot| slot.stream).collect()
        };
        for mut stream in drained {
            let _ = stream.shutdown().await;
        }
    }
}

/// One per authenticated client. Reader, writer, and manager tasks each hold
/// their own `Arc<Control>`; the registry holds another. The registry
/// back-edge is `Weak` — a Control does not keep its own registry entry
/// alive.
pub struct Control {
    pub id: String,
    out_tx: mpsc::Sender<Message>,
    pool: ProxyPool,
    shutdown: CancellationToken,
    last_ping: Mutex<Instant>,
    torn_down: AtomicBool,
    registry: Weak<ControlRegistry>,
}

impl Control {
    /// Accept a freshly authenticated tunnel connection: generate a
    /// ClientId, register it, spawn the three tasks, and enqueue the initial
    /// `AuthResp` + `ReqProxy` handshake (§4.3).
    pub async fn spawn(stream: TcpStream, registry: &Arc<ControlRegistry>) -> Arc<Control> {
        let client_id = common::random_client_id();
        let (read_half, write_half) = stream.into_split();
        let (out_tx, out_rx) = mpsc::channel(OUT_QUEUE_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(IN_QUEUE_CAPACITY);

        let control = Arc::new(Control {
            id: client_id.clone(),
            out_tx,
            pool: ProxyPool::new(PROXY_MAX_POOL_SIZE),
            shutdown: CancellationToken::new(),
            last_ping: Mutex::new(Instant::now()),
            torn_down: AtomicBool::new(false),
            registry: Arc::downgrade(registry),
        });

        if let Some(_displaced) = registry.add(client_id.clone(), control.clone()) {
            debug!(client_id, "client id collided with a live session; orphaning the previous one");
        }

        tokio::spawn(writer_task(control.clone(), out_rx, write_half));
        tokio::spawn(reader_task(control.clone(), read_half, in_tx));
        tokio::spawn(manager_task(control.clone(), in_rx));

        if control
            .out_tx
            .send(Message::AuthResp(AuthResp {
                version: String::new(),
                client_id: client_id.clone(),
                error: String::new(),
            }))
            .await
            .is_err()
        {
            error!(client_id, "failed to enqueue AuthResp, writer already gone");
        }
        if control
            .out_tx
            .send(Message::ReqProxy(ReqProxy {}))
            .await
            .is_err()
        {
            error!(client_id, "failed to enqueue priming ReqProxy");
        }

        control
    }

    /// Construct a bare Control with no live tasks, for registry unit tests.
    #[cfg(test)]
    pub fn new_for_test(id: String) -> Control {
        let (out_tx, _out_rx) = mpsc::channel(OUT_QUEUE_CAPACITY);
        Control {
            id,
            out_tx,
            pool: ProxyPool::new(PROXY_MAX_POOL_SIZE),
            shutdown: CancellationToken::new(),
            last_ping: Mutex::new(Instant::now()),
            torn_down: AtomicBool::new(false),
            registry: Weak::new(),
        }
    }

    /// `RegisterProxy(socket)` — enqueue a freshly dialed-back proxy socket,
    /// or close it if the pool is already at capacity.
    pub async fn register_proxy(&self, stream: TcpStream) {
        match self.pool.register(stream) {
            None => self.pool.notify.notify_one(),
            Some(mut stream) => {
                debug!(id = self.id, "proxy pool full, discarding new socket");
                let _ = stream.shutdown().await;
            }
        }
    }

    /// `GetProxy()` — dequeue a live proxy socket, skipping stale ones,
    /// requesting fresh ones from the client if the pool is empty.
    pub async fn get_proxy(&self) -> Result<TcpStream, Error> {
        if let Some(stream) = self.drain_fresh_or_stale()? {
            return Ok(stream);
        }
        if self.shutdown.is_cancelled() {
            return Err(Error::SessionClosed);
        }
        for _ in 0..PROXY_MAX_POOL_SIZE.min(5) {
            if self
                .out_tx
                .send(Message::ReqProxy(ReqProxy {}))
                .await
                .is_err()
            {
                return Err(Error::SessionClosed);
            }
        }
        let deadline = Instant::now() + PING_TIMEOUT_INTERVAL;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::PoolTimeout);
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(Error::SessionClosed),
                woken = timeout(remaining, self.pool.notify.notified()) => {
                    if woken.is_err() {
                        return Err(Error::PoolTimeout);
                    }
                }
            }
            if let Some(stream) = self.drain_fresh_or_stale()? {
                return Ok(stream);
            }
        }
    }

    /// Pop slots until a fresh one is found (returned) or the pool goes
    /// empty (`None`). Stale slots found along the way are logged and
    /// skipped, never returned.
    fn drain_fresh_or_stale(&self) -> Result<Option<TcpStream>, Error> {
        loop {
            match self.pool.pop() {
                Popped::Fresh(stream) => return Ok(Some(stream)),
                Popped::Stale => {
                    debug!(id = self.id, "skipping stale proxy socket on dequeue");
                    continue;
                }
                Popped::Empty => return Ok(None),
            }
        }
    }

    /// Tear down on any terminal condition (reader EOF, writer I/O error,
    /// heartbeat reaping): cancel `shutdown` so the reader and writer tasks
    /// stop racing their socket I/O and close their halves, close every
    /// pooled proxy socket, and remove the session from the registry.
    /// Idempotent regardless of which task calls it first — cancelling the
    /// reader/writer also drives each of them back into this same function.
    async fn teardown(self: &Arc<Self>) {
        if self
            .torn_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.shutdown.cancel();
        self.pool.drain().await;
        if let Some(registry) = self.registry.upgrade() {
            registry.del(&self.id);
        }
        debug!(id = self.id, "control session torn down");
    }
}

/// Races the next outbound message against `control.shutdown` so that
/// `teardown()` (e.g. the manager's heartbeat-reap branch) can actually wake
/// this task out of a `recv()` that would otherwise never return, close the
/// socket, and let it exit — rather than leaking the task and the fd for as
/// long as the `Arc<Control>` it holds stays alive.
async fn writer_task(
    control: Arc<Control>,
    mut out_rx: mpsc::Receiver<Message>,
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
) {
    loop {
        tokio::select! {
            _ = control.shutdown.cancelled() => {
                debug!(id = control.id, "control writer observed shutdown, closing socket");
                break;
            }
            received = out_rx.recv() => {
                match received {
                    Some(message) => {
                        if let Err(e) = write_msg(&mut write_half, &message).await {
                            warn!(id = control.id, error = %e, "control writer failed, tearing down session");
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    let _ = write_half.shutdown().await;
    control.teardown().await;
}

/// Same shutdown race as `writer_task`: without it a heartbeat-loss teardown
/// cannot interrupt a `read_msg` that's waiting on a client that will never
/// send anything again.
async fn reader_task(
    control: Arc<Control>,
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    in_tx: mpsc::Sender<Message>,
) {
    loop {
        tokio::select! {
            _ = control.shutdown.cancelled() => {
                debug!(id = control.id, "control reader observed shutdown, stopping");
                break;
            }
            result = read_msg(&mut read_half) => {
                match result {
                    Ok(message) => {
                        if in_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(common::Error::Eof) => {
                        debug!(id = control.id, "control reader observed clean EOF");
                        break;
                    }
                    Err(e) => {
                        warn!(id = control.id, error = %e, "control reader failed");
                        break;
                    }
                }
            }
        }
    }
    drop(in_tx);
    control.teardown().await;
}

async fn manager_task(control: Arc<Control>, mut in_rx: mpsc::Receiver<Message>) {
    let mut reap = tokio::time::interval(CONN_REAP_INTERVAL);
    reap.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = reap.tick() => {
                let elapsed = {
                    let last_ping = control.last_ping.lock().expect("last_ping mutex poisoned");
                    last_ping.elapsed()
                };
                if elapsed > PING_TIMEOUT_INTERVAL {
                    warn!(id = control.id, "heartbeat lost, tearing down session");
                    control.teardown().await;
                    return;
                }
            }
            received = in_rx.recv() => {
                match received {
                    None => return,
                    Some(Message::Ping(Ping {})) => {
                        *control.last_ping.lock().expect("last_ping mutex poisoned") = Instant::now();
                        if control.out_tx.send(Message::Pong(Pong {})).await.is_err() {
                            return;
                        }
                    }
                    Some(other) => {
                        debug!(id = control.id, type_name = other.type_name(), "ignoring unexpected control message");
                    }
                }
            }
        }
    }
}

/// Handle a freshly accepted tunnel connection whose first frame has already
/// been read and found to be `RegProxy`: look the target Control up and hand
/// it the socket, or close it if there is no such session.
pub async fn handle_reg_proxy(
    registry: &Arc<ControlRegistry>,
    client_id: &str,
    stream: TcpStream,
) {
    match registry.get(client_id) {
        Some(control) => control.register_proxy(stream).await,
        None => {
            debug!(client_id, "RegProxy for unknown client id, closing socket");
            drop(stream);
        }
    }
}

/// Read exactly one `RegProxy` frame off a freshly accepted tunnel
/// connection once the acceptor has already classified it as such. Exposed
/// for callers that need the typed helper rather than raw `read_msg_into`.
pub async fn expect_reg_proxy(stream: &mut TcpStream) -> Result<protocol::RegProxy, Error> {
    match read_msg_into(stream, "RegProxy").await? {
        Message::RegProxy(body) => Ok(body),
        _ => unreachable!("read_msg_into enforces the requested variant"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accepted, _) = tokio::join!(listener.accept(), connect);
        (accepted.unwrap().0, connect.await.unwrap())
    }

    #[tokio::test]
    async fn pool_enforces_capacity_and_closes_the_overflow_socket() {
        let pool = ProxyPool::new(PROXY_MAX_POOL_SIZE);
        for _ in 0..PROXY_MAX_POOL_SIZE {
            let (server_side, _client_side) = loopback_pair().await;
            assert!(pool.register(server_side).is_none());
        }
        let (server_side, _client_side) = loopback_pair().await;
        assert!(pool.register(server_side).is_some());
        assert_eq!(pool.slots.lock().unwrap().len(), PROXY_MAX_POOL_SIZE);
    }

    #[tokio::test]
    async fn pop_reports_stale_slots_without_returning_them() {
        let pool = ProxyPool::new(PROXY_MAX_POOL_SIZE);
        let (server_side, _client_side) = loopback_pair().await;
        pool.slots.lock().unwrap().push_back(ProxySlot {
            stream: server_side,
            deadline: Instant::now() - Duration::from_secs(1),
        });
        assert!(matches!(pool.pop(), Popped::Stale));
        assert!(matches!(pool.pop(), Popped::Empty));
    }

    #[tokio::test]
    async fn get_proxy_blocks_on_an_empty_pool_instead_of_failing_immediately() {
        let (out_tx, mut out_rx) = mpsc::channel(OUT_QUEUE_CAPACITY);
        let control = Control {
            id: "X".to_string(),
            out_tx,
            pool: ProxyPool::new(PROXY_MAX_POOL_SIZE),
            shutdown: CancellationToken::new(),
            last_ping: Mutex::new(Instant::now()),
            torn_down: AtomicBool::new(false),
            registry: Weak::new(),
        };
        // Drain the ReqProxy retries so the channel never fills and blocks the send.
        tokio::spawn(async move { while out_rx.recv().await.is_some() {} });
        let deadline = Instant::now() + Duration::from_millis(50);
        let result = tokio::select! {
            result = control.get_proxy() => Some(result),
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => None,
        };
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn get_proxy_skips_a_stale_entry_already_in_the_queue_and_returns_the_fresh_one() {
        let (out_tx, mut out_rx) = mpsc::channel(OUT_QUEUE_CAPACITY);
        let control = Control {
            id: "X".to_string(),
            out_tx,
            pool: ProxyPool::new(PROXY_MAX_POOL_SIZE),
            shutdown: CancellationToken::new(),
            last_ping: Mutex::new(Instant::now()),
            torn_down: AtomicBool::new(false),
            registry: Weak::new(),
        };
        tokio::spawn(async move { while out_rx.recv().await.is_some() {} });

        let (stale_server, _stale_client) = loopback_pair().await;
        control.pool.slots.lock().unwrap().push_back(ProxySlot {
            stream: stale_server,
            deadline: Instant::now() - Duration::from_secs(1),
        });

        let (fresh_server, fresh_client) = loopback_pair().await;
        let fresh_client_local_addr = fresh_client.local_addr().unwrap();
        control.register_proxy(fresh_server).await;

        let got = control.get_proxy().await.unwrap();
        assert_eq!(got.peer_addr().unwrap(), fresh_client_local_addr);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_loss_tears_down_the_session_and_removes_it_from_the_registry() {
        let registry = Arc::new(ControlRegistry::new());
        let (server_side, mut client_side) = loopback_pair().await;
        let control = Control::spawn(server_side, &registry).await;
        let id = control.id.clone();

        // Drain the handshake so the writer task isn't left blocked on a full queue.
        let _auth_resp = read_msg(&mut client_side).await.unwrap();
        let _req_proxy = read_msg(&mut client_side).await.unwrap();

        tokio::time::advance(PING_TIMEOUT_INTERVAL + CONN_REAP_INTERVAL + Duration::from_secs(1))
            .await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        assert!(registry.get(&id).is_none());

        // The reader/writer tasks must have actually closed the socket, not
        // just cancelled `shutdown` and left the fd dangling.
        let mut buf = [0u8; 1];
        let n = client_side.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "control socket should be closed after heartbeat loss");
    }
}
