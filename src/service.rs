//! The stdio protocol service: read loop, dispatch, response correlation,
//! heartbeat, and process lifecycle.
//!
//! One service instance owns all shared protocol state: the frozen command
//! table, the pending-response table, and the request id counter. The read
//! loop feeds a [`FrameBuffer`] and spawns one dispatch task per decoded
//! packet (bounded by a semaphore), a dedicated writer task serializes all
//! output, and a heartbeat task pings the host every interval, requesting
//! shutdown when the host stops answering.
//!
//! The service never calls `std::process::exit` itself; [`ServiceBuilder::serve`]
//! returns the exit status and the binary maps it to the real process exit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, Mutex, Semaphore};

use crate::error::{Result, WorkerError};
use crate::handler::{CommandTable, Handler, HandlerResult};
use crate::protocol::{error_value, Direction, FrameBuffer, Packet, Request, Value};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Exit status for a clean shutdown (`exit` command or end of input).
pub const EXIT_CLEAN: i32 = 0;

/// Exit status for fatal conditions: write failure, missed heartbeat,
/// unexpected response, read error.
pub const EXIT_FATAL: i32 = 1;

/// Default interval between liveness pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Default cap on concurrently running dispatch tasks.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Default stdin read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024;

/// One-shot continuation invoked when the response to a sent request arrives.
type ResponseCallback = Box<dyn FnOnce(Value) + Send>;

/// Tunable service parameters.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub heartbeat_interval: Duration,
    pub max_concurrent_handlers: usize,
    pub channel_capacity: usize,
    pub max_frame_size: u32,
    pub read_buffer_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            channel_capacity: crate::writer::DEFAULT_CHANNEL_CAPACITY,
            max_frame_size: crate::protocol::DEFAULT_MAX_FRAME_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Builder for configuring commands and running the service.
pub struct ServiceBuilder {
    commands: CommandTable,
    config: ServiceConfig,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            commands: CommandTable::new(),
            config: ServiceConfig::default(),
        }
    }

    /// Register a command handler. Registration is only possible before
    /// `serve`; the table is frozen once the service accepts input.
    pub fn command<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        self.commands.register(name, handler);
        self
    }

    /// Override the heartbeat interval (mainly for tests).
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Cap on concurrently running dispatch tasks.
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    /// Maximum accepted frame payload length.
    pub fn max_frame_size(mut self, limit: u32) -> Self {
        self.config.max_frame_size = limit;
        self
    }

    /// Run the service over the given streams until shutdown.
    ///
    /// Built-in commands (`ping`, `exit`) are registered before the first
    /// byte is read. Returns the process exit status: [`EXIT_CLEAN`] after an
    /// `exit` command or clean end of input, [`EXIT_FATAL`] for write
    /// failures, missed heartbeats, unexpected responses, or read errors.
    pub async fn serve<R, W>(mut self, reader: R, writer: W) -> i32
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        if !self.commands.contains("ping") {
            self.commands
                .register("ping", |_request: Request| async { Ok(Value::Nil) });
        }

        let (writer_handle, mut writer_task) =
            spawn_writer_task(writer, self.config.channel_capacity);
        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(ServiceInner {
            commands: self.commands,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            writer: writer_handle.clone(),
            fatal_tx,
        });

        let heartbeat = tokio::spawn(heartbeat_loop(
            inner.clone(),
            self.config.heartbeat_interval,
        ));

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_handlers));
        let read_loop = read_loop(reader, inner.clone(), semaphore, self.config.clone());
        tokio::pin!(read_loop);

        let status = tokio::select! {
            status = fatal_rx.recv() => status.unwrap_or(EXIT_FATAL),
            result = &mut read_loop => match result {
                Ok(()) => {
                    // Clean end of input: stop pinging, then let the send
                    // queue drain before exiting. A write failure while
                    // draining is still fatal.
                    heartbeat.abort();
                    tokio::select! {
                        _ = writer_handle.wait_idle() => EXIT_CLEAN,
                        _ = &mut writer_task => EXIT_FATAL,
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "read loop failed");
                    EXIT_FATAL
                }
            },
            result = &mut writer_task => {
                if let Ok(Err(err)) = result {
                    tracing::error!(error = %err, "output stream write failed");
                }
                EXIT_FATAL
            }
        };

        heartbeat.abort();
        status
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared protocol state reachable from every task.
struct ServiceInner {
    commands: CommandTable,
    pending: Mutex<HashMap<u32, ResponseCallback>>,
    next_id: AtomicU32,
    writer: WriterHandle,
    fatal_tx: mpsc::UnboundedSender<i32>,
}

impl ServiceInner {
    /// Assign the next process-unique request id.
    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Request process shutdown with the given status. The first request
    /// wins; later ones are ignored.
    fn fatal(&self, status: i32) {
        let _ = self.fatal_tx.send(status);
    }

    /// Encode and enqueue a packet for the writer task.
    async fn send_packet(&self, packet: Packet) {
        let frame = Bytes::from(packet.encode());
        if self.writer.send(frame).await.is_err() {
            tracing::error!("writer task is gone, requesting shutdown");
            self.fatal(EXIT_FATAL);
        }
    }

    /// Send a request to the host, registering the continuation for its
    /// response. The continuation is stored before the request is enqueued so
    /// the response can never race past it.
    async fn send_request(&self, request: Request, callback: ResponseCallback) {
        let id = self.next_id();
        self.pending.lock().await.insert(id, callback);
        self.send_packet(Packet::request(id, request.to_value())).await;
    }

    /// Decode one inbound frame and route it.
    async fn receive_packet(self: &Arc<Self>, frame: Bytes) {
        let packet = match Packet::decode(&frame) {
            Ok(packet) => packet,
            Err(err) => {
                // No reliable id to answer; drop the packet.
                tracing::debug!(error = %err, "failed to decode the packet");
                return;
            }
        };
        tracing::debug!(
            id = packet.id,
            direction = ?packet.direction,
            "packet received"
        );

        match packet.direction {
            Direction::Request => self.dispatch_request(packet).await,
            Direction::Response => self.resolve_response(packet).await,
        }
    }

    async fn dispatch_request(&self, packet: Packet) {
        let Some(request) = Request::from_value(&packet.payload) else {
            self.send_packet(Packet::response(
                packet.id,
                error_value("unable to parse the request"),
            ))
            .await;
            return;
        };

        // Built-in: terminate with status 0, no response sent.
        if request.command == "exit" {
            tracing::debug!("exit command received");
            self.fatal(EXIT_CLEAN);
            return;
        }

        let payload = match self.commands.get(&request.command) {
            None => error_value(format!("no handler for command: {}", request.command)),
            Some(handler) => {
                // Run the handler on its own task so a panic is contained
                // and becomes an error response instead of taking down the
                // worker.
                let fut = handler.call(request);
                match tokio::spawn(fut).await {
                    Ok(Ok(value)) => value,
                    Ok(Err(err)) => error_value(err.message()),
                    Err(join_err) if join_err.is_panic() => {
                        tracing::error!("command handler panicked");
                        error_value("command handler panicked")
                    }
                    Err(_) => error_value("command handler cancelled"),
                }
            }
        };

        self.send_packet(Packet::response(packet.id, payload)).await;
    }

    /// Invoke the pending continuation for a response id exactly once. A
    /// response with no pending entry means the host answered an id we never
    /// sent (or answered twice): the stream can no longer be trusted.
    async fn resolve_response(&self, packet: Packet) {
        let callback = self.pending.lock().await.remove(&packet.id);
        match callback {
            Some(callback) => callback(packet.payload),
            None => {
                tracing::error!(id = packet.id, "response for an id with no pending request");
                self.fatal(EXIT_FATAL);
            }
        }
    }
}

/// Read stdin, extract frames, and spawn one dispatch task per packet.
async fn read_loop<R>(
    mut reader: R,
    inner: Arc<ServiceInner>,
    semaphore: Arc<Semaphore>,
    config: ServiceConfig,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frame_buffer = FrameBuffer::with_max_frame_size(config.max_frame_size);
    let mut buf = vec![0u8; config.read_buffer_size];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        for frame in frame_buffer.push(&buf[..n])? {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::ChannelClosed)?;
            let inner = inner.clone();
            tokio::spawn(async move {
                let _permit = permit;
                inner.receive_packet(frame).await;
            });
        }
    }

    if frame_buffer.has_partial_frame() {
        return Err(WorkerError::Protocol(
            "input stream ended mid-frame".to_string(),
        ));
    }
    Ok(())
}

/// Ping the host every `interval`; if the previous ping was never answered by
/// the next tick, request shutdown. This is how an orphaned worker detects a
/// dead host and stops itself.
async fn heartbeat_loop(inner: Arc<ServiceInner>, interval: Duration) {
    loop {
        let responded = Arc::new(AtomicBool::new(false));
        let flag = responded.clone();
        inner
            .send_request(
                Request::new("ping", Vec::new()),
                Box::new(move |_| flag.store(true, Ordering::Release)),
            )
            .await;

        tokio::time::sleep(interval).await;

        if !responded.load(Ordering::Acquire) {
            tracing::error!("host did not answer ping within the heartbeat interval");
            inner.fatal(EXIT_FATAL);
            return;
        }
    }
}
