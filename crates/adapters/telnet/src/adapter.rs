//! The telnet device adapter: command building, streaming and report polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use homewire_app::ports::{
    CommandFunc, DeviceAdapter, EventConsumer, EventProducer, ProducedEvents,
};
use homewire_domain::command::Command;
use homewire_domain::device::Device;
use homewire_domain::error::HubError;
use homewire_domain::event::Event;

use crate::codec::{self, FrameCodec};
use crate::config::TelnetConfig;
use crate::error::TelnetError;
use crate::parser::FrameResolver;
use crate::pool::ConnectionPool;
use crate::transport::{Connection, ConnectionFactory};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Adapter for one telnet device.
///
/// Call [`init_connections`](Self::init_connections) before building
/// commands or producing events; commands executed earlier fail with
/// [`TelnetError::NotConnected`].
pub struct TelnetAdapter<F> {
    config: TelnetConfig,
    resolver: Arc<FrameResolver>,
    pool: Arc<OnceLock<Arc<ConnectionPool<F>>>>,
    shutdown: CancellationToken,
    stream_cancel: Mutex<CancellationToken>,
    streaming: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl<F: ConnectionFactory> TelnetAdapter<F> {
    /// `bridged` are the devices whose `DEVICE` frames this one relays.
    pub fn new(
        device: Arc<Device>,
        bridged: impl IntoIterator<Item = Arc<Device>>,
        config: TelnetConfig,
    ) -> Self {
        let shutdown = CancellationToken::new();
        Self {
            config,
            resolver: Arc::new(FrameResolver::new(device, bridged)),
            pool: Arc::new(OnceLock::new()),
            stream_cancel: Mutex::new(shutdown.child_token()),
            shutdown,
            streaming: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            consumer: Mutex::new(None),
        }
    }

    fn device(&self) -> &Device {
        self.resolver.device()
    }

    /// Create the connection pool and start pinging its idle connections.
    ///
    /// Connections are opened lazily, so an unreachable device does not
    /// fail here.
    ///
    /// # Errors
    ///
    /// Returns [`TelnetError::AlreadyInitialised`] on a second call.
    pub fn init_connections(&self, factory: F) -> Result<(), TelnetError> {
        let name = self.device().name.clone();
        tracing::info!(device = %name, pool_size = self.config.pool_size, "init connections");
        let pool = Arc::new(ConnectionPool::new(name, self.config.pool_size, factory));
        self.pool
            .set(Arc::clone(&pool))
            .map_err(|_| TelnetError::AlreadyInitialised)?;

        let handle = tokio::spawn(keep_alive_loop(
            pool,
            self.config.keep_alive(),
            self.shutdown.child_token(),
        ));
        self.track(handle);
        Ok(())
    }

    fn connected_pool(&self) -> Result<Arc<ConnectionPool<F>>, TelnetError> {
        self.pool.get().cloned().ok_or(TelnetError::NotConnected)
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Start the connect, authenticate and stream cycle.
    ///
    /// When streaming is disabled in the configuration, the returned event
    /// channel is already closed and `done` is already `true`.
    ///
    /// # Errors
    ///
    /// Returns [`TelnetError::NotConnected`] before `init_connections`,
    /// [`TelnetError::AlreadyStreaming`] while a stream is running and
    /// [`TelnetError::PoolClosed`] after [`shutdown`](Self::shutdown).
    pub fn start_producing_events(&self) -> Result<ProducedEvents, TelnetError> {
        let (events_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (done_tx, done) = watch::channel(false);

        if !self.config.stream {
            tracing::debug!(device = %self.device().name, "streaming disabled");
            let _ = done_tx.send(true);
            return Ok(ProducedEvents { events, done });
        }

        let pool = self.connected_pool()?;
        if self.shutdown.is_cancelled() {
            return Err(TelnetError::PoolClosed);
        }
        if self.streaming.swap(true, Ordering::SeqCst) {
            return Err(TelnetError::AlreadyStreaming);
        }
        // a fresh token so a stopped stream can be started again
        let cancel = self.shutdown.child_token();
        *self
            .stream_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = cancel.clone();
        let handle = tokio::spawn(stream_loop(
            pool,
            Arc::clone(&self.resolver),
            self.config.clone(),
            events_tx,
            cancel,
            done_tx,
        ));
        self.track(handle);
        Ok(ProducedEvents { events, done })
    }

    /// Stop every background task and close the pool.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.stop_consuming();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(err) = task.await {
                tracing::warn!(device = %self.device().name, error = %err, "background task failed");
            }
        }
        if let Some(pool) = self.pool.get() {
            pool.close();
        }
        tracing::info!(device = %self.device().name, "telnet adapter stopped");
    }
}

impl<F: ConnectionFactory> DeviceAdapter for TelnetAdapter<F> {
    fn family(&self) -> &'static str {
        "telnet"
    }

    fn build_command(&self, command: &Command) -> Result<CommandFunc, HubError> {
        let frame = codec::encode(command)?;
        let label = format!("{} {}", self.device().name, frame.trim_end());
        let pool = Arc::clone(&self.pool);
        let timeout = self.config.io_timeout();
        Ok(CommandFunc::new(label, async move {
            let pool = pool.get().cloned().ok_or(TelnetError::NotConnected)?;
            write_frame(&pool, &frame, timeout).await?;
            Ok::<(), HubError>(())
        }))
    }
}

impl<F: ConnectionFactory> EventProducer for TelnetAdapter<F> {
    fn producer_name(&self) -> &str {
        &self.device().name
    }

    fn start_producing(&self) -> Result<ProducedEvents, HubError> {
        self.start_producing_events().map_err(Into::into)
    }

    /// Stop the stream loop; the pool and report consumer keep running and
    /// streaming may be started again.
    fn stop_producing(&self) -> impl Future<Output = ()> + Send {
        tracing::debug!(device = %self.device().name, "stop producing");
        self.stream_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        self.streaming.store(false, Ordering::SeqCst);
        std::future::ready(())
    }
}

impl<F: ConnectionFactory> EventConsumer for TelnetAdapter<F> {
    fn consumer_name(&self) -> &str {
        &self.device().name
    }

    /// Answer `ZonesReport` by querying each owned zone; the device replies
    /// on the stream with an `OUTPUT` frame.
    fn start_consuming(&self, events: broadcast::Receiver<Event>) {
        let handle = tokio::spawn(report_loop(
            Arc::clone(&self.pool),
            Arc::clone(&self.resolver),
            self.config.io_timeout(),
            events,
            self.shutdown.child_token(),
        ));
        let previous = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn stop_consuming(&self) {
        let handle = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Write one frame on a pooled connection. A connection that fails the
/// write is discarded rather than returned to the pool.
///
/// Waiting for a free connection is bounded by `timeout` as well, so a
/// stream holding the last pooled connection fails the command instead of
/// stalling the processor.
async fn write_frame<F: ConnectionFactory>(
    pool: &Arc<ConnectionPool<F>>,
    frame: &str,
    timeout: Duration,
) -> Result<(), TelnetError> {
    let mut conn = tokio::time::timeout(timeout, pool.checkout())
        .await
        .map_err(|_| TelnetError::Timeout {
            stage: "waiting for connection",
        })??;
    let write = async {
        conn.write_all(frame.as_bytes()).await?;
        conn.flush().await
    };
    let outcome = tokio::time::timeout(timeout, write).await;
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            conn.discard();
            Err(TelnetError::Io(err))
        }
        Err(_) => {
            conn.discard();
            Err(TelnetError::Timeout {
                stage: "writing command",
            })
        }
    }
}

async fn keep_alive_loop<F: ConnectionFactory>(
    pool: Arc<ConnectionPool<F>>,
    every: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(every) => pool.keep_alive().await,
        }
    }
}

/// Never gives up on its own: every failure is followed by the fixed retry
/// delay and a fresh connect.
async fn stream_loop<F: ConnectionFactory>(
    pool: Arc<ConnectionPool<F>>,
    resolver: Arc<FrameResolver>,
    config: TelnetConfig,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
    done: watch::Sender<bool>,
) {
    let name = resolver.device().name.clone();
    loop {
        tracing::debug!(device = %name, "attempting to stream events");
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = stream_once(&pool, &resolver, config.max_backlog_bytes, &events) => result,
        };
        match result {
            Ok(()) => tracing::info!(device = %name, "stream closed"),
            Err(err) => tracing::warn!(device = %name, error = %err, "streaming failed"),
        }
        if events.is_closed() {
            break;
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.retry_delay()) => {}
        }
    }
    tracing::info!(device = %name, "stopped streaming events");
    let _ = done.send(true);
}

async fn stream_once<F: ConnectionFactory>(
    pool: &Arc<ConnectionPool<F>>,
    resolver: &FrameResolver,
    max_backlog: usize,
    events: &mpsc::Sender<Event>,
) -> Result<(), TelnetError> {
    let mut conn = pool.checkout().await?;
    tracing::info!(device = %resolver.device().name, "streaming events");
    let result = read_frames(&mut conn, resolver, max_backlog, events).await;
    conn.discard();
    result
}

async fn read_frames(
    conn: &mut Connection,
    resolver: &FrameResolver,
    max_backlog: usize,
    events: &mpsc::Sender<Event>,
) -> Result<(), TelnetError> {
    let device_id = &resolver.device().id;
    let mut frames = FramedRead::new(conn, FrameCodec::new(max_backlog));
    while let Some(frame) = frames.next().await {
        let frame = frame?;
        let Some(command) = resolver.resolve(&frame) else {
            tracing::trace!(frame = %frame.raw, "dropping frame");
            continue;
        };
        let event = Event::CommandObserved {
            device_id: device_id.clone(),
            command,
            raw: frame.raw,
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
    Ok(())
}

async fn report_loop<F: ConnectionFactory>(
    pool: Arc<OnceLock<Arc<ConnectionPool<F>>>>,
    resolver: Arc<FrameResolver>,
    timeout: Duration,
    mut events: broadcast::Receiver<Event>,
    cancel: CancellationToken,
) {
    let device = resolver.device();
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let zone_ids = match event {
            Ok(Event::ZonesReport { zone_ids }) => zone_ids,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(device = %device.name, skipped, "report consumer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let Some(pool) = pool.get() else {
            tracing::warn!(device = %device.name, "report requested before connections were initialised");
            continue;
        };
        for zone in device.owned_zones(&zone_ids) {
            let query = codec::encode_level_query(&zone.local_id);
            if let Err(err) = write_frame(pool, &query, timeout).await {
                tracing::warn!(device = %device.name, zone = %zone.id, error = %err, "failed to query zone level");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::tests::PipeFactory;
    use homewire_domain::id::ZoneId;
    use std::sync::atomic::Ordering;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn repeater() -> Arc<Device> {
        Arc::new(
            Device::builder()
                .id("repeater")
                .local_id("1")
                .name("Repeater")
                .zone("12", "hall", "Hall")
                .button("2", "hall-btn", "Hall Button")
                .build()
                .unwrap(),
        )
    }

    fn adapter(config: TelnetConfig) -> TelnetAdapter<Arc<PipeFactory>> {
        TelnetAdapter::new(repeater(), [], config)
    }

    async fn read_n(device: &mut DuplexStream, n: usize) -> String {
        let mut buf = vec![0_u8; n];
        device.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn should_write_built_command_on_execute() {
        let adapter = adapter(TelnetConfig::default());
        let factory = Arc::new(PipeFactory::default());
        let mut device = factory.expect_connection();
        adapter.init_connections(Arc::clone(&factory)).unwrap();

        let zone = adapter.device().zone("12").unwrap().clone();
        let func = adapter
            .build_command(&Command::set_zone(&zone, 0.75))
            .unwrap();
        assert_eq!(func.label(), "Repeater #OUTPUT,12,1,0.75");
        func.execute().await.unwrap();

        assert_eq!(read_n(&mut device, 19).await, "#OUTPUT,12,1,0.75\r\n");
        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn should_not_touch_the_wire_until_executed() {
        let adapter = adapter(TelnetConfig::default());
        let factory = Arc::new(PipeFactory::default());
        adapter.init_connections(Arc::clone(&factory)).unwrap();

        let _func = adapter
            .build_command(&Command::button_press("hall-btn"))
            .unwrap();

        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn should_fail_execution_before_init() {
        let adapter = adapter(TelnetConfig::default());
        let func = adapter
            .build_command(&Command::zone_set_level("hall", 1.0))
            .unwrap();
        assert!(matches!(func.execute().await, Err(HubError::Transport(_))));
    }

    #[tokio::test]
    async fn should_stream_observed_commands() {
        let adapter = adapter(TelnetConfig::default());
        let factory = Arc::new(PipeFactory::default());
        let mut device = factory.expect_connection();
        adapter.init_connections(Arc::clone(&factory)).unwrap();

        let mut produced = adapter.start_producing_events().unwrap();
        device
            .write_all(b"QNET> ~OUTPUT,12,1,50.00\r\n~OUTPUT,99,1,1.00\r\n~DEVICE,1,2,3\r\n")
            .await
            .unwrap();

        let first = produced.events.recv().await.unwrap();
        assert_eq!(
            first,
            Event::CommandObserved {
                device_id: "repeater".into(),
                command: Command::ZoneSetLevel {
                    zone_id: ZoneId::new("hall"),
                    zone_local_id: "12".to_string(),
                    level: 50.0,
                },
                raw: "~OUTPUT,12,1,50.00".to_string(),
            }
        );
        let second = produced.events.recv().await.unwrap();
        assert!(matches!(
            second,
            Event::CommandObserved { command: Command::ButtonPress { .. }, .. }
        ));
        assert!(matches!(
            adapter.start_producing_events(),
            Err(TelnetError::AlreadyStreaming)
        ));
        adapter.shutdown().await;
        assert!(*produced.done.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn should_reconnect_after_retry_delay() {
        let adapter = adapter(TelnetConfig::default());
        let factory = Arc::new(PipeFactory::default());
        let mut first = factory.expect_connection();
        let mut second = factory.expect_connection();
        adapter.init_connections(Arc::clone(&factory)).unwrap();
        let mut produced = adapter.start_producing_events().unwrap();

        first.write_all(b"~DEVICE,1,2,3\r\n").await.unwrap();
        produced.events.recv().await.unwrap();
        let dropped_at = tokio::time::Instant::now();
        drop(first);

        second.write_all(b"~DEVICE,1,2,4\r\n").await.unwrap();
        let resumed = produced.events.recv().await.unwrap();

        assert!(matches!(
            resumed,
            Event::CommandObserved { command: Command::ButtonRelease { .. }, .. }
        ));
        assert!(dropped_at.elapsed() >= Duration::from_secs(10));
        let pool = adapter.connected_pool().unwrap();
        assert_eq!(pool.idle_count(), 0);
        adapter.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_retrying_when_connect_fails() {
        let adapter = adapter(TelnetConfig::default());
        let factory = Arc::new(PipeFactory::default());
        adapter.init_connections(Arc::clone(&factory)).unwrap();
        let _produced = adapter.start_producing_events().unwrap();

        tokio::time::sleep(Duration::from_secs(35)).await;

        assert_eq!(factory.created.load(Ordering::SeqCst), 4);
        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn should_stop_stream_but_keep_pool_on_stop_producing() {
        let adapter = adapter(TelnetConfig::default());
        let factory = Arc::new(PipeFactory::default());
        let _device = factory.expect_connection();
        adapter.init_connections(Arc::clone(&factory)).unwrap();
        let mut produced = adapter.start_producing_events().unwrap();

        adapter.stop_producing().await;
        produced.done.wait_for(|done| *done).await.unwrap();

        assert!(adapter.connected_pool().is_ok());
        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn should_stream_again_after_stop_producing() {
        let adapter = adapter(TelnetConfig::default());
        let factory = Arc::new(PipeFactory::default());
        let mut first = factory.expect_connection();
        let mut second = factory.expect_connection();
        adapter.init_connections(Arc::clone(&factory)).unwrap();

        let mut stopped = adapter.start_producing_events().unwrap();
        while factory.created.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        adapter.stop_producing().await;
        stopped.done.wait_for(|done| *done).await.unwrap();

        // the new stream may reuse the idle connection or open another one
        let mut produced = adapter.start_producing_events().unwrap();
        for device in [&mut first, &mut second] {
            device.write_all(b"~DEVICE,1,2,3\r\n").await.unwrap();
        }
        assert!(matches!(
            produced.events.recv().await.unwrap(),
            Event::CommandObserved { command: Command::ButtonPress { .. }, .. }
        ));

        adapter.shutdown().await;
        assert!(matches!(
            adapter.start_producing_events(),
            Err(TelnetError::PoolClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_command_while_stream_holds_only_connection() {
        let adapter = adapter(TelnetConfig {
            pool_size: 1,
            ..TelnetConfig::default()
        });
        let factory = Arc::new(PipeFactory::default());
        let _device = factory.expect_connection();
        adapter.init_connections(Arc::clone(&factory)).unwrap();
        let _produced = adapter.start_producing_events().unwrap();
        while factory.created.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let zone = adapter.device().zone("12").unwrap().clone();
        let started = tokio::time::Instant::now();
        let result = adapter
            .build_command(&Command::set_zone(&zone, 0.5))
            .unwrap()
            .execute()
            .await;

        let Err(HubError::Transport(source)) = result else {
            panic!("expected a transport error");
        };
        assert_eq!(source.to_string(), "timed out while waiting for connection");
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(10));
        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn should_return_closed_channel_when_streaming_disabled() {
        let adapter = adapter(TelnetConfig {
            stream: false,
            ..TelnetConfig::default()
        });
        let mut produced = adapter.start_producing_events().unwrap();
        assert!(produced.events.recv().await.is_none());
        assert!(*produced.done.borrow());
    }

    #[tokio::test]
    async fn should_query_owned_zones_on_report() {
        let adapter = adapter(TelnetConfig {
            stream: false,
            ..TelnetConfig::default()
        });
        let factory = Arc::new(PipeFactory::default());
        let mut device = factory.expect_connection();
        adapter.init_connections(Arc::clone(&factory)).unwrap();
        let (bus, rx) = broadcast::channel(8);
        adapter.start_consuming(rx);

        bus.send(Event::ZonesReport {
            zone_ids: vec![ZoneId::new("elsewhere"), ZoneId::new("hall")],
        })
        .unwrap();

        assert_eq!(read_n(&mut device, 14).await, "?OUTPUT,12,1\r\n");
        adapter.shutdown().await;
    }
}
