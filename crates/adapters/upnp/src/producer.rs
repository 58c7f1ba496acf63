//! Subscription lease upkeep and notification decoding for one device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use homewire_app::ports::{EventProducer, ProducedEvents};
use homewire_domain::device::Device;
use homewire_domain::error::HubError;
use homewire_domain::event::Event;

use crate::callback::CallbackRoutes;
use crate::config::UpnpConfig;
use crate::error::UpnpError;
use crate::parser;
use crate::subscription::{SubscribeRequest, Subscriber};

const EVENT_PATH: &str = "/upnp/event/basicevent1";
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Keeps a `basicevent1` subscription alive and turns its notifications
/// into domain events.
///
/// With `auto_renew`, a granted lease is renewed after `renew_after`;
/// without it the first lease is left to expire. When a subscribe or renew
/// fails the SID is forgotten and a fresh subscription is attempted after
/// `retry_delay`. A stopped producer can be started again.
pub struct UpnpProducer<S> {
    device: Arc<Device>,
    config: UpnpConfig,
    subscriber: Arc<S>,
    routes: CallbackRoutes,
    sid: Arc<Mutex<Option<String>>>,
    cancel: Mutex<CancellationToken>,
    producing: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: Subscriber> UpnpProducer<S> {
    pub fn new(
        device: Arc<Device>,
        config: UpnpConfig,
        subscriber: Arc<S>,
        routes: CallbackRoutes,
    ) -> Self {
        Self {
            device,
            config,
            subscriber,
            routes,
            sid: Arc::new(Mutex::new(None)),
            cancel: Mutex::new(CancellationToken::new()),
            producing: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Subscription ID currently held, if any.
    #[must_use]
    pub fn sid(&self) -> Option<String> {
        self.sid.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn event_url(&self) -> String {
        format!("{}{EVENT_PATH}", self.device.address.trim_end_matches('/'))
    }

    fn callback_key(&self) -> &str {
        self.device.id.as_str()
    }

    /// Spawn the subscription and notification loops.
    ///
    /// # Errors
    ///
    /// Returns [`UpnpError::AlreadyProducing`] until [`stop`](Self::stop)
    /// has been called.
    pub fn start(&self) -> Result<ProducedEvents, UpnpError> {
        if self.producing.swap(true, Ordering::SeqCst) {
            return Err(UpnpError::AlreadyProducing);
        }
        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();
        let (events_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (done_tx, done) = watch::channel(false);
        let notifications = self.routes.register(self.callback_key());

        let subscription = tokio::spawn(subscription_loop(
            Arc::clone(&self.subscriber),
            Lease {
                device: self.device.name.clone(),
                url: self.event_url(),
                callback: self.config.callback_url(self.callback_key()),
                config: self.config.clone(),
            },
            Arc::clone(&self.sid),
            cancel.clone(),
        ));
        let notify = tokio::spawn(notify_loop(
            Arc::clone(&self.device),
            notifications,
            events_tx,
            cancel,
            done_tx,
        ));

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(subscription);
        tasks.push(notify);
        Ok(ProducedEvents { events, done })
    }

    /// Cancel both loops, then drop the subscription on the device.
    pub async fn stop(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(err) = task.await {
                tracing::warn!(device = %self.device.name, error = %err, "background task failed");
            }
        }
        self.routes.unregister(self.callback_key());

        let sid = self.sid.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sid) = sid {
            if let Err(err) = self.subscriber.unsubscribe(&self.event_url(), &sid).await {
                tracing::debug!(device = %self.device.name, error = %err, "unsubscribe failed");
            }
        }
        self.producing.store(false, Ordering::SeqCst);
        tracing::info!(device = %self.device.name, "upnp producer stopped");
    }
}

impl<S: Subscriber> EventProducer for UpnpProducer<S> {
    fn producer_name(&self) -> &str {
        &self.device.name
    }

    fn start_producing(&self) -> Result<ProducedEvents, HubError> {
        self.start().map_err(Into::into)
    }

    fn stop_producing(&self) -> impl Future<Output = ()> + Send {
        self.stop()
    }
}

struct Lease {
    device: String,
    url: String,
    callback: String,
    config: UpnpConfig,
}

async fn subscription_loop<S: Subscriber>(
    subscriber: Arc<S>,
    lease: Lease,
    sid: Arc<Mutex<Option<String>>>,
    cancel: CancellationToken,
) {
    loop {
        let current = sid.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let request = SubscribeRequest {
            url: &lease.url,
            sid: current.as_deref(),
            lease: lease.config.lease(),
            auto_renew: lease.config.auto_renew,
            callback: &lease.callback,
        };
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = subscriber.subscribe(request) => result,
        };
        let wait = match result {
            Ok(granted) => {
                tracing::debug!(device = %lease.device, sid = %granted, renewal = current.is_some(), "subscribed");
                *sid.lock().unwrap_or_else(PoisonError::into_inner) = Some(granted);
                if !request.auto_renew {
                    cancel.cancelled().await;
                    break;
                }
                lease.config.renew_after()
            }
            Err(err) => {
                tracing::warn!(device = %lease.device, error = %err, "subscription failed");
                *sid.lock().unwrap_or_else(PoisonError::into_inner) = None;
                lease.config.retry_delay()
            }
        };
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(wait) => {}
        }
    }
}

async fn notify_loop(
    device: Arc<Device>,
    mut notifications: mpsc::Receiver<String>,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
    done: watch::Sender<bool>,
) {
    loop {
        let body = tokio::select! {
            () = cancel.cancelled() => break,
            body = notifications.recv() => body,
        };
        let Some(body) = body else { break };
        let Some(event) = parser::notification_event(&device, &body) else {
            tracing::trace!(device = %device.name, "ignoring notification");
            continue;
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
    tracing::info!(device = %device.name, "stopped producing events");
    let _ = done.send(true);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::time::Instant;

    use homewire_domain::device::Protocol;
    use homewire_domain::id::ZoneId;

    #[derive(Debug)]
    pub(crate) struct Call {
        pub sid: Option<String>,
        pub auto_renew: bool,
        pub at: Instant,
    }

    /// Replays queued answers, then grants `uuid:default`.
    #[derive(Default)]
    pub(crate) struct ScriptedSubscriber {
        pub answers: Mutex<VecDeque<Result<String, UpnpError>>>,
        pub calls: Mutex<Vec<Call>>,
        pub unsubscribed: Mutex<Vec<String>>,
    }

    impl ScriptedSubscriber {
        pub fn answering(answers: impl IntoIterator<Item = Result<String, UpnpError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into_iter().collect()),
                ..Self::default()
            }
        }
    }

    impl Subscriber for ScriptedSubscriber {
        async fn subscribe(&self, request: SubscribeRequest<'_>) -> Result<String, UpnpError> {
            self.calls.lock().unwrap().push(Call {
                sid: request.sid.map(str::to_string),
                auto_renew: request.auto_renew,
                at: Instant::now(),
            });
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("uuid:default".to_string()))
        }

        async fn unsubscribe(&self, _url: &str, sid: &str) -> Result<(), UpnpError> {
            self.unsubscribed.lock().unwrap().push(sid.to_string());
            Ok(())
        }
    }

    fn switch() -> Arc<Device> {
        Arc::new(
            Device::builder()
                .id("heater")
                .local_id("heater")
                .name("Heater")
                .address("http://10.0.0.7:49153")
                .protocol(Protocol::UpnpInsight)
                .zone(parser::LOCAL_ID, "heater-zone", "Heater")
                .build()
                .unwrap(),
        )
    }

    fn producer(
        subscriber: Arc<ScriptedSubscriber>,
        routes: CallbackRoutes,
    ) -> UpnpProducer<ScriptedSubscriber> {
        UpnpProducer::new(switch(), UpnpConfig::default(), subscriber, routes)
    }

    #[tokio::test(start_paused = true)]
    async fn should_renew_then_resubscribe_after_failure() {
        let subscriber = Arc::new(ScriptedSubscriber::answering([
            Ok("uuid:first".to_string()),
            Err(UpnpError::Status {
                action: "SUBSCRIBE",
                status: 412,
            }),
            Ok("uuid:second".to_string()),
        ]));
        let producer = producer(Arc::clone(&subscriber), CallbackRoutes::new());
        let start = Instant::now();
        let _events = producer.start().unwrap();

        tokio::time::sleep(Duration::from_secs(105)).await;
        assert_eq!(producer.sid(), None);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(producer.sid().as_deref(), Some("uuid:second"));

        let calls = subscriber.calls.lock().unwrap();
        let sids: Vec<_> = calls.iter().map(|call| call.sid.as_deref()).collect();
        assert_eq!(sids, [None, Some("uuid:first"), None]);
        let offsets: Vec<_> = calls.iter().map(|call| (call.at - start).as_secs()).collect();
        assert_eq!(offsets, [0, 100, 110]);
        assert!(calls.iter().all(|call| call.auto_renew));
    }

    #[tokio::test(start_paused = true)]
    async fn should_let_lease_lapse_without_auto_renew() {
        let subscriber = Arc::new(ScriptedSubscriber::default());
        let config = UpnpConfig {
            auto_renew: false,
            ..UpnpConfig::default()
        };
        let producer = UpnpProducer::new(
            switch(),
            config,
            Arc::clone(&subscriber),
            CallbackRoutes::new(),
        );
        let _events = producer.start().unwrap();

        tokio::time::sleep(Duration::from_secs(300)).await;

        let calls = subscriber.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].auto_renew);
        drop(calls);
        producer.stop().await;
    }

    #[tokio::test]
    async fn should_subscribe_afresh_after_restart() {
        let subscriber = Arc::new(ScriptedSubscriber::default());
        let routes = CallbackRoutes::new();
        let producer = producer(Arc::clone(&subscriber), routes.clone());
        let _first = producer.start().unwrap();
        while producer.sid().is_none() {
            tokio::task::yield_now().await;
        }
        producer.stop().await;

        let mut produced = producer.start().unwrap();
        while producer.sid().is_none() {
            tokio::task::yield_now().await;
        }
        let status = notify(
            routes.router(),
            "/notify/heater",
            "&lt;BinaryState&gt;0&lt;/BinaryState&gt;",
        )
        .await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert!(matches!(
            produced.events.recv().await.unwrap(),
            Event::ZoneLevelChanged { .. }
        ));

        let sids: Vec<_> = subscriber
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|call| call.sid.clone())
            .collect();
        assert_eq!(sids, [None, None]);
        producer.stop().await;
    }

    #[tokio::test]
    async fn should_turn_notification_into_event() {
        let routes = CallbackRoutes::new();
        let producer = producer(Arc::new(ScriptedSubscriber::default()), routes.clone());
        let mut produced = producer.start().unwrap();

        let status = notify(
            routes.router(),
            "/notify/heater",
            "&lt;BinaryState&gt;8|1|0&lt;/BinaryState&gt;",
        )
        .await;
        assert_eq!(status, axum::http::StatusCode::OK);

        let event = produced.events.recv().await.unwrap();
        assert_eq!(
            event,
            Event::ZoneLevelChanged {
                zone_id: ZoneId::new("heater-zone"),
                zone_name: "Heater".to_string(),
                level: 1.0,
            }
        );
    }

    #[tokio::test]
    async fn should_unsubscribe_and_signal_done_on_stop() {
        let subscriber = Arc::new(ScriptedSubscriber::default());
        let producer = producer(Arc::clone(&subscriber), CallbackRoutes::new());
        let mut produced = producer.start().unwrap();
        while producer.sid().is_none() {
            tokio::task::yield_now().await;
        }

        producer.stop_producing().await;

        assert!(*produced.done.borrow_and_update());
        assert_eq!(*subscriber.unsubscribed.lock().unwrap(), ["uuid:default"]);
        assert_eq!(producer.sid(), None);
    }

    #[tokio::test]
    async fn should_reject_second_start() {
        let producer = producer(Arc::new(ScriptedSubscriber::default()), CallbackRoutes::new());
        let _events = producer.start().unwrap();
        assert!(matches!(producer.start(), Err(UpnpError::AlreadyProducing)));
        producer.stop().await;
    }

    async fn notify(router: axum::Router, uri: &str, body: &str) -> axum::http::StatusCode {
        use tower::ServiceExt;
        let request = axum::http::Request::builder()
            .method(axum::http::Method::from_bytes(b"NOTIFY").unwrap())
            .uri(uri)
            .body(axum::body::Body::from(body.to_string()))
            .unwrap();
        router.oneshot(request).await.unwrap().status()
    }
}
