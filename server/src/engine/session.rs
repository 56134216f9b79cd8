use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::activity::{Activity, normalize};
use super::commands::{CommandDispatcher, DispatchOutcome};
use super::state_mirror::StateMirror;
use super::sync::SyncOrchestrator;
use crate::error::{DispatchError, SessionError};
use crate::gateway::capabilities::{DirectoryQuery, GatewayConnector, MessageSender};
use crate::gateway::types::{GatewayEvent, InboundMessage, Intent};

/// Maximum queued gateway events before the gateway side waits.
pub const EVENT_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Stopped,
    Starting,
    Ready,
    Errored,
}

/// Everything the session reports to the outside world.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    Ready { username: String },
    Error(String),
    Activity(Activity),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub token: Option<String>,
    pub intents: Vec<Intent>,
    /// Application authorization link handed out when no token is configured.
    pub app_authorize_url: String,
}

pub struct Session {
    config: SessionConfig,
    directory: Arc<dyn DirectoryQuery>,
    sync: SyncOrchestrator,
    dispatcher: CommandDispatcher,
    status: Mutex<SessionStatus>,
    notify: mpsc::UnboundedSender<SessionNotification>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        directory: Arc<dyn DirectoryQuery>,
        sender: Arc<dyn MessageSender>,
        mirror: Arc<StateMirror>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            sync: SyncOrchestrator::new(directory.clone(), mirror),
            directory,
            dispatcher: CommandDispatcher::new(sender),
            config,
            status: Mutex::new(SessionStatus::Stopped),
            notify: tx,
        });
        (session, rx)
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap()
    }

    pub fn mirror(&self) -> &Arc<StateMirror> {
        self.sync.mirror()
    }

    pub fn sync(&self) -> &SyncOrchestrator {
        &self.sync
    }

    fn set_status(&self, status: SessionStatus) {
        *self.status.lock().unwrap() = status;
    }

    fn emit(&self, notification: SessionNotification) {
        if self.notify.send(notification).is_err() {
            debug!("no listener for session notifications");
        }
    }

    fn report_error(&self, message: String) {
        error!(%message, "session error");
        self.emit(SessionNotification::Error(message));
    }

    /// Log in, wait for the first ready signal, run the keyed guild sync, and
    /// only then announce readiness. Returns the handle of the dispatch loop
    /// that takes over the event stream.
    pub async fn start(
        self: &Arc<Self>,
        connector: &dyn GatewayConnector,
    ) -> Result<JoinHandle<()>, SessionError> {
        let Some(token) = self.config.token.as_deref().filter(|t| !t.is_empty()) else {
            let err = SessionError::MissingCredential {
                authorize_url: self.config.app_authorize_url.clone(),
            };
            self.report_error(err.to_string());
            return Err(err);
        };

        self.set_status(SessionStatus::Starting);
        let (tx, mut rx) = mpsc::channel(EVENT_QUEUE);

        if let Err(e) = connector.login(token, &self.config.intents, tx).await {
            self.set_status(SessionStatus::Errored);
            self.report_error(format!("login failed: {e}"));
            return Err(SessionError::Login(e));
        }
        info!(intents = self.config.intents.len(), "gateway login under way");

        loop {
            match rx.recv().await {
                Some(GatewayEvent::Ready { username }) => {
                    self.on_first_ready(username).await;
                    break;
                }
                Some(GatewayEvent::Error(e)) => {
                    self.set_status(SessionStatus::Errored);
                    self.report_error(format!("login failed: {e}"));
                    return Err(SessionError::Login(e));
                }
                Some(GatewayEvent::Message(msg)) => {
                    debug!(message_id = msg.id, "dropping message received before ready");
                }
                None => {
                    self.set_status(SessionStatus::Errored);
                    self.report_error(SessionError::GatewayClosed.to_string());
                    return Err(SessionError::GatewayClosed);
                }
            }
        }

        let session = self.clone();
        Ok(tokio::spawn(async move { session.run(rx).await }))
    }

    async fn on_first_ready(&self, username: String) {
        // A failed sync is reported but does not hold back readiness.
        if let Err(e) = self.sync.sync_guilds().await {
            self.report_error(format!("guild sync on ready failed: {e}"));
        }
        self.set_status(SessionStatus::Ready);
        info!(%username, guilds = self.mirror().guild_count(), "session ready");
        self.emit(SessionNotification::Ready { username });
    }

    async fn run(self: Arc<Self>, mut events: mpsc::Receiver<GatewayEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        self.set_status(SessionStatus::Stopped);
        info!("gateway event stream ended, session stopped");
    }

    pub async fn handle_event(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Message(msg) => {
                if let Err(e) = self.handle_message(msg).await {
                    warn!(error = %e, "failed to handle message");
                }
            }
            GatewayEvent::Error(e) => {
                // Runtime gateway errors are non-fatal; keep consuming events.
                self.set_status(SessionStatus::Errored);
                self.report_error(e);
            }
            GatewayEvent::Ready { username } => {
                debug!(%username, "gateway ready again");
            }
        }
    }

    /// Route one inbound message. Returns the emitted activity, or `None`
    /// when the message was from a bot or triggered a sync.
    pub async fn handle_message(
        &self,
        msg: InboundMessage,
    ) -> Result<Option<Activity>, DispatchError> {
        if msg.author.bot {
            return Ok(None);
        }

        if self.dispatcher.dispatch(&msg).await? == DispatchOutcome::SyncRequested {
            self.sync.sync().await?;
            self.sync.sync_all_channels().await?;
            return Ok(None);
        }

        let channel_name = self.channel_name(&msg).await;
        let activity = normalize(&msg, channel_name.as_deref());
        self.mirror().upsert_user(msg.author);
        self.emit(SessionNotification::Activity(activity.clone()));
        Ok(Some(activity))
    }

    async fn channel_name(&self, msg: &InboundMessage) -> Option<String> {
        if msg.guild_id.is_none() {
            return None;
        }
        if let Some(ch) = self.mirror().channel(msg.channel_id) {
            return ch.name;
        }
        match self.directory.fetch_channel(msg.channel_id).await {
            Ok(ch) => ch.name,
            Err(e) => {
                warn!(channel_id = msg.channel_id, error = %e, "could not resolve channel name");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine::commands::tests::{RecordingSender, inbound};
    use crate::engine::state_mirror::tests::{channel, guild, mirror_with_store};
    use crate::engine::sync::tests::MockDirectory;
    use crate::gateway::types::UserRecord;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Connector that replays scripted events and keeps the sender so tests
    /// can push more after start.
    #[derive(Default)]
    pub(crate) struct MockConnector {
        pub login_calls: Mutex<usize>,
        pub fail_login: Option<String>,
        pub on_login: Vec<GatewayEvent>,
        pub events: Mutex<Option<mpsc::Sender<GatewayEvent>>>,
    }

    impl MockConnector {
        pub(crate) fn ready() -> Self {
            Self {
                on_login: vec![GatewayEvent::Ready {
                    username: "relay".into(),
                }],
                ..Default::default()
            }
        }

        pub(crate) async fn push(&self, event: GatewayEvent) {
            let tx = self.events.lock().unwrap().clone().unwrap();
            tx.send(event).await.unwrap();
        }
    }

    #[async_trait]
    impl GatewayConnector for MockConnector {
        async fn login(
            &self,
            _token: &str,
            _intents: &[Intent],
            events: mpsc::Sender<GatewayEvent>,
        ) -> Result<(), String> {
            *self.login_calls.lock().unwrap() += 1;
            if let Some(e) = &self.fail_login {
                return Err(e.clone());
            }
            for event in &self.on_login {
                events.try_send(event.clone()).unwrap();
            }
            *self.events.lock().unwrap() = Some(events);
            Ok(())
        }
    }

    pub(crate) fn config(token: Option<&str>) -> SessionConfig {
        SessionConfig {
            token: token.map(String::from),
            intents: Intent::DEFAULTS.to_vec(),
            app_authorize_url: "https://discord.com/oauth2/authorize?client_id=123&permissions=0&scope=bot".into(),
        }
    }

    struct Harness {
        session: Arc<Session>,
        notifications: mpsc::UnboundedReceiver<SessionNotification>,
        directory: Arc<MockDirectory>,
        sender: Arc<RecordingSender>,
    }

    fn harness(token: Option<&str>, directory: MockDirectory, sender: RecordingSender) -> Harness {
        let (mirror, _) = mirror_with_store();
        let directory = Arc::new(directory);
        let sender = Arc::new(sender);
        let (session, notifications) = Session::new(
            config(token),
            directory.clone(),
            sender.clone(),
            Arc::new(mirror),
        );
        Harness {
            session,
            notifications,
            directory,
            sender,
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<SessionNotification>) -> SessionNotification {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("notification channel closed")
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_login() {
        let mut h = harness(None, MockDirectory::default(), RecordingSender::default());
        let connector = MockConnector::ready();

        let err = h.session.start(&connector).await.unwrap_err();
        let SessionError::MissingCredential { authorize_url } = &err else {
            panic!("expected MissingCredential, got {err:?}");
        };
        assert!(authorize_url.contains("client_id=123"));
        assert_eq!(*connector.login_calls.lock().unwrap(), 0);
        assert_eq!(h.session.status(), SessionStatus::Stopped);

        let SessionNotification::Error(msg) = next(&mut h.notifications).await else {
            panic!("expected error notification");
        };
        assert!(msg.contains("client_id=123"));
    }

    #[tokio::test]
    async fn test_empty_token_counts_as_missing() {
        let h = harness(Some(""), MockDirectory::default(), RecordingSender::default());
        let connector = MockConnector::ready();
        assert!(matches!(
            h.session.start(&connector).await,
            Err(SessionError::MissingCredential { .. })
        ));
        assert_eq!(*connector.login_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_login_failure_rejects_and_notifies() {
        let mut h = harness(Some("tok"), MockDirectory::default(), RecordingSender::default());
        let connector = MockConnector {
            fail_login: Some("invalid token".into()),
            ..Default::default()
        };

        let err = h.session.start(&connector).await.unwrap_err();
        assert!(matches!(err, SessionError::Login(ref e) if e == "invalid token"));
        assert_eq!(h.session.status(), SessionStatus::Errored);
        assert!(matches!(
            next(&mut h.notifications).await,
            SessionNotification::Error(ref m) if m.contains("invalid token")
        ));
    }

    #[tokio::test]
    async fn test_gateway_error_before_ready_is_a_login_failure() {
        let mut h = harness(Some("tok"), MockDirectory::default(), RecordingSender::default());
        let connector = MockConnector {
            on_login: vec![GatewayEvent::Error("authentication failed".into())],
            ..Default::default()
        };

        assert!(matches!(
            h.session.start(&connector).await,
            Err(SessionError::Login(_))
        ));
        assert!(matches!(
            next(&mut h.notifications).await,
            SessionNotification::Error(_)
        ));
    }

    #[tokio::test]
    async fn test_ready_runs_guild_sync_before_announcing() {
        let mut h = harness(
            Some("tok"),
            MockDirectory::with_guilds(vec![guild(1, "a"), guild(2, "b")]),
            RecordingSender::default(),
        );
        let connector = MockConnector::ready();

        let _loop = h.session.start(&connector).await.unwrap();
        assert_eq!(h.session.status(), SessionStatus::Ready);
        assert_eq!(h.session.mirror().guild_count(), 2);
        assert!(h.session.mirror().guild_list().is_empty());
        assert_eq!(
            next(&mut h.notifications).await,
            SessionNotification::Ready {
                username: "relay".into()
            }
        );
    }

    #[tokio::test]
    async fn test_failed_ready_sync_is_reported_but_not_fatal() {
        let directory = MockDirectory::default();
        *directory.fail_guilds.lock().unwrap() = true;
        let mut h = harness(Some("tok"), directory, RecordingSender::default());

        h.session.start(&MockConnector::ready()).await.unwrap();
        assert!(matches!(
            next(&mut h.notifications).await,
            SessionNotification::Error(_)
        ));
        assert!(matches!(
            next(&mut h.notifications).await,
            SessionNotification::Ready { .. }
        ));
        assert_eq!(h.session.status(), SessionStatus::Ready);
    }

    #[tokio::test]
    async fn test_dispatch_loop_emits_activities_in_order() {
        let mut h = harness(Some("tok"), MockDirectory::default(), RecordingSender::default());
        let connector = MockConnector::ready();
        h.session.start(&connector).await.unwrap();
        let _ = next(&mut h.notifications).await;

        h.session.mirror().upsert_channel(channel(100, 200, "general"));
        connector.push(GatewayEvent::Message(inbound("first"))).await;
        connector.push(GatewayEvent::Message(inbound("second"))).await;

        for expected in ["first", "second"] {
            let SessionNotification::Activity(a) = next(&mut h.notifications).await else {
                panic!("expected activity");
            };
            assert_eq!(a.object.content, expected);
            assert_eq!(a.target.name.as_deref(), Some("general"));
        }
    }

    #[tokio::test]
    async fn test_runtime_error_is_not_fatal() {
        let mut h = harness(Some("tok"), MockDirectory::default(), RecordingSender::default());
        let connector = MockConnector::ready();
        h.session.start(&connector).await.unwrap();
        let _ = next(&mut h.notifications).await;

        connector
            .push(GatewayEvent::Error("shard heartbeat missed".into()))
            .await;
        assert!(matches!(
            next(&mut h.notifications).await,
            SessionNotification::Error(ref m) if m == "shard heartbeat missed"
        ));
        assert_eq!(h.session.status(), SessionStatus::Errored);

        connector.push(GatewayEvent::Message(inbound("still here"))).await;
        assert!(matches!(
            next(&mut h.notifications).await,
            SessionNotification::Activity(_)
        ));
    }

    #[tokio::test]
    async fn test_plain_message_activity_matches_input() {
        let h = harness(Some("tok"), MockDirectory::default(), RecordingSender::default());
        let msg = inbound("hello there");

        let activity = h.session.handle_message(msg.clone()).await.unwrap().unwrap();
        assert_eq!(activity.object.content, "hello there");
        assert_eq!(activity.actor.reference, msg.author.id);
        assert_eq!(activity.target.reference, msg.channel_id);
        assert_eq!(h.session.mirror().user(42).unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_command_reply_still_emits_activity() {
        let h = harness(Some("tok"), MockDirectory::default(), RecordingSender::default());
        let activity = h.session.handle_message(inbound("!ping")).await.unwrap();
        assert_eq!(activity.unwrap().object.content, "!ping");
        assert_eq!(h.sender.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_command_emits_no_activity() {
        let directory = MockDirectory::with_guilds(vec![guild(1, "a")]);
        directory.set_channels(1, vec![channel(10, 1, "general")]);
        let mut h = harness(Some("tok"), directory, RecordingSender::default());

        let out = h.session.handle_message(inbound("!sync")).await.unwrap();
        assert!(out.is_none());
        assert!(h.notifications.try_recv().is_err());
        assert!(h.sender.sent.lock().unwrap().is_empty());
        assert_eq!(h.session.mirror().guild_list().len(), 1);
        assert_eq!(h.session.mirror().channel_count(), 1);
    }

    #[tokio::test]
    async fn test_bot_messages_are_ignored() {
        let mut h = harness(Some("tok"), MockDirectory::default(), RecordingSender::default());
        let mut msg = inbound("!ping");
        msg.author = UserRecord {
            id: 7,
            username: "otherbot".into(),
            bot: true,
        };

        assert!(h.session.handle_message(msg).await.unwrap().is_none());
        assert!(h.sender.sent.lock().unwrap().is_empty());
        assert!(h.notifications.try_recv().is_err());
        assert!(h.session.mirror().user(7).is_none());
    }

    #[tokio::test]
    async fn test_dm_target_has_no_name() {
        let h = harness(Some("tok"), MockDirectory::default(), RecordingSender::default());
        let mut msg = inbound("hi");
        msg.guild_id = None;

        let activity = h.session.handle_message(msg).await.unwrap().unwrap();
        assert_eq!(activity.target.name, None);
    }

    #[tokio::test]
    async fn test_unmirrored_channel_name_is_fetched() {
        let directory = MockDirectory::default();
        directory.set_channels(200, vec![channel(100, 200, "fetched")]);
        let h = harness(Some("tok"), directory, RecordingSender::default());

        let activity = h.session.handle_message(inbound("yo")).await.unwrap().unwrap();
        assert_eq!(activity.target.name.as_deref(), Some("fetched"));
        assert_eq!(h.directory.member_calls.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_reply_failure_propagates() {
        let h = harness(
            Some("tok"),
            MockDirectory::default(),
            RecordingSender {
                fail: true,
                ..Default::default()
            },
        );
        let err = h.session.handle_message(inbound("!help")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Send(_)));
    }
}
