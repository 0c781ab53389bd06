use std::sync::Arc;

use thing_core::Channel;
use thing_store::StateStore;
use thing_transport::{Connection, EndpointConfig, Received};

use super::ChannelContext;
use crate::backoff::Backoff;
use crate::codec::{ActionResult, Command, CommandCodec, CommandResult};
use crate::dispatch::ActionDispatcher;
use crate::error::Result;
use crate::indicator::Indicator;
use crate::lifecycle::ExitGuard;

const CHANNEL: Channel = Channel::CommandHandler;

/// Why a connection stopped being served.
enum SessionEnd {
    Shutdown,
    PeerClosed,
}

/// Receives commands, applies them and answers with their results.
pub struct CommandHandler {
    ctx: ChannelContext,
    endpoint: EndpointConfig,
    dispatcher: ActionDispatcher<dyn StateStore, dyn Indicator>,
    codec: Box<dyn CommandCodec>,
    buffer_size: usize,
    backoff: Backoff,
}

impl CommandHandler {
    /// Create a handler receiving through a buffer of `buffer_size` bytes.
    #[must_use]
    pub fn new(
        ctx: ChannelContext,
        endpoint: EndpointConfig,
        dispatcher: ActionDispatcher<dyn StateStore, dyn Indicator>,
        codec: Box<dyn CommandCodec>,
        buffer_size: usize,
        backoff: Backoff,
    ) -> Self {
        Self {
            ctx,
            endpoint,
            dispatcher,
            codec,
            buffer_size,
            backoff,
        }
    }

    /// Serve connections until shutdown is requested.
    pub fn run(mut self) {
        let _guard = ExitGuard::new(Arc::clone(&self.ctx.coordinator), CHANNEL);
        let mut buf = vec![0u8; self.buffer_size.max(1)];
        tracing::info!(endpoint = %self.endpoint, "Command handler started");

        while self.ctx.running(CHANNEL) {
            let mut conn = match self.ctx.connector.connect(&self.endpoint) {
                Ok(conn) => conn,
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        error = %e,
                        attempt = self.backoff.failures(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Failed to connect command channel"
                    );
                    self.ctx.pause(CHANNEL, delay);
                    continue;
                }
            };
            self.codec.reset();
            tracing::info!(endpoint = %self.endpoint, "Command channel connected");

            let served = self.serve(conn.as_mut(), &mut buf);
            if let Err(e) = conn.close() {
                tracing::warn!(error = %e, "Failed to close command channel");
            }

            match served {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::PeerClosed) => {
                    let delay = self.backoff.next_delay();
                    tracing::info!(
                        endpoint = %self.endpoint,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Command channel closed by peer"
                    );
                    self.ctx.pause(CHANNEL, delay);
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    tracing::warn!(error = %e, "Command channel connection lost");
                    self.ctx.pause(CHANNEL, delay);
                }
            }
        }

        tracing::info!("Command handler stopping");
    }

    fn serve(&mut self, conn: &mut dyn Connection, buf: &mut [u8]) -> Result<SessionEnd> {
        while self.ctx.running(CHANNEL) {
            match conn.receive(buf)? {
                Received::WouldBlock => {}
                Received::Closed => return Ok(SessionEnd::PeerClosed),
                Received::Data(n) => {
                    // Only a session that delivered data counts as healthy.
                    self.backoff.reset();
                    for command in self.codec.decode(&buf[..n]) {
                        let result = self.execute(&command);
                        let encoded = self.codec.encode(&result)?;
                        conn.send_all(&encoded)?;
                    }
                }
            }
        }
        Ok(SessionEnd::Shutdown)
    }

    /// Dispatch every action of `command` in order.
    #[must_use]
    pub fn execute(&self, command: &Command) -> CommandResult {
        tracing::info!(
            command_id = %command.id,
            actions = command.actions.len(),
            "Executing command"
        );
        let results = command
            .actions
            .iter()
            .map(|action| ActionResult::from_outcome(action, &self.dispatcher.dispatch(action)))
            .collect();
        CommandResult {
            id: command.id.clone(),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonLinesCodec;
    use crate::indicator::mock::RecordingIndicator;
    use crate::lifecycle::ShutdownCoordinator;
    use crate::scheduler::{Scheduler, Task};
    use std::thread;
    use std::time::Duration;
    use thing_store::{FixedSensor, MutexStateStore};
    use thing_transport::{Connector, ScriptStep, ScriptedConnector, ScriptedSession};

    struct ThreadScheduler;

    impl Scheduler for ThreadScheduler {
        fn spawn(&self, _name: &str, task: Task) -> Result<()> {
            thread::spawn(task);
            Ok(())
        }

        fn delay(&self, duration: Duration) {
            thread::sleep(duration);
        }
    }

    struct Fixture {
        connector: ScriptedConnector,
        coordinator: Arc<ShutdownCoordinator>,
        store: Arc<MutexStateStore<FixedSensor>>,
        handler: CommandHandler,
    }

    fn fixture() -> Fixture {
        let connector = ScriptedConnector::new();
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let store = Arc::new(MutexStateStore::new(
            FixedSensor::new(21_000),
            Duration::from_millis(50),
        ));
        let ctx = ChannelContext {
            connector: Arc::new(connector.clone()),
            coordinator: Arc::clone(&coordinator),
            scheduler: Arc::new(ThreadScheduler),
            poll_interval: Duration::from_millis(5),
        };
        let dispatcher: ActionDispatcher<dyn StateStore, dyn Indicator> = ActionDispatcher::new(
            Arc::clone(&store) as Arc<dyn StateStore>,
            Arc::new(RecordingIndicator::new()) as Arc<dyn Indicator>,
        );
        let handler = CommandHandler::new(
            ctx,
            EndpointConfig::new("cloud.test", 443),
            dispatcher,
            Box::new(JsonLinesCodec::new(4096)),
            64,
            Backoff::new(Duration::from_millis(1), Duration::from_millis(4)),
        );
        Fixture {
            connector,
            coordinator,
            store,
            handler,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached");
    }

    #[test]
    fn applies_command_and_answers() {
        let Fixture {
            connector,
            coordinator,
            store,
            handler,
        } = fixture();
        let command = b"{\"commandID\":\"c1\",\"actions\":[{\"AirConditionerAlias\":[{\"turnPower\":true}]}]}\n";
        connector.push_session(
            ScriptedSession::new()
                .then(ScriptStep::WouldBlock)
                .then_data(command.to_vec()),
        );

        let worker = thread::spawn(move || handler.run());
        wait_until(|| connector.sent().first().is_some_and(|sent| !sent.is_empty()));
        coordinator.request_shutdown();
        worker.join().unwrap();

        assert!(store.read().unwrap().power);
        assert_eq!(
            String::from_utf8(connector.sent()[0].clone()).unwrap(),
            "{\"commandID\":\"c1\",\"actionResults\":[{\"AirConditionerAlias\":[{\"turnPower\":{\"succeeded\":true}}]}]}\n"
        );
        assert!(coordinator.has_exited(Channel::CommandHandler));
        assert_eq!(connector.close_count(), 1);
    }

    #[test]
    fn reconnects_after_peer_close_and_errors() {
        let Fixture {
            connector,
            coordinator,
            handler,
            ..
        } = fixture();
        connector.push_connect_failure();
        connector.push_session(ScriptedSession::new().then(ScriptStep::Closed));
        connector.push_session(
            ScriptedSession::new().then(ScriptStep::Fail(std::io::ErrorKind::ConnectionReset)),
        );
        connector.push_session(ScriptedSession::new());

        let worker = thread::spawn(move || handler.run());
        wait_until(|| connector.connect_count() >= 4);
        coordinator.request_shutdown();
        worker.join().unwrap();

        assert_eq!(connector.connect_count(), 4);
        assert_eq!(connector.close_count(), 3);
        assert!(coordinator.has_exited(Channel::CommandHandler));
    }

    #[test]
    fn peer_closing_every_session_is_paced() {
        let Fixture {
            connector,
            coordinator,
            mut handler,
            ..
        } = fixture();
        handler.backoff = Backoff::new(Duration::from_millis(40), Duration::from_secs(1));
        for _ in 0..20 {
            connector.push_session(ScriptedSession::new().then(ScriptStep::Closed));
        }

        let worker = thread::spawn(move || handler.run());
        thread::sleep(Duration::from_millis(100));
        coordinator.request_shutdown();
        worker.join().unwrap();

        // Delays of 40ms then 80ms allow at most three connects in 100ms.
        let connects = connector.connect_count();
        assert!((1..=3).contains(&connects), "{connects} connects");
        assert_eq!(connector.close_count(), connects);
    }

    #[test]
    fn received_data_resets_backoff() {
        let Fixture {
            connector,
            mut handler,
            ..
        } = fixture();
        let endpoint = EndpointConfig::new("cloud.test", 443);
        let mut buf = [0u8; 64];
        handler.backoff.next_delay();
        handler.backoff.next_delay();

        connector.push_session(ScriptedSession::new().then(ScriptStep::Closed));
        let mut silent = connector.connect(&endpoint).unwrap();
        assert!(matches!(
            handler.serve(silent.as_mut(), &mut buf),
            Ok(SessionEnd::PeerClosed)
        ));
        assert_eq!(handler.backoff.failures(), 2);

        connector.push_session(ScriptedSession::new().then_data("\n").then(ScriptStep::Closed));
        let mut talking = connector.connect(&endpoint).unwrap();
        assert!(matches!(
            handler.serve(talking.as_mut(), &mut buf),
            Ok(SessionEnd::PeerClosed)
        ));
        assert_eq!(handler.backoff.failures(), 0);
    }

    #[test]
    fn exits_without_connecting_after_shutdown() {
        let Fixture {
            connector,
            coordinator,
            handler,
            ..
        } = fixture();
        coordinator.request_shutdown();
        handler.run();

        assert_eq!(connector.connect_count(), 0);
        assert!(coordinator.has_exited(Channel::CommandHandler));
    }
}
