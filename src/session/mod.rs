//! Session loop
//!
//! Startup: connect, enable automatic reconnection, publish the handshake,
//! then collect topics from the operator until at least one subscription
//! succeeds. After that the loop pumps the gateway forever.

pub mod input;

pub use input::{StaticTopicSource, StdinTopicSource, TopicSource, TOPIC_PROMPT};

use crate::config::ClientConfig;
use crate::error::{SessionError, SessionResult};
use crate::processing::CommandConfirmer;
use crate::protocol::{parse_topic_line, QoS, Topic};
use crate::transport::{Gateway, MessageHandler, PumpOutcome, Publisher, Transport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Topics subscribed during startup, in the order they were accepted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionSet {
    topics: Vec<Topic>,
}

impl SubscriptionSet {
    /// Add `topic`; returns false if it was already present
    pub fn insert(&mut self, topic: Topic) -> bool {
        if self.contains(&topic) {
            return false;
        }
        self.topics.push(topic);
        true
    }

    pub fn contains(&self, topic: &Topic) -> bool {
        self.topics.contains(topic)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Topic> {
        self.topics.iter()
    }
}

/// Top-level driver owning the gateway and the subscription set
pub struct Session<T: Transport> {
    gateway: Gateway<T>,
    subscriptions: SubscriptionSet,
    confirmer: Arc<CommandConfirmer>,
    handshake_payload: Vec<u8>,
    pump_timeout: Duration,
    idle_delay: Duration,
}

impl<T: Transport> Session<T> {
    pub fn new(gateway: Gateway<T>, config: &ClientConfig) -> SessionResult<Self> {
        let confirmer = CommandConfirmer::new(
            config.confirm_topic()?,
            config.session.max_confirmation_bytes,
        );

        Ok(Self {
            gateway,
            subscriptions: SubscriptionSet::default(),
            confirmer: Arc::new(confirmer),
            handshake_payload: config.session.handshake_payload.as_bytes().to_vec(),
            pump_timeout: config.pump_timeout(),
            idle_delay: config.idle_delay(),
        })
    }

    /// Wrap `transport` in a gateway configured from `config`
    pub fn with_transport(transport: T, config: &ClientConfig) -> SessionResult<Self> {
        Self::new(Gateway::new(transport, config.command_timeout()), config)
    }

    pub fn gateway(&self) -> &Gateway<T> {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut Gateway<T> {
        &mut self.gateway
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    /// Connect, handshake and subscribe; any error here is fatal
    pub async fn start(&mut self, source: &mut dyn TopicSource) -> SessionResult<()> {
        self.gateway.connect().await.map_err(SessionError::Connect)?;
        self.gateway.set_auto_reconnect(true);
        self.publish_handshake().await;
        self.collect_subscriptions(source).await
    }

    async fn publish_handshake(&mut self) {
        let topic = self.confirmer.confirm_topic().clone();
        match self
            .gateway
            .publish(&topic, self.handshake_payload.clone(), QoS::AtLeastOnce)
            .await
        {
            Ok(_) => info!("Published handshake to {}", topic),
            Err(e) => warn!("Handshake publish to {} failed: {}", topic, e),
        }
    }

    /// Read operator lines until at least one topic is subscribed
    pub async fn collect_subscriptions(
        &mut self,
        source: &mut dyn TopicSource,
    ) -> SessionResult<()> {
        while self.subscriptions.is_empty() {
            source.prompt().await?;
            let Some(line) = source.read_line().await? else {
                return Err(SessionError::InputClosed);
            };

            let parsed = parse_topic_line(&line);
            if parsed.is_empty() {
                warn!("Error reading input. Try again.");
                continue;
            }

            for result in parsed {
                match result {
                    Ok(topic) => self.subscribe(topic).await,
                    Err(e) => {
                        warn!("{}", e);
                        source.reject(&e);
                    }
                }
            }
        }

        info!(
            "Subscribed to {} topic(s); entering session loop",
            self.subscriptions.len()
        );
        Ok(())
    }

    async fn subscribe(&mut self, topic: Topic) {
        info!("Subscribing to {}", topic);
        let handler: Arc<dyn MessageHandler> = self.confirmer.clone();
        match self
            .gateway
            .subscribe(topic.as_str(), QoS::AtLeastOnce, handler)
            .await
        {
            Ok(()) => {
                self.subscriptions.insert(topic);
            }
            Err(e) => error!("Error subscribing to {}: {}", topic, e),
        }
    }

    /// One loop iteration: pump, then pause for the idle delay
    pub async fn run_once(&mut self) -> PumpOutcome {
        let outcome = match self.gateway.pump(self.pump_timeout).await {
            Ok(PumpOutcome::Reconnecting) => {
                debug!("Attempting reconnect");
                PumpOutcome::Reconnecting
            }
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Event loop error: {}", e);
                PumpOutcome::Idle
            }
        };

        if !self.idle_delay.is_zero() {
            tokio::time::sleep(self.idle_delay).await;
        }
        outcome
    }

    /// Run until the process is terminated
    pub async fn run(&mut self) {
        loop {
            self.run_once().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(s: &str) -> Topic {
        Topic::parse(s).unwrap()
    }

    /// Source that keeps the default `reject`, like the stdin source
    struct LinesOnly(Vec<String>);

    #[async_trait::async_trait]
    impl TopicSource for LinesOnly {
        async fn prompt(&mut self) -> std::io::Result<()> {
            Ok(())
        }

        async fn read_line(&mut self) -> std::io::Result<Option<String>> {
            Ok((!self.0.is_empty()).then(|| self.0.remove(0)))
        }
    }

    #[tokio::test]
    async fn test_rejected_tokens_are_reported_once_by_the_session() {
        let mut config = ClientConfig::for_broker("mqtt://localhost:1883");
        config.broker.command_timeout_ms = 100;
        let mut session =
            Session::with_transport(crate::testing::MockTransport::new(), &config).unwrap();
        let mut source = LinesOnly(vec!["lamp devices/lamp".to_string()]);

        session.start(&mut source).await.unwrap();

        let topics: Vec<_> = session.subscriptions().iter().map(Topic::as_str).collect();
        assert_eq!(topics, vec!["devices/lamp"]);
    }

    #[test]
    fn test_subscription_set_ignores_duplicates() {
        let mut set = SubscriptionSet::default();
        assert!(set.insert(topic("a/b")));
        assert!(set.insert(topic("c/d")));
        assert!(!set.insert(topic("a/b")));

        assert_eq!(set.len(), 2);
        assert!(set.contains(&topic("c/d")));
        let order: Vec<_> = set.iter().map(Topic::as_str).collect();
        assert_eq!(order, vec!["a/b", "c/d"]);
    }

    #[test]
    fn test_empty_set() {
        let set = SubscriptionSet::default();
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);
    }
}
