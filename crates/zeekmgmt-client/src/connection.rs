//! The connection state machine.
//!
//! One connection owns at most one live transport session and walks
//! `Disconnected → Connecting → Connected → Subscribing → Ready`. The
//! subscription set is fixed at handshake time: [`Connection::connect`]
//! sends the full topic list as the opening frame and only returns once
//! the peer has acked it, so a caller that publishes after `connect`
//! can never miss a response on a subscribed topic. Asking for a topic
//! the live session does not carry tears the session down and
//! re-handshakes with the union set.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use zeekmgmt_wire::{message, Event, InboundMessage, Topic, Value};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::transport::{connect_with_retry, Connector, Transport};

/// Where the connection stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribing,
    Ready,
}

/// One result of [`Connection::receive`].
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    /// An event arrived on a subscribed topic.
    Event { topic: Topic, event: Event },
    /// The deadline passed with nothing to deliver.
    Deadline,
}

/// A client connection to the management endpoint.
pub struct Connection<C: Connector> {
    connector: C,
    url: Url,
    connect_attempts: u32,
    connect_retry_delay: Duration,
    state: ConnectionState,
    topics: BTreeSet<Topic>,
    transport: Option<C::Transport>,
    /// Data frames that arrived before the handshake ack.
    pending: VecDeque<(Topic, Value)>,
}

impl<C: Connector> Connection<C> {
    pub fn new(connector: C, config: &ClientConfig) -> Result<Self, ClientError> {
        let url = config.endpoint_url()?;
        Ok(Self::with_endpoint(
            connector,
            url,
            config.connect_attempts,
            config.connect_retry_delay,
        ))
    }

    /// Bypasses [`ClientConfig`] for callers that already hold a URL.
    pub fn with_endpoint(
        connector: C,
        url: Url,
        connect_attempts: u32,
        connect_retry_delay: Duration,
    ) -> Self {
        Self {
            connector,
            url,
            connect_attempts,
            connect_retry_delay,
            state: ConnectionState::Disconnected,
            topics: BTreeSet::new(),
            transport: None,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// The topics the live session is subscribed to.
    pub fn topics(&self) -> &BTreeSet<Topic> {
        &self.topics
    }

    /// Brings the connection to `Ready` with every topic in `topics`
    /// subscribed.
    ///
    /// No-op when already `Ready` with a superset. A missing topic on a
    /// live session forces a fresh dial and handshake with the union
    /// set, since the peer fixes subscriptions at handshake time.
    /// Dialing retries up to the configured attempt bound; exhausting
    /// it leaves the connection `Disconnected` and returns
    /// [`ClientError::Connection`].
    pub async fn connect(&mut self, topics: &[Topic]) -> Result<(), ClientError> {
        if self.state == ConnectionState::Ready
            && topics.iter().all(|t| self.topics.contains(t))
        {
            return Ok(());
        }

        let mut wanted: BTreeSet<Topic> = self.topics.clone();
        wanted.extend(topics.iter().cloned());

        if self.transport.is_some() {
            debug!(topics = ?topics, "re-handshaking live session for new topics");
            self.close().await;
        }

        self.state = ConnectionState::Connecting;
        self.topics.clear();

        let mut transport = match connect_with_retry(
            &self.connector,
            &self.url,
            self.connect_attempts,
            self.connect_retry_delay,
        )
        .await
        {
            Ok(transport) => transport,
            Err(err) => {
                self.state = ConnectionState::Disconnected;
                return Err(err);
            }
        };
        self.state = ConnectionState::Connected;

        let topic_list: Vec<Topic> = wanted.iter().cloned().collect();
        if let Err(err) = transport.send(message::handshake(&topic_list)).await {
            self.state = ConnectionState::Disconnected;
            return Err(err);
        }
        self.state = ConnectionState::Subscribing;

        // The subscription is live only once the peer acks; anything
        // published on these topics after this point reaches us.
        match self.await_ack(&mut transport).await {
            Ok(()) => {
                self.transport = Some(transport);
                self.topics = wanted;
                self.state = ConnectionState::Ready;
                info!(endpoint = %self.url, topics = self.topics.len(), "session ready");
                Ok(())
            }
            Err(err) => {
                self.state = ConnectionState::Disconnected;
                Err(err)
            }
        }
    }

    async fn await_ack(&mut self, transport: &mut C::Transport) -> Result<(), ClientError> {
        loop {
            let text = transport
                .recv()
                .await?
                .ok_or_else(|| ClientError::transport("peer closed during handshake"))?;
            match InboundMessage::from_wire(&text)? {
                InboundMessage::Ack { endpoint, version } => {
                    debug!(peer = %endpoint, %version, "subscription acknowledged");
                    return Ok(());
                }
                InboundMessage::Error { code, context } => {
                    return Err(ClientError::Broker { code, context });
                }
                InboundMessage::Data { topic, value } => {
                    self.pending.push_back((topic, value));
                }
            }
        }
    }

    /// Publishes one event and returns without waiting for a reply.
    pub async fn publish(&mut self, topic: &Topic, event: &Event) -> Result<(), ClientError> {
        if self.state != ConnectionState::Ready {
            return Err(ClientError::NotReady);
        }
        let transport = self.transport.as_mut().ok_or(ClientError::NotReady)?;
        let frame = message::data_message(topic, &event.to_value());
        debug!(topic = %topic, event = event.name(), "publishing");
        if let Err(err) = transport.send(frame).await {
            self.teardown().await;
            return Err(err);
        }
        Ok(())
    }

    /// Awaits the next event until `deadline`.
    ///
    /// Broker error frames surface as [`ClientError::Broker`]; a data
    /// message whose payload is not an event-shaped record is a
    /// [`ClientError::Wire`], never silently skipped. Non-data frames
    /// are skipped. A transport failure or peer close tears the
    /// session down.
    pub async fn receive(&mut self, deadline: Instant) -> Result<Received, ClientError> {
        if self.state != ConnectionState::Ready {
            return Err(ClientError::NotReady);
        }

        if let Some((topic, value)) = self.pending.pop_front() {
            let event = Event::from_value(&value)?;
            return Ok(Received::Event { topic, event });
        }

        loop {
            let result = {
                let transport = self.transport.as_mut().ok_or(ClientError::NotReady)?;
                tokio::time::timeout_at(deadline, transport.recv()).await
            };
            let frame = match result {
                Err(_elapsed) => return Ok(Received::Deadline),
                Ok(Ok(Some(text))) => text,
                Ok(Ok(None)) => {
                    self.teardown().await;
                    return Err(ClientError::transport("peer closed the session"));
                }
                Ok(Err(err)) => {
                    self.teardown().await;
                    return Err(err);
                }
            };
            match InboundMessage::from_wire(&frame)? {
                InboundMessage::Data { topic, value } => {
                    let event = Event::from_value(&value)?;
                    return Ok(Received::Event { topic, event });
                }
                InboundMessage::Error { code, context } => {
                    warn!(%code, %context, "broker reported an error");
                    return Err(ClientError::Broker { code, context });
                }
                InboundMessage::Ack { endpoint, .. } => {
                    debug!(peer = %endpoint, "skipping stray ack");
                }
            }
        }
    }

    /// Releases the session. Idempotent.
    pub async fn close(&mut self) {
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.pending.clear();
        self.topics.clear();
        self.state = ConnectionState::Disconnected;
    }
}
