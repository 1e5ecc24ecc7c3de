//! A scripted in-memory transport for driving the connection and the
//! transaction engine without a network.
//!
//! Each dial pops the next scripted session (or failure) off a queue.
//! A session delivers its frames in order and then pends forever, so
//! deadline behavior is exercised with tokio's paused clock. An
//! optional responder closure reacts to published events, which lets
//! tests answer requests whose correlation token is minted inside the
//! client.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use url::Url;

use zeekmgmt_client::transport::{Connector, DialError, Transport};
use zeekmgmt_client::ClientError;
use zeekmgmt_wire::{message, Event, InboundMessage, Topic};

/// One scripted inbound step.
#[derive(Debug, Clone)]
pub enum MockFrame {
    Text(String),
    /// Peer closes the session.
    Close,
    /// Transport-level failure.
    Error(String),
}

pub fn ack_frame() -> MockFrame {
    MockFrame::Text(r#"{"type":"ack","endpoint":"broker","version":"2.5.0"}"#.to_owned())
}

pub fn error_frame(code: &str, context: &str) -> MockFrame {
    MockFrame::Text(format!(
        r#"{{"type":"error","code":"{code}","context":"{context}"}}"#
    ))
}

pub fn event_frame(topic: &Topic, event: &Event) -> MockFrame {
    MockFrame::Text(message::data_message(topic, &event.to_value()))
}

/// A data message carrying an arbitrary value, event-shaped or not.
pub fn event_payload_frame(topic: &Topic, value: &zeekmgmt_wire::Value) -> MockFrame {
    MockFrame::Text(message::data_message(topic, value))
}

type Responder = Box<dyn FnMut(&Topic, &Event) -> Vec<MockFrame> + Send>;

#[derive(Default)]
struct Shared {
    sessions: VecDeque<Result<VecDeque<MockFrame>, String>>,
    sent: Vec<String>,
    dials: u32,
    responder: Option<Responder>,
}

/// Hands out scripted sessions, one per dial.
#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next dial to succeed with the given inbound frames.
    pub fn push_session(&self, frames: Vec<MockFrame>) {
        self.shared
            .lock()
            .unwrap()
            .sessions
            .push_back(Ok(frames.into()));
    }

    /// Scripts the next dial to fail.
    pub fn push_failure(&self, reason: &str) {
        self.shared
            .lock()
            .unwrap()
            .sessions
            .push_back(Err(reason.to_owned()));
    }

    /// Reacts to every published event with scripted responses.
    pub fn set_responder(
        &self,
        responder: impl FnMut(&Topic, &Event) -> Vec<MockFrame> + Send + 'static,
    ) {
        self.shared.lock().unwrap().responder = Some(Box::new(responder));
    }

    /// Every frame the client sent, handshakes included, in order.
    pub fn sent(&self) -> Vec<String> {
        self.shared.lock().unwrap().sent.clone()
    }

    pub fn dial_count(&self) -> u32 {
        self.shared.lock().unwrap().dials
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn dial(&self, _url: &Url) -> Result<MockTransport, DialError> {
        let mut shared = self.shared.lock().unwrap();
        shared.dials += 1;
        match shared.sessions.pop_front() {
            Some(Ok(inbox)) => Ok(MockTransport {
                inbox: Arc::new(Mutex::new(inbox)),
                shared: Arc::clone(&self.shared),
            }),
            Some(Err(reason)) => Err(DialError::new(reason)),
            None => Err(DialError::new("no scripted session left")),
        }
    }
}

pub struct MockTransport {
    inbox: Arc<Mutex<VecDeque<MockFrame>>>,
    shared: Arc<Mutex<Shared>>,
}

impl Transport for MockTransport {
    async fn send(&mut self, text: String) -> Result<(), ClientError> {
        let reaction = {
            let mut shared = self.shared.lock().unwrap();
            shared.sent.push(text.clone());
            match (&mut shared.responder, InboundMessage::from_wire(&text)) {
                (Some(responder), Ok(InboundMessage::Data { topic, value })) => {
                    Event::from_value(&value)
                        .map(|event| responder(&topic, &event))
                        .unwrap_or_default()
                }
                _ => Vec::new(),
            }
        };
        self.inbox.lock().unwrap().extend(reaction);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, ClientError> {
        let frame = self.inbox.lock().unwrap().pop_front();
        match frame {
            Some(MockFrame::Text(text)) => Ok(Some(text)),
            Some(MockFrame::Close) => Ok(None),
            Some(MockFrame::Error(reason)) => Err(ClientError::Transport { reason }),
            // Nothing scripted: pend until the caller's deadline.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {}
}

pub fn endpoint() -> Url {
    Url::parse("ws://127.0.0.1:2149/v1/messages/json").unwrap()
}
