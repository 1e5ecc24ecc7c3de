//! The request/response transaction engine.
//!
//! One transaction publishes a request event and correlates the
//! responses that arrive on the subscribed topics against a fixed
//! overall deadline. The caller picks a completion policy: resolve on
//! the first matching response, or wait for a named set of responders
//! and report whoever is missing when the deadline lands. Timeouts,
//! partial coverage, and cancellation are outcomes, not errors --
//! only transport and wire failures are.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use zeekmgmt_wire::{Event, Topic, Value};

use crate::connection::{Connection, Received};
use crate::error::ClientError;
use crate::transport::Connector;

/// When a transaction is done collecting responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// The first accepted response completes the transaction.
    Single,
    /// Every named responder must answer; anything less at the
    /// deadline is a partial result.
    AllOf(BTreeSet<String>),
}

/// One transaction, fully described up front.
#[derive(Debug, Clone)]
pub struct TransactionSpec {
    /// The request event, published verbatim.
    pub request: Event,
    /// Topics the request goes out on, each exactly once.
    pub publish_to: Vec<Topic>,
    /// Topics that must be subscribed before publication.
    pub subscribe: Vec<Topic>,
    /// Response event names accepted; everything else is discarded.
    pub expect: BTreeSet<String>,
    /// When set, a response's first argument must equal this token.
    pub correlation: Option<String>,
    pub policy: CompletionPolicy,
    /// The overall budget; never reset by traffic.
    pub timeout: Duration,
}

impl TransactionSpec {
    /// A single-response request to the controller.
    pub fn controller(
        request: Event,
        response: impl Into<String>,
        correlation: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            request,
            publish_to: vec![Topic::controller()],
            subscribe: vec![Topic::controller()],
            expect: BTreeSet::from([response.into()]),
            correlation: Some(correlation.into()),
            policy: CompletionPolicy::Single,
            timeout,
        }
    }

    /// An n-of-n request fanned out to the agents on the named
    /// instances.
    pub fn fan_out(
        request: Event,
        instances: &[String],
        response: impl Into<String>,
        correlation: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let topics: Vec<Topic> = instances.iter().map(|i| Topic::agent(i)).collect();
        Self {
            request,
            publish_to: topics.clone(),
            subscribe: topics,
            expect: BTreeSet::from([response.into()]),
            correlation: Some(correlation.into()),
            policy: CompletionPolicy::AllOf(instances.iter().cloned().collect()),
            timeout,
        }
    }
}

/// One accepted response, attributed to its source where the topic
/// names an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionResponse {
    /// The responding instance, `None` for the controller topic.
    pub responder: Option<String>,
    pub event: Event,
}

/// How a transaction ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    /// The policy was satisfied.
    Complete(Vec<TransactionResponse>),
    /// The deadline landed with some but not all named responders
    /// heard from.
    Partial {
        responses: Vec<TransactionResponse>,
        missing: BTreeSet<String>,
    },
    /// The deadline landed with no accepted response at all.
    TimedOut,
    /// The caller's cancellation token fired.
    Cancelled,
}

/// Runs one transaction to an outcome.
///
/// Ensures the connection is `Ready` with every `subscribe` topic
/// active, publishes the request once per `publish_to` topic, then
/// collects responses until the policy resolves or the deadline lands.
/// Unexpected event names and correlation mismatches are discarded
/// with a debug log and do not touch the deadline. Cancellation leaves
/// the connection usable for subsequent transactions.
pub async fn transact<C: Connector>(
    conn: &mut Connection<C>,
    spec: TransactionSpec,
    cancel: &CancellationToken,
) -> Result<TransactionOutcome, ClientError> {
    conn.connect(&spec.subscribe).await?;
    for topic in &spec.publish_to {
        conn.publish(topic, &spec.request).await?;
    }

    let deadline = Instant::now() + spec.timeout;
    let mut responses: Vec<TransactionResponse> = Vec::new();
    let mut answered: BTreeSet<String> = BTreeSet::new();

    loop {
        let received = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(request = spec.request.name(), "transaction cancelled");
                return Ok(TransactionOutcome::Cancelled);
            }
            received = conn.receive(deadline) => received?,
        };

        let (topic, event) = match received {
            Received::Deadline => {
                return Ok(resolve_deadline(&spec.policy, responses, &answered));
            }
            Received::Event { topic, event } => (topic, event),
        };

        if !spec.expect.contains(event.name()) {
            debug!(event = event.name(), topic = %topic, "discarding unexpected event");
            continue;
        }
        if let Some(token) = &spec.correlation {
            let first = event.args().first().and_then(Value::as_str);
            if first != Some(token.as_str()) {
                debug!(event = event.name(), topic = %topic,
                       "discarding response with foreign correlation token");
                continue;
            }
        }

        let responder = topic.instance().map(str::to_owned);
        if let Some(name) = &responder {
            answered.insert(name.clone());
        }
        responses.push(TransactionResponse { responder, event });

        match &spec.policy {
            CompletionPolicy::Single => {
                return Ok(TransactionOutcome::Complete(responses));
            }
            CompletionPolicy::AllOf(wanted) => {
                if wanted.is_subset(&answered) {
                    return Ok(TransactionOutcome::Complete(responses));
                }
            }
        }
    }
}

fn resolve_deadline(
    policy: &CompletionPolicy,
    responses: Vec<TransactionResponse>,
    answered: &BTreeSet<String>,
) -> TransactionOutcome {
    if responses.is_empty() {
        return TransactionOutcome::TimedOut;
    }
    match policy {
        CompletionPolicy::Single => TransactionOutcome::TimedOut,
        CompletionPolicy::AllOf(wanted) => TransactionOutcome::Partial {
            responses,
            missing: wanted.difference(answered).cloned().collect(),
        },
    }
}
