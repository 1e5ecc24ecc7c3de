//! The management actions, one async function per controller request.
//!
//! Each action runs a single-response transaction against the
//! controller topic, decodes the per-responder results, and returns a
//! typed outcome. Remote failures stay per-responder inside the
//! outcome types wherever there is room for them; actions whose whole
//! point is one payload (fetching a configuration, listing instances)
//! turn a failed result into [`ClientError::Remote`].

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use zeekmgmt_wire::{Event, Value, WireError};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::ClientError;
use crate::events;
use crate::transact::{transact, TransactionOutcome, TransactionSpec};
use crate::transport::{Connector, WsConnector};
use crate::types::{ActionResult, Configuration, Instance, NodeOutputs, NodeStatus};

/// A connected management client.
///
/// Generic over the connector so tests can drive it with a scripted
/// transport; production uses [`Client::new`], which dials WebSockets.
pub struct Client<C: Connector = WsConnector> {
    conn: Connection<C>,
    request_timeout: Duration,
    cancel: CancellationToken,
}

impl Client<WsConnector> {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let connector = WsConnector::new(&config.tls)?;
        Self::with_connector(connector, config)
    }
}

impl<C: Connector> Client<C> {
    pub fn with_connector(connector: C, config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            conn: Connection::new(connector, config)?,
            request_timeout: config.request_timeout,
            cancel: CancellationToken::new(),
        })
    }

    /// A token that aborts any in-flight action when cancelled. The
    /// connection survives cancellation, and a fresh token is minted
    /// once a cancelled action has resolved -- re-fetch this before
    /// arming the next interrupt.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn close(&mut self) {
        self.conn.close().await;
    }

    // ── Actions ──────────────────────────────────────────────────

    /// Deploys the staged configuration across the cluster.
    pub async fn deploy(&mut self) -> Result<DeployOutcome, ClientError> {
        let (event, reqid) = events::deploy_request();
        let response = self
            .controller_request(event, reqid, events::DEPLOY_RESPONSE)
            .await?;
        let results = results_arg(&response)?;
        Ok(DeployOutcome::from_results(results))
    }

    /// Fetches the staged (or, with `deployed`, the running)
    /// configuration.
    pub async fn get_configuration(
        &mut self,
        deployed: bool,
    ) -> Result<Configuration, ClientError> {
        let (event, reqid) = events::get_configuration_request(deployed);
        let response = self
            .controller_request(event, reqid, events::GET_CONFIGURATION_RESPONSE)
            .await?;
        let result = single_result(&response)?;
        if !result.success {
            return Err(remote_failure(&result));
        }
        let data = require_data(&result, "get_configuration")?;
        Ok(Configuration::from_value(data)?)
    }

    /// Reads a script-level variable on the given nodes (all nodes
    /// when the set is empty).
    pub async fn get_id_value(
        &mut self,
        id: &str,
        nodes: &BTreeSet<String>,
    ) -> Result<IdValueOutcome, ClientError> {
        let (event, reqid) = events::get_id_value_request(id, nodes);
        let response = self
            .controller_request(event, reqid, events::GET_ID_VALUE_RESPONSE)
            .await?;
        let results = results_arg(&response)?;

        let mut outcome = IdValueOutcome::default();
        for result in results {
            if !result.success {
                outcome.errors.push(result);
                continue;
            }
            let node = match &result.node {
                Some(node) => node.clone(),
                None => {
                    outcome.errors.push(result);
                    continue;
                }
            };
            if let Some(data) = &result.data {
                outcome.values.insert(node, data.clone());
            }
        }
        Ok(outcome)
    }

    /// Lists the instances currently peered with the controller.
    pub async fn get_instances(&mut self) -> Result<Vec<Instance>, ClientError> {
        let (event, reqid) = events::get_instances_request();
        let response = self
            .controller_request(event, reqid, events::GET_INSTANCES_RESPONSE)
            .await?;
        let result = single_result(&response)?;
        if !result.success {
            return Err(remote_failure(&result));
        }
        let data = require_data(&result, "get_instances")?;
        let entries = data.as_vector().ok_or_else(|| {
            malformed(format!(
                "get_instances data: expected a vector, have \"{}\"",
                data.tag()
            ))
        })?;
        let mut instances: Vec<Instance> = entries
            .iter()
            .map(Instance::from_value)
            .collect::<Result<_, _>>()?;
        instances.sort();
        Ok(instances)
    }

    /// Reports node status across the cluster, keyed by instance.
    pub async fn get_nodes(&mut self) -> Result<NodesOutcome, ClientError> {
        let (event, reqid) = events::get_nodes_request();
        let response = self
            .controller_request(event, reqid, events::GET_NODES_RESPONSE)
            .await?;
        let results = results_arg(&response)?;

        let mut outcome = NodesOutcome::default();
        for result in results {
            if !result.success {
                outcome.errors.push(result);
                continue;
            }
            let instance = match &result.instance {
                Some(instance) => instance.clone(),
                None => {
                    outcome.errors.push(result);
                    continue;
                }
            };
            let data = require_data(&result, "get_nodes")?;
            let entries = data.as_vector().ok_or_else(|| {
                malformed(format!(
                    "get_nodes data: expected a vector, have \"{}\"",
                    data.tag()
                ))
            })?;
            let mut statuses: Vec<NodeStatus> = entries
                .iter()
                .map(NodeStatus::from_value)
                .collect::<Result<_, _>>()?;
            statuses.sort();
            outcome.instances.insert(instance, statuses);
        }
        Ok(outcome)
    }

    /// Restarts the given nodes (all nodes when the set is empty).
    pub async fn restart(
        &mut self,
        nodes: &BTreeSet<String>,
    ) -> Result<Vec<ActionResult>, ClientError> {
        let (event, reqid) = events::restart_request(nodes);
        let response = self
            .controller_request(event, reqid, events::RESTART_RESPONSE)
            .await?;
        let mut results = results_arg(&response)?;
        results.sort();
        Ok(results)
    }

    /// Stages a new cluster configuration for later deployment.
    pub async fn stage_configuration(
        &mut self,
        config: &Configuration,
    ) -> Result<StageOutcome, ClientError> {
        let (event, reqid) = events::stage_configuration_request(config);
        let response = self
            .controller_request(event, reqid, events::STAGE_CONFIGURATION_RESPONSE)
            .await?;
        let mut results = results_arg(&response)?;
        results.sort();

        // A successful staging reports the new configuration id as
        // result data.
        let id = results
            .iter()
            .filter(|r| r.success)
            .find_map(|r| r.data.as_ref().and_then(Value::as_str))
            .map(str::to_owned);
        let errors: Vec<ActionResult> = results.into_iter().filter(|r| !r.success).collect();
        Ok(StageOutcome { id, errors })
    }

    // ── Plumbing ─────────────────────────────────────────────────

    async fn controller_request(
        &mut self,
        event: Event,
        reqid: String,
        response: &str,
    ) -> Result<Event, ClientError> {
        debug!(request = event.name(), %reqid, "running controller transaction");
        let spec = TransactionSpec::controller(event, response, reqid, self.request_timeout);
        match transact(&mut self.conn, spec, &self.cancel).await? {
            TransactionOutcome::Complete(responses) => responses
                .into_iter()
                .next()
                .map(|r| r.event)
                .ok_or_else(|| ClientError::Transport {
                    reason: "transaction completed without a response".to_owned(),
                }),
            TransactionOutcome::TimedOut | TransactionOutcome::Partial { .. } => {
                Err(ClientError::RequestTimeout {
                    timeout: self.request_timeout,
                })
            }
            TransactionOutcome::Cancelled => {
                // A spent token would cancel every later action on
                // this client; replace it so only the interrupted
                // transaction is lost.
                self.cancel = CancellationToken::new();
                Err(ClientError::Cancelled)
            }
        }
    }
}

// ── Outcome types ────────────────────────────────────────────────────

/// What came back from a deploy: every responder's result, the new
/// configuration id when one was reported, and captured outputs of
/// nodes that failed to launch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployOutcome {
    pub id: Option<String>,
    pub results: Vec<ActionResult>,
    pub node_outputs: BTreeMap<String, NodeOutputs>,
}

impl DeployOutcome {
    fn from_results(mut results: Vec<ActionResult>) -> Self {
        results.sort();
        let id = results
            .iter()
            .filter(|r| r.success)
            .find_map(|r| r.data.as_ref().and_then(Value::as_str))
            .map(str::to_owned);

        let mut node_outputs = BTreeMap::new();
        for result in &results {
            if result.success {
                continue;
            }
            if let (Some(node), Some(data)) = (&result.node, &result.data) {
                if let Ok(outputs) = NodeOutputs::from_value(data) {
                    node_outputs.insert(node.clone(), outputs);
                }
            }
        }
        Self {
            id,
            results,
            node_outputs,
        }
    }

    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}

/// Per-node variable values, with failed reads kept alongside.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdValueOutcome {
    pub values: BTreeMap<String, Value>,
    pub errors: Vec<ActionResult>,
}

/// Node statuses keyed by the instance that reported them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodesOutcome {
    pub instances: BTreeMap<String, Vec<NodeStatus>>,
    pub errors: Vec<ActionResult>,
}

/// The staged configuration's id, or the per-responder errors when
/// staging was rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutcome {
    pub id: Option<String>,
    pub errors: Vec<ActionResult>,
}

// ── Response decoding ────────────────────────────────────────────────

fn malformed(context: String) -> ClientError {
    ClientError::Wire(WireError::MalformedValue { context })
}

fn remote_failure(result: &ActionResult) -> ClientError {
    ClientError::Remote {
        responder: result
            .instance
            .clone()
            .unwrap_or_else(|| "controller".to_owned()),
        error: result
            .error
            .clone()
            .unwrap_or_else(|| "unspecified failure".to_owned()),
    }
}

fn require_data<'a>(result: &'a ActionResult, what: &str) -> Result<&'a Value, ClientError> {
    result
        .data
        .as_ref()
        .ok_or_else(|| malformed(format!("{what}: successful result carries no data")))
}

/// Responses shaped `(reqid, results: vector of Result)`.
fn results_arg(event: &Event) -> Result<Vec<ActionResult>, ClientError> {
    let arg = event.args().get(1).ok_or_else(|| {
        malformed(format!("{}: missing results argument", event.name()))
    })?;
    let entries = arg.as_vector().ok_or_else(|| {
        malformed(format!(
            "{}: results argument has tag \"{}\", expected a vector",
            event.name(),
            arg.tag()
        ))
    })?;
    let results = entries
        .iter()
        .map(ActionResult::from_value)
        .collect::<Result<_, _>>()?;
    Ok(results)
}

/// Responses shaped `(reqid, result: Result)`.
fn single_result(event: &Event) -> Result<ActionResult, ClientError> {
    let arg = event.args().get(1).ok_or_else(|| {
        malformed(format!("{}: missing result argument", event.name()))
    })?;
    Ok(ActionResult::from_value(arg)?)
}
