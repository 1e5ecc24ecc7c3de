//! Typed mirrors of the management protocol's records.
//!
//! The remote side models cluster state as records of tagged values;
//! each type here carries `to_value`/`from_value` for that shape.
//! Optional fields travel as `none`. Everything orders
//! deterministically (nodes by name, results by instance then node) so
//! aggregated output is reproducible.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::net::IpAddr;

use zeekmgmt_wire::{Port, Proto, Value, WireError};

fn malformed(context: String) -> WireError {
    WireError::MalformedValue { context }
}

// ── Enums ────────────────────────────────────────────────────────────

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident, $scope:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// The scoped member name used on the wire.
            pub fn wire_name(&self) -> &'static str {
                match self {
                    $(Self::$variant => concat!($scope, "::", $label)),+
                }
            }

            pub fn to_value(&self) -> Value {
                Value::enum_value(self.wire_name())
            }

            pub fn from_value(value: &Value) -> Result<Self, WireError> {
                let name = value.as_enum().ok_or_else(|| {
                    malformed(format!(
                        concat!(stringify!($name), ": expected an enum-value, have tag \"{}\""),
                        value.tag()
                    ))
                })?;
                $(
                    if name == concat!($scope, "::", $label) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(malformed(format!(
                    concat!(stringify!($name), ": unknown member \"{}\""),
                    name
                )))
            }
        }
    };
}

wire_enum!(
    /// A node's role in the cluster proper (`Supervisor::ClusterRole`).
    ClusterRole, "Supervisor", {
        None => "NONE",
        Logger => "LOGGER",
        Manager => "MANAGER",
        Proxy => "PROXY",
        Worker => "WORKER",
    }
);

wire_enum!(
    /// A process's role in the management layer (`Management::Role`).
    ManagementRole, "Management", {
        None => "NONE",
        Agent => "AGENT",
        Controller => "CONTROLLER",
        Node => "NODE",
    }
);

wire_enum!(
    /// A node's lifecycle state (`Management::State`).
    NodeState, "Management", {
        Pending => "PENDING",
        Running => "RUNNING",
        Stopped => "STOPPED",
        Failed => "FAILED",
        Crashed => "CRASHED",
        Unknown => "UNKNOWN",
    }
);

// ── Slot helpers ─────────────────────────────────────────────────────

fn slot_context(record: &str, idx: usize, detail: impl std::fmt::Display) -> WireError {
    malformed(format!("{record} slot {idx}: {detail}"))
}

fn slot_string(record: &str, slots: &[Value], idx: usize) -> Result<String, WireError> {
    slots[idx]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| slot_context(record, idx, format!("expected a string, have \"{}\"", slots[idx].tag())))
}

fn slot_opt_string(record: &str, slots: &[Value], idx: usize) -> Result<Option<String>, WireError> {
    match &slots[idx] {
        Value::None => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(slot_context(record, idx, format!("expected a string or none, have \"{}\"", other.tag()))),
    }
}

fn slot_opt_port(record: &str, slots: &[Value], idx: usize) -> Result<Option<u16>, WireError> {
    match &slots[idx] {
        Value::None => Ok(None),
        Value::Port(p) => Ok(Some(p.number)),
        other => Err(slot_context(record, idx, format!("expected a port or none, have \"{}\"", other.tag()))),
    }
}

fn opt_port_value(port: Option<u16>) -> Value {
    match port {
        Some(number) => Value::Port(Port::new(number, Proto::Tcp)),
        None => Value::None,
    }
}

fn opt_string_value(s: &Option<String>) -> Value {
    match s {
        Some(s) => Value::string(s.clone()),
        None => Value::None,
    }
}

// ── Instance ─────────────────────────────────────────────────────────

/// One machine in the cluster, running an agent.
///
/// A listening instance carries host and port (the controller connects
/// to it); an instance without a port connects to the controller
/// itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instance {
    pub name: String,
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
}

impl Instance {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
            port: None,
        }
    }

    pub fn listening(name: impl Into<String>, host: IpAddr, port: u16) -> Self {
        Self {
            name: name.into(),
            host: Some(host),
            port: Some(port),
        }
    }

    pub fn to_value(&self) -> Value {
        let host = match self.host {
            Some(addr) => Value::Address(addr),
            None => Value::None,
        };
        Value::Record(vec![
            Value::string(self.name.clone()),
            host,
            opt_port_value(self.port),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self, WireError> {
        let slots = value.expect_record(3)?;
        let host = match &slots[1] {
            Value::None => None,
            Value::Address(addr) => Some(*addr),
            other => {
                return Err(slot_context(
                    "Instance",
                    1,
                    format!("expected an address or none, have \"{}\"", other.tag()),
                ))
            }
        };
        Ok(Self {
            name: slot_string("Instance", slots, 0)?,
            host,
            port: slot_opt_port("Instance", slots, 2)?,
        })
    }
}

// ── Node ─────────────────────────────────────────────────────────────

/// A named key/value setting attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeOption {
    pub name: String,
    pub value: String,
}

impl NodeOption {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    fn to_value(&self) -> Value {
        Value::Record(vec![
            Value::string(self.name.clone()),
            Value::string(self.value.clone()),
        ])
    }

    fn from_value(value: &Value) -> Result<Self, WireError> {
        let slots = value.expect_record(2)?;
        Ok(Self {
            name: slot_string("Option", slots, 0)?,
            value: slot_string("Option", slots, 1)?,
        })
    }
}

/// One Zeek process in the cluster configuration. 11-slot record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub name: String,
    pub instance: String,
    pub role: ClusterRole,
    pub state: NodeState,
    pub port: Option<u16>,
    pub scripts: Vec<String>,
    pub options: Vec<NodeOption>,
    pub interface: Option<String>,
    pub cpu_affinity: Option<u64>,
    pub env: BTreeMap<String, String>,
    pub metrics_port: Option<u16>,
}

impl Node {
    pub fn new(name: impl Into<String>, instance: impl Into<String>, role: ClusterRole) -> Self {
        Self {
            name: name.into(),
            instance: instance.into(),
            role,
            state: NodeState::Running,
            port: None,
            scripts: Vec::new(),
            options: Vec::new(),
            interface: None,
            cpu_affinity: None,
            env: BTreeMap::new(),
            metrics_port: None,
        }
    }

    pub fn to_value(&self) -> Value {
        let scripts = if self.scripts.is_empty() {
            Value::None
        } else {
            Value::Vector(self.scripts.iter().map(|s| Value::string(s.clone())).collect())
        };
        let options = if self.options.is_empty() {
            Value::None
        } else {
            Value::Set(self.options.iter().map(NodeOption::to_value).collect())
        };
        let env = Value::Table(
            self.env
                .iter()
                .map(|(k, v)| (Value::string(k.clone()), Value::string(v.clone())))
                .collect(),
        );
        Value::Record(vec![
            Value::string(self.name.clone()),
            Value::string(self.instance.clone()),
            self.role.to_value(),
            self.state.to_value(),
            opt_port_value(self.port),
            scripts,
            options,
            opt_string_value(&self.interface),
            self.cpu_affinity.map(Value::Count).unwrap_or(Value::None),
            env,
            opt_port_value(self.metrics_port),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self, WireError> {
        let slots = value.expect_record(11)?;

        let scripts = match &slots[5] {
            Value::None => Vec::new(),
            Value::Vector(elems) => {
                let mut out = Vec::with_capacity(elems.len());
                for elem in elems {
                    out.push(elem.as_str().map(str::to_owned).ok_or_else(|| {
                        slot_context("Node", 5, "script entries must be strings")
                    })?);
                }
                out
            }
            other => {
                return Err(slot_context(
                    "Node",
                    5,
                    format!("expected a vector or none, have \"{}\"", other.tag()),
                ))
            }
        };

        let options = match &slots[6] {
            Value::None => Vec::new(),
            Value::Set(elems) => {
                let mut out: Vec<NodeOption> =
                    elems.iter().map(NodeOption::from_value).collect::<Result<_, _>>()?;
                out.sort();
                out
            }
            other => {
                return Err(slot_context(
                    "Node",
                    6,
                    format!("expected a set or none, have \"{}\"", other.tag()),
                ))
            }
        };

        let cpu_affinity = match &slots[8] {
            Value::None => None,
            Value::Count(n) => Some(*n),
            other => {
                return Err(slot_context(
                    "Node",
                    8,
                    format!("expected a count or none, have \"{}\"", other.tag()),
                ))
            }
        };

        let env = match &slots[9] {
            Value::None => BTreeMap::new(),
            Value::Table(entries) => {
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    let key = k.as_str().ok_or_else(|| {
                        slot_context("Node", 9, "environment keys must be strings")
                    })?;
                    let val = v.as_str().ok_or_else(|| {
                        slot_context("Node", 9, "environment values must be strings")
                    })?;
                    out.insert(key.to_owned(), val.to_owned());
                }
                out
            }
            other => {
                return Err(slot_context(
                    "Node",
                    9,
                    format!("expected a table or none, have \"{}\"", other.tag()),
                ))
            }
        };

        Ok(Self {
            name: slot_string("Node", slots, 0)?,
            instance: slot_string("Node", slots, 1)?,
            role: ClusterRole::from_value(&slots[2])?,
            state: NodeState::from_value(&slots[3])?,
            port: slot_opt_port("Node", slots, 4)?,
            scripts,
            options,
            interface: slot_opt_string("Node", slots, 7)?,
            cpu_affinity,
            env,
            metrics_port: slot_opt_port("Node", slots, 10)?,
        })
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

// ── Configuration ────────────────────────────────────────────────────

/// A full cluster configuration: its identifier plus the instance and
/// node sets. 3-slot record; the sets arrive unordered and are sorted
/// on decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub id: String,
    pub instances: Vec<Instance>,
    pub nodes: Vec<Node>,
}

impl Configuration {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            instances: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Record(vec![
            Value::string(self.id.clone()),
            Value::Set(self.instances.iter().map(Instance::to_value).collect()),
            Value::Set(self.nodes.iter().map(Node::to_value).collect()),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self, WireError> {
        let slots = value.expect_record(3)?;
        let instances_set = slots[1]
            .as_set()
            .ok_or_else(|| slot_context("Configuration", 1, "expected a set of instances"))?;
        let nodes_set = slots[2]
            .as_set()
            .ok_or_else(|| slot_context("Configuration", 2, "expected a set of nodes"))?;

        let mut instances: Vec<Instance> = instances_set
            .iter()
            .map(Instance::from_value)
            .collect::<Result<_, _>>()?;
        let mut nodes: Vec<Node> =
            nodes_set.iter().map(Node::from_value).collect::<Result<_, _>>()?;
        instances.sort();
        nodes.sort();

        Ok(Self {
            id: slot_string("Configuration", slots, 0)?,
            instances,
            nodes,
        })
    }
}

// ── NodeStatus ───────────────────────────────────────────────────────

/// A running node's reported status. 7-slot record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeStatus {
    pub node: String,
    pub state: NodeState,
    pub mgmt_role: ManagementRole,
    pub cluster_role: ClusterRole,
    pub pid: Option<i64>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
}

impl NodeStatus {
    pub fn to_value(&self) -> Value {
        Value::Record(vec![
            Value::string(self.node.clone()),
            self.state.to_value(),
            self.mgmt_role.to_value(),
            self.cluster_role.to_value(),
            self.pid.map(Value::Integer).unwrap_or(Value::None),
            opt_port_value(self.port),
            opt_port_value(self.metrics_port),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self, WireError> {
        let slots = value.expect_record(7)?;
        let pid = match &slots[4] {
            Value::None => None,
            Value::Integer(pid) => Some(*pid),
            other => {
                return Err(slot_context(
                    "NodeStatus",
                    4,
                    format!("expected an integer or none, have \"{}\"", other.tag()),
                ))
            }
        };
        Ok(Self {
            node: slot_string("NodeStatus", slots, 0)?,
            state: NodeState::from_value(&slots[1])?,
            mgmt_role: ManagementRole::from_value(&slots[2])?,
            cluster_role: ClusterRole::from_value(&slots[3])?,
            pid,
            port: slot_opt_port("NodeStatus", slots, 5)?,
            metrics_port: slot_opt_port("NodeStatus", slots, 6)?,
        })
    }
}

impl PartialOrd for NodeStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.node.cmp(&other.node)
    }
}

// ── ActionResult ─────────────────────────────────────────────────────

/// One responder's result for a management action. 6-slot record.
///
/// `data` is any-typed on the remote side and passes through as a raw
/// value; the operation that issued the request knows what to decode
/// it into. A failed result stays a per-responder fact -- one
/// responder failing never invalidates the others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub reqid: String,
    pub success: bool,
    pub instance: Option<String>,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub node: Option<String>,
}

impl ActionResult {
    pub fn to_value(&self) -> Value {
        Value::Record(vec![
            Value::string(self.reqid.clone()),
            Value::Boolean(self.success),
            opt_string_value(&self.instance),
            self.data.clone().unwrap_or(Value::None),
            opt_string_value(&self.error),
            opt_string_value(&self.node),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self, WireError> {
        let slots = value.expect_record(6)?;
        let success = slots[1].as_bool().ok_or_else(|| {
            slot_context("Result", 1, format!("expected a boolean, have \"{}\"", slots[1].tag()))
        })?;
        let data = if slots[3].is_none() {
            None
        } else {
            Some(slots[3].clone())
        };
        Ok(Self {
            reqid: slot_string("Result", slots, 0)?,
            success,
            instance: slot_opt_string("Result", slots, 2)?,
            data,
            error: slot_opt_string("Result", slots, 4)?,
            node: slot_opt_string("Result", slots, 5)?,
        })
    }
}

impl PartialOrd for ActionResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ActionResult {
    // Results sort by source instance first (results without one
    // last), then by node name.
    fn cmp(&self, other: &Self) -> Ordering {
        let key = |r: &Self| (r.instance.is_none(), r.instance.clone(), r.node.clone());
        key(self).cmp(&key(other))
    }
}

// ── NodeOutputs ──────────────────────────────────────────────────────

/// Captured stdout/stderr of a failed node. 2-slot record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOutputs {
    pub stdout: String,
    pub stderr: String,
}

impl NodeOutputs {
    pub fn to_value(&self) -> Value {
        Value::Record(vec![
            Value::string(self.stdout.clone()),
            Value::string(self.stderr.clone()),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self, WireError> {
        let slots = value.expect_record(2)?;
        Ok(Self {
            stdout: slot_string("NodeOutputs", slots, 0)?,
            stderr: slot_string("NodeOutputs", slots, 1)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_node() -> Node {
        let mut node = Node::new("worker-01", "instance-1", ClusterRole::Worker);
        node.port = Some(2150);
        node.scripts = vec!["policy/misc/stats".to_owned()];
        node.options = vec![NodeOption::new("LogAscii::use_json", "T")];
        node.interface = Some("eth0".to_owned());
        node.cpu_affinity = Some(2);
        node.env.insert("ZEEK_DEFAULT_LISTEN".to_owned(), "1".to_owned());
        node.metrics_port = Some(9090);
        node
    }

    #[test]
    fn enums_roundtrip_with_scoped_names() {
        assert_eq!(ClusterRole::Worker.wire_name(), "Supervisor::WORKER");
        assert_eq!(ManagementRole::Agent.wire_name(), "Management::AGENT");
        assert_eq!(NodeState::Crashed.wire_name(), "Management::CRASHED");

        for role in [
            ClusterRole::None,
            ClusterRole::Logger,
            ClusterRole::Manager,
            ClusterRole::Proxy,
            ClusterRole::Worker,
        ] {
            assert_eq!(ClusterRole::from_value(&role.to_value()).unwrap(), role);
        }
    }

    #[test]
    fn unknown_enum_member_rejected() {
        let err = ClusterRole::from_value(&Value::enum_value("Supervisor::JANITOR")).unwrap_err();
        assert!(err.to_string().contains("unknown member"), "{err}");

        let err = ClusterRole::from_value(&Value::string("Supervisor::WORKER")).unwrap_err();
        assert!(err.to_string().contains("expected an enum-value"), "{err}");
    }

    #[test]
    fn instance_roundtrips() {
        let listening =
            Instance::listening("instance-1", "10.0.0.5".parse().unwrap(), 2151);
        assert_eq!(Instance::from_value(&listening.to_value()).unwrap(), listening);

        let connecting = Instance::new("instance-2");
        assert_eq!(
            Instance::from_value(&connecting.to_value()).unwrap(),
            connecting
        );
    }

    #[test]
    fn node_roundtrips_full_and_minimal() {
        let full = sample_node();
        assert_eq!(Node::from_value(&full.to_value()).unwrap(), full);

        let minimal = Node::new("manager", "instance-1", ClusterRole::Manager);
        assert_eq!(Node::from_value(&minimal.to_value()).unwrap(), minimal);
    }

    #[test]
    fn node_arity_mismatch_rejected() {
        let err = Node::from_value(&Value::Record(vec![Value::string("x")])).unwrap_err();
        assert!(err.to_string().contains("expected 11 slots"), "{err}");
    }

    #[test]
    fn configuration_roundtrips_sorted() {
        let mut config = Configuration::new("cfg-1");
        config.instances = vec![Instance::new("a"), Instance::new("b")];
        config.nodes = vec![
            Node::new("manager", "a", ClusterRole::Manager),
            Node::new("worker-01", "b", ClusterRole::Worker),
        ];
        let back = Configuration::from_value(&config.to_value()).unwrap();
        assert_eq!(back, config);
        assert!(back.nodes.windows(2).all(|w| w[0].name <= w[1].name));
    }

    #[test]
    fn node_status_roundtrips() {
        let status = NodeStatus {
            node: "worker-01".to_owned(),
            state: NodeState::Running,
            mgmt_role: ManagementRole::Node,
            cluster_role: ClusterRole::Worker,
            pid: Some(4242),
            port: Some(2150),
            metrics_port: None,
        };
        assert_eq!(NodeStatus::from_value(&status.to_value()).unwrap(), status);
    }

    #[test]
    fn action_result_roundtrips_and_passes_data_through() {
        let result = ActionResult {
            reqid: "req-1".to_owned(),
            success: true,
            instance: Some("instance-1".to_owned()),
            data: Some(Value::Vector(vec![Value::Count(1)])),
            error: None,
            node: Some("worker-01".to_owned()),
        };
        assert_eq!(ActionResult::from_value(&result.to_value()).unwrap(), result);

        let failed = ActionResult {
            reqid: "req-1".to_owned(),
            success: false,
            instance: None,
            data: None,
            error: Some("no such node".to_owned()),
            node: None,
        };
        assert_eq!(ActionResult::from_value(&failed.to_value()).unwrap(), failed);
    }

    #[test]
    fn action_results_sort_by_instance_then_node() {
        let mk = |instance: Option<&str>, node: Option<&str>| ActionResult {
            reqid: "r".to_owned(),
            success: true,
            instance: instance.map(str::to_owned),
            data: None,
            error: None,
            node: node.map(str::to_owned),
        };
        let mut results = vec![
            mk(None, None),
            mk(Some("b"), Some("worker-02")),
            mk(Some("a"), Some("worker-03")),
            mk(Some("b"), Some("worker-01")),
        ];
        results.sort();
        let order: Vec<_> = results
            .iter()
            .map(|r| (r.instance.as_deref(), r.node.as_deref()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Some("a"), Some("worker-03")),
                (Some("b"), Some("worker-01")),
                (Some("b"), Some("worker-02")),
                (None, None),
            ]
        );
    }

    #[test]
    fn node_outputs_roundtrip() {
        let outputs = NodeOutputs {
            stdout: "started".to_owned(),
            stderr: "fatal: oops".to_owned(),
        };
        assert_eq!(NodeOutputs::from_value(&outputs.to_value()).unwrap(), outputs);
    }
}
