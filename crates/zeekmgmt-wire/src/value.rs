//! The tagged value model and its JSON wire codec.
//!
//! The management protocol exchanges dynamically typed values as JSON
//! text. The wire format has no implicit typing: every value travels as
//! `{"@data-type": <tag>, "data": <payload>}`, and the same payload
//! shape can belong to several semantic types (an address, a subnet,
//! and an enum name are all plain strings), so the tag is load-bearing.
//!
//! [`Value`] is a closed sum type with one case per wire tag. Encoding
//! is total; decoding fails with [`WireError::MalformedValue`] naming
//! the offending tag, index path, or arity. `encode` and `decode` are
//! mutual inverses for every constructible value.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::WireError;

const TAG_KEY: &str = "@data-type";
const DATA_KEY: &str = "data";

// ── Port ─────────────────────────────────────────────────────────────

/// Transport-layer protocol tag carried by a port value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Proto {
    Unknown,
    Tcp,
    Udp,
    Icmp,
}

impl Proto {
    pub fn as_str(&self) -> &'static str {
        match self {
            Proto::Unknown => "?",
            Proto::Tcp => "tcp",
            Proto::Udp => "udp",
            Proto::Icmp => "icmp",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "?" => Some(Proto::Unknown),
            "tcp" => Some(Proto::Tcp),
            "udp" => Some(Proto::Udp),
            "icmp" => Some(Proto::Icmp),
            _ => None,
        }
    }
}

/// A transport port: a number plus a protocol tag, written `80/tcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port {
    pub number: u16,
    pub proto: Proto,
}

impl Port {
    pub fn new(number: u16, proto: Proto) -> Self {
        Self { number, proto }
    }

    /// Shorthand for the common TCP case.
    pub fn tcp(number: u16) -> Self {
        Self::new(number, Proto::Tcp)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.proto.as_str())
    }
}

impl FromStr for Port {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (number, proto) = s
            .split_once('/')
            .ok_or_else(|| WireError::value(format!("port \"{s}\" lacks a /proto suffix")))?;
        let number: u16 = number
            .parse()
            .map_err(|_| WireError::value(format!("port number \"{number}\" invalid")))?;
        if number == 0 {
            return Err(WireError::value("port number 0 outside valid range"));
        }
        let proto = Proto::from_label(proto)
            .ok_or_else(|| WireError::value(format!("unknown port protocol \"{proto}\"")))?;
        Ok(Port { number, proto })
    }
}

// ── Subnet ───────────────────────────────────────────────────────────

/// A network subnet, written `addr/prefix`. The prefix length is
/// validated against the address family on construction, so every
/// `Subnet` value is encodable and re-decodable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subnet {
    addr: IpAddr,
    prefix: u8,
}

impl Subnet {
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, WireError> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(WireError::value(format!(
                "subnet prefix /{prefix} exceeds /{max} for {addr}"
            )));
        }
        Ok(Self { addr, prefix })
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl FromStr for Subnet {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| WireError::value(format!("subnet \"{s}\" lacks a /prefix suffix")))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| WireError::value(format!("subnet address \"{addr}\" invalid")))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| WireError::value(format!("subnet prefix \"{prefix}\" invalid")))?;
        Subnet::new(addr, prefix)
    }
}

// ── Value ────────────────────────────────────────────────────────────

/// One wire value: a closed tagged union with one case per wire tag.
///
/// Values are immutable trees of pure data; transformations build new
/// trees. Structural equality, a total order, and a hash consistent
/// with equality are defined recursively over the variants -- sets and
/// tables require this for membership, and the transaction engine uses
/// values as aggregation keys.
///
/// Timestamps and timespans are stored as the wire representation
/// (fractional seconds, Unix epoch for absolute time) so the codec is
/// exactly invertible; [`Value::timestamp`] and [`Value::timespan`]
/// convert from the chrono/std types at the edges.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Boolean(bool),
    Count(u64),
    Integer(i64),
    Real(f64),
    String(String),
    Enum(String),
    Address(IpAddr),
    Subnet(Subnet),
    Port(Port),
    /// Fractional seconds since the Unix epoch.
    Timestamp(f64),
    /// Fractional seconds.
    Timespan(f64),
    Vector(Vec<Value>),
    Set(BTreeSet<Value>),
    Table(BTreeMap<Value, Value>),
    /// An ordered aggregate with a fixed arity known to both ends; the
    /// slot names never travel on the wire.
    Record(Vec<Value>),
}

impl Value {
    /// The wire tag for this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Boolean(_) => "boolean",
            Value::Count(_) => "count",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::String(_) => "string",
            Value::Enum(_) => "enum-value",
            Value::Address(_) => "address",
            Value::Subnet(_) => "subnet",
            Value::Port(_) => "port",
            Value::Timestamp(_) => "timestamp",
            Value::Timespan(_) => "timespan",
            Value::Vector(_) => "vector",
            Value::Set(_) => "set",
            Value::Table(_) => "table",
            Value::Record(_) => "record",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::None => 0,
            Value::Boolean(_) => 1,
            Value::Count(_) => 2,
            Value::Integer(_) => 3,
            Value::Real(_) => 4,
            Value::String(_) => 5,
            Value::Enum(_) => 6,
            Value::Address(_) => 7,
            Value::Subnet(_) => 8,
            Value::Port(_) => 9,
            Value::Timestamp(_) => 10,
            Value::Timespan(_) => 11,
            Value::Vector(_) => 12,
            Value::Set(_) => 13,
            Value::Table(_) => 14,
            Value::Record(_) => 15,
        }
    }

    // ── Constructors ─────────────────────────────────────────────

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn enum_value(name: impl Into<String>) -> Self {
        Value::Enum(name.into())
    }

    /// An absolute time, converted to the wire's fractional-seconds form.
    pub fn timestamp(at: DateTime<Utc>) -> Self {
        let secs = at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) / 1e9;
        Value::Timestamp(secs)
    }

    /// A time interval, converted to the wire's fractional-seconds form.
    pub fn timespan(interval: Duration) -> Self {
        Value::Timespan(interval.as_secs_f64())
    }

    /// Wraps an optional value, mapping `None` to the `none` variant.
    pub fn option(value: Option<Value>) -> Self {
        value.unwrap_or(Value::None)
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            Value::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&str> {
        match self {
            Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<IpAddr> {
        match self {
            Value::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_port(&self) -> Option<Port> {
        match self {
            Value::Port(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(secs) => Some(DateTime::from_timestamp_nanos((secs * 1e9) as i64)),
            _ => None,
        }
    }

    pub fn as_timespan(&self) -> Option<Duration> {
        match self {
            Value::Timespan(secs) => Duration::try_from_secs_f64(*secs).ok(),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[Value]> {
        match self {
            Value::Vector(elems) => Some(elems),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<Value>> {
        match self {
            Value::Set(elems) => Some(elems),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&BTreeMap<Value, Value>> {
        match self {
            Value::Table(elems) => Some(elems),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&[Value]> {
        match self {
            Value::Record(slots) => Some(slots),
            _ => None,
        }
    }

    /// Caller-supplied schema check: the value must be a record with
    /// exactly `arity` slots. Fails with [`WireError::MalformedValue`]
    /// naming the arity mismatch.
    pub fn expect_record(&self, arity: usize) -> Result<&[Value], WireError> {
        match self {
            Value::Record(slots) if slots.len() == arity => Ok(slots),
            Value::Record(slots) => Err(WireError::value(format!(
                "record arity mismatch: expected {arity} slots, have {}",
                slots.len()
            ))),
            other => Err(WireError::value(format!(
                "expected a record, have tag \"{}\"",
                other.tag()
            ))),
        }
    }

    // ── Codec ────────────────────────────────────────────────────

    /// Encodes the value into its tagged JSON wire representation.
    /// Total: never fails for a constructible value tree.
    pub fn encode(&self) -> serde_json::Value {
        let data = match self {
            Value::None => json!({}),
            Value::Boolean(b) => json!(b),
            Value::Count(n) => json!(n),
            Value::Integer(n) => json!(n),
            Value::Real(x) => encode_f64(*x),
            Value::String(s) => json!(s),
            Value::Enum(s) => json!(s),
            Value::Address(a) => json!(a.to_string()),
            Value::Subnet(s) => json!(s.to_string()),
            Value::Port(p) => json!(p.to_string()),
            Value::Timestamp(secs) => encode_f64(*secs),
            Value::Timespan(secs) => encode_f64(*secs),
            Value::Vector(elems) | Value::Record(elems) => {
                json!(elems.iter().map(Value::encode).collect::<Vec<_>>())
            }
            // BTreeSet iterates in order, so set encoding is canonical
            // regardless of insertion order.
            Value::Set(elems) => json!(elems.iter().map(Value::encode).collect::<Vec<_>>()),
            Value::Table(elems) => json!(elems
                .iter()
                .map(|(k, v)| json!({ "key": k.encode(), "value": v.encode() }))
                .collect::<Vec<_>>()),
        };
        json!({ TAG_KEY: self.tag(), DATA_KEY: data })
    }

    /// Serializes the value to raw wire text.
    pub fn to_wire(&self) -> String {
        self.encode().to_string()
    }

    /// Decodes a tagged JSON tree back into a value.
    pub fn decode(data: &serde_json::Value) -> Result<Value, WireError> {
        decode_at(data, "value")
    }

    /// Parses and decodes raw wire text.
    pub fn from_wire(text: &str) -> Result<Value, WireError> {
        let data: serde_json::Value = serde_json::from_str(text)
            .map_err(|err| WireError::value(format!("not well-formed JSON: {err}")))?;
        Value::decode(&data)
    }
}

// JSON has no literals for the non-finite floats, so reals (and the
// f64-backed time types) carry them as marker strings. Keeps encoding
// total and exactly invertible, including NaN sign.
fn encode_f64(x: f64) -> serde_json::Value {
    if x.is_finite() {
        json!(x)
    } else if x.is_nan() {
        json!(if x.is_sign_negative() { "-nan" } else { "nan" })
    } else if x.is_sign_positive() {
        json!("+inf")
    } else {
        json!("-inf")
    }
}

fn decode_f64(payload: &serde_json::Value) -> Option<f64> {
    if let Some(x) = payload.as_f64() {
        return Some(x);
    }
    match payload.as_str()? {
        "nan" => Some(f64::NAN),
        "-nan" => Some(-f64::NAN),
        "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

// The recursive decoder. `path` names the position in the tree for
// error context, e.g. "value.data[2].key".
fn decode_at(data: &serde_json::Value, path: &str) -> Result<Value, WireError> {
    let obj = data
        .as_object()
        .ok_or_else(|| WireError::value(format!("{path}: not an object")))?;
    let tag = obj
        .get(TAG_KEY)
        .and_then(|t| t.as_str())
        .ok_or_else(|| WireError::value(format!("{path}: missing \"{TAG_KEY}\" tag")))?;
    let payload = obj
        .get(DATA_KEY)
        .ok_or_else(|| WireError::value(format!("{path}: missing \"{DATA_KEY}\" payload")))?;

    let mismatch = |wanted: &str| {
        WireError::value(format!(
            "{path}: tag \"{tag}\" expects {wanted} payload, have {payload}"
        ))
    };

    match tag {
        "none" => {
            if payload.as_object().is_some_and(|o| o.is_empty()) {
                Ok(Value::None)
            } else {
                Err(mismatch("an empty object"))
            }
        }
        "boolean" => payload.as_bool().map(Value::Boolean).ok_or_else(|| mismatch("a boolean")),
        "count" => payload
            .as_u64()
            .map(Value::Count)
            .ok_or_else(|| mismatch("a non-negative integer")),
        "integer" => payload.as_i64().map(Value::Integer).ok_or_else(|| mismatch("an integer")),
        "real" => decode_f64(payload).map(Value::Real).ok_or_else(|| mismatch("a number")),
        "string" => payload
            .as_str()
            .map(Value::string)
            .ok_or_else(|| mismatch("a string")),
        "enum-value" => payload
            .as_str()
            .map(Value::enum_value)
            .ok_or_else(|| mismatch("a string")),
        "address" => {
            let text = payload.as_str().ok_or_else(|| mismatch("a string"))?;
            let addr: IpAddr = text
                .parse()
                .map_err(|_| WireError::value(format!("{path}: address \"{text}\" invalid")))?;
            Ok(Value::Address(addr))
        }
        "subnet" => {
            let text = payload.as_str().ok_or_else(|| mismatch("a string"))?;
            text.parse()
                .map(Value::Subnet)
                .map_err(|err: WireError| WireError::value(format!("{path}: {err}")))
        }
        "port" => {
            let text = payload.as_str().ok_or_else(|| mismatch("a string"))?;
            text.parse()
                .map(Value::Port)
                .map_err(|err: WireError| WireError::value(format!("{path}: {err}")))
        }
        "timestamp" => decode_f64(payload)
            .map(Value::Timestamp)
            .ok_or_else(|| mismatch("a number")),
        "timespan" => decode_f64(payload)
            .map(Value::Timespan)
            .ok_or_else(|| mismatch("a number")),
        "vector" | "record" => {
            let elems = payload.as_array().ok_or_else(|| mismatch("an array"))?;
            let mut out = Vec::with_capacity(elems.len());
            for (idx, elem) in elems.iter().enumerate() {
                out.push(decode_at(elem, &format!("{path}[{idx}]"))?);
            }
            if tag == "vector" {
                Ok(Value::Vector(out))
            } else {
                Ok(Value::Record(out))
            }
        }
        "set" => {
            let elems = payload.as_array().ok_or_else(|| mismatch("an array"))?;
            let mut out = BTreeSet::new();
            for (idx, elem) in elems.iter().enumerate() {
                let elem_path = format!("{path}[{idx}]");
                let decoded = decode_at(elem, &elem_path)?;
                if !out.insert(decoded) {
                    return Err(WireError::value(format!(
                        "{elem_path}: duplicate set element"
                    )));
                }
            }
            Ok(Value::Set(out))
        }
        "table" => {
            let entries = payload.as_array().ok_or_else(|| mismatch("an array"))?;
            let mut out = BTreeMap::new();
            for (idx, entry) in entries.iter().enumerate() {
                let entry_path = format!("{path}[{idx}]");
                let obj = entry.as_object().ok_or_else(|| {
                    WireError::value(format!("{entry_path}: table entry is not an object"))
                })?;
                let key = obj.get("key").ok_or_else(|| {
                    WireError::value(format!("{entry_path}: table entry missing \"key\""))
                })?;
                let val = obj.get("value").ok_or_else(|| {
                    WireError::value(format!("{entry_path}: table entry missing \"value\""))
                })?;
                let key = decode_at(key, &format!("{entry_path}.key"))?;
                let val = decode_at(val, &format!("{entry_path}.value"))?;
                if out.insert(key, val).is_some() {
                    return Err(WireError::value(format!(
                        "{entry_path}: duplicate table key"
                    )));
                }
            }
            Ok(Value::Table(out))
        }
        other => Err(WireError::value(format!("{path}: unknown tag \"{other}\""))),
    }
}

// ── Equality / ordering / hashing ────────────────────────────────────
//
// Manual because of the f64-carrying variants: reals compare and hash
// via their bit-level total order, which keeps Eq/Ord/Hash mutually
// consistent (NaN equals itself, -0.0 != 0.0).

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::None, Value::None) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Count(a), Value::Count(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Enum(a), Value::Enum(b)) => a.cmp(b),
            (Value::Address(a), Value::Address(b)) => a.cmp(b),
            (Value::Subnet(a), Value::Subnet(b)) => a.cmp(b),
            (Value::Port(a), Value::Port(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.total_cmp(b),
            (Value::Timespan(a), Value::Timespan(b)) => a.total_cmp(b),
            (Value::Vector(a), Value::Vector(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Table(a), Value::Table(b)) => a.cmp(b),
            (Value::Record(a), Value::Record(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::None => {}
            Value::Boolean(b) => b.hash(state),
            Value::Count(n) => n.hash(state),
            Value::Integer(n) => n.hash(state),
            Value::Real(x) | Value::Timestamp(x) | Value::Timespan(x) => {
                x.to_bits().hash(state);
            }
            Value::String(s) | Value::Enum(s) => s.hash(state),
            Value::Address(a) => a.hash(state),
            Value::Subnet(s) => s.hash(state),
            Value::Port(p) => p.hash(state),
            Value::Vector(elems) | Value::Record(elems) => elems.hash(state),
            Value::Set(elems) => elems.hash(state),
            Value::Table(elems) => elems.hash(state),
        }
    }
}

// ── Conversions from native types ────────────────────────────────────

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Count(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<IpAddr> for Value {
    fn from(a: IpAddr) -> Self {
        Value::Address(a)
    }
}

impl From<Port> for Value {
    fn from(p: Port) -> Self {
        Value::Port(p)
    }
}

impl From<Subnet> for Value {
    fn from(s: Subnet) -> Self {
        Value::Subnet(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(elems: Vec<Value>) -> Self {
        Value::Vector(elems)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
