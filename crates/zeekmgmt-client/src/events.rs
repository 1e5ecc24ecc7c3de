//! The controller's request/response event vocabulary.
//!
//! Every request constructor mints a fresh correlation token as
//! argument 0 and hands it back alongside the event; responses echo it
//! in the same position, which is what the transaction engine matches
//! on.

use std::collections::BTreeSet;

use uuid::Uuid;

use zeekmgmt_wire::{Event, Value};

use crate::types::Configuration;

pub const DEPLOY_REQUEST: &str = "Management::Controller::API::deploy_request";
pub const DEPLOY_RESPONSE: &str = "Management::Controller::API::deploy_response";
pub const GET_CONFIGURATION_REQUEST: &str = "Management::Controller::API::get_configuration_request";
pub const GET_CONFIGURATION_RESPONSE: &str =
    "Management::Controller::API::get_configuration_response";
pub const GET_ID_VALUE_REQUEST: &str = "Management::Controller::API::get_id_value_request";
pub const GET_ID_VALUE_RESPONSE: &str = "Management::Controller::API::get_id_value_response";
pub const GET_INSTANCES_REQUEST: &str = "Management::Controller::API::get_instances_request";
pub const GET_INSTANCES_RESPONSE: &str = "Management::Controller::API::get_instances_response";
pub const GET_NODES_REQUEST: &str = "Management::Controller::API::get_nodes_request";
pub const GET_NODES_RESPONSE: &str = "Management::Controller::API::get_nodes_response";
pub const RESTART_REQUEST: &str = "Management::Controller::API::restart_request";
pub const RESTART_RESPONSE: &str = "Management::Controller::API::restart_response";
pub const STAGE_CONFIGURATION_REQUEST: &str =
    "Management::Controller::API::stage_configuration_request";
pub const STAGE_CONFIGURATION_RESPONSE: &str =
    "Management::Controller::API::stage_configuration_response";
pub const TEST_NOOP_REQUEST: &str = "Management::Controller::API::test_noop_request";
pub const TEST_TIMEOUT_REQUEST: &str = "Management::Controller::API::test_timeout_request";
pub const TEST_TIMEOUT_RESPONSE: &str = "Management::Controller::API::test_timeout_response";

fn fresh_reqid() -> String {
    Uuid::new_v4().to_string()
}

fn request(name: &str, mut args: Vec<Value>) -> (Event, String) {
    let reqid = fresh_reqid();
    args.insert(0, Value::string(reqid.clone()));
    (Event::new(name, args), reqid)
}

/// `deploy_request(reqid)` -- deploy the staged configuration.
pub fn deploy_request() -> (Event, String) {
    request(DEPLOY_REQUEST, vec![])
}

/// `get_configuration_request(reqid, deployed)` -- fetch the staged or
/// the deployed configuration.
pub fn get_configuration_request(deployed: bool) -> (Event, String) {
    request(GET_CONFIGURATION_REQUEST, vec![Value::Boolean(deployed)])
}

/// `get_id_value_request(reqid, id, nodes)` -- read a script-level
/// variable on the given nodes, all of them when empty.
pub fn get_id_value_request(id: &str, nodes: &BTreeSet<String>) -> (Event, String) {
    let nodes = Value::Set(nodes.iter().map(|n| Value::string(n.clone())).collect());
    request(
        GET_ID_VALUE_REQUEST,
        vec![Value::string(id), nodes],
    )
}

/// `get_instances_request(reqid)` -- list the connected instances.
pub fn get_instances_request() -> (Event, String) {
    request(GET_INSTANCES_REQUEST, vec![])
}

/// `get_nodes_request(reqid)` -- report node status across instances.
pub fn get_nodes_request() -> (Event, String) {
    request(GET_NODES_REQUEST, vec![])
}

/// `restart_request(reqid, nodes)` -- restart the given nodes, all of
/// them when empty.
pub fn restart_request(nodes: &BTreeSet<String>) -> (Event, String) {
    let nodes = Value::Set(nodes.iter().map(|n| Value::string(n.clone())).collect());
    request(RESTART_REQUEST, vec![nodes])
}

/// `stage_configuration_request(reqid, config)` -- stage a new cluster
/// configuration.
pub fn stage_configuration_request(config: &Configuration) -> (Event, String) {
    request(STAGE_CONFIGURATION_REQUEST, vec![config.to_value()])
}

/// `test_noop_request(reqid)` -- diagnostic request the controller
/// swallows without answering.
pub fn test_noop_request() -> (Event, String) {
    request(TEST_NOOP_REQUEST, vec![])
}

/// `test_timeout_request(reqid, with_state)` -- diagnostic request the
/// controller answers only when `with_state` is set.
pub fn test_timeout_request(with_state: bool) -> (Event, String) {
    request(TEST_TIMEOUT_REQUEST, vec![Value::Boolean(with_state)])
}
