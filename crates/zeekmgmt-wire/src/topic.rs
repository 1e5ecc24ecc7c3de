//! Pub/sub topic names.
//!
//! The controller listens on a single well-known topic; each agent
//! listens on a topic derived from its instance name. The derivation is
//! injective, so an inbound message's topic identifies the responder.

use std::fmt;

const CONTROLLER_TOPIC: &str = "zeek/management/controller";
const AGENT_TOPIC_PREFIX: &str = "zeek/management/agent/";

/// A pub/sub topic name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Topic(String);

impl Topic {
    /// The controller's well-known topic.
    pub fn controller() -> Self {
        Topic(CONTROLLER_TOPIC.to_owned())
    }

    /// The topic of the agent on the named instance.
    pub fn agent(instance: &str) -> Self {
        Topic(format!("{AGENT_TOPIC_PREFIX}{instance}"))
    }

    /// Wraps a topic string received from the peer.
    pub fn from_wire(name: impl Into<String>) -> Self {
        Topic(name.into())
    }

    /// Inverse of [`Topic::agent`]: the instance name for an agent
    /// topic, `None` for the controller topic and foreign topics.
    pub fn instance(&self) -> Option<&str> {
        self.0
            .strip_prefix(AGENT_TOPIC_PREFIX)
            .filter(|name| !name.is_empty())
    }

    pub fn is_controller(&self) -> bool {
        self.0 == CONTROLLER_TOPIC
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn controller_topic_is_fixed() {
        assert_eq!(Topic::controller().as_str(), "zeek/management/controller");
        assert!(Topic::controller().is_controller());
        assert_eq!(Topic::controller().instance(), None);
    }

    #[test]
    fn agent_topic_embeds_the_instance() {
        let topic = Topic::agent("instance-1");
        assert_eq!(topic.as_str(), "zeek/management/agent/instance-1");
        assert_eq!(topic.instance(), Some("instance-1"));
        assert!(!topic.is_controller());
    }

    #[test]
    fn agent_derivation_is_injective() {
        assert_ne!(Topic::agent("a"), Topic::agent("b"));
        assert_eq!(Topic::agent("a"), Topic::agent("a"));
    }

    #[test]
    fn foreign_topics_have_no_instance() {
        assert_eq!(Topic::from_wire("some/other/topic").instance(), None);
        assert_eq!(Topic::from_wire("zeek/management/agent/").instance(), None);
    }
}
