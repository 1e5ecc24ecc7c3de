//! Events: a name plus a positional argument list.
//!
//! On the wire an event is a 2-slot record, `[name, args]`; the
//! receiving side dispatches on the name and interprets the arguments
//! positionally. Application-level schemas (which arguments a given
//! event carries) are left to the layers above.

use crate::error::WireError;
use crate::value::Value;

/// One management event, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    name: String,
    args: Vec<Value>,
}

impl Event {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The wire form: a record of `[String(name), Vector(args)]`.
    pub fn to_value(&self) -> Value {
        Value::Record(vec![
            Value::String(self.name.clone()),
            Value::Vector(self.args.clone()),
        ])
    }

    /// Inverse of [`Event::to_value`]. Anything other than a 2-slot
    /// record of string and vector is a [`WireError::MalformedEvent`].
    pub fn from_value(value: &Value) -> Result<Self, WireError> {
        let slots = value
            .expect_record(2)
            .map_err(|err| WireError::event(format!("not an event record: {err}")))?;
        let name = slots[0]
            .as_str()
            .ok_or_else(|| {
                WireError::event(format!(
                    "event name slot has tag \"{}\", expected a string",
                    slots[0].tag()
                ))
            })?
            .to_owned();
        let args = slots[1]
            .as_vector()
            .ok_or_else(|| {
                WireError::event(format!(
                    "event argument slot has tag \"{}\", expected a vector",
                    slots[1].tag()
                ))
            })?
            .to_vec();
        Ok(Self { name, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn roundtrips_through_value() {
        let event = Event::new(
            "Management::Controller::API::get_nodes_request",
            vec![Value::string("req-1")],
        );
        let back = Event::from_value(&event.to_value()).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn empty_args_are_allowed() {
        let event = Event::new("ping", vec![]);
        let back = Event::from_value(&event.to_value()).unwrap();
        assert_eq!(back.args(), &[]);
    }

    #[test]
    fn rejects_non_event_shapes() {
        // Wrong arity.
        let err = Event::from_value(&Value::Record(vec![Value::string("x")])).unwrap_err();
        assert!(matches!(err, WireError::MalformedEvent { .. }));

        // Swapped slots.
        let err = Event::from_value(&Value::Record(vec![
            Value::Vector(vec![]),
            Value::string("x"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("event name slot"), "{err}");

        // Second slot not a vector.
        let err = Event::from_value(&Value::Record(vec![
            Value::string("x"),
            Value::Count(1),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("event argument slot"), "{err}");

        // Not a record at all.
        let err = Event::from_value(&Value::Vector(vec![
            Value::string("x"),
            Value::Vector(vec![]),
        ]))
        .unwrap_err();
        assert!(matches!(err, WireError::MalformedEvent { .. }));
    }

    #[test]
    fn equality_covers_name_and_args() {
        let a = Event::new("e", vec![Value::Count(1)]);
        assert_eq!(a, Event::new("e", vec![Value::Count(1)]));
        assert_ne!(a, Event::new("e", vec![Value::Integer(1)]));
        assert_ne!(a, Event::new("f", vec![Value::Count(1)]));
    }
}
