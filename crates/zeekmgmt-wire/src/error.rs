use thiserror::Error;

/// Errors from the wire layer: the value codec and the event shape check.
///
/// The `context` string names the offending tag, the index path into the
/// tree, or the expected vs. actual arity -- enough to pinpoint what the
/// remote side actually sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The payload violates the type-tag contract.
    #[error("malformed value: {context}")]
    MalformedValue { context: String },

    /// A decoded value is not a valid event-shaped record.
    #[error("malformed event: {context}")]
    MalformedEvent { context: String },
}

impl WireError {
    pub(crate) fn value(context: impl Into<String>) -> Self {
        Self::MalformedValue {
            context: context.into(),
        }
    }

    pub(crate) fn event(context: impl Into<String>) -> Self {
        Self::MalformedEvent {
            context: context.into(),
        }
    }
}
