use thiserror::Error;

/// A stored permission document that does not have the expected shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("permission document must be an object at {path}")]
    NotAnObject { path: String },
    #[error("permission flag at {path} must be a boolean")]
    NotABoolean { path: String },
    #[error("node at {path} mixes verb flags with nested scopes")]
    MixedNode { path: String },
    #[error("permission document root cannot be a verb leaf")]
    LeafAtRoot,
}

/// Failure raised by a [`crate::MembershipLookup`] implementation.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("membership backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("stored permission document is malformed: {0}")]
    Malformed(#[from] DocumentError),
}

impl LookupError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Why a request was denied. Only ever surfaces in logs.
#[derive(Debug, Error)]
pub enum DenyReason {
    #[error("project or principal missing from request")]
    MissingContext,
    #[error("principal is not a member of the project")]
    NoMembership,
    #[error("permission key does not resolve at segment {segment:?}")]
    MalformedPath { segment: String },
    #[error("verb {verb} not granted")]
    VerbNotGranted { verb: crate::Verb },
    #[error("membership lookup failed: {0}")]
    CollaboratorFailure(#[from] LookupError),
}
