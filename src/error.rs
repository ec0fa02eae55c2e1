use std::io;

/// Everything that can go wrong between a raw packet and the flow record store.
///
/// Decoding errors drop the offending message and the collector keeps running;
/// `ConfigInvalid` is fatal at construction time.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("template {template_id} with obs domain {obs_domain_id} does not exist")]
    UnknownTemplate { obs_domain_id: u32, template_id: u16 },

    #[error("no information element registered for id {element_id} under enterprise {enterprise_id}")]
    UnknownElement { element_id: u16, enterprise_id: u32 },

    #[error("no information element named {name:?} under enterprise {enterprise_id}")]
    UnknownElementName { name: String, enterprise_id: u32 },

    #[error("{name} is not in the expected format")]
    TypeMismatch { name: String },

    #[error("{name} does not exist in the record")]
    FlowKeyIncomplete { name: &'static str },

    #[error("set type {0} is not supported")]
    UnsupportedSet(u16),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
