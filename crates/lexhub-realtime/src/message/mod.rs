//! Wire message definitions: outbound envelopes, inbound commands,
//! builders, and validation.

pub mod builder;
pub mod types;
pub mod validator;

pub use types::{Envelope, ErrorCode, InboundCommand, InboundMessage, MessageType};
