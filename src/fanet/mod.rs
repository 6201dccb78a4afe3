pub mod codec;
pub mod error;

pub use codec::{decode, encode, topic_packet_type};
pub use error::ParseError;
