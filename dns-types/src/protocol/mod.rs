//! The DNS wire protocol: message/header/question/RR types, and their
//! (de)serialisation to and from the wire format.

pub mod deserialise;
pub mod serialise;
pub mod types;

pub use types::*;
