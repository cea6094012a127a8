//! Error types surfaced at the request boundary. Following the
//! source's own choice, these are hand-written enums with manual
//! `Display`/`Error` impls rather than a derive-macro crate.

use std::fmt;

use dns_types::protocol::types::{DomainName, QueryType};

/// Something went wrong while resolving a question, either
/// authoritatively or recursively.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResolutionError {
    /// The recursion depth limit (see `recursive::MAX_RECURSION_DEPTH`)
    /// was hit before an answer or a dead end was reached.
    RecursionLimit,

    /// An upstream query did not get a reply within the timeout.
    Timeout { server: std::net::Ipv4Addr },

    /// Sending to or receiving from an upstream server failed at the
    /// socket level.
    Io { server: std::net::Ipv4Addr },

    /// A delegation's NS record had no matching glue A record, and
    /// there is nowhere left to refer to.
    DeadEnd {
        qname: DomainName,
        qtype: QueryType,
    },
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::RecursionLimit => write!(f, "hit the recursion depth limit"),
            ResolutionError::Timeout { server } => write!(f, "upstream {server} timed out"),
            ResolutionError::Io { server } => write!(f, "I/O error talking to upstream {server}"),
            ResolutionError::DeadEnd { qname, qtype } => write!(
                f,
                "no further referral for {} {:?}",
                qname.to_dotted_string(),
                qtype
            ),
        }
    }
}

impl std::error::Error for ResolutionError {}
