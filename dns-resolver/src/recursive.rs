//! Iterative recursive resolution, starting from a configured root.
//!
//! Deliberately simpler than a conformant resolver: bailiwick is taken
//! to be the last two labels of the question name rather than tracked
//! per-server through the referral chain (see the module's treatment
//! of `bailiwick` below), referral selection is "first NS with glue in
//! message order," and there is no longest-match nameserver cache.

use std::net::Ipv4Addr;

use async_recursion::async_recursion;
use dns_types::protocol::types::{
    QueryType, Question, Rcode, RecordType, RecordTypeWithData, ResourceRecord,
};

use crate::cache::SharedCache;
use crate::error::ResolutionError;
use crate::metrics::Metrics;
use crate::name::is_in_zone;
use crate::net;

/// No reimplementation should recurse forever against a misbehaving
/// upstream; the source imposes no limit, this one does.
pub const MAX_RECURSION_DEPTH: usize = 16;

/// The assembled pieces of a recursive resolution.
#[derive(Debug, Clone)]
pub struct RecursiveResult {
    pub rcode: Rcode,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

/// Resolve `question` starting from `root_ip`, with the default depth
/// limit.
pub async fn resolve(
    cache: &SharedCache,
    metrics: &mut Metrics,
    root_ip: Ipv4Addr,
    question: &Question,
) -> Result<RecursiveResult, ResolutionError> {
    resolve_with_depth(cache, metrics, root_ip, question, MAX_RECURSION_DEPTH).await
}

/// As `resolve`, but with an explicit depth budget — used when a CNAME
/// chase in the authoritative responder hands off to recursion partway
/// through its own depth budget.
pub async fn resolve_with_depth(
    cache: &SharedCache,
    metrics: &mut Metrics,
    root_ip: Ipv4Addr,
    question: &Question,
    depth: usize,
) -> Result<RecursiveResult, ResolutionError> {
    resolve_from(cache, metrics, root_ip, root_ip, question, depth).await
}

#[async_recursion]
async fn resolve_from(
    cache: &SharedCache,
    metrics: &mut Metrics,
    root_ip: Ipv4Addr,
    server_ip: Ipv4Addr,
    question: &Question,
    depth: usize,
) -> Result<RecursiveResult, ResolutionError> {
    if depth == 0 {
        return Err(ResolutionError::RecursionLimit);
    }

    let message = match net::query_nameserver(server_ip, question).await {
        Ok(message) => {
            metrics.nameserver_hit();
            message
        }
        Err(err) => {
            metrics.nameserver_miss();
            return Err(err);
        }
    };

    // The bailiwick is computed from the qname alone, not tracked
    // through the chain of servers queried so far. This matches the
    // last-two-labels simplification, not a per-server zone.
    let bailiwick = question.name.last_n_labels(2);
    let in_bailiwick = |rr: &ResourceRecord| is_in_zone(&rr.name, &bailiwick);

    let answers: Vec<ResourceRecord> = message.answers.into_iter().filter(in_bailiwick).collect();
    let authority: Vec<ResourceRecord> =
        message.authority.into_iter().filter(in_bailiwick).collect();
    let additional: Vec<ResourceRecord> =
        message.additional.into_iter().filter(in_bailiwick).collect();

    if message.header.rcode == Rcode::NoError {
        for rr in answers.iter().chain(authority.iter()).chain(additional.iter()) {
            cache.put(rr.clone());
        }
    }

    if question.qtype == QueryType::Record(RecordType::A) {
        let has_terminal_a = answers
            .iter()
            .any(|rr| rr.name == question.name && rr.rtype_with_data.rtype() == RecordType::A);

        if !has_terminal_a {
            let cname_target = answers.iter().find_map(|rr| match &rr.rtype_with_data {
                RecordTypeWithData::CNAME { cname } if rr.name == question.name => {
                    Some(cname.clone())
                }
                _ => None,
            });

            if let Some(target) = cname_target {
                let follow_up = Question {
                    name: target,
                    qtype: question.qtype,
                    qclass: question.qclass,
                };
                let chased =
                    resolve_from(cache, metrics, root_ip, root_ip, &follow_up, depth - 1).await?;
                let mut combined = answers;
                combined.extend(chased.answers);
                return Ok(RecursiveResult {
                    rcode: message.header.rcode,
                    answers: combined,
                    authority,
                    additional,
                });
            }
        }
    }

    if !answers.is_empty() {
        return Ok(RecursiveResult {
            rcode: message.header.rcode,
            answers,
            authority,
            additional,
        });
    }

    let is_ns_already_answered = question.qtype == QueryType::Record(RecordType::NS)
        && authority
            .iter()
            .any(|rr| rr.name == question.name && rr.rtype_with_data.rtype() == RecordType::NS);
    if is_ns_already_answered {
        return Ok(RecursiveResult {
            rcode: message.header.rcode,
            answers,
            authority,
            additional,
        });
    }

    let referral_ip = authority.iter().find_map(|rr| match &rr.rtype_with_data {
        RecordTypeWithData::NS { nsdname } => additional.iter().find_map(|add| {
            match &add.rtype_with_data {
                RecordTypeWithData::A { address } if &add.name == nsdname => Some(*address),
                _ => None,
            }
        }),
        _ => None,
    });

    if let Some(glue_ip) = referral_ip {
        resolve_from(cache, metrics, root_ip, glue_ip, question, depth - 1).await
    } else {
        Ok(RecursiveResult {
            rcode: message.header.rcode,
            answers,
            authority,
            additional,
        })
    }
}

#[cfg(test)]
mod tests {
    use dns_types::protocol::types::DomainName;

    #[test]
    fn bailiwick_is_last_two_labels() {
        let name = DomainName::from_dotted_string("www.example.com.").unwrap();
        assert_eq!(
            name.last_n_labels(2),
            DomainName::from_dotted_string("example.com.").unwrap()
        );
    }
}
