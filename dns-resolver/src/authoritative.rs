//! Authoritative answer assembly.
//!
//! Answers any question the dispatcher decided to hand us: either
//! because its owner is in the served zone, or because the cache
//! already holds data for it (left over from an earlier recursion).
//! See section 4.3 of the design notes for the branch-by-branch
//! algorithm this follows.

use std::net::Ipv4Addr;

use async_recursion::async_recursion;
use dns_types::protocol::types::{
    DomainName, QueryType, Question, Rcode, RecordType, RecordTypeWithData, ResourceRecord,
};

use crate::cache::SharedCache;
use crate::error::ResolutionError;
use crate::metrics::Metrics;
use crate::name::is_in_zone;
use crate::recursive::{self, MAX_RECURSION_DEPTH};

/// The assembled pieces of a response: everything the dispatcher needs
/// other than the header flags and id, which it stamps itself.
#[derive(Debug, Clone)]
pub struct AuthoritativeResult {
    pub rcode: Rcode,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
    /// Whether this reply speaks for the served zone and should set the
    /// header's AA bit. False for a delegation cut, where the NS data
    /// handed back points at someone else's servers.
    pub authoritative: bool,
}

/// Answer `question` from the cache, treating `origin` as the served
/// zone's apex. `root_ip` is needed only to chase a CNAME whose target
/// falls outside the zone.
#[async_recursion]
pub async fn resolve_authoritative(
    cache: &SharedCache,
    metrics: &mut Metrics,
    origin: &DomainName,
    root_ip: Ipv4Addr,
    question: &Question,
    depth: usize,
) -> Result<AuthoritativeResult, ResolutionError> {
    if depth == 0 {
        return Err(ResolutionError::RecursionLimit);
    }

    let in_zone = is_in_zone(&question.name, origin);

    match question.qtype {
        QueryType::Record(RecordType::A) => {
            let cname_rrs = cache.get(&question.name, RecordType::CNAME);
            if !cname_rrs.is_empty() {
                let mut answers = cname_rrs.clone();
                for rr in &cname_rrs {
                    if let RecordTypeWithData::CNAME { cname } = &rr.rtype_with_data {
                        let follow_up = Question {
                            name: cname.clone(),
                            qtype: QueryType::Record(RecordType::A),
                            qclass: question.qclass,
                        };
                        if is_in_zone(cname, origin) {
                            let chased = resolve_authoritative(
                                cache,
                                metrics,
                                origin,
                                root_ip,
                                &follow_up,
                                depth - 1,
                            )
                            .await?;
                            answers.extend(chased.answers);
                        } else {
                            let chased = recursive::resolve_with_depth(
                                cache,
                                metrics,
                                root_ip,
                                &follow_up,
                                depth - 1,
                            )
                            .await?;
                            answers.extend(chased.answers);
                        }
                    }
                }

                let authoritative = answers.iter().all(|rr| is_in_zone(&rr.name, origin));
                return Ok(AuthoritativeResult {
                    rcode: Rcode::NoError,
                    answers,
                    authority: authority_for(cache, origin, in_zone),
                    additional: Vec::new(),
                    authoritative,
                });
            }

            let a_rrs = cache.get(&question.name, RecordType::A);
            if a_rrs.is_empty() {
                Ok(nxdomain(in_zone))
            } else {
                Ok(AuthoritativeResult {
                    rcode: Rcode::NoError,
                    answers: a_rrs,
                    authority: Vec::new(),
                    additional: Vec::new(),
                    authoritative: in_zone,
                })
            }
        }

        QueryType::Record(RecordType::CNAME) => {
            let rrs = cache.get(&question.name, RecordType::CNAME);
            if rrs.is_empty() {
                Ok(nxdomain(in_zone))
            } else {
                Ok(AuthoritativeResult {
                    rcode: Rcode::NoError,
                    answers: rrs,
                    authority: authority_for(cache, origin, in_zone),
                    additional: Vec::new(),
                    authoritative: in_zone,
                })
            }
        }

        QueryType::Record(rtype @ (RecordType::MX | RecordType::TXT)) => {
            let rrs = cache.get(&question.name, rtype);
            if rrs.is_empty() {
                Ok(nxdomain(in_zone))
            } else {
                Ok(AuthoritativeResult {
                    rcode: Rcode::NoError,
                    answers: rrs,
                    authority: authority_for(cache, origin, in_zone),
                    additional: Vec::new(),
                    authoritative: in_zone,
                })
            }
        }

        QueryType::Record(RecordType::NS) => {
            let ns_rrs = cache.get(&question.name, RecordType::NS);
            if ns_rrs.is_empty() {
                return Ok(nxdomain(in_zone));
            }

            let mut additional = Vec::new();
            for rr in &ns_rrs {
                if let RecordTypeWithData::NS { nsdname } = &rr.rtype_with_data {
                    additional.extend(cache.get(nsdname, RecordType::A));
                }
            }

            // NS at the served apex is answer data; NS anywhere else
            // under the zone marks a delegation cut, so it belongs in
            // authority instead, even though the owner is in-zone by
            // the subdomain test used elsewhere in this function.
            let is_apex = question.name == *origin;
            if is_apex {
                Ok(AuthoritativeResult {
                    rcode: Rcode::NoError,
                    answers: ns_rrs,
                    authority: Vec::new(),
                    additional,
                    authoritative: true,
                })
            } else {
                // A delegation cut: the NS data names someone else's
                // servers, so this reply does not speak for them.
                Ok(AuthoritativeResult {
                    rcode: Rcode::NoError,
                    answers: Vec::new(),
                    authority: ns_rrs,
                    additional,
                    authoritative: false,
                })
            }
        }

        _ => Ok(nxdomain(in_zone)),
    }
}

fn nxdomain(in_zone: bool) -> AuthoritativeResult {
    AuthoritativeResult {
        rcode: Rcode::NameError,
        answers: Vec::new(),
        authority: Vec::new(),
        additional: Vec::new(),
        authoritative: in_zone,
    }
}

/// The `(origin, NS)` authority block, attached to non-NS answers when
/// the question's owner is in-zone.
fn authority_for(cache: &SharedCache, origin: &DomainName, in_zone: bool) -> Vec<ResourceRecord> {
    if in_zone {
        cache.get(origin, RecordType::NS)
    } else {
        Vec::new()
    }
}

/// Convenience entry point used by `dispatch`, with the default depth
/// limit.
pub async fn resolve_authoritative_default(
    cache: &SharedCache,
    metrics: &mut Metrics,
    origin: &DomainName,
    root_ip: Ipv4Addr,
    question: &Question,
) -> Result<AuthoritativeResult, ResolutionError> {
    resolve_authoritative(cache, metrics, origin, root_ip, question, MAX_RECURSION_DEPTH).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::types::test_util::*;
    use dns_types::protocol::types::{QueryClass, RecordClass};

    fn question(name: &str, qtype: QueryType) -> Question {
        Question {
            name: domain(name),
            qtype,
            qclass: QueryClass::Record(RecordClass::IN),
        }
    }

    fn origin() -> DomainName {
        domain("foo.")
    }

    #[tokio::test]
    async fn plain_a_record_has_no_authority_block() {
        let cache = SharedCache::new();
        cache.put(a_record("www.foo.", "89.2.33.1".parse().unwrap()));
        cache.put(ns_record("foo.", "ns.foo."));

        let result = resolve_authoritative_default(
            &cache,
            &mut Metrics::new(),
            &origin(),
            Ipv4Addr::new(10, 0, 0, 1),
            &question("www.foo.", QueryType::Record(RecordType::A)),
        )
        .await
        .unwrap();

        assert_eq!(result.rcode, Rcode::NoError);
        assert_eq!(result.answers.len(), 1);
        assert!(result.authority.is_empty());
    }

    #[tokio::test]
    async fn missing_name_is_nxdomain() {
        let cache = SharedCache::new();

        let result = resolve_authoritative_default(
            &cache,
            &mut Metrics::new(),
            &origin(),
            Ipv4Addr::new(10, 0, 0, 1),
            &question("nxdomain-www.foo.", QueryType::Record(RecordType::A)),
        )
        .await
        .unwrap();

        assert_eq!(result.rcode, Rcode::NameError);
        assert!(result.answers.is_empty());
    }

    #[tokio::test]
    async fn cname_chain_within_zone_resolves_to_terminal_a() {
        let cache = SharedCache::new();
        cache.put(cname_record("mail.foo.", "server.foo."));
        cache.put(cname_record("server.foo.", "other.foo."));
        cache.put(a_record("other.foo.", "1.2.3.4".parse().unwrap()));
        cache.put(ns_record("foo.", "ns.foo."));

        let result = resolve_authoritative_default(
            &cache,
            &mut Metrics::new(),
            &origin(),
            Ipv4Addr::new(10, 0, 0, 1),
            &question("mail.foo.", QueryType::Record(RecordType::A)),
        )
        .await
        .unwrap();

        assert_eq!(result.rcode, Rcode::NoError);
        assert_eq!(result.answers.len(), 3);
        assert_eq!(
            result.answers[0].rtype_with_data,
            RecordTypeWithData::CNAME {
                cname: domain("server.foo.")
            }
        );
        assert_eq!(
            result.answers[2].rtype_with_data,
            RecordTypeWithData::A {
                address: "1.2.3.4".parse().unwrap()
            }
        );
        assert_eq!(result.authority.len(), 1);
    }

    #[tokio::test]
    async fn delegated_ns_goes_in_authority_with_glue() {
        let cache = SharedCache::new();
        cache.put(ns_record("bar.foo.", "ns.bar.foo."));
        cache.put(a_record("ns.bar.foo.", "5.5.5.5".parse().unwrap()));

        let result = resolve_authoritative_default(
            &cache,
            &mut Metrics::new(),
            &origin(),
            Ipv4Addr::new(10, 0, 0, 1),
            &question("bar.foo.", QueryType::Record(RecordType::NS)),
        )
        .await
        .unwrap();

        assert!(result.answers.is_empty());
        assert_eq!(result.authority.len(), 1);
        assert_eq!(result.additional.len(), 1);
        assert!(!result.authoritative);
    }

    #[tokio::test]
    async fn origin_ns_query_is_answered_not_delegated() {
        let cache = SharedCache::new();
        cache.put(ns_record("foo.", "ns.foo."));

        let result = resolve_authoritative_default(
            &cache,
            &mut Metrics::new(),
            &origin(),
            Ipv4Addr::new(10, 0, 0, 1),
            &question("foo.", QueryType::Record(RecordType::NS)),
        )
        .await
        .unwrap();

        assert_eq!(result.answers.len(), 1);
        assert!(result.authority.is_empty());
        assert!(result.authoritative);
    }

    #[tokio::test]
    async fn nxdomain_out_of_zone_is_not_authoritative() {
        let cache = SharedCache::new();
        cache.put(a_record("www.foo.", "89.2.33.1".parse().unwrap()));

        let result = resolve_authoritative_default(
            &cache,
            &mut Metrics::new(),
            &origin(),
            Ipv4Addr::new(10, 0, 0, 1),
            &question("nxdomain-www.bar.", QueryType::Record(RecordType::A)),
        )
        .await
        .unwrap();

        assert_eq!(result.rcode, Rcode::NameError);
        assert!(!result.authoritative);
    }
}
