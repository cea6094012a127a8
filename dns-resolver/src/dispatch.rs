//! Request dispatch: classify an inbound question, route it to the
//! authoritative responder or the recursor, and stamp the reply flags.

use std::net::Ipv4Addr;

use dns_types::protocol::types::{DomainName, Message, QueryType};

use crate::authoritative;
use crate::cache::SharedCache;
use crate::metrics::Metrics;
use crate::name::is_in_zone;
use crate::recursive;

/// Process one parsed inbound request, returning the reply to send
/// back, or `None` if an upstream failure means there is nothing to
/// send (the caller drops the request silently in that case).
pub async fn dispatch(
    cache: &SharedCache,
    metrics: &mut Metrics,
    origin: &DomainName,
    root_ip: Ipv4Addr,
    request: &Message,
) -> Option<Message> {
    cache.sweep();

    let mut response = request.make_response();
    let mut is_authoritative = true;

    for question in &request.questions {
        let QueryType::Record(rtype) = question.qtype else {
            continue;
        };

        let cached = cache.get(&question.name, rtype);
        metrics.cache_hit_or_miss(&cached);
        let has_cache_entries = !cached.is_empty();
        let in_zone = is_in_zone(&question.name, origin);

        if has_cache_entries || in_zone {
            metrics.authoritative_hit();
            let result =
                authoritative::resolve_authoritative_default(cache, metrics, origin, root_ip, question)
                    .await
                    .ok()?;
            response.header.rcode = result.rcode;
            response.answers.extend(result.answers);
            response.authority.extend(result.authority);
            response.additional.extend(result.additional);
            is_authoritative &= result.authoritative;
        } else {
            let result = recursive::resolve(cache, metrics, root_ip, question).await.ok()?;
            response.header.rcode = result.rcode;
            response.answers.extend(result.answers);
            response.authority.extend(result.authority);
            response.additional.extend(result.additional);
            // A recursive hand-off is never authoritative, whatever the
            // upstream reply's answer section happens to contain.
            is_authoritative = false;
        }
    }

    response.header.id = request.header.id;
    response.header.is_truncated = false;
    response.header.recursion_available = true;
    response.header.is_authoritative = is_authoritative;

    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::types::test_util::*;
    use dns_types::protocol::types::{QueryClass, Question, Rcode, RecordClass, RecordType};

    fn origin() -> DomainName {
        domain("foo.")
    }

    fn request(name: &str, qtype: QueryType) -> Message {
        Message::from_question(
            4242,
            Question {
                name: domain(name),
                qtype,
                qclass: QueryClass::Record(RecordClass::IN),
            },
        )
    }

    #[tokio::test]
    async fn reply_echoes_id_and_question() {
        let cache = SharedCache::new();
        cache.put(a_record("www.foo.", "89.2.33.1".parse().unwrap()));
        let req = request("www.foo.", QueryType::Record(RecordType::A));

        let resp = dispatch(
            &cache,
            &mut Metrics::new(),
            &origin(),
            Ipv4Addr::new(10, 0, 0, 1),
            &req,
        )
        .await
        .unwrap();

        assert_eq!(resp.header.id, req.header.id);
        assert_eq!(resp.questions, req.questions);
    }

    #[tokio::test]
    async fn in_zone_answer_is_authoritative() {
        let cache = SharedCache::new();
        cache.put(a_record("www.foo.", "89.2.33.1".parse().unwrap()));
        let req = request("www.foo.", QueryType::Record(RecordType::A));

        let resp = dispatch(
            &cache,
            &mut Metrics::new(),
            &origin(),
            Ipv4Addr::new(10, 0, 0, 1),
            &req,
        )
        .await
        .unwrap();

        assert!(resp.header.is_authoritative);
        assert_eq!(resp.header.rcode, Rcode::NoError);
    }

    #[tokio::test]
    async fn in_zone_miss_is_nxdomain_and_authoritative() {
        let cache = SharedCache::new();
        let req = request("nxdomain-www.foo.", QueryType::Record(RecordType::A));

        let resp = dispatch(
            &cache,
            &mut Metrics::new(),
            &origin(),
            Ipv4Addr::new(10, 0, 0, 1),
            &req,
        )
        .await
        .unwrap();

        assert_eq!(resp.header.rcode, Rcode::NameError);
        assert!(resp.header.is_authoritative);
        assert!(resp.answers.is_empty());
    }

    #[tokio::test]
    async fn delegated_ns_query_is_not_authoritative() {
        let cache = SharedCache::new();
        cache.put(ns_record("bar.foo.", "ns.bar.foo."));
        cache.put(a_record("ns.bar.foo.", "5.5.5.5".parse().unwrap()));
        let req = request("bar.foo.", QueryType::Record(RecordType::NS));

        let resp = dispatch(
            &cache,
            &mut Metrics::new(),
            &origin(),
            Ipv4Addr::new(10, 0, 0, 1),
            &req,
        )
        .await
        .unwrap();

        assert!(resp.answers.is_empty());
        assert_eq!(resp.authority.len(), 1);
        assert!(!resp.header.is_authoritative);
    }

    #[tokio::test]
    async fn recursive_miss_is_never_authoritative() {
        use dns_types::protocol::types::Message;
        use tokio::net::UdpSocket;

        let responder = UdpSocket::bind(("127.0.0.1", crate::net::UPSTREAM_PORT))
            .await
            .unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            if let Ok((n, peer)) = responder.recv_from(&mut buf).await {
                if let Ok(req) = Message::from_octets(&buf[..n]) {
                    let mut resp = req.make_response();
                    resp.header.id = req.header.id;
                    if let Ok(bytes) = resp.into_octets() {
                        let _ = responder.send_to(&bytes, peer).await;
                    }
                }
            }
        });

        let cache = SharedCache::new();
        let req = request("www.elsewhere.", QueryType::Record(RecordType::A));

        let resp = dispatch(
            &cache,
            &mut Metrics::new(),
            &origin(),
            Ipv4Addr::new(127, 0, 0, 1),
            &req,
        )
        .await
        .unwrap();

        assert_eq!(resp.header.rcode, Rcode::NoError);
        assert!(resp.answers.is_empty());
        assert!(!resp.header.is_authoritative);
    }

    #[tokio::test]
    async fn tc_is_always_cleared() {
        let cache = SharedCache::new();
        let req = request("www.foo.", QueryType::Record(RecordType::A));

        let resp = dispatch(
            &cache,
            &mut Metrics::new(),
            &origin(),
            Ipv4Addr::new(10, 0, 0, 1),
            &req,
        )
        .await
        .unwrap();

        assert!(!resp.header.is_truncated);
    }
}
