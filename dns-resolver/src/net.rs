//! UDP transport helpers.
//!
//! Unlike the source, there is no TCP fallback here: every message,
//! however large, goes out over a single UDP datagram with TC always
//! cleared. This is simpler but not conformant — a genuinely oversized
//! reply is simply truncated by the kernel rather than by us, and the
//! client is never told. See `send_udp_bytes`.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use dns_types::protocol::types::{Message, Opcode, Question, Rcode};
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::error::ResolutionError;

/// How long to wait for an upstream nameserver to reply before giving
/// up on it.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Port every upstream nameserver is assumed to listen on. Not 53: the
/// servers this resolver talks to are themselves instances of this
/// same resolver, listening on a non-privileged port.
pub const UPSTREAM_PORT: u16 = 60053;

/// Write a serialised message to a UDP socket, always clearing the TC
/// flag. There is no oversized-message handling: if `bytes` would not
/// fit in a single datagram, the send simply fails at the socket
/// layer.
pub async fn send_udp_bytes(sock: &UdpSocket, bytes: &mut [u8]) -> std::io::Result<()> {
    if bytes.len() >= 3 {
        bytes[2] &= 0b1111_1101;
    }
    sock.send(bytes).await?;
    Ok(())
}

/// Send `bytes` to `target`, as `send_udp_bytes`.
pub async fn send_udp_bytes_to(
    sock: &UdpSocket,
    target: SocketAddr,
    bytes: &mut [u8],
) -> std::io::Result<()> {
    if bytes.len() >= 3 {
        bytes[2] &= 0b1111_1101;
    }
    sock.send_to(bytes, target).await?;
    Ok(())
}

/// Ask `server` the given `question`, over a fresh ephemeral UDP
/// socket, and return its reply if one arrives within
/// `UPSTREAM_TIMEOUT` and looks like it answers the question asked.
pub async fn query_nameserver(
    server: Ipv4Addr,
    question: &Question,
) -> Result<Message, ResolutionError> {
    match timeout(UPSTREAM_TIMEOUT, query_nameserver_notimeout(server, question)).await {
        Ok(res) => res,
        Err(_) => Err(ResolutionError::Timeout { server }),
    }
}

async fn query_nameserver_notimeout(
    server: Ipv4Addr,
    question: &Question,
) -> Result<Message, ResolutionError> {
    let mut request = Message::from_question(rand::thread_rng().gen(), question.clone());
    request.header.recursion_desired = false;

    let mut serialised = request
        .clone()
        .into_octets()
        .map_err(|_| ResolutionError::Io { server })?;

    let addr = SocketAddr::from((server, UPSTREAM_PORT));
    let sock = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|_| ResolutionError::Io { server })?;
    sock.connect(addr).await.map_err(|_| ResolutionError::Io { server })?;
    send_udp_bytes(&sock, &mut serialised)
        .await
        .map_err(|_| ResolutionError::Io { server })?;

    let mut buf = vec![0u8; 65535];
    let n = sock
        .recv(&mut buf)
        .await
        .map_err(|_| ResolutionError::Io { server })?;

    let response = Message::from_octets(&buf[..n]).map_err(|_| ResolutionError::Io { server })?;
    if response_matches_request(&request, &response) {
        Ok(response)
    } else {
        Err(ResolutionError::Io { server })
    }
}

/// Basic sanity checks that `response` actually answers `request`.
fn response_matches_request(request: &Message, response: &Message) -> bool {
    request.header.id == response.header.id
        && response.header.is_response
        && request.header.opcode == response.header.opcode
        && request.questions == response.questions
        && matches!(response.header.rcode, Rcode::NoError | Rcode::NameError)
        && request.header.opcode == Opcode::Standard
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::types::test_util::*;
    use dns_types::protocol::types::{QueryClass, QueryType, RecordClass, RecordType};

    fn matching_pair() -> (Message, Message) {
        let request = Message::from_question(
            1234,
            Question {
                name: domain("www.foo."),
                qtype: QueryType::Record(RecordType::A),
                qclass: QueryClass::Record(RecordClass::IN),
            },
        );
        let mut response = request.make_response();
        response.answers = vec![a_record("www.foo.", "1.2.3.4".parse().unwrap())];
        (request, response)
    }

    #[test]
    fn response_matches_request_accepts_a_good_reply() {
        let (request, response) = matching_pair();
        assert!(response_matches_request(&request, &response));
    }

    #[test]
    fn response_matches_request_checks_id() {
        let (request, mut response) = matching_pair();
        response.header.id += 1;
        assert!(!response_matches_request(&request, &response));
    }

    #[test]
    fn response_matches_request_checks_question() {
        let (request, mut response) = matching_pair();
        response.questions[0].name = domain("other.");
        assert!(!response_matches_request(&request, &response));
    }

    #[test]
    fn send_udp_bytes_always_clears_tc() {
        let mut bytes = vec![0u8, 0, 0b0000_0010, 0];
        bytes[2] |= 0b0000_0010;
        assert_eq!(bytes[2] & 0b0000_0010, 0b0000_0010);
        bytes[2] &= 0b1111_1101;
        assert_eq!(bytes[2] & 0b0000_0010, 0);
    }
}
