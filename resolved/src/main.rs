//! Entry point: parse arguments, load the served zone, bind a UDP
//! socket, and drive the cooperative poll loop that owns it.

use std::net::Ipv4Addr;
use std::process;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::net::UdpSocket;
use tokio::time::sleep;

use dns_resolver::cache::SharedCache;
use dns_resolver::dispatch::dispatch;
use dns_resolver::metrics::Metrics;
use dns_types::protocol::types::Message;
use dns_types::zones::types::Zone;

/// How often the poll loop checks the socket for a readable datagram
/// when none is waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A minimal authoritative-and-recursive DNS resolver.
///
/// Serves one zone, loaded from `zone_file`, authoritatively, and
/// resolves anything else by recursing from `root_ip`.
#[derive(Debug, Parser)]
struct Args {
    /// IPv4 address of the root nameserver to start recursion from
    root_ip: Ipv4Addr,

    /// Path to the zone file to serve authoritatively
    zone_file: std::path::PathBuf,

    /// Port to listen on; 0 chooses an ephemeral port
    #[arg(long, default_value_t = 0)]
    port: u16,
}

fn begin_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    begin_logging();

    let zone = match load_zone(&args.zone_file) {
        Ok(zone) => zone,
        Err(error) => {
            tracing::error!(?error, path = ?args.zone_file, "could not load zone file");
            process::exit(1);
        }
    };

    let origin = zone.origin.clone();
    let cache = SharedCache::new();
    seed_cache(&cache, &zone);

    let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, args.port)).await {
        Ok(socket) => socket,
        Err(error) => {
            tracing::error!(?error, "could not bind UDP socket");
            process::exit(1);
        }
    };

    let bound_port = match socket.local_addr() {
        Ok(addr) => addr.port(),
        Err(error) => {
            tracing::error!(?error, "could not read back bound address");
            process::exit(1);
        }
    };

    tracing::info!("Bound to port {bound_port}");

    serve(&socket, &cache, &origin, args.root_ip).await;
}

fn load_zone(path: &std::path::Path) -> std::io::Result<Zone> {
    let data = std::fs::read_to_string(path)?;
    Zone::deserialise(&data).map_err(|error| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())
    })
}

/// Prime the cache with the zone's own records, each expiring
/// `zone.default_ttl` seconds from now.
fn seed_cache(cache: &SharedCache, zone: &Zone) {
    for rr in &zone.records {
        let mut rr = rr.clone();
        if rr.ttl == 0 {
            rr.ttl = zone.default_ttl;
        }
        cache.put(rr);
    }
}

/// The cooperative poll loop: wait for a datagram, process it fully
/// (including any upstream recursion), then go back to waiting. There
/// is no per-request task and no parallelism.
async fn serve(socket: &UdpSocket, cache: &SharedCache, origin: &dns_types::protocol::types::DomainName, root_ip: Ipv4Addr) {
    let mut buf = vec![0u8; 65535];
    let mut metrics = Metrics::new();

    loop {
        let (size, peer) = match socket.try_recv_from(&mut buf) {
            Ok(result) => result,
            Err(ref error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                sleep(POLL_INTERVAL).await;
                continue;
            }
            Err(error) => {
                tracing::debug!(?error, "error reading from socket");
                continue;
            }
        };

        let Ok(request) = Message::from_octets(&buf[..size]) else {
            tracing::debug!(?peer, "dropped malformed datagram");
            continue;
        };

        let start = Instant::now();
        let Some(response) = dispatch(cache, &mut metrics, origin, root_ip, &request).await else {
            tracing::debug!(?peer, "dropped request: upstream failure");
            continue;
        };
        tracing::debug!(?peer, elapsed = ?start.elapsed(), rcode = ?response.header.rcode, "answered");

        let Ok(mut serialised) = response.into_octets() else {
            tracing::warn!(?peer, "could not serialise response");
            continue;
        };

        if let Err(error) = dns_resolver::net::send_udp_bytes_to(socket, peer, &mut serialised).await {
            tracing::debug!(?peer, ?error, "send error");
        }
    }
}
