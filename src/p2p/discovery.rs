//! Overlay host and peer discovery, grounded in
//! `internal/p2p/discovery/discovery.go`, `internal/p2p/base/base.go`,
//! `internal/p2p/mdns/mdns.go`, and `internal/p2p/dht/dht.go`.
//!
//! go-libp2p's mDNS service advertises and filters on a rendezvous
//! string; `libp2p::mdns` in Rust has no equivalent tag and simply
//! surfaces every peer speaking mDNS on the LAN. This crate resolves
//! that gap by treating a successful stream open on [`PROTOCOL_ID`] as
//! the rendezvous filter: a LAN peer not running this application
//! fails to open the stream and is logged and skipped, same as any
//! other connection failure.

use std::collections::HashSet;
use std::time::Duration;

use futures::StreamExt;
use libp2p::kad::store::MemoryStore;
use libp2p::multiaddr::Protocol;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{kad, mdns, noise, tcp, yamux, Multiaddr, PeerId, StreamProtocol, Swarm, SwarmBuilder};
use libp2p_stream as stream;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;

/// Rendezvous tag, ported verbatim from `base.go`'s `RendezvousString`.
pub const RENDEZVOUS_TAG: &str = "p2p-meet-example-000cdfb2-7055-4c36-87a7-94a646eaf57e";

/// Framed-stream protocol identifier, ported verbatim from
/// `base.go`'s `ProtocolID`.
pub const PROTOCOL_ID: StreamProtocol = StreamProtocol::new("/p2p-call/connection/1.1.0");

/// DHT discovery starts this long after mDNS, matching `discovery.go`'s
/// `time.After(3 * time.Second)`.
const DHT_START_DELAY: Duration = Duration::from_secs(3);

/// Default Kademlia bootstrap peers, ported from `dht.go`'s
/// `dht.DefaultBootstrapPeers` (the standard go-libp2p-kad-dht bootstrap
/// set). Without these the routing table starts empty and `bootstrap()`
/// has no one to query.
const DEFAULT_BOOTSTRAP_PEERS: &[&str] = &[
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmcZf59bWwK5XFi76CZX8cbJ4BhTzzA3gU1ZjYZcYW3dwt",
];

/// Seeds the Kademlia routing table with [`DEFAULT_BOOTSTRAP_PEERS`] so
/// `bootstrap()` has known peers to query instead of returning
/// `NoKnownPeers` against an empty table.
fn seed_bootstrap_peers(kademlia: &mut kad::Behaviour<MemoryStore>) {
    for raw in DEFAULT_BOOTSTRAP_PEERS {
        let addr: Multiaddr = match raw.parse() {
            Ok(addr) => addr,
            Err(e) => {
                warn!(addr = raw, error = %e, "failed to parse bootstrap multiaddr");
                continue;
            }
        };
        let peer_id = addr.iter().find_map(|proto| match proto {
            Protocol::P2p(peer_id) => Some(peer_id),
            _ => None,
        });
        match peer_id {
            Some(peer_id) => {
                kademlia.add_address(&peer_id, addr);
            }
            None => warn!(addr = raw, "bootstrap multiaddr missing /p2p/ peer id"),
        }
    }
}

#[derive(NetworkBehaviour)]
struct DiscoveryBehaviour {
    mdns: mdns::tokio::Behaviour,
    kademlia: kad::Behaviour<MemoryStore>,
    stream: stream::Behaviour,
}

/// A stream opened with a peer, either by us or by them, handed off to
/// the caller for signalling setup.
pub struct DiscoveredStream {
    pub peer: PeerId,
    pub stream: stream::Stream,
}

/// Runs mDNS and DHT discovery concurrently until either a peer is
/// found and a stream opened, or `ready` fires because the caller's
/// handshake already completed on a stream found another way.
///
/// Ported from `DiscoverManager::StartDiscovery`: the two discovery
/// sources cross-cancel each other on first success.
pub async fn run_discovery(
    local_key: libp2p::identity::Keypair,
    ready: std::sync::Arc<Notify>,
    out_streams: async_channel::Sender<DiscoveredStream>,
) -> Result<(), AppError> {
    let local_peer_id = PeerId::from(local_key.public());

    let mut swarm = build_swarm(local_key)?;
    swarm
        .behaviour_mut()
        .kademlia
        .set_mode(Some(kad::Mode::Server));
    seed_bootstrap_peers(&mut swarm.behaviour_mut().kademlia);

    // Bind all interfaces on an ephemeral port, same as `base.go`'s
    // `libp2p.New` with no explicit `ListenAddrStrings`.
    swarm
        .listen_on("/ip4/0.0.0.0/tcp/0".parse().expect("valid multiaddr"))
        .map_err(|e| AppError::Discovery(format!("failed to listen: {e}")))?;
    if let Err(e) = swarm.listen_on("/ip6/::/tcp/0".parse().expect("valid multiaddr")) {
        warn!(error = %e, "failed to listen on ipv6, continuing with ipv4 only");
    }

    let mut control = swarm.behaviour().stream.new_control();
    let mut incoming = control
        .accept(PROTOCOL_ID)
        .map_err(|e| AppError::Discovery(format!("failed to register protocol handler: {e}")))?;

    // Incoming-stream acceptor: runs for the lifetime of the process,
    // independent of which discovery source found the peer.
    {
        let out_streams = out_streams.clone();
        tokio::spawn(async move {
            while let Some((peer, stream)) = incoming.next().await {
                debug!(%peer, "accepted inbound stream");
                let _ = out_streams.send(DiscoveredStream { peer, stream }).await;
            }
        });
    }

    let mdns_cancel = CancellationToken::new();
    let dht_cancel = CancellationToken::new();
    let mut connected: HashSet<PeerId> = HashSet::new();

    let mut dht_bootstrapped = false;
    let mut dht_start_deadline = Box::pin(tokio::time::sleep(DHT_START_DELAY));
    let mut dht_armed = false;

    loop {
        tokio::select! {
            _ = ready.notified() => {
                info!("stream established, stopping discovery");
                mdns_cancel.cancel();
                dht_cancel.cancel();
                return Ok(());
            }
            _ = &mut dht_start_deadline, if !dht_armed => {
                dht_armed = true;
                info!("starting DHT discovery");
                if let Err(e) = swarm.behaviour_mut().kademlia.bootstrap() {
                    warn!(error = %e, "DHT bootstrap failed to start");
                } else {
                    dht_bootstrapped = true;
                }
                if dht_bootstrapped {
                    let key = kad::RecordKey::new(&RENDEZVOUS_TAG);
                    swarm.behaviour_mut().kademlia.start_providing(key.clone())
                        .map_err(|e| AppError::Discovery(format!("start_providing failed: {e}")))?;
                    swarm.behaviour_mut().kademlia.get_providers(key);
                }
            }
            event = swarm.select_next_some() => {
                if mdns_cancel.is_cancelled() && dht_cancel.is_cancelled() {
                    return Ok(());
                }
                if let Some(found) = handle_event(event, local_peer_id, &mut control, &out_streams, &mut connected).await? {
                    match found {
                        FoundVia::Mdns => {
                            info!("mDNS discovery succeeded");
                            dht_cancel.cancel();
                        }
                        FoundVia::Dht => {
                            info!("DHT discovery succeeded");
                            mdns_cancel.cancel();
                        }
                    }
                    return Ok(());
                }
            }
        }
    }
}

enum FoundVia {
    Mdns,
    Dht,
}

async fn handle_event(
    event: SwarmEvent<DiscoveryBehaviourEvent>,
    local_peer_id: PeerId,
    control: &mut stream::Control,
    out_streams: &async_channel::Sender<DiscoveredStream>,
    connected: &mut HashSet<PeerId>,
) -> Result<Option<FoundVia>, AppError> {
    match event {
        SwarmEvent::Behaviour(DiscoveryBehaviourEvent::Mdns(mdns::Event::Discovered(peers))) => {
            for (peer_id, _addr) in peers {
                if process_one_peer(peer_id, local_peer_id, control, out_streams, connected).await {
                    return Ok(Some(FoundVia::Mdns));
                }
            }
            Ok(None)
        }
        SwarmEvent::Behaviour(DiscoveryBehaviourEvent::Kademlia(
            kad::Event::OutboundQueryProgressed {
                result: kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders { providers, .. })),
                ..
            },
        )) => {
            for peer_id in providers {
                if process_one_peer(peer_id, local_peer_id, control, out_streams, connected).await {
                    return Ok(Some(FoundVia::Dht));
                }
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

/// Ported from `base.go`'s `ProcessOnePeer`, the five ordered rules of
/// spec.md §4.4: skip self; skip (and wait for the peer's inbound
/// stream instead) when `peer_id > local_peer_id`, so exactly one side
/// dials; short-circuit if already connected; otherwise open a stream,
/// logging and continuing past any failure.
async fn process_one_peer(
    peer_id: PeerId,
    local_peer_id: PeerId,
    control: &mut stream::Control,
    out_streams: &async_channel::Sender<DiscoveredStream>,
    connected: &mut HashSet<PeerId>,
) -> bool {
    if peer_id == local_peer_id {
        return false;
    }

    if peer_id.to_bytes() > local_peer_id.to_bytes() {
        debug!(%peer_id, "peer ranks above us, waiting for inbound stream instead of dialing");
        return false;
    }

    if connected.contains(&peer_id) {
        debug!(%peer_id, "already connected, nothing to do");
        return true;
    }

    debug!(%peer_id, "found peer via discovery");
    match control.open_stream(peer_id, PROTOCOL_ID).await {
        Ok(opened) => {
            info!(%peer_id, "connected to peer");
            connected.insert(peer_id);
            let _ = out_streams
                .send(DiscoveredStream {
                    peer: peer_id,
                    stream: opened,
                })
                .await;
            true
        }
        Err(e) => {
            warn!(%peer_id, error = %e, "connection failed");
            false
        }
    }
}

fn build_swarm(local_key: libp2p::identity::Keypair) -> Result<Swarm<DiscoveryBehaviour>, AppError> {
    let swarm = SwarmBuilder::with_existing_identity(local_key)
        .with_tokio()
        .with_tcp(
            tcp::Config::default(),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|e| AppError::Discovery(format!("failed to configure tcp transport: {e}")))?
        .with_behaviour(|key| {
            let peer_id = PeerId::from(key.public());
            let mdns = mdns::tokio::Behaviour::new(mdns::Config::default(), peer_id)?;
            let kademlia = kad::Behaviour::new(peer_id, MemoryStore::new(peer_id));
            let stream = stream::Behaviour::new();
            Ok(DiscoveryBehaviour { mdns, kademlia, stream })
        })
        .map_err(|e| AppError::Discovery(format!("failed to build behaviour: {e}")))?
        .build();
    Ok(swarm)
}
