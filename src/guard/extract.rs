//! Identifier extraction strategies.

use std::net::{IpAddr, SocketAddr};

/// Identifier used when an extractor yields an empty string.
pub const ANONYMOUS_IDENTIFIER: &str = "anonymous";

/// Identifier shared by every request under [`GlobalIdentifier`].
pub const GLOBAL_IDENTIFIER: &str = "global";

/// Maps a request context to the string a client is counted under.
///
/// The same logical client must always map to the same string. Collisions
/// between distinct clients are the extractor's concern, not the limiter's.
pub trait IdentifierExtractor<C: ?Sized>: Send + Sync {
    /// Produce the identifier for `ctx`.
    fn extract(&self, ctx: &C) -> String;
}

impl<C: ?Sized, F> IdentifierExtractor<C> for F
where
    F: Fn(&C) -> String + Send + Sync,
{
    fn extract(&self, ctx: &C) -> String {
        self(ctx)
    }
}

/// Counts every request against one pooled bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalIdentifier;

impl<C: ?Sized> IdentifierExtractor<C> for GlobalIdentifier {
    fn extract(&self, _ctx: &C) -> String {
        GLOBAL_IDENTIFIER.to_string()
    }
}

/// Contexts that know the network address of their peer.
pub trait PeerAddr {
    /// The peer's IP address, if known.
    fn peer_ip(&self) -> Option<IpAddr>;
}

impl PeerAddr for IpAddr {
    fn peer_ip(&self) -> Option<IpAddr> {
        Some(*self)
    }
}

impl PeerAddr for SocketAddr {
    fn peer_ip(&self) -> Option<IpAddr> {
        Some(self.ip())
    }
}

impl<T: PeerAddr> PeerAddr for Option<T> {
    fn peer_ip(&self) -> Option<IpAddr> {
        self.as_ref().and_then(PeerAddr::peer_ip)
    }
}

/// Identifies clients by peer IP address.
///
/// IPv4-mapped IPv6 addresses are folded to their IPv4 form so one client is
/// not counted twice on dual-stack listeners. An unknown peer yields an empty
/// identifier, which the guard pools under [`ANONYMOUS_IDENTIFIER`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IpIdentifier;

impl<C: PeerAddr + ?Sized> IdentifierExtractor<C> for IpIdentifier {
    fn extract(&self, ctx: &C) -> String {
        match ctx.peer_ip() {
            Some(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                Some(v4) => v4.to_string(),
                None => v6.to_string(),
            },
            Some(ip) => ip.to_string(),
            None => String::new(),
        }
    }
}
