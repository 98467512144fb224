//! The seam between the cluster core and the byte-moving forwarder.

pub mod exchange;

use crate::cluster::ProxyTarget;
use http::Request;

/// Maps incoming requests to proxy targets.
///
/// Implemented by the cluster container; the forwarder calls
/// [`find_target`](ProxyClient::find_target) per request and later resolves
/// the returned target to a concrete node when it is about to connect. The
/// request body is never inspected, only headers and URI.
pub trait ProxyClient: Send + Sync {
    /// Map a request to a target, or `None` when no virtual host or
    /// context matches.
    fn find_target<B>(&self, request: &Request<B>) -> Option<ProxyTarget>;
}
