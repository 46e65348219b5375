//! Raw local-interface ingress/egress: interface name/alias resolution, the AF_PACKET socket
//! plumbing (including VLAN aux-data reinjection), and the endpoint that owns both directions.

mod endpoint;
mod error;
mod resolve;
mod socket;

pub use endpoint::InterfaceEndpoint;
pub use error::IfaceError;
pub use resolve::resolve_ifindex;
pub use socket::MAX_FRAME_SIZE;
