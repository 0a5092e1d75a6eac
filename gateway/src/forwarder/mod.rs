pub mod forwarder;
pub mod transport;

pub use forwarder::{EndpointRefresher, Forwarder};
pub use transport::{DownstreamResponse, DownstreamTransport, HttpMethod, HttpTransport};
