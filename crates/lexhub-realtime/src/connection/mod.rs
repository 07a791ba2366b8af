//! Client connection management: registry, pool, handles, heartbeat, auth.

pub mod authenticator;
pub mod handle;
pub mod handler;
pub mod heartbeat;
pub mod lifecycle;
pub mod pool;
pub mod registry;
pub mod transport;

pub use authenticator::WsAuthenticator;
pub use handle::{Connection, ConnectionInfo, ConnectionState};
pub use handler::InboundHandler;
pub use lifecycle::LifecycleListener;
pub use registry::ConnectionRegistry;
pub use transport::{ChannelPeer, ChannelTransport};
