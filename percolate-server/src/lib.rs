pub mod http;
pub mod router;
pub mod server;
pub mod subsystems;

pub use router::GatewayContext;
