//! A TCP-backed `Remote` for `relay-engine`'s close protocol.

mod remote;

pub use remote::{TcpRemote, TcpSocketConfig};
