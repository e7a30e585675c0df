//! Network Module
//!
//! TCP server, connection handling and the blocking client.
//!
//! ## Architecture
//! - Single acceptor thread (non-blocking accept, polled with a shutdown flag)
//! - One thread per connection, capped by `max_connections`
//! - Commands handed to the `Node`

mod client;
mod connection;
mod server;

pub use client::Client;
pub use connection::Connection;
pub use server::Server;
