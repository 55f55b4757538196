//! HLS reverse proxy.
//!
//! Playlists fetched through `/proxy` are rewritten so that every segment,
//! key and sub-playlist they reference is fetched through `/proxy` as well.
//! Everything else is streamed to the player with its range semantics intact.

pub mod config;
pub mod error;
pub mod metrics;
pub mod proxy;
pub mod server;
