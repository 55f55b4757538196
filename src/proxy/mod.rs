//! Playlist-rewriting and dual-mode fetch engine.
//!
//! The front door hands this module a validated target [`url::Url`], the
//! inbound request context and the configuration. [`classify`] picks the arm
//! once; playlists are buffered and rewritten by [`playlist`], everything else
//! is streamed by [`relay`].

pub mod classify;
pub mod playlist;
pub mod relay;
pub mod resolve;
pub mod upstream;

pub use classify::{ResourceKind, classify};
pub use resolve::resolve;
