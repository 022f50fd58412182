//! `agent_shared`
//!
//! Shared libraries for the tile-world agent and anything that talks to it.
//!
//! Design goals:
//! - Deterministic, pure spatial addressing (coords).
//! - One owned view cache with a small set of mutators (view).
//! - Explicit, versionable wire types (net).
//! - No `unsafe`.

pub mod component;
pub mod config;
pub mod coords;
pub mod math;
pub mod net;
pub mod view;
