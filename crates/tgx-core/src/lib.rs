//! Core of the Telegram export tooling.
//!
//! Three pieces carry the logic: a reverse line reader over append-only
//! record logs ([`reverse`]), a bounded window chunker that batches records
//! for downstream analysis ([`chunker`]), and an inter-arrival smoother for
//! activity trends ([`trend`]). Decoding of export lines into [`domain::Record`]s
//! lives in [`export`]; acquiring exports and talking to remote analysis
//! services is left to other tools.

pub mod chunker;
pub mod config;
pub mod domain;
pub mod errors;
pub mod export;
pub mod logging;
pub mod report;
pub mod reverse;
pub mod trend;
pub mod utils;

pub use errors::{Error, Result};
