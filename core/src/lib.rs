pub mod api;
pub mod chain;
pub mod data;
pub mod error;
#[cfg(test)]
mod fixtures;
pub mod mempool;
pub mod normalizer;
pub mod notifications;
pub mod sequencer;
pub mod shutdown;
pub mod types;
pub mod utils;
