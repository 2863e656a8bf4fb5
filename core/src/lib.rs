pub mod config;
pub mod finality;
pub mod import;
pub mod messages;
pub mod network;
pub mod peer_view;
pub mod reputation;
pub mod shutdown;
pub mod state;
pub mod sync;
pub mod telemetry;
pub mod types;
pub mod unready_blocks;
pub mod utils;

#[cfg(test)]
pub mod test_utils;
