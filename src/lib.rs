pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod sequencer;
pub mod store;
pub mod types;
pub mod updater;

#[cfg(test)]
pub mod testing;
