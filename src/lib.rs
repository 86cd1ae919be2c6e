pub mod cache;
pub mod config;
pub mod converter;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod live_index;
pub mod output;
pub mod parser;
pub mod request;
pub mod server;
pub mod siri;
pub mod snapshot;
pub mod state;
pub mod static_index;
pub mod stats;
pub mod validate;
pub mod warnings;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
