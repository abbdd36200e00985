pub mod api;
pub mod config;
pub mod decoder;
pub mod estimator;
pub mod fetch;
pub mod geo;
pub mod poller;
pub mod snapshot;
pub mod store;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
