mod beacons;
mod hosts;
mod pool;
mod uconn;
mod writer;

pub use beacons::{BeaconProxyStore, RankedPair};
pub use hosts::HostStore;
pub use pool::{Pool, PooledConnection};
pub use uconn::UconnProxyStore;
pub use writer::BeaconWriter;

#[cfg(test)]
mod tests;
