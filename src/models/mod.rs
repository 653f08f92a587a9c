pub mod bandwidth;
pub mod config;
pub mod interface;
pub mod process;
pub mod snapshot;
pub mod socket;
