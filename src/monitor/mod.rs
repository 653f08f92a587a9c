pub mod bandwidth;
pub mod collector;
pub mod correlator;
pub mod details;
pub mod hub;
pub mod rates;
pub mod sockets;
pub mod trace_parser;
