pub mod serial;
pub mod hub;
pub mod schedule;
pub mod rpc;
