//! Domain types and the ports the application layer drives.

pub mod balance;
pub mod policy;
pub mod ports;
pub mod profit;
pub mod state;
pub mod verifier;
pub mod worker;
