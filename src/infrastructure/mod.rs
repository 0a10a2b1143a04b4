//! Adapters implementing the domain ports.

pub mod csv_ledger;
pub mod esplora;
pub mod in_memory;
pub mod process;
