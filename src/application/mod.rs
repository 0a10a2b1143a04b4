//! Application layer orchestrating the payment gate.
//!
//! `GatedProcessController` owns the worker lifecycle behind a single lock,
//! and `GateService` combines it with the balance source and profit ledger
//! for the outer interfaces.

pub mod controller;
pub mod service;
