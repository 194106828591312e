// src/lib.rs
pub mod attendance;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod dataset;
pub mod export;
pub mod ledger;
pub mod models;
pub mod payroll;
pub mod reconciler;
pub mod server;
pub mod session_window;
pub mod system;

#[cfg(test)]
mod payroll_tests;
