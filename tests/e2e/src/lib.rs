//! DoseMate end-to-end test support
//!
//! - `harness`: isolated shared containers with a pinned clock
//! - `mocks`: medication, dose and legacy-store fixtures

pub mod harness;
pub mod mocks;
