//! Test harness

mod container_manager;

pub use container_manager::TestContainer;
