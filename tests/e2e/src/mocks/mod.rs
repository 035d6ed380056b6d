//! Test fixtures

mod fixtures;

pub use fixtures::{DayScenario, LegacyMetricRow, TestDataFactory};
