//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives the full supervisory cycle
//! against mock adapters. All tests run on the host (x86_64) with no real
//! hardware required.

mod charging_scenarios;
mod fault_scenarios;
mod mock_hw;
mod uplink_tests;
