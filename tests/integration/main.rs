//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against a mock transport or an in-process simulator.  Nothing here
//! needs a real simulator.

mod engine_tests;
mod sim_client_tests;
mod transport_tests;
