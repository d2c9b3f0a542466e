//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the controller against
//! recording adapters.  Everything runs on the host with no radio.

mod mock_gatt;
mod request_flow_tests;
mod session_tests;
