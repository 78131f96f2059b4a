//! Tests for the block/command engine
//!
//! Organized by feature area

mod control_flow_tests;
mod helpers;
mod sequencing_tests;
