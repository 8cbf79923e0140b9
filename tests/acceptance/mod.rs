//! Integration tests for cyclebench acceptance testing.

mod common;
mod counter_test;
mod sequence_test;
mod timer_test;
