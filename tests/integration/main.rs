//! Integration tests

mod listener_test;
mod relay_test;
mod stream_test;
mod support;
