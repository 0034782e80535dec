//! Pipeline scenario tests with deterministic capability stand-ins.

mod support;
