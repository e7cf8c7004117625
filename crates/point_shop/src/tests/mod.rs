//! Cross-module scenario tests for the shop core.

pub(crate) mod support;

mod credit_flow;
