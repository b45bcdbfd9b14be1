//! Integration Tests Module
//!
//! End-to-end tests of the analytics agent with a fixture database, a
//! scripted reasoning model and a stub sandbox. No network access and no
//! Python interpreter are needed.

// Shared fixtures and the test application builder
mod fixtures;

// Analyze flows: schema questions, query + chart, follow-ups, guard, sandbox failures
mod analyze_test;

// Session store invariants and per-session serialization
mod session_test;

// HTTP routing, status mapping and response shapes
mod http_test;
