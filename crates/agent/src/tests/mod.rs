//! Orchestration tests driven by a scripted model, the mock embedder and an
//! in-memory SQLite store.

mod orchestration;
