//! Retrieval tests across the embedder, store and query gate.
