//! This module holds typed parameters for endpoint inputs.
//!
//! Request bodies are deserialized into these types before they reach the SSE
//! server, and they carry the OpenAPI schemas for the rendered API docs.

pub(crate) mod event;
