//! # FLX Engine
//!
//! Back-end half of the Trunkline pair. Consumes routing requests from the
//! request queue one at a time, resolves each against the in-memory
//! subscriber-location registry, and emits the decision onto the response
//! queue under the same correlation id.

pub mod alr;
pub mod engine;

pub use alr::{route_policy, AlrStore};
pub use engine::{handle_request, Engine, EngineConfig};
