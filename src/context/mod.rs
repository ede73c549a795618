pub mod arbiter;
pub mod responder;
pub mod store;

pub use arbiter::{ArbiterTimeouts, CommitOutcome, QueryArbiter, RoundOutcome};
pub use responder::{EchoResponder, Prompt, Responder};
pub use store::ContextStore;
