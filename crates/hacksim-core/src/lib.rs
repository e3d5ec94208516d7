//! Terminal simulation engine.
//!
//! The [`SessionManager`] caches one session per `(user, challenge)`,
//! runs command lines through the interpreter, grades them with the
//! objective evaluator, and persists the outcome through the store traits.

pub mod catalog;
pub mod evaluator;
pub mod objective;
pub mod session;
pub mod store;

pub use catalog::{Challenge, ChallengeCatalog, MemoryCatalog};
pub use objective::{EvalContext, Objective, Predicate};
pub use session::{
    ExecuteRequest, ExecuteResponse, Progress, SessionKey, SessionManager, SessionView,
    SweeperHandle,
};
pub use store::{
    Attempt, AttemptId, AttemptStore, HistoryEntry, JsonUserStore, MemoryAttemptStore,
    MemoryUserStore, UserStore,
};
