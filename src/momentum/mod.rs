// Momentum detection: snapshot history, rate math, and the per-post
// tracking state machine. Pure computation, no I/O.

pub mod evaluator;
pub mod record;
pub mod snapshots;
