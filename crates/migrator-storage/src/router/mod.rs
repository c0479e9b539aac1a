//! Dual-write router.
//!
//! `DoubleWritePool` presents one `ConnPool` while fanning writes out to the
//! src and dst stores according to the active `Pattern`. The primary side's
//! outcome is always what the caller sees; the secondary side is advisory and
//! its failures go to a `SecondaryFailureHandler`.

pub mod failure;
pub mod pool;
pub mod state;
pub mod tx;

pub use failure::{
    FailureClass, LoggingFailureHandler, SecondaryFailure, SecondaryFailureHandler,
    SecondaryFailureStats, SecondaryOp,
};
pub use pool::DoubleWritePool;
pub use state::RouterState;
pub use tx::DoubleWriteTx;
