//! Messages entering the tick thread from other contexts.
//!
//! Death notifications and operator input can originate on arbitrary
//! threads; they are queued here and drained at the top of each tick, so
//! the tick thread stays the single mutation context for all controller
//! state.

use std::sync::mpsc;

use spawnkeep_core::types::UnitHandle;

pub enum ServiceMessage {
    /// A tracked unit died in the world.
    UnitDied(UnitHandle),
    /// One line of operator input. The reply is sent back on the
    /// one-shot channel once the tick thread has processed it.
    Command {
        operator: String,
        line: String,
        reply: mpsc::Sender<String>,
    },
}
