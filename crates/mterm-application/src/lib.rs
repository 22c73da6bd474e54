//! Application layer for mterm.
//!
//! `CommandRouter` coordinates the session manager, the history store and the
//! resource lock manager with the interpreter and executors for each input
//! line.

pub mod reply;
pub mod router;
mod session_commands;

pub use reply::{ReplyAction, RouterReply};
pub use router::{CommandRouter, CommandRouterBuilder, RouterOptions};
