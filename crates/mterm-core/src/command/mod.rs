//! Builtin command table and input classification.

pub mod builtin;
mod classify;

pub use builtin::{BuiltinCommand, BuiltinKind, builtin_commands, builtin_for, find_builtin};
pub use classify::{
    Classified, ExecutableLookup, InputClassifier, Invocation, PathLookup, SplitArgs, split_words,
};
