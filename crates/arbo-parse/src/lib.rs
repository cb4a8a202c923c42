//! The table-driven, error-tolerant, incremental parser.
//!
//! A parse runs a small set of stack versions over the grammar's action
//! table. Conflicts fork versions, convergent versions merge, and errors
//! are repaired by synthesizing missing tokens or skipping input, so every
//! parse yields a tree. With a previous tree on hand, subtrees untouched
//! by edits are pushed wholesale instead of being re-lexed.

mod parser;
mod reuse;
mod stack;
#[cfg(test)]
mod tests;

pub use parser::{ParseError, Parser};
