// src/issues/mod.rs
//
// Lifecycle side of the engine: tracked integrity issues and the operator
// decisions (merge confirmations, dismissals) that close them out.

pub mod merge;
pub mod tracker;
