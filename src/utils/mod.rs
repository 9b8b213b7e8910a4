// src/utils/mod.rs

pub mod env;
