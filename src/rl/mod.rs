// src/rl/mod.rs

mod q_learning;

pub use q_learning::{QAdjustmentLayer, ACTIONS};
