//! Stack aggregation core
//!
//! - `stack_key`: identity of a distinct stack and its per-window count
//! - `aggregator`: the concurrent counting table with atomic drain

pub mod aggregator;
pub mod stack_key;

pub use aggregator::{StackAggregator, StackSink};
pub use stack_key::{AggregatedStack, StackKey};
