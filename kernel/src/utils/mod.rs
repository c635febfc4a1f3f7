//! Small support containers shared across subsystems.

pub mod sorted_index;

pub use sorted_index::SortedIndex;
