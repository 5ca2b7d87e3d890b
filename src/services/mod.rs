pub mod aggregator;
pub mod board;
pub mod market;
pub mod normalizer;
pub mod tracker;

pub use aggregator::*;
pub use board::*;
pub use market::*;
pub use normalizer::*;
pub use tracker::*;
