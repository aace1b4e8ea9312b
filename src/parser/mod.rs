pub mod cards;
pub mod challenge;

pub use cards::{CardExtractor, CardSelectors};
pub use challenge::BlockDetector;
