pub mod recommendation;
pub mod ticker;
