pub mod comment;
pub mod post;
pub mod vote;

pub use comment::*;
pub use post::*;
pub use vote::*;
