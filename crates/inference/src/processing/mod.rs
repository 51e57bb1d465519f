pub mod post;

pub use post::{OutputLayout, PostProcessor};
