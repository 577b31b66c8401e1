pub mod interpret;
pub mod normalize;
pub mod pipeline;
pub mod snapshot;
pub mod source;
