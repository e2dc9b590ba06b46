pub mod extract;
pub mod filesystem;
pub mod pipeline;
pub mod reconcile;
pub mod source;
pub mod treesitter;
