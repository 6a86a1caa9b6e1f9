mod dfs;
pub mod error;
pub mod groups;
pub mod plugins;
mod validate;
pub mod vertex;
