pub mod explain;
pub mod ping;
