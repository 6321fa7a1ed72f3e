pub mod source;
pub mod thumbnail;
