pub mod client;
pub mod parser;
pub mod pipeline;
pub mod types;
pub mod validator;

pub use client::*;
pub use parser::*;
pub use pipeline::*;
pub use types::*;
pub use validator::*;
