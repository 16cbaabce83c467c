//! Arena-backed syntax tree and the recursive-descent parser that builds it.

mod nodes;
mod parser;

pub use nodes::*;
pub use parser::*;
