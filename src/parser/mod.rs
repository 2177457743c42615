pub mod common;
mod python;

pub use common::{ParseFailure, ParseResult, Parser};
pub use python::PythonParser;
