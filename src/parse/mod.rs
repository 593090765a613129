pub mod ast;
mod error;
mod lexer;
mod parser;

pub use error::FormatError;
pub use parser::Parser;

/// Parse dice notation into a reusable expression tree.
///
/// Empty input parses to the integer zero. The first offending position is
/// reported for anything malformed; there is no error recovery.
pub fn parse(s: &str) -> Result<ast::Expr, FormatError> {
    Parser::new(s).parse()
}
