//! Go source loading: file selection, import extraction and package lookup

pub mod constraints;
pub mod imports;
pub mod loader;
pub mod parser_pool;


pub use constraints::{BuildContext, ConstraintError};
pub use imports::{extract as extract_imports, GoFileSummary};
pub use loader::GoPathLoader;
pub use parser_pool::{create_parser_pool, ParseRequest, ParseResult, ParserPool};
