//! Text normalization shared by snippet matching and document indexing.

pub mod entities;
mod mapped;
mod markdown;
mod normalize;
pub mod tokens;

pub use mapped::MappedText;
pub use markdown::{clean_quote, ends_with_ellipsis, quote_lines, strip_markdown};
pub use normalize::{normalize, normalize_mapped};
