// bix_ast - Call-site data model shared with the builder inference engine
//! This crate defines the already-parsed, already-overload-resolved view of a
//! builder call that the inference engine consumes.
//!
//! Nothing in here performs analysis. Producers (parsers, resolvers) build these
//! values; `bix_inference` reads them.

pub mod call_site;
pub mod expression;
pub mod signature;
pub mod statement;
pub mod types;

pub use call_site::*;
pub use expression::*;
pub use signature::*;
pub use statement::*;
pub use types::*;
