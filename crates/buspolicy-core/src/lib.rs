//! Shared vocabulary for the bus policy compiler.
//!
//! The compiler consumes two collaborators that live outside its core:
//! a pull-based token source over the XML configuration dialect and an
//! identity resolver mapping user/group names to numeric ids. Both are
//! defined here as traits so the compiler, its tests and the root
//! binary agree on a single contract.

pub mod error;
pub mod traits;
pub mod types;

pub use error::*;
pub use traits::*;
pub use types::*;
