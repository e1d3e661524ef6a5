//! Bus Policy Compiler
//!
//! Compiles D-Bus `busconfig` XML fragments into a layered access-control
//! model for a bus proxy's matching logic.
//!
//! Key features:
//! - Explicit finite-state schema validation, one token at a time
//! - Write-once rule fields and single-class rules, rejected with line numbers
//! - Default, mandatory, per-user and per-group rule chains with
//!   most-recent-first precedence
//! - Best-effort multi-fragment loading with a full diagnostic report
//! - Unknown top-level elements skipped without recursion

pub mod error;
pub mod identity;
pub mod loader;
pub mod machine;
pub mod rule;
pub mod store;
pub mod xml;

// Re-export primary types for convenience
pub use error::{CompileError, CompileErrorKind, CompileResult, FragmentError};
pub use identity::{StaticIdentityResolver, SystemIdentityResolver};
pub use loader::{compile_fragment, compile_str, load, FragmentSet, LoadReport};
pub use machine::{compile, CompileOutcome, CompileWarning, Compiler};
pub use rule::{Disposition, MessageType, Rule, RuleBuilder, RuleClass, RuleField};
pub use store::{Category, PolicyStore, RuleChain, StoreSummary};
pub use xml::XmlTokenSource;
