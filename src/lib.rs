//! SILL: Transactional Catalog Store
//!
//! Keeps the free software catalog as a small set of normalized rows plus a
//! compiled view derived from them. Every mutation is serialized by the
//! [`transaction::TransactionCoordinator`], published in memory, and
//! persisted in commit order to a [`store::RowStore`].

pub mod compiler;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod logging;
pub mod operations;
pub mod recompile;
pub mod rows;
pub mod state;
pub mod store;
pub mod tooling;
pub mod transaction;
pub mod types;

pub use compiler::{CompiledSoftware, CompiledView, Compiler, PublicSoftware};
pub use error::{ApiError, CompileError, EnrichmentError, StorageError};
pub use operations::{AgentRef, DeclarationForm, DeclarationKind, InstanceForm, SoftwareForm};
pub use recompile::{Recompiler, RecompileReport, RecompileTrigger};
pub use rows::Rows;
pub use state::CatalogState;
pub use transaction::{TransactionCoordinator, Transition};
