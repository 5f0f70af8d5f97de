//! # linkbridge-adapter-storage-fs
//!
//! Filesystem persistence adapter for captured signals and macros.
//!
//! ## Responsibilities
//! - Implement the [`CommandStore`](linkbridge_app::ports::CommandStore) port
//! - Map command keys onto `<root>/commands/[<namespace>/]<name>` and macro
//!   keys onto `<root>/macros/[<namespace>/]<name>`
//! - Replace signal files atomically (write to a temporary file, then rename)
//!
//! ## Dependency rule
//! Depends on `linkbridge-app` (for port traits) and `linkbridge-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod command_store;
pub mod error;

pub use command_store::FsCommandStore;
pub use error::StoreError;
