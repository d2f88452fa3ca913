//! podsh: browse, edit and script a hierarchical resource pod.
//!
//! The library holds everything the `podsh` binary drives: path resolution
//! ([`vfs`]), the typed table store ([`store`]), the in-memory pod
//! ([`pod`]), loose identifier lookup ([`lookup`]), the type registry
//! ([`registry`]) and the command executor ([`shell`]).

pub mod error;
pub mod lookup;
pub mod pod;
pub mod registry;
pub mod shell;
pub mod store;
pub mod vfs;

pub use error::{CommandError, CommandResult, ErrorKind};
pub use shell::{ExecOptions, ShellState};
