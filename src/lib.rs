//! # Iteration Control
//!
//! Versions a working directory as one permanent main line plus short
//! lived alternate lines. An alternate is branched off, iterated on and
//! eventually promoted back into main as a single new revision.
//!
//! [`versioned::VersionedWorkspace`] is the entry point; everything it
//! records lives in a `.rev` directory inside the working directory.

mod hex;

/// Branch naming for the main line and its alternates.
pub mod branches;
pub mod config;
/// A revision store in the `.rev` directory of a working directory.
pub mod dot_rev;
pub mod error;
/// Exclusion globs read from `.revignore`.
pub mod ignore;
/// Hash-based binary object identifier.
pub mod object_id;
/// Content addressible store API using the [`object_id::ObjectId`].
pub mod object_store;
pub mod package;
/// Snapshots of the working directory and their display form.
pub mod revision;
/// A data structure representing a directory structure with
/// names of files pointing to an [`object_id::ObjectId`].
pub mod tree;
pub mod versioned;
pub mod workspace;
