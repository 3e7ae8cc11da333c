/*!
 * motorstate engine
 *
 * This crate provides the snapshot engine of motorstate: reading the full
 * attribute set of a motor, the snapshot file format, transactional
 * write-back with retry and rollback, and drift comparison.
 */

#![warn(missing_docs)]

// Re-export core types
pub use motorstate_core::prelude;

pub mod codec;
pub mod comparator;
pub mod error;
pub mod reader;
pub mod session;
pub mod transaction;
pub mod writer;

// Re-export main types for convenience
pub use codec::{
    decode, encode, encode_reduced, encode_table, read_snapshot_file, write_snapshot_files,
    SnapshotFiles,
};
pub use comparator::{compare, AttributeDifference, ComparisonReport, MotorComparison, Verdict};
pub use error::{Error, Result};
pub use reader::read_parameters;
pub use session::{RunMode, RunReport, Session};
pub use transaction::{WriteState, WriteTransaction};
pub use writer::{TransactionalWriter, WriteOutcome};

/// motorstate engine crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
