//! Operation dispatcher.
//!
//! # Data Flow
//! ```text
//! OperationDescriptor (untrusted `query` object)
//!     → descriptor.rs (required fields per operation, JSON → BSON)
//!     → Command (typed, validated)
//!     → executor.rs (one engine primitive per operation)
//!     → outcome.rs (ids as strings, JSON-safe values, status envelope)
//! ```
//!
//! # Design Decisions
//! - Validation never needs a connection and runs before one is opened
//! - Update and delete always apply to every matching record
//! - Engine failures are values (`Execution`), never panics

pub mod descriptor;
pub mod executor;
pub mod outcome;

pub use descriptor::{Command, OperationDescriptor, OperationKind, Records};
pub use executor::execute;
pub use outcome::{into_envelope, Outcome, Success};
