//! Async driver for feed pipelines.
//!
//! The [`pipeline`] crate decides *what* to read; this crate performs the reads.
//! A [`PipelineDriver`] runs pipeline turns, hands each [`pipeline::DataRequest`]
//! to a [`DataSource`], and feeds the answers back through `provide_data`.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The driver sequences calls between the pipeline
//! state machine and a transport. It contains no merge rules of its own.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`source`] | The `DataSource` port and `FetchedPage` |
//! | [`errors`] | `SourceError` and `DriverError` |
//! | [`driver`] | `PipelineDriver` and `DriverConfig` |
//! | [`memory`] | `InMemorySource`, a fixture-backed `DataSource` |

pub mod driver;
pub mod errors;
pub mod memory;
pub mod source;

pub use driver::{DriverConfig, PipelineDriver};
pub use errors::{DriverError, SourceError};
pub use memory::InMemorySource;
pub use source::{DataSource, FetchedPage};
