//! The transport port.

use async_trait::async_trait;
use pipeline::DataRequest;

use crate::errors::SourceError;

/// One single-partition response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchedPage {
    /// Raw response body; see [`pipeline::payload`] for the accepted shapes.
    pub data: Vec<u8>,
    /// Continuation returned by the service. `None` (or empty) ends the partition.
    pub continuation: Option<String>,
}

/// Performs single-partition reads on behalf of a pipeline.
///
/// Implementations are shared between concurrently running fetches.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Reads the page of `request.partition_id` that starts at
    /// `request.continuation`.
    async fn fetch(&self, request: &DataRequest) -> Result<FetchedPage, SourceError>;
}
