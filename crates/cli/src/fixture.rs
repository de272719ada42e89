//! Partitioned fixture files.
//!
//! ```json
//! {
//!   "resourceId": "coll1",
//!   "partitions": [
//!     { "id": "0", "minInclusive": "", "maxExclusive": "80", "pages": [[{"id": "a"}], []] },
//!     { "id": "1", "minInclusive": "80", "maxExclusive": "FF", "pages": [] }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::{bail, Context};
use driver::InMemorySource;
use pipeline::{PartitionKeyRangeProperties, ResourceId};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    #[serde(default)]
    pub resource_id: Option<String>,
    pub partitions: Vec<FixturePartition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixturePartition {
    pub id: String,
    pub min_inclusive: String,
    pub max_exclusive: String,
    #[serde(default)]
    pub pages: Vec<Vec<Value>>,
}

impl Fixture {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing fixture {}", path.display()))
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn resource_id(&self) -> Option<ResourceId> {
        self.resource_id.clone().and_then(ResourceId::new)
    }

    /// The partition map, in fixture order.
    pub fn ranges(&self) -> anyhow::Result<Vec<PartitionKeyRangeProperties>> {
        self.partitions
            .iter()
            .map(|p| {
                let Some(range) =
                    PartitionKeyRangeProperties::new(&p.id, &p.min_inclusive, &p.max_exclusive)
                else {
                    bail!("fixture partition has an empty id");
                };
                if range.feed_range().is_none() {
                    bail!(
                        "partition {} has invalid bounds [{}, {})",
                        p.id,
                        p.min_inclusive,
                        p.max_exclusive
                    );
                }
                Ok(range)
            })
            .collect()
    }

    pub fn source(&self) -> InMemorySource {
        self.partitions
            .iter()
            .fold(InMemorySource::new(), |source, p| {
                source.with_partition(p.id.clone(), p.pages.clone())
            })
    }
}
