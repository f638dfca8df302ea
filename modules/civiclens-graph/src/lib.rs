pub mod client;
pub mod query;
pub mod reader;
pub mod writer;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use neo4rs::query;

pub use client::GraphClient;
pub use query::{GeoStrategy, IssueFilter, PageMeta, Pagination, SortOrder, SortSpec, Visibility};
pub use reader::{visibility_for, BucketCount, IssueReader, IssueStats, OverallStats};
pub use writer::{IssuePatch, IssueWriter};
