//! larksync-core - Core library for larksync
//!
//! One-directional sync of a Lark Bitable table into a relational
//! mirror: field normalization, record mapping, paginated remote
//! reading, and mirror reconciliation.

pub mod bitable;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod mirror;
pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod util;

pub use bitable::{BitableClient, BitableConfig, CachedToken, TokenCache};
pub use engine::SyncEngine;
pub use error::{Error, Result};
pub use mapper::{map_record, MapperOptions};
pub use mirror::{MirrorStore, PostgrestConfig, PostgrestStore};
pub use models::{CanonicalRow, RemoteRecord, SyncResult};
pub use normalize::{
    normalize_scalar, normalize_search_text, normalize_timestamp, MultiValuePolicy,
    NormalizedTimestamp,
};
