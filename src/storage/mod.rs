mod entities;
mod parts;
mod schema;
mod types;

pub use parts::{Conditional, SectionTtls, SectionUpdate};
pub use schema::Database;
pub use types::{
    Entity, EntityDetails, EntityKind, EntityRef, FeedEntry, FeedPayload, Section, SectionName,
    StoreError, VideoCollection, VideoItem,
};
