//! Core types for the cycling newsfeed
//!
//! This crate defines the shared data structures used across the newsfeed,
//! including the news entry aggregate, change notifications, and the
//! ranking rules used by the vote and view listings.

pub mod change;
pub mod entry;
pub mod error;
pub mod ranking;
pub mod zone;

pub use change::{ChangeEvent, ChangeKind, ChangeOrigin};
pub use entry::{is_valid_link, NewsEntry, VoteDirection, DEFAULT_LANGUAGE, FUTURE_CLAMP_EPSILON};
pub use error::{CoreError, CoreResult};
pub use ranking::{rank_by_views, rank_by_votes, ranking_key};
pub use zone::{parse_zone, DEFAULT_REFERENCE_ZONE};
