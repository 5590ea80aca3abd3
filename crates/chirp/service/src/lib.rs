//! Service layer for chirp.
//!
//! [`UserService`] and [`PostService`] route requests to whichever
//! [`Storage`](chirp_storage::Storage) engine was configured at startup.
//! [`FeedAggregator`] builds a follower's feed by fanning out one fetch per
//! followed author, tolerating individual failures.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod auth;
mod clock;
mod error;
pub mod feed;
mod posts;
mod users;

pub use auth::{Auth, AuthError};
pub use clock::MonotonicClock;
pub use error::{ServiceError, ServiceResult};
pub use feed::{ContributorOutcome, FeedAggregator, FeedConfig, FeedReport};
pub use posts::PostService;
pub use users::UserService;
