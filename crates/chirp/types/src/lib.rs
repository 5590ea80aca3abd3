//! Entity model for chirp.
//!
//! Two entities are persisted by the storage engines:
//! - [`User`]: a uniquely named account carrying both directions of the
//!   follow graph (`follows` and `followers`)
//! - [`Post`]: authored content whose [`PostId`] is namespaced under the
//!   author, so ownership can be read straight off the id
//!
//! Values here are plain data. Engines hand out clones, never views into
//! their own state.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
mod post;
mod user;

pub use error::ModelError;
pub use post::{NewPost, Post, PostId, POST_ID_SEPARATOR};
pub use user::{validate_username, User, UserUpdate, MAX_USERNAME_LEN};
