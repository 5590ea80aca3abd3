//! Persisted key layout.
//!
//! ```text
//! users/{username}                    -> UserRecord
//! follows/{username}/{followedName}   -> empty marker
//! followers/{username}/{followerName} -> empty marker
//! posts/{author}/{postLocalId}        -> PostRecord
//! ```
//!
//! An optional namespace is prepended as `{namespace}/`. With no namespace
//! the layout above is reproduced byte for byte.

use chirp_types::PostId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpace {
    root: String,
}

impl KeySpace {
    pub fn new(namespace: &str) -> Self {
        let trimmed = namespace.trim_matches('/');
        let root = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}/")
        };
        Self { root }
    }

    pub fn user(&self, username: &str) -> String {
        format!("{}users/{username}", self.root)
    }

    pub fn follows_prefix(&self, username: &str) -> String {
        format!("{}follows/{username}/", self.root)
    }

    /// Forward edge: `follower` follows `followee`.
    pub fn follow_edge(&self, follower: &str, followee: &str) -> String {
        format!("{}{followee}", self.follows_prefix(follower))
    }

    pub fn followers_prefix(&self, username: &str) -> String {
        format!("{}followers/{username}/", self.root)
    }

    /// Reverse edge stored under the followed user.
    pub fn follower_edge(&self, followee: &str, follower: &str) -> String {
        format!("{}{follower}", self.followers_prefix(followee))
    }

    pub fn posts_prefix(&self, author: &str) -> String {
        format!("{}posts/{author}/", self.root)
    }

    pub fn post(&self, id: &PostId) -> String {
        format!("{}{}", self.posts_prefix(id.author()), id.local_part())
    }
}

/// Peer username from an edge key found under `prefix`.
pub fn peer_from_key<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(prefix)
        .filter(|peer| !peer.is_empty() && !peer.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_layout_has_no_namespace() {
        let keys = KeySpace::default();
        assert_eq!(keys.user("alice"), "users/alice");
        assert_eq!(keys.follow_edge("alice", "bob"), "follows/alice/bob");
        assert_eq!(keys.follower_edge("bob", "alice"), "followers/bob/alice");
        assert_eq!(
            keys.post(&PostId::new("alice", "0f3c")),
            "posts/alice/0f3c"
        );
    }

    #[test]
    fn namespace_is_normalized() {
        let keys = KeySpace::new("/prod/");
        assert_eq!(keys.user("alice"), "prod/users/alice");
        assert_eq!(KeySpace::new(""), KeySpace::default());
    }

    #[test]
    fn peer_extraction_rejects_nested_keys() {
        assert_eq!(peer_from_key("follows/a/", "follows/a/b"), Some("b"));
        assert_eq!(peer_from_key("follows/a/", "follows/a/"), None);
        assert_eq!(peer_from_key("follows/a/", "follows/a/b/c"), None);
        assert_eq!(peer_from_key("follows/a/", "followers/a/b"), None);
    }

    proptest! {
        #[test]
        fn edge_keys_round_trip(
            ns in "[a-z]{0,8}",
            a in "[a-zA-Z0-9_.-]{1,24}",
            b in "[a-zA-Z0-9_.-]{1,24}",
        ) {
            let keys = KeySpace::new(&ns);
            let forward = keys.follow_edge(&a, &b);
            prop_assert_eq!(peer_from_key(&keys.follows_prefix(&a), &forward), Some(b.as_str()));
            let reverse = keys.follower_edge(&b, &a);
            prop_assert_eq!(peer_from_key(&keys.followers_prefix(&b), &reverse), Some(a.as_str()));
        }
    }
}
