//! Domain models shared across plinth crates.
//!
//! Each submodule holds one domain. Status-like enums are stored as lowercase
//! text columns; [`string_enum!`] gives them a matching `as_str`, `Display`
//! and `FromStr`.

use serde::{Deserialize, Serialize};

/// Declare the text representation of a unit-only enum.
///
/// The strings must match the enum's serde renaming so database values, JSON
/// and query parameters all agree.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(crate::Error::InvalidInput(format!(
                        "invalid {}: '{}'",
                        stringify!($name),
                        s
                    ))),
                }
            }
        }
    };
}

pub mod address;
pub mod comment;
pub mod job;
pub mod media;
pub mod menu;
pub mod notification;
pub mod organization;
pub mod post;
pub mod tag;
pub mod taxonomy;
pub mod user;

pub use address::*;
pub use comment::*;
pub use job::*;
pub use media::*;
pub use menu::*;
pub use notification::*;
pub use organization::*;
pub use post::*;
pub use tag::*;
pub use taxonomy::*;
pub use user::*;

/// One page of a list query plus the unpaginated total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64) -> Self {
        Self { items, total }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

/// A tree node returned from ancestor/descendant queries, annotated with its
/// distance from the node the query started at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry<T> {
    #[serde(flatten)]
    pub node: T,
    pub depth: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_map_keeps_total() {
        let page = Page::new(vec![1, 2, 3], 10).map(|n| n * 2);
        assert_eq!(page.items, vec![2, 4, 6]);
        assert_eq!(page.total, 10);
    }

    #[test]
    fn tree_entry_flattens_node() {
        #[derive(Serialize)]
        struct Node {
            name: &'static str,
        }
        let entry = TreeEntry {
            node: Node { name: "root" },
            depth: 2,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({"name": "root", "depth": 2}));
    }
}
