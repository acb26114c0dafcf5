use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// A navigation menu bound to a theme location such as `primary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Menu {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry in a menu. Exactly one of `url`, `post_id`, `term_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: Uuid,
    pub menu_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub label: String,
    pub url: Option<String>,
    pub post_id: Option<Uuid>,
    pub term_id: Option<Uuid>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Check that a menu item links to exactly one target.
pub fn validate_menu_target(
    url: Option<&str>,
    post_id: Option<Uuid>,
    term_id: Option<Uuid>,
) -> Result<()> {
    let set = [url.is_some(), post_id.is_some(), term_id.is_some()]
        .iter()
        .filter(|s| **s)
        .count();
    if set != 1 {
        return Err(Error::InvalidInput(
            "menu item must link to exactly one of url, post_id or term_id".to_string(),
        ));
    }
    if let Some(u) = url {
        if u.trim().is_empty() {
            return Err(Error::InvalidInput("menu item url is empty".to_string()));
        }
    }
    Ok(())
}

/// A menu item with its nested children, in position order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItemNode {
    #[serde(flatten)]
    pub item: MenuItem,
    pub children: Vec<MenuItemNode>,
}

/// A menu together with its nested items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuTree {
    #[serde(flatten)]
    pub menu: Menu,
    pub items: Vec<MenuItemNode>,
}

/// Nest a flat list of one menu's items by `parent_id`.
///
/// Siblings are ordered by `position`, then `created_at`. Items whose parent
/// is not in the list are placed at the top level so nothing disappears.
pub fn build_menu_tree(items: Vec<MenuItem>) -> Vec<MenuItemNode> {
    let present: HashSet<Uuid> = items.iter().map(|i| i.id).collect();

    let mut by_parent: HashMap<Option<Uuid>, Vec<MenuItem>> = HashMap::new();
    for item in items {
        let key = item.parent_id.filter(|p| present.contains(p));
        by_parent.entry(key).or_default().push(item);
    }
    for siblings in by_parent.values_mut() {
        siblings.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then(a.created_at.cmp(&b.created_at))
        });
    }

    attach_children(None, &mut by_parent)
}

fn attach_children(
    parent: Option<Uuid>,
    by_parent: &mut HashMap<Option<Uuid>, Vec<MenuItem>>,
) -> Vec<MenuItemNode> {
    let siblings = by_parent.remove(&parent).unwrap_or_default();
    siblings
        .into_iter()
        .map(|item| {
            let children = attach_children(Some(item.id), by_parent);
            MenuItemNode { item, children }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(id: u128, parent: Option<u128>, position: i32) -> MenuItem {
        let now = Utc::now();
        MenuItem {
            id: Uuid::from_u128(id),
            menu_id: Uuid::nil(),
            parent_id: parent.map(Uuid::from_u128),
            label: format!("item {}", id),
            url: Some("/".to_string()),
            post_id: None,
            term_id: None,
            position,
            created_at: now + Duration::milliseconds(id as i64),
            updated_at: now,
        }
    }

    fn ids(nodes: &[MenuItemNode]) -> Vec<u128> {
        nodes.iter().map(|n| n.item.id.as_u128()).collect()
    }

    #[test]
    fn test_tree_nests_by_parent_and_orders_by_position() {
        let items = vec![
            item(1, None, 1),
            item(2, None, 0),
            item(3, Some(1), 1),
            item(4, Some(1), 0),
            item(5, Some(4), 0),
        ];
        let tree = build_menu_tree(items);

        assert_eq!(ids(&tree), vec![2, 1]);
        assert!(tree[0].children.is_empty());
        assert_eq!(ids(&tree[1].children), vec![4, 3]);
        assert_eq!(ids(&tree[1].children[0].children), vec![5]);
    }

    #[test]
    fn test_equal_positions_fall_back_to_creation_order() {
        let tree = build_menu_tree(vec![item(7, None, 0), item(6, None, 0)]);
        assert_eq!(ids(&tree), vec![6, 7]);
    }

    #[test]
    fn test_orphans_surface_at_top_level() {
        let tree = build_menu_tree(vec![item(1, None, 0), item(2, Some(99), 1)]);
        assert_eq!(ids(&tree), vec![1, 2]);
    }

    #[test]
    fn test_empty_menu() {
        assert!(build_menu_tree(Vec::new()).is_empty());
    }

    #[test]
    fn test_target_validation() {
        let id = Uuid::nil();
        assert!(validate_menu_target(Some("/about"), None, None).is_ok());
        assert!(validate_menu_target(None, Some(id), None).is_ok());
        assert!(validate_menu_target(None, None, None).is_err());
        assert!(validate_menu_target(Some("/x"), Some(id), None).is_err());
        assert!(validate_menu_target(Some("  "), None, None).is_err());
    }
}
