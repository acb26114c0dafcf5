//! Navigation menus and their item trees.

use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use plinth_core::defaults::NAME_MAX_LENGTH;
use plinth_core::validation::{validate_optional, validate_required};
use plinth_core::{
    build_menu_tree, ensure_valid_move, validate_menu_target, validate_slug, CreateMenuItemRequest,
    Error, Menu, MenuItem, MenuItemRepository, MenuRepository, MenuTree, Result,
    UpdateMenuItemRequest, User,
};
use plinth_db::Database;

use super::{ensure_moderator, require};

const URL_MAX_LENGTH: usize = 2_048;

#[derive(Debug, Deserialize)]
pub struct CreateMenuItemInput {
    pub label: String,
    pub parent_id: Option<Uuid>,
    pub url: Option<String>,
    pub post_id: Option<Uuid>,
    pub term_id: Option<Uuid>,
    pub position: Option<i32>,
}

/// Link fields replace the whole target when any of them is present.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateMenuItemInput {
    pub label: Option<String>,
    pub url: Option<String>,
    pub post_id: Option<Uuid>,
    pub term_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct MenuService {
    db: Database,
}

impl MenuService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, actor: &User, name: &str, location: &str) -> Result<Menu> {
        ensure_moderator(actor)?;
        let name = validate_required("name", name, NAME_MAX_LENGTH)?;
        validate_slug(location)
            .map_err(|_| Error::InvalidInput(format!("'{}' is not a valid menu location", location)))?;
        let menu = self.db.menus.create(&name, location).await?;
        info!(menu_id = %menu.id, location = %menu.location, "Menu created");
        Ok(menu)
    }

    pub async fn get(&self, id: Uuid) -> Result<Menu> {
        require(self.db.menus.get(id).await?, "Menu", id)
    }

    pub async fn get_by_location(&self, location: &str) -> Result<Menu> {
        require(self.db.menus.get_by_location(location).await?, "Menu at location", location)
    }

    pub async fn list(&self) -> Result<Vec<Menu>> {
        self.db.menus.list().await
    }

    pub async fn update(&self, actor: &User, id: Uuid, name: Option<&str>, location: Option<&str>) -> Result<Menu> {
        ensure_moderator(actor)?;
        let name = validate_optional("name", name, NAME_MAX_LENGTH)?;
        if let Some(location) = location {
            validate_slug(location)?;
        }
        self.db.menus.update(id, name.as_deref(), location).await
    }

    /// Delete a menu with every item.
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<()> {
        ensure_moderator(actor)?;
        self.db.menus.delete(id).await
    }

    /// The whole menu, nested.
    pub async fn tree(&self, id: Uuid) -> Result<MenuTree> {
        let menu = self.get(id).await?;
        let items = self.db.menu_items.list_for_menu(id).await?;
        Ok(MenuTree {
            menu,
            items: build_menu_tree(items),
        })
    }

    // =========================================================================
    // ITEMS
    // =========================================================================

    #[instrument(skip(self, actor, input), fields(subsystem = "api", component = "menus", op = "add_item"))]
    pub async fn add_item(&self, actor: &User, menu_id: Uuid, input: CreateMenuItemInput) -> Result<MenuItem> {
        ensure_moderator(actor)?;
        self.get(menu_id).await?;
        let label = validate_required("label", &input.label, NAME_MAX_LENGTH)?;
        let url = validate_optional("url", input.url.as_deref(), URL_MAX_LENGTH)?;
        validate_menu_target(url.as_deref(), input.post_id, input.term_id)?;
        if let Some(parent_id) = input.parent_id {
            self.check_parent(menu_id, parent_id).await?;
        }
        if input.position.is_some_and(|p| p < 0) {
            return Err(Error::InvalidInput("position must not be negative".to_string()));
        }

        self.db
            .menu_items
            .create(CreateMenuItemRequest {
                menu_id,
                parent_id: input.parent_id,
                label,
                url,
                post_id: input.post_id,
                term_id: input.term_id,
                position: input.position,
            })
            .await
    }

    pub async fn update_item(&self, actor: &User, id: Uuid, input: UpdateMenuItemInput) -> Result<MenuItem> {
        ensure_moderator(actor)?;
        let item = require(self.db.menu_items.get(id).await?, "Menu item", id)?;
        let label = validate_optional("label", input.label.as_deref(), NAME_MAX_LENGTH)?;
        let url = validate_optional("url", input.url.as_deref(), URL_MAX_LENGTH)?;

        let relink = url.is_some() || input.post_id.is_some() || input.term_id.is_some();
        if relink {
            validate_menu_target(url.as_deref(), input.post_id, input.term_id)?;
        }

        self.db
            .menu_items
            .update(
                item.id,
                UpdateMenuItemRequest {
                    label,
                    url,
                    post_id: input.post_id,
                    term_id: input.term_id,
                },
            )
            .await
    }

    /// Delete an item; its children move up to its parent.
    pub async fn delete_item(&self, actor: &User, id: Uuid) -> Result<()> {
        ensure_moderator(actor)?;
        self.db.menu_items.delete(id).await
    }

    #[instrument(skip(self, actor), fields(subsystem = "api", component = "menus", op = "move_item"))]
    pub async fn move_item(
        &self,
        actor: &User,
        id: Uuid,
        new_parent: Option<Uuid>,
        position: Option<i32>,
    ) -> Result<MenuItem> {
        ensure_moderator(actor)?;
        let item = require(self.db.menu_items.get(id).await?, "Menu item", id)?;
        ensure_valid_move(&self.db.menu_items, id, new_parent).await?;
        if let Some(parent_id) = new_parent {
            self.check_parent(item.menu_id, parent_id).await?;
        }
        if position.is_some_and(|p| p < 0) {
            return Err(Error::InvalidInput("position must not be negative".to_string()));
        }
        self.db.menu_items.set_parent(id, new_parent, position).await
    }

    async fn check_parent(&self, menu_id: Uuid, parent_id: Uuid) -> Result<()> {
        let parent = require(self.db.menu_items.get(parent_id).await?, "Menu item", parent_id)?;
        if parent.menu_id != menu_id {
            return Err(Error::InvalidInput(
                "parent item belongs to another menu".to_string(),
            ));
        }
        Ok(())
    }
}
