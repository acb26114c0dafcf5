//! Menu and menu item repositories.
//!
//! Items of one menu form a tree through `parent_id`, ordered among siblings
//! by `position`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use plinth_core::{
    new_v7, CreateMenuItemRequest, Error, Menu, MenuItem, MenuItemRepository, MenuRepository,
    Result, TreeRepository, UpdateMenuItemRequest,
};

use crate::tree::TreeTable;

const TREE: TreeTable = TreeTable {
    table: "menu_items",
    scope: Some("menu_id"),
    order_by: "position",
};

const ITEM_COLUMNS: &str =
    "id, menu_id, parent_id, label, url, post_id, term_id, position, created_at, updated_at";

/// Next free position under a parent: `$menu`, `$parent`, `$exclude`.
const NEXT_POSITION: &str = "(SELECT COALESCE(MAX(position) + 1, 0) FROM menu_items
                              WHERE menu_id = {menu} AND parent_id IS NOT DISTINCT FROM {parent}
                                AND id IS DISTINCT FROM {exclude})";

fn next_position(menu: &str, parent: &str, exclude: &str) -> String {
    NEXT_POSITION
        .replace("{menu}", menu)
        .replace("{parent}", parent)
        .replace("{exclude}", exclude)
}

fn link_error(err: sqlx::Error) -> Error {
    let err = Error::Database(err);
    if err.is_foreign_key_violation() {
        Error::InvalidInput("linked menu, parent, post or term does not exist".to_string())
    } else if err.is_check_violation() {
        Error::InvalidInput(
            "menu item must link to exactly one of url, post_id or term_id".to_string(),
        )
    } else {
        err
    }
}

// =============================================================================
// MENUS
// =============================================================================

/// PostgreSQL implementation of MenuRepository.
pub struct PgMenuRepository {
    pool: Pool<Postgres>,
}

impl PgMenuRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_menu_row(row: &PgRow) -> Menu {
        Menu {
            id: row.get("id"),
            name: row.get("name"),
            location: row.get("location"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl MenuRepository for PgMenuRepository {
    async fn create(&self, name: &str, location: &str) -> Result<Menu> {
        let row = sqlx::query(
            "INSERT INTO menus (id, name, location, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $4)
             RETURNING id, name, location, created_at, updated_at",
        )
        .bind(new_v7())
        .bind(name)
        .bind(location)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(e)
                .on_unique_violation(format!("menu location '{}' is already taken", location))
        })?;

        Ok(Self::parse_menu_row(&row))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Menu>> {
        let row = sqlx::query(
            "SELECT id, name, location, created_at, updated_at FROM menus WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_menu_row))
    }

    async fn get_by_location(&self, location: &str) -> Result<Option<Menu>> {
        let row = sqlx::query(
            "SELECT id, name, location, created_at, updated_at FROM menus WHERE location = $1",
        )
        .bind(location)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_menu_row))
    }

    async fn list(&self) -> Result<Vec<Menu>> {
        let rows = sqlx::query(
            "SELECT id, name, location, created_at, updated_at FROM menus ORDER BY location",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_menu_row).collect())
    }

    async fn update(&self, id: Uuid, name: Option<&str>, location: Option<&str>) -> Result<Menu> {
        let row = sqlx::query(
            "UPDATE menus SET name = COALESCE($2, name), location = COALESCE($3, location),
                              updated_at = $4
             WHERE id = $1
             RETURNING id, name, location, created_at, updated_at",
        )
        .bind(id)
        .bind(name)
        .bind(location)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(e).on_unique_violation("menu location is already taken"))?
        .ok_or_else(|| Error::NotFound(format!("Menu {} not found", id)))?;

        Ok(Self::parse_menu_row(&row))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM menus WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        if deleted == 0 {
            return Err(Error::NotFound(format!("Menu {} not found", id)));
        }
        info!(subsystem = "db", component = "menus", op = "delete", menu_id = %id, "Menu deleted");
        Ok(())
    }
}

// =============================================================================
// MENU ITEMS
// =============================================================================

/// PostgreSQL implementation of MenuItemRepository.
pub struct PgMenuItemRepository {
    pool: Pool<Postgres>,
}

impl PgMenuItemRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_item_row(row: &PgRow) -> Result<MenuItem> {
        Ok(MenuItem {
            id: row.get("id"),
            menu_id: row.get("menu_id"),
            parent_id: row.get("parent_id"),
            label: row.get("label"),
            url: row.get("url"),
            post_id: row.get("post_id"),
            term_id: row.get("term_id"),
            position: row.get("position"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn not_found(id: Uuid) -> Error {
        Error::NotFound(format!("Menu item {} not found", id))
    }
}

#[async_trait]
impl TreeRepository for PgMenuItemRepository {
    fn node_kind(&self) -> &'static str {
        "menu item"
    }

    async fn node_exists(&self, id: Uuid) -> Result<bool> {
        TREE.exists(&self.pool, id).await
    }

    async fn is_descendant(&self, ancestor: Uuid, candidate: Uuid) -> Result<bool> {
        TREE.is_descendant(&self.pool, ancestor, candidate).await
    }
}

#[async_trait]
impl MenuItemRepository for PgMenuItemRepository {
    async fn create(&self, req: CreateMenuItemRequest) -> Result<MenuItem> {
        let row = sqlx::query(&format!(
            "INSERT INTO menu_items (id, menu_id, parent_id, label, url, post_id, term_id,
                                     position, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, {}), $9, $9)
             RETURNING {}",
            next_position("$2", "$3", "NULL"),
            ITEM_COLUMNS
        ))
        .bind(new_v7())
        .bind(req.menu_id)
        .bind(req.parent_id)
        .bind(&req.label)
        .bind(&req.url)
        .bind(req.post_id)
        .bind(req.term_id)
        .bind(req.position)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(link_error)?;

        Self::parse_item_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<MenuItem>> {
        let row = sqlx::query(&format!("SELECT {} FROM menu_items WHERE id = $1", ITEM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_item_row).transpose()
    }

    async fn list_for_menu(&self, menu_id: Uuid) -> Result<Vec<MenuItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM menu_items WHERE menu_id = $1",
            ITEM_COLUMNS
        ))
        .bind(menu_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_item_row).collect()
    }

    async fn update(&self, id: Uuid, req: UpdateMenuItemRequest) -> Result<MenuItem> {
        // Any link field present replaces the whole target.
        let relink = req.url.is_some() || req.post_id.is_some() || req.term_id.is_some();

        let row = sqlx::query(&format!(
            "UPDATE menu_items SET
                label = COALESCE($2, label),
                url = CASE WHEN $6 THEN $3 ELSE url END,
                post_id = CASE WHEN $6 THEN $4 ELSE post_id END,
                term_id = CASE WHEN $6 THEN $5 ELSE term_id END,
                updated_at = $7
             WHERE id = $1
             RETURNING {}",
            ITEM_COLUMNS
        ))
        .bind(id)
        .bind(&req.label)
        .bind(&req.url)
        .bind(req.post_id)
        .bind(req.term_id)
        .bind(relink)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(link_error)?
        .ok_or_else(|| Self::not_found(id))?;

        Self::parse_item_row(&row)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let parent: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT parent_id FROM menu_items WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::Database)?;

        let Some(parent) = parent else {
            return Err(Self::not_found(id));
        };

        let promoted = sqlx::query(
            "UPDATE menu_items SET parent_id = $2, updated_at = $3 WHERE parent_id = $1",
        )
        .bind(id)
        .bind(parent)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        sqlx::query("DELETE FROM menu_items WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "menu_items",
            op = "delete",
            node_id = %id,
            promoted,
            "Menu item deleted"
        );
        Ok(())
    }

    async fn set_parent(
        &self,
        id: Uuid,
        parent_id: Option<Uuid>,
        position: Option<i32>,
    ) -> Result<MenuItem> {
        let row = sqlx::query(&format!(
            "UPDATE menu_items m SET
                parent_id = $2,
                position = COALESCE($3, {}),
                updated_at = $4
             WHERE m.id = $1
             RETURNING {}",
            next_position("m.menu_id", "$2", "$1"),
            ITEM_COLUMNS
        ))
        .bind(id)
        .bind(parent_id)
        .bind(position)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(link_error)?
        .ok_or_else(|| Self::not_found(id))?;

        info!(
            subsystem = "db",
            component = "menu_items",
            op = "move",
            node_id = %id,
            parent_id = ?parent_id,
            "Menu item moved"
        );
        Self::parse_item_row(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_position_substitutes_every_placeholder() {
        let sql = next_position("$2", "$3", "NULL");
        assert!(sql.contains("menu_id = $2"));
        assert!(sql.contains("IS NOT DISTINCT FROM $3"));
        assert!(sql.contains("IS DISTINCT FROM NULL"));
        assert!(!sql.contains('{'));
    }
}
