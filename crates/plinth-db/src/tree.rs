//! Adjacency-list queries shared by the organization, term and menu item
//! tables.
//!
//! Every tree table has `id` and a nullable self-referencing `parent_id`.
//! Recursive walks carry the visited path and stop when a node repeats, so a
//! corrupted cycle in the data cannot make a query run forever.

use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use plinth_core::{Error, Result, TreeEntry};

/// Maps one row of a tree table to its model.
pub(crate) type RowMapper<T> = fn(&PgRow) -> Result<T>;

/// Static description of one tree table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeTable {
    pub table: &'static str,
    /// Column that partitions the table into independent forests
    /// (e.g. `taxonomy_id`); siblings never cross it.
    pub scope: Option<&'static str>,
    /// Sibling ordering.
    pub order_by: &'static str,
}

impl TreeTable {
    fn exists_sql(&self) -> String {
        format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)", self.table)
    }

    fn has_children_sql(&self) -> String {
        format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE parent_id = $1)",
            self.table
        )
    }

    /// `$1` = ancestor, `$2` = candidate. Walks upward from the candidate.
    fn is_descendant_sql(&self) -> String {
        format!(
            r#"
            WITH RECURSIVE up AS (
                SELECT id, parent_id, ARRAY[id] AS path
                FROM {t} WHERE id = $2
                UNION ALL
                SELECT t.id, t.parent_id, up.path || t.id
                FROM {t} t
                JOIN up ON t.id = up.parent_id
                WHERE NOT t.id = ANY(up.path)
            )
            SELECT EXISTS (SELECT 1 FROM up WHERE parent_id = $1)
            "#,
            t = self.table
        )
    }

    fn children_sql(&self) -> String {
        format!(
            "SELECT * FROM {} WHERE parent_id = $1 ORDER BY {}, id",
            self.table, self.order_by
        )
    }

    fn siblings_sql(&self) -> String {
        let scope = self
            .scope
            .map(|c| format!(" AND s.{c} = n.{c}"))
            .unwrap_or_default();
        format!(
            r#"
            SELECT s.* FROM {t} s
            JOIN {t} n ON n.id = $1
            WHERE s.parent_id IS NOT DISTINCT FROM n.parent_id
              AND s.id <> n.id{scope}
            ORDER BY s.{o}, s.id
            "#,
            t = self.table,
            o = self.order_by,
            scope = scope
        )
    }

    /// Ancestors with `depth` = distance from the start node, root first.
    fn ancestors_sql(&self) -> String {
        format!(
            r#"
            WITH RECURSIVE up AS (
                SELECT parent_id AS id, 1 AS depth, ARRAY[id] AS path
                FROM {t} WHERE id = $1 AND parent_id IS NOT NULL
                UNION ALL
                SELECT t.parent_id, up.depth + 1, up.path || t.id
                FROM {t} t
                JOIN up ON t.id = up.id
                WHERE t.parent_id IS NOT NULL AND NOT t.parent_id = ANY(up.path)
            )
            SELECT x.*, up.depth FROM up
            JOIN {t} x ON x.id = up.id
            ORDER BY up.depth DESC
            "#,
            t = self.table
        )
    }

    /// Descendants up to `$2` levels deep, breadth first.
    fn descendants_sql(&self) -> String {
        format!(
            r#"
            WITH RECURSIVE down AS (
                SELECT id, 1 AS depth, ARRAY[$1::uuid, id] AS path
                FROM {t} WHERE parent_id = $1
                UNION ALL
                SELECT t.id, down.depth + 1, down.path || t.id
                FROM {t} t
                JOIN down ON t.parent_id = down.id
                WHERE down.depth < $2 AND NOT t.id = ANY(down.path)
            )
            SELECT x.*, down.depth FROM down
            JOIN {t} x ON x.id = down.id
            ORDER BY down.depth, x.{o}, x.id
            "#,
            t = self.table,
            o = self.order_by
        )
    }

    pub async fn exists(&self, pool: &Pool<Postgres>, id: Uuid) -> Result<bool> {
        sqlx::query_scalar(&self.exists_sql())
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(Error::Database)
    }

    pub async fn has_children(&self, pool: &Pool<Postgres>, id: Uuid) -> Result<bool> {
        sqlx::query_scalar(&self.has_children_sql())
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(Error::Database)
    }

    pub async fn is_descendant(
        &self,
        pool: &Pool<Postgres>,
        ancestor: Uuid,
        candidate: Uuid,
    ) -> Result<bool> {
        sqlx::query_scalar(&self.is_descendant_sql())
            .bind(ancestor)
            .bind(candidate)
            .fetch_one(pool)
            .await
            .map_err(Error::Database)
    }

    pub async fn children<T>(
        &self,
        pool: &Pool<Postgres>,
        id: Uuid,
        map: RowMapper<T>,
    ) -> Result<Vec<T>> {
        let rows = sqlx::query(&self.children_sql())
            .bind(id)
            .fetch_all(pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(map).collect()
    }

    pub async fn siblings<T>(
        &self,
        pool: &Pool<Postgres>,
        id: Uuid,
        map: RowMapper<T>,
    ) -> Result<Vec<T>> {
        let rows = sqlx::query(&self.siblings_sql())
            .bind(id)
            .fetch_all(pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(map).collect()
    }

    pub async fn ancestors<T>(
        &self,
        pool: &Pool<Postgres>,
        id: Uuid,
        map: RowMapper<T>,
    ) -> Result<Vec<TreeEntry<T>>> {
        let rows = sqlx::query(&self.ancestors_sql())
            .bind(id)
            .fetch_all(pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(|r| with_depth(r, map)).collect()
    }

    pub async fn descendants<T>(
        &self,
        pool: &Pool<Postgres>,
        id: Uuid,
        max_depth: i32,
        map: RowMapper<T>,
    ) -> Result<Vec<TreeEntry<T>>> {
        let rows = sqlx::query(&self.descendants_sql())
            .bind(id)
            .bind(max_depth.max(1))
            .fetch_all(pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(|r| with_depth(r, map)).collect()
    }
}

fn with_depth<T>(row: &PgRow, map: RowMapper<T>) -> Result<TreeEntry<T>> {
    Ok(TreeEntry {
        node: map(row)?,
        depth: row.get("depth"),
    })
}
