use chrono::{DateTime, Utc};
use sqlx::Error;

use crate::model::{New_Protocol, Protocol, Table};

impl Table<Protocol> {
    /// Inserts the protocol or refreshes `updated_at` on a name conflict.
    pub async fn upsert(
        &self,
        data: &New_Protocol,
        updated_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        const SQL: &str = r#"
        INSERT INTO "protocol" (
            "name",
            "slug",
            "chain_id",
            "is_active",
            "created_at",
            "updated_at"
        )
        VALUES ($1, $2, $3, TRUE, $4, $4)
        ON CONFLICT ("name") DO UPDATE
        SET "updated_at" = EXCLUDED."updated_at"
        "#;

        sqlx::query(SQL)
            .bind(&data.name)
            .bind(&data.slug)
            .bind(data.chain_id)
            .bind(updated_at)
            .execute(&self.pool)
            .await
            .map(drop)
    }

    pub async fn get_ids_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<(String, i32)>, Error> {
        const SQL: &str = r#"
        SELECT "name", "id"
        FROM "protocol"
        WHERE "name" = ANY($1)
        "#;

        sqlx::query_as(SQL).bind(names).fetch_all(&self.pool).await
    }

    pub async fn get_all(&self) -> Result<Vec<Protocol>, Error> {
        const SQL: &str = r#"
        SELECT *
        FROM "protocol"
        ORDER BY "name"
        "#;

        sqlx::query_as(SQL).fetch_all(&self.pool).await
    }
}
