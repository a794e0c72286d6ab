use chrono::{DateTime, Utc};
use sqlx::{types::Json, Error, QueryBuilder};

use crate::{
    dao::PositionFilter,
    helpers::slugify,
    model::{LP_Position, Position, Table},
};

use super::DataBase;

const SELECT_POSITIONS: &str = r#"
    SELECT
        p.*,
        pr."name" AS "protocol_name"
    FROM "lp_position" p
    INNER JOIN "protocol" pr ON pr."id" = p."protocol_id"
"#;

impl Table<LP_Position> {
    /// Keyed by `("protocol_id", "pool_address")`. On conflict only the
    /// mutable attributes and `last_fetched` are overwritten.
    pub async fn upsert(
        &self,
        protocol_id: i32,
        data: &Position,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        const SQL: &str = r#"
        INSERT INTO "lp_position" (
            "protocol_id",
            "pool_address",
            "pool_name",
            "chain_id",
            "token0_symbol",
            "token0_address",
            "token1_symbol",
            "token1_address",
            "apy",
            "apr",
            "tvl_usd",
            "volume_24h",
            "fees_24h",
            "il_risk",
            "risk_level",
            "farm_rewards",
            "is_stable",
            "extra",
            "last_fetched",
            "created_at"
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $19)
        ON CONFLICT ("protocol_id", "pool_address") DO UPDATE
        SET
            "apy" = EXCLUDED."apy",
            "apr" = EXCLUDED."apr",
            "tvl_usd" = EXCLUDED."tvl_usd",
            "volume_24h" = EXCLUDED."volume_24h",
            "fees_24h" = EXCLUDED."fees_24h",
            "il_risk" = EXCLUDED."il_risk",
            "risk_level" = EXCLUDED."risk_level",
            "farm_rewards" = EXCLUDED."farm_rewards",
            "is_stable" = EXCLUDED."is_stable",
            "last_fetched" = EXCLUDED."last_fetched"
        "#;

        sqlx::query(SQL)
            .bind(protocol_id)
            .bind(&data.pool_address)
            .bind(&data.pool_name)
            .bind(data.chain_id.to_string())
            .bind(&data.token0_symbol)
            .bind(&data.token0_address)
            .bind(&data.token1_symbol)
            .bind(&data.token1_address)
            .bind(data.apy)
            .bind(data.apr)
            .bind(data.tvl_usd)
            .bind(data.volume_24h)
            .bind(data.fees_24h)
            .bind(data.il_risk)
            .bind(data.risk_level.to_string())
            .bind(Json(&data.farm_rewards))
            .bind(data.is_stable)
            .bind(Json(&data.extra))
            .bind(fetched_at)
            .execute(&self.pool)
            .await
            .map(drop)
    }

    pub async fn get_top(&self, limit: i64) -> Result<Vec<LP_Position>, Error> {
        let sql = format!(
            r#"
            {}
            ORDER BY
                p."apy" DESC NULLS LAST,
                p."tvl_usd" DESC NULLS LAST,
                p."id" ASC
            LIMIT $1
            "#,
            SELECT_POSITIONS
        );

        sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn get_one(
        &self,
        protocol_name: &str,
        pool_address: &str,
    ) -> Result<Option<LP_Position>, Error> {
        let sql = format!(
            r#"
            {}
            WHERE
                pr."name" = $1 AND
                p."pool_address" = $2
            "#,
            SELECT_POSITIONS
        );

        sqlx::query_as(&sql)
            .bind(protocol_name)
            .bind(pool_address)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn search(
        &self,
        filter: &PositionFilter,
    ) -> Result<Vec<LP_Position>, Error> {
        let mut builder: QueryBuilder<DataBase> =
            QueryBuilder::new(SELECT_POSITIONS);
        builder.push(" WHERE TRUE");

        if let Some(chain) = filter.chain_key() {
            builder.push(r#" AND p."chain_id" = "#).push_bind(chain);
        }

        if let Some(protocol) = &filter.protocol {
            builder
                .push(r#" AND (LOWER(pr."name") = LOWER("#)
                .push_bind(protocol.to_owned())
                .push(r#") OR pr."slug" = "#)
                .push_bind(slugify(protocol))
                .push(")");
        }

        if let Some(min) = filter.min_apy {
            builder.push(r#" AND p."apy" >= "#).push_bind(min);
        }

        if let Some(max) = filter.max_apy {
            builder.push(r#" AND p."apy" <= "#).push_bind(max);
        }

        if let Some(min) = filter.min_tvl {
            builder.push(r#" AND p."tvl_usd" >= "#).push_bind(min);
        }

        if !filter.risk_levels.is_empty() {
            let levels: Vec<String> =
                filter.risk_levels.iter().map(|l| l.to_string()).collect();
            builder
                .push(r#" AND p."risk_level" = ANY("#)
                .push_bind(levels)
                .push(")");
        }

        if filter.stable_only {
            builder.push(r#" AND p."is_stable""#);
        }

        if let Some(pattern) = filter.asset_pattern() {
            builder
                .push(r#" AND (p."token0_symbol" ILIKE "#)
                .push_bind(pattern.to_owned())
                .push(r#" ESCAPE '\' OR p."token1_symbol" ILIKE "#)
                .push_bind(pattern)
                .push(r#" ESCAPE '\')"#);
        }

        builder
            .push(" ORDER BY ")
            .push(filter.sort_by.column())
            .push(" ")
            .push(filter.order.keyword())
            .push(r#" NULLS LAST, p."tvl_usd" DESC NULLS LAST, p."id" ASC"#)
            .push(" LIMIT ")
            .push_bind(filter.limit())
            .push(" OFFSET ")
            .push_bind(filter.offset());

        builder
            .build_query_as::<LP_Position>()
            .fetch_all(&self.pool)
            .await
    }
}
