//! Database query functions
//!
//! Writers take a `SqliteConnection` so callers decide the transaction
//! boundary; readers take the pool.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{CollectorError, Result};
use crate::models::{BlockPoint, KnownPeer, TxFeePoint};

/// SQLite integers are signed; refuse values that would wrap.
pub fn to_sql_int(what: &'static str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| CollectorError::OutOfRange { what, value: value.to_string() })
}

fn from_sql_int(what: &'static str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| CollectorError::OutOfRange { what, value: value.to_string() })
}

pub struct BlockQueries;

type BlockRow = (i64, i64, i64, f64, String);

fn block_from_row((height, timestamp, total_diff, hashrate, bucket): BlockRow) -> Result<BlockPoint> {
    Ok(BlockPoint {
        height: from_sql_int("height", height)?,
        timestamp,
        total_difficulty: from_sql_int("total difficulty", total_diff)?,
        hashrate,
        tier: bucket.parse()?,
    })
}

impl BlockQueries {
    pub async fn reset(conn: &mut SqliteConnection) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM blocks").execute(&mut *conn).await?;
        Ok(deleted.rows_affected())
    }

    pub async fn upsert(conn: &mut SqliteConnection, points: &[BlockPoint]) -> Result<()> {
        for point in points {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO blocks (height, timestamp, total_diff, hashrate, bucket)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(to_sql_int("height", point.height)?)
            .bind(point.timestamp)
            .bind(to_sql_int("total difficulty", point.total_difficulty)?)
            .bind(point.hashrate)
            .bind(point.tier.as_str())
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Move aged rows to coarser tiers. `recent_cutoff` / `hourly_cutoff` are the
    /// newest timestamps that no longer qualify for `recent` / `hourly`.
    pub async fn retier(conn: &mut SqliteConnection, recent_cutoff: i64, hourly_cutoff: i64) -> Result<(u64, u64)> {
        let to_hourly = sqlx::query("UPDATE blocks SET bucket = 'hourly' WHERE bucket = 'recent' AND timestamp <= ?")
            .bind(recent_cutoff)
            .execute(&mut *conn)
            .await?;
        let to_daily = sqlx::query("UPDATE blocks SET bucket = 'daily' WHERE bucket = 'hourly' AND timestamp <= ?")
            .bind(hourly_cutoff)
            .execute(&mut *conn)
            .await?;
        Ok((to_hourly.rows_affected(), to_daily.rows_affected()))
    }

    pub async fn get(pool: &SqlitePool, height: u64) -> Result<Option<BlockPoint>> {
        let row = sqlx::query_as::<_, BlockRow>(
            "SELECT height, timestamp, total_diff, hashrate, bucket FROM blocks WHERE height = ?",
        )
        .bind(to_sql_int("height", height)?)
        .fetch_optional(pool)
        .await?;

        row.map(block_from_row).transpose()
    }

    /// Newest rows first.
    pub async fn latest(pool: &SqlitePool, limit: i64) -> Result<Vec<BlockPoint>> {
        let rows = sqlx::query_as::<_, BlockRow>(
            r#"
            SELECT height, timestamp, total_diff, hashrate, bucket
            FROM blocks
            ORDER BY height DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(block_from_row).collect()
    }

    pub async fn hashrate_series(pool: &SqlitePool, bucket: &str) -> Result<Vec<(i64, f64)>> {
        let rows = sqlx::query_as::<_, (i64, f64)>(
            "SELECT timestamp, hashrate FROM blocks WHERE bucket = ? ORDER BY timestamp, height",
        )
        .bind(bucket)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn difficulty_series(pool: &SqlitePool, bucket: &str) -> Result<Vec<(i64, i64)>> {
        let rows = sqlx::query_as::<_, (i64, i64)>(
            "SELECT timestamp, total_diff FROM blocks WHERE bucket = ? ORDER BY timestamp, height",
        )
        .bind(bucket)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM blocks")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

/// Column of `block_stats` exported as a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMetric {
    Transactions,
    Fees,
}

impl TxMetric {
    fn column(&self) -> &'static str {
        match self {
            TxMetric::Transactions => "tx_count",
            TxMetric::Fees => "fee_total",
        }
    }
}

pub struct TxFeeQueries;

impl TxFeeQueries {
    pub async fn upsert(conn: &mut SqliteConnection, points: &[TxFeePoint]) -> Result<()> {
        for point in points {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO block_stats (height, timestamp, tx_count, fee_total, output_count)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(to_sql_int("height", point.height)?)
            .bind(point.timestamp)
            .bind(to_sql_int("tx count", point.tx_count)?)
            .bind(to_sql_int("fee total", point.fee_total)?)
            .bind(to_sql_int("output count", point.output_count)?)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Per-height values with `timestamp >= since`.
    pub async fn raw_since(pool: &SqlitePool, metric: TxMetric, since: i64) -> Result<Vec<(i64, i64)>> {
        let sql = format!(
            "SELECT timestamp, {col} FROM block_stats WHERE timestamp >= ? ORDER BY timestamp, height",
            col = metric.column()
        );
        let rows = sqlx::query_as::<_, (i64, i64)>(&sql)
            .bind(since)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    /// Sums over fixed-width buckets of `bucket_secs` for `from <= timestamp < to`.
    pub async fn bucketed(
        pool: &SqlitePool,
        metric: TxMetric,
        bucket_secs: i64,
        from: Option<i64>,
        to: i64,
    ) -> Result<Vec<(i64, i64)>> {
        let sql = format!(
            r#"
            SELECT (timestamp / {width}) * {width} AS bucket_ts, SUM({col})
            FROM block_stats
            WHERE timestamp >= ? AND timestamp < ?
            GROUP BY bucket_ts
            ORDER BY bucket_ts
            "#,
            width = bucket_secs,
            col = metric.column()
        );
        let rows = sqlx::query_as::<_, (i64, i64)>(&sql)
            .bind(from.unwrap_or(i64::MIN))
            .bind(to)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM block_stats")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

pub struct MetaQueries;

impl MetaQueries {
    pub const LAST_HEIGHT: &'static str = "last_height";
    pub const LAST_UPDATED: &'static str = "last_updated";
    pub const PEERS_UPDATED: &'static str = "peers_updated";

    pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, Option<String>>("SELECT value FROM meta WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
        Ok(value.flatten())
    }

    pub async fn get_i64(pool: &SqlitePool, key: &str) -> Result<Option<i64>> {
        Ok(Self::get(pool, key).await?.and_then(|v| v.trim().parse().ok()))
    }

    pub async fn set(conn: &mut SqliteConnection, key: &str, value: impl ToString) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn last_height(pool: &SqlitePool) -> Result<Option<u64>> {
        Ok(Self::get_i64(pool, Self::LAST_HEIGHT).await?.map(|h| h.max(0) as u64))
    }
}

pub struct PeerQueries;

impl PeerQueries {
    /// Insert new peers; refresh mutable fields and `last_seen` of known ones.
    /// `first_seen` of an existing row is never touched.
    pub async fn upsert(conn: &mut SqliteConnection, peers: &[KnownPeer]) -> Result<()> {
        for peer in peers {
            sqlx::query(
                r#"
                INSERT INTO known_peers (
                    ip, network, port, user_agent, direction, lat, lng,
                    country, country_code, city, first_seen, last_seen
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (ip, network) DO UPDATE SET
                    port         = excluded.port,
                    user_agent   = excluded.user_agent,
                    direction    = excluded.direction,
                    lat          = excluded.lat,
                    lng          = excluded.lng,
                    country      = excluded.country,
                    country_code = excluded.country_code,
                    city         = excluded.city,
                    last_seen    = MAX(known_peers.last_seen, excluded.last_seen)
                "#,
            )
            .bind(&peer.ip)
            .bind(&peer.network)
            .bind(peer.port)
            .bind(&peer.user_agent)
            .bind(&peer.direction)
            .bind(peer.lat)
            .bind(peer.lng)
            .bind(&peer.country)
            .bind(&peer.country_code)
            .bind(&peer.city)
            .bind(peer.first_seen)
            .bind(peer.last_seen)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn prune(conn: &mut SqliteConnection, cutoff: i64) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM known_peers WHERE last_seen < ?")
            .bind(cutoff)
            .execute(&mut *conn)
            .await?;
        Ok(deleted.rows_affected())
    }

    pub async fn seen_since(pool: &SqlitePool, cutoff: i64) -> Result<Vec<KnownPeer>> {
        let peers = sqlx::query_as::<_, KnownPeer>(
            r#"
            SELECT ip, network, port, user_agent, direction,
                   lat, lng, country, country_code, city, first_seen, last_seen
            FROM known_peers
            WHERE last_seen >= ?
            ORDER BY last_seen DESC, network, ip
            "#,
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await?;
        Ok(peers)
    }

    pub async fn get(pool: &SqlitePool, ip: &str, network: &str) -> Result<Option<KnownPeer>> {
        let peer = sqlx::query_as::<_, KnownPeer>(
            r#"
            SELECT ip, network, port, user_agent, direction,
                   lat, lng, country, country_code, city, first_seen, last_seen
            FROM known_peers
            WHERE ip = ? AND network = ?
            "#,
        )
        .bind(ip)
        .bind(network)
        .fetch_optional(pool)
        .await?;
        Ok(peer)
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM known_peers")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

pub struct SnapshotQueries;

impl SnapshotQueries {
    /// Append a histogram. Rows are never rewritten: if one was already taken
    /// at `sampled_at` this is a no-op and returns `false`.
    pub async fn insert(conn: &mut SqliteConnection, sampled_at: i64, counts: &[(String, i64)]) -> Result<bool> {
        let taken = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM peer_snapshots WHERE sampled_at = ?")
            .bind(sampled_at)
            .fetch_one(&mut *conn)
            .await?;
        if taken > 0 {
            return Ok(false);
        }
        for (user_agent, count) in counts {
            sqlx::query("INSERT INTO peer_snapshots (sampled_at, user_agent, count) VALUES (?, ?, ?)")
                .bind(sampled_at)
                .bind(user_agent)
                .bind(count)
                .execute(&mut *conn)
                .await?;
        }
        Ok(true)
    }

    pub async fn prune(conn: &mut SqliteConnection, cutoff: i64) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM peer_snapshots WHERE sampled_at < ?")
            .bind(cutoff)
            .execute(&mut *conn)
            .await?;
        Ok(deleted.rows_affected())
    }

    /// The newest snapshot, largest counts first.
    pub async fn latest(pool: &SqlitePool) -> Result<Option<(i64, Vec<(String, i64)>)>> {
        let latest = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(sampled_at) FROM peer_snapshots")
            .fetch_one(pool)
            .await?;
        let Some(sampled_at) = latest else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT user_agent, count
            FROM peer_snapshots
            WHERE sampled_at = ?
            ORDER BY count DESC, user_agent
            "#,
        )
        .bind(sampled_at)
        .fetch_all(pool)
        .await?;

        Ok(Some((sampled_at, rows)))
    }
}
