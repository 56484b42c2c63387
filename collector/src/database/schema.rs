//! Database schema definitions
//!
//! One statement per constant; `SCHEMA` lists them in creation order.

pub const CREATE_BLOCKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    height      INTEGER PRIMARY KEY,
    timestamp   INTEGER NOT NULL,
    total_diff  INTEGER NOT NULL,
    hashrate    REAL    NOT NULL DEFAULT 0,
    bucket      TEXT    NOT NULL DEFAULT 'recent'
)
"#;

pub const CREATE_BLOCKS_TIMESTAMP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_blocks_ts ON blocks(timestamp)";

pub const CREATE_BLOCKS_BUCKET_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_blocks_bucket ON blocks(bucket)";

pub const CREATE_BLOCK_STATS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS block_stats (
    height        INTEGER PRIMARY KEY,
    timestamp     INTEGER NOT NULL,
    tx_count      INTEGER NOT NULL DEFAULT 0,
    fee_total     INTEGER NOT NULL DEFAULT 0,
    output_count  INTEGER NOT NULL DEFAULT 0
)
"#;

pub const CREATE_BLOCK_STATS_TIMESTAMP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_bstats_ts ON block_stats(timestamp)";

pub const CREATE_PEER_SNAPSHOTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS peer_snapshots (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    sampled_at  INTEGER NOT NULL,
    user_agent  TEXT    NOT NULL,
    count       INTEGER NOT NULL DEFAULT 1
)
"#;

pub const CREATE_PEER_SNAPSHOTS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_peers_ts ON peer_snapshots(sampled_at)";

pub const CREATE_META_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key    TEXT PRIMARY KEY,
    value  TEXT
)
"#;

pub const CREATE_KNOWN_PEERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS known_peers (
    ip            TEXT    NOT NULL,
    network       TEXT    NOT NULL DEFAULT 'mainnet',
    port          INTEGER NOT NULL,
    user_agent    TEXT    NOT NULL DEFAULT '',
    direction     TEXT    NOT NULL DEFAULT '',
    lat           REAL    NOT NULL DEFAULT 0,
    lng           REAL    NOT NULL DEFAULT 0,
    country       TEXT    NOT NULL DEFAULT '',
    country_code  TEXT    NOT NULL DEFAULT '',
    city          TEXT    NOT NULL DEFAULT '',
    first_seen    INTEGER NOT NULL,
    last_seen     INTEGER NOT NULL,
    PRIMARY KEY (ip, network),
    CHECK (first_seen <= last_seen)
)
"#;

pub const CREATE_KNOWN_PEERS_LAST_SEEN_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_kp_last_seen ON known_peers(last_seen)";

pub const CREATE_KNOWN_PEERS_COUNTRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_kp_country ON known_peers(country)";

pub const SCHEMA: &[&str] = &[
    CREATE_BLOCKS_TABLE,
    CREATE_BLOCKS_TIMESTAMP_INDEX,
    CREATE_BLOCKS_BUCKET_INDEX,
    CREATE_BLOCK_STATS_TABLE,
    CREATE_BLOCK_STATS_TIMESTAMP_INDEX,
    CREATE_PEER_SNAPSHOTS_TABLE,
    CREATE_PEER_SNAPSHOTS_INDEX,
    CREATE_META_TABLE,
    CREATE_KNOWN_PEERS_TABLE,
    CREATE_KNOWN_PEERS_LAST_SEEN_INDEX,
    CREATE_KNOWN_PEERS_COUNTRY_INDEX,
];
