//! Row-mapped entity types for the store (spec.md §3).
//!
//! Each type mirrors a table from `migrations.rs`. Enums serialise to the
//! short lowercase strings the data model names (`"unspent"`, `"pending"`,
//! `"locks"`, ...) rather than integers, so the database stays inspectable
//! with a plain `sqlite3` shell the way a real wallet's support flow needs.

use rusqlite::{types::FromSql, types::FromSqlError, types::ToSqlOutput, Row, ToSql};
use serde::{Deserialize, Serialize};

/// Partitions UTXOs by role; see spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Basket {
    Default,
    Ordinals,
    Identity,
    Derived,
    Locks,
}

impl Basket {
    fn as_str(&self) -> &'static str {
        match self {
            Basket::Default => "default",
            Basket::Ordinals => "ordinals",
            Basket::Identity => "identity",
            Basket::Derived => "derived",
            Basket::Locks => "locks",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "default" => Basket::Default,
            "ordinals" => Basket::Ordinals,
            "identity" => Basket::Identity,
            "derived" => Basket::Derived,
            "locks" => Basket::Locks,
            _ => return None,
        })
    }

    /// Upgrades from any basket to `derived` are monotonic (spec.md §3);
    /// `derived` never reverts to a less-specific basket.
    pub fn upgrade(current: Basket, observed: Basket) -> Basket {
        if current == Basket::Derived {
            Basket::Derived
        } else {
            observed
        }
    }
}

impl ToSql for Basket {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Basket {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::Result<Self, FromSqlError> {
        let s = value.as_str()?;
        Basket::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown basket {s}").into()))
    }
}

/// The pending-spend state machine's three states (spec.md §3, §4.5). `NULL`
/// in the database and `Unspent` here are treated identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpendingStatus {
    Unspent,
    Pending,
    Spent,
}

impl SpendingStatus {
    fn as_str(&self) -> &'static str {
        match self {
            SpendingStatus::Unspent => "unspent",
            SpendingStatus::Pending => "pending",
            SpendingStatus::Spent => "spent",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "unspent" => SpendingStatus::Unspent,
            "pending" => SpendingStatus::Pending,
            "spent" => SpendingStatus::Spent,
            _ => return None,
        })
    }

    pub fn from_nullable(value: Option<String>) -> SpendingStatus {
        value
            .and_then(|s| SpendingStatus::parse(&s))
            .unwrap_or(SpendingStatus::Unspent)
    }
}

impl ToSql for SpendingStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// Open-question resolution (SPEC_FULL.md): the `"unknown"` sentinel used
/// when reconciliation can't attribute a spend to a known txid is modeled as
/// its own variant instead of a magic string, while still persisting the
/// literal text `"unknown"` so the on-disk shape matches spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpentTxid {
    Known(String),
    Unknown,
}

impl SpentTxid {
    pub fn as_str(&self) -> &str {
        match self {
            SpentTxid::Known(txid) => txid,
            SpentTxid::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> SpentTxid {
        if s == "unknown" {
            SpentTxid::Unknown
        } else {
            SpentTxid::Known(s.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => TransactionStatus::Pending,
            "confirmed" => TransactionStatus::Confirmed,
            "failed" => TransactionStatus::Failed,
            _ => return None,
        })
    }
}

impl ToSql for TransactionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionStatus {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::Result<Self, FromSqlError> {
        let s = value.as_str()?;
        TransactionStatus::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown transaction status {s}").into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub id: i64,
    pub account_id: i64,
    pub txid: String,
    pub vout: u32,
    pub satoshis: u64,
    pub locking_script: String,
    pub address: String,
    pub basket: Basket,
    pub spendable: bool,
    pub created_at: i64,
    pub spent_at: Option<i64>,
    pub spent_txid: Option<SpentTxid>,
    pub spending_status: SpendingStatus,
    pub pending_spending_txid: Option<String>,
    pub pending_since: Option<i64>,
    pub tags: Vec<String>,
}

impl Utxo {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let tags_json: String = row.get("tags")?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
        let spent_txid: Option<String> = row.get("spent_txid")?;
        let spending_status: Option<String> = row.get("spending_status")?;

        Ok(Utxo {
            id: row.get("id")?,
            account_id: row.get("account_id")?,
            txid: row.get("txid")?,
            vout: row.get("vout")?,
            satoshis: row.get::<_, i64>("satoshis")? as u64,
            locking_script: row.get("locking_script")?,
            address: row.get("address")?,
            basket: row.get("basket")?,
            spendable: row.get::<_, i64>("spendable")? != 0,
            created_at: row.get("created_at")?,
            spent_at: row.get("spent_at")?,
            spent_txid: spent_txid.map(|s| SpentTxid::from_str(&s)),
            spending_status: SpendingStatus::from_nullable(spending_status),
            pending_spending_txid: row.get("pending_spending_txid")?,
            pending_since: row.get("pending_since")?,
            tags,
        })
    }

    /// Coin-selection eligibility per spec.md §4.5 and invariant 3 in §8.
    pub fn is_spendable(&self) -> bool {
        self.spendable && self.spent_at.is_none() && self.spending_status != SpendingStatus::Pending
            && self.spending_status != SpendingStatus::Spent
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    pub txid: String,
    pub raw_tx: Option<String>,
    pub description: Option<String>,
    pub created_at: i64,
    pub confirmed_at: Option<i64>,
    pub block_height: Option<i64>,
    pub status: TransactionStatus,
    pub amount: Option<i64>,
    pub labels: Vec<String>,
}

impl Transaction {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let labels_json: String = row.get("labels")?;
        let labels: Vec<String> = serde_json::from_str(&labels_json).unwrap_or_default();

        Ok(Transaction {
            id: row.get("id")?,
            account_id: row.get("account_id")?,
            txid: row.get("txid")?,
            raw_tx: row.get("raw_tx")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
            confirmed_at: row.get("confirmed_at")?,
            block_height: row.get("block_height")?,
            status: row.get("status")?,
            amount: row.get("amount")?,
            labels,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub id: i64,
    pub account_id: i64,
    pub utxo_id: i64,
    pub unlock_block: u32,
    pub lock_block: Option<i64>,
    pub ordinal_origin: Option<String>,
    pub created_at: i64,
    pub unlocked_at: Option<i64>,
}

impl Lock {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Lock {
            id: row.get("id")?,
            account_id: row.get("account_id")?,
            utxo_id: row.get("utxo_id")?,
            unlock_block: row.get::<_, i64>("unlock_block")? as u32,
            lock_block: row.get("lock_block")?,
            ordinal_origin: row.get("ordinal_origin")?,
            created_at: row.get("created_at")?,
            unlocked_at: row.get("unlocked_at")?,
        })
    }

    /// Invariant 4 (spec.md §8): `unlockedAt = NULL ⇔` the referenced UTXO is
    /// not known-spent. Callers check this against the UTXO row themselves;
    /// this just names the active/inactive predicate.
    pub fn is_active(&self) -> bool {
        self.unlocked_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    pub address: String,
    pub account_id: i64,
    pub sender_public_key: String,
    pub invoice_number: String,
    pub last_synced_at: Option<i64>,
}

impl DerivedAddress {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(DerivedAddress {
            address: row.get("address")?,
            account_id: row.get("account_id")?,
            sender_public_key: row.get("sender_public_key")?,
            invoice_number: row.get("invoice_number")?,
            last_synced_at: row.get("last_synced_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub active: bool,
    pub encrypted_keys: String,
}

impl Account {
    pub(super) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Account {
            id: row.get("id")?,
            name: row.get("name")?,
            created_at: row.get("created_at")?,
            active: row.get::<_, i64>("active")? != 0,
            encrypted_keys: row.get("encrypted_keys")?,
        })
    }
}
