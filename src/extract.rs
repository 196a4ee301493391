//! Change Extractor: turns a stream of [`Change`]s for one ledger into
//! deduplicated, deterministically ordered rows for one dataset.
//!
//! Grounded on `internal/transform/contract_data.go` and
//! `internal/transform/ttl.go`: filter by entry type, apply the per-row
//! derivation, drop the one documented nonce artifact, then dedupe by
//! natural key keeping the latest occurrence
//! (`utils.RemoveDuplicatesByFields`).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use stellar_xdr::curr::{LedgerEntryData, ScVal};

use crate::changes::{derive_key_symbol, key_hash_hex, Change, ChangeKind, ContractDataRow, Durability, TtlRow};

#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("computing key hash: {0}")]
    KeyHash(#[from] stellar_xdr::curr::Error),
    #[error("change of kind {0:?} carried mismatched ledger entry data")]
    KindMismatch(ChangeKind),
}

/// Which dataset to extract. Each variant pulls a disjoint subset of the
/// incoming `Change` stream, identified by `ChangeKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    ContractData,
    Ttl,
}

impl Dataset {
    pub fn table_name(self) -> &'static str {
        match self {
            Dataset::ContractData => "contract_data",
            Dataset::Ttl => "ttl",
        }
    }

    fn kind(self) -> ChangeKind {
        match self {
            Dataset::ContractData => ChangeKind::ContractData,
            Dataset::Ttl => ChangeKind::Ttl,
        }
    }
}

/// Build one `ContractDataRow` from a change already known to be of kind
/// `ContractData`. Returns `Ok(None)` for a deletion (no `post` state) --
/// this system never rows out entry removals.
fn contract_data_row(change: &Change) -> Result<Option<ContractDataRow>, ExtractError> {
    let Some(data) = &change.post else {
        return Ok(None);
    };
    let LedgerEntryData::ContractData(entry) = data else {
        return Err(ExtractError::KindMismatch(ChangeKind::ContractData));
    };

    let contract_id = match &entry.contract {
        stellar_xdr::curr::ScAddress::Contract(hash) => hex::encode(hash.0),
        stellar_xdr::curr::ScAddress::Account(_) => String::new(),
    };

    // The nonce-discard rule: entries with no resolvable contract id are a
    // transient artifact of certain host-function invocations and are
    // never rows in this dataset.
    if contract_id.is_empty() {
        return Ok(None);
    }

    let durability = match entry.durability {
        stellar_xdr::curr::ContractDataDurability::Persistent => Durability::Persistent,
        stellar_xdr::curr::ContractDataDurability::Temporary => Durability::Temporary,
    };

    let key_hash = key_hash_hex(&change.key)?;
    let key_symbol = derive_key_symbol(&entry.key);

    Ok(Some(ContractDataRow {
        contract_id,
        ledger_sequence: change.ledger_sequence,
        key_hash,
        durability,
        key_symbol,
        key: key_xdr_bytes(&entry.key),
        val: key_xdr_bytes(&entry.val),
        closed_at: change.closed_at,
    }))
}

fn key_xdr_bytes(val: &ScVal) -> Vec<u8> {
    use stellar_xdr::curr::WriteXdr;
    val.to_xdr(stellar_xdr::curr::Limits::none())
        .unwrap_or_default()
}

fn ttl_row(change: &Change) -> Result<Option<TtlRow>, ExtractError> {
    let Some(data) = &change.post else {
        return Ok(None);
    };
    let LedgerEntryData::Ttl(entry) = data else {
        return Err(ExtractError::KindMismatch(ChangeKind::Ttl));
    };

    Ok(Some(TtlRow {
        key_hash: hex::encode(entry.key_hash.0),
        live_until_ledger_sequence: entry.live_until_ledger_seq,
        ledger_sequence: change.ledger_sequence,
        closed_at: change.closed_at,
    }))
}

/// Natural keys used for intra-payload deduplication.
fn contract_data_key(row: &ContractDataRow) -> (String, String, u32, Vec<u8>) {
    (
        row.contract_id.clone(),
        row.key_hash.clone(),
        row.ledger_sequence,
        row.key.clone(),
    )
}

fn ttl_key(row: &TtlRow) -> (String, u32) {
    (row.key_hash.clone(), row.ledger_sequence)
}

fn stable_hash<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Dedup by natural key, keeping the latest occurrence in iteration order,
/// then sort survivors by a stable hash of their key so output order is
/// deterministic across runs regardless of the ledger's internal change
/// ordering.
fn dedup_keep_last_sorted<T, K, F>(items: Vec<T>, key_fn: F) -> Vec<T>
where
    K: Eq + Hash + Clone,
    F: Fn(&T) -> K,
{
    let mut by_key: HashMap<K, T> = HashMap::new();
    for item in items {
        by_key.insert(key_fn(&item), item);
    }
    let mut pairs: Vec<(K, T)> = by_key.into_iter().collect();
    pairs.sort_by_key(|(k, _)| stable_hash(k));
    pairs.into_iter().map(|(_, v)| v).collect()
}

/// Extract every row of `dataset` out of one ledger's changes, deduplicated
/// and deterministically ordered.
pub fn extract_contract_data(changes: &[Change]) -> Result<Vec<ContractDataRow>, ExtractError> {
    let mut rows = Vec::new();
    for change in changes.iter().filter(|c| c.kind == Dataset::ContractData.kind()) {
        if let Some(row) = contract_data_row(change)? {
            rows.push(row);
        }
    }
    Ok(dedup_keep_last_sorted(rows, contract_data_key))
}

pub fn extract_ttl(changes: &[Change]) -> Result<Vec<TtlRow>, ExtractError> {
    let mut rows = Vec::new();
    for change in changes.iter().filter(|c| c.kind == Dataset::Ttl.kind()) {
        if let Some(row) = ttl_row(change)? {
            rows.push(row);
        }
    }
    Ok(dedup_keep_last_sorted(rows, ttl_key))
}
