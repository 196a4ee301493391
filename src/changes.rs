//! Row types and the two state-change kinds this indexer cares about.
//!
//! `Change` is the boundary with the external ledger-decoding collaborator:
//! in production it is produced by diffing the pre/post `LedgerEntry`
//! values out of a ledger's transaction metadata (the Go sibling of this
//! crate delegates that to `stellar/go`'s `ingest` package). This crate
//! only consumes the XDR value types (`stellar_xdr::curr`) that the real
//! decoder would hand back -- it never parses the wire format itself.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use stellar_xdr::curr::{LedgerEntryData, LedgerKey, ScVal, WriteXdr};

/// Which of the two material ledger-entry kinds a [`Change`] carries.
/// Every other `LedgerEntryType` is discarded by the extractor before it
/// ever becomes a `Change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    ContractData,
    Ttl,
}

/// A single typed delta within a ledger payload.
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub ledger_sequence: u32,
    pub closed_at: DateTime<Utc>,
    /// The entry's ledger key, used to derive `key_hash`.
    pub key: LedgerKey,
    /// State of the entry after this change. `None` for a deletion, which
    /// never produces a row (deletions are not modeled by this system;
    /// see Non-goals).
    pub post: Option<LedgerEntryData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    Persistent,
    Temporary,
}

impl Durability {
    pub fn as_str(self) -> &'static str {
        match self {
            Durability::Persistent => "persistent",
            Durability::Temporary => "temporary",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractDataRow {
    pub contract_id: String,
    pub ledger_sequence: u32,
    pub key_hash: String,
    pub durability: Durability,
    pub key_symbol: String,
    pub key: Vec<u8>,
    pub val: Vec<u8>,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TtlRow {
    pub key_hash: String,
    pub live_until_ledger_sequence: u32,
    pub ledger_sequence: u32,
    pub closed_at: DateTime<Utc>,
}

/// Common accessor for the ledger a row was observed in, used by
/// dataset-agnostic test doubles.
pub trait HasLedgerSequence {
    fn ledger_sequence(&self) -> u32;
}

impl HasLedgerSequence for ContractDataRow {
    fn ledger_sequence(&self) -> u32 {
        self.ledger_sequence
    }
}

impl HasLedgerSequence for TtlRow {
    fn ledger_sequence(&self) -> u32 {
        self.ledger_sequence
    }
}

/// The key-hash Stellar uses everywhere a `LedgerKey` needs a stable,
/// fixed-length identifier: the SHA-256 of its canonical XDR encoding,
/// lower-case hex.
pub fn key_hash_hex(key: &LedgerKey) -> Result<String, stellar_xdr::curr::Error> {
    let bytes = key.to_xdr(stellar_xdr::curr::Limits::none())?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest))
}

/// Renders an `ScVal` the way it would read as a human string, not its
/// Rust type/variant debug form. Only the shapes that can plausibly lead
/// a storage key vector are handled; anything else has no useful textual
/// rendering here.
fn sc_val_as_text(val: &ScVal) -> Option<String> {
    match val {
        ScVal::Symbol(s) => std::str::from_utf8(s.as_slice()).ok().map(str::to_string),
        ScVal::String(s) => std::str::from_utf8(s.as_slice()).ok().map(str::to_string),
        _ => None,
    }
}

/// `key_symbol` is the first whitespace-delimited token of the decoded
/// vector payload with surrounding brackets stripped, or empty if the key
/// is not a vector. Soroban contracts conventionally key nested storage
/// with a leading `Symbol` (e.g. `["Balance", address]`), so in practice
/// this recovers that leading symbol's name -- rendered from the value
/// itself, never from Rust's derived `Debug` of the XDR wrapper types.
pub fn derive_key_symbol(key: &ScVal) -> String {
    match key {
        ScVal::Vec(Some(items)) => items
            .get(0)
            .and_then(sc_val_as_text)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellar_xdr::curr::{ScSymbol, ScVal, StringM, VecM};

    #[test]
    fn key_symbol_empty_for_non_vector() {
        assert_eq!(derive_key_symbol(&ScVal::Void), "");
    }

    #[test]
    fn key_symbol_takes_first_token_of_vector() {
        let sym = ScSymbol(StringM::try_from("Balance").unwrap());
        let items: VecM<ScVal> = vec![ScVal::Symbol(sym)].try_into().unwrap();
        let key = ScVal::Vec(Some(items.into()));
        let symbol = derive_key_symbol(&key);
        assert_eq!(symbol, "Balance");
    }

    #[test]
    fn key_symbol_empty_when_first_element_is_not_textual() {
        let items: VecM<ScVal> = vec![ScVal::U32(42)].try_into().unwrap();
        let key = ScVal::Vec(Some(items.into()));
        assert_eq!(derive_key_symbol(&key), "");
    }

    #[test]
    fn durability_string_mapping() {
        assert_eq!(Durability::Persistent.as_str(), "persistent");
        assert_eq!(Durability::Temporary.as_str(), "temporary");
    }
}
