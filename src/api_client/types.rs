//! Wire types for the block-explorer and miner fee-quote APIs (spec.md §6).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub satoshis: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressHistoryEntry {
    pub tx_hash: String,
    pub height: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxDetail {
    #[serde(default)]
    pub vin: Vec<TxInput>,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
    pub locktime: u32,
    pub blockheight: Option<i64>,
    pub time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxInput {
    pub txid: Option<String>,
    pub vout: Option<u32>,
    #[serde(default)]
    pub sequence: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxOutput {
    /// BTC float, per spec.md §6; converted with [`btc_to_sats`] at the call
    /// site rather than here, so this type stays a faithful wire mirror.
    pub value: f64,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptPubKey {
    pub hex: String,
    #[serde(default)]
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpentInfo {
    pub spending_txid: String,
}

/// `value * 1e8`, rounded — the exact conversion spec.md §6 specifies for
/// every BTC-float amount field this API returns.
pub fn btc_to_sats(value: f64) -> u64 {
    (value * 1e8).round() as u64
}

#[derive(Debug, Clone, Copy)]
pub struct FeeQuote {
    pub sats_per_byte: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeQuoteEnvelope {
    payload: PayloadField,
}

/// The `mapi` fee-quote envelope's `payload` is itself a JSON document, but
/// some miners serialise it as a string and others as an inline object;
/// this untagged enum accepts either.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PayloadField {
    Inline(Payload),
    Encoded(String),
}

#[derive(Debug, Clone, Deserialize)]
struct Payload {
    fees: Vec<FeeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct FeeEntry {
    #[serde(rename = "feeType")]
    fee_type: String,
    #[serde(rename = "miningFee")]
    mining_fee: MiningFee,
}

#[derive(Debug, Clone, Deserialize)]
struct MiningFee {
    satoshis: u64,
    bytes: u64,
}

impl FeeQuoteEnvelope {
    pub fn standard_rate(&self) -> Option<FeeQuote> {
        let payload = match &self.payload {
            PayloadField::Inline(payload) => payload.clone(),
            PayloadField::Encoded(s) => serde_json::from_str(s).ok()?,
        };

        payload
            .fees
            .iter()
            .find(|fee| fee.fee_type == "standard")
            .filter(|fee| fee.mining_fee.bytes > 0)
            .map(|fee| FeeQuote {
                sats_per_byte: fee.mining_fee.satoshis as f64 / fee.mining_fee.bytes as f64,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btc_to_sats_rounds_correctly() {
        assert_eq!(btc_to_sats(0.00001), 1_000);
        assert_eq!(btc_to_sats(1.23456789), 123_456_789);
    }

    #[test]
    fn fee_quote_parses_encoded_payload_string() {
        let json = r#"{"payload":"{\"fees\":[{\"feeType\":\"standard\",\"miningFee\":{\"satoshis\":1,\"bytes\":2}}]}"}"#;
        let envelope: FeeQuoteEnvelope = serde_json::from_str(json).unwrap();
        let quote = envelope.standard_rate().unwrap();
        assert_eq!(quote.sats_per_byte, 0.5);
    }

    #[test]
    fn fee_quote_parses_inline_payload_object() {
        let json = r#"{"payload":{"fees":[{"feeType":"standard","miningFee":{"satoshis":4,"bytes":2}}]}}"#;
        let envelope: FeeQuoteEnvelope = serde_json::from_str(json).unwrap();
        let quote = envelope.standard_rate().unwrap();
        assert_eq!(quote.sats_per_byte, 2.0);
    }
}
