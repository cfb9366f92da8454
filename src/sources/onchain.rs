//! Wallet history adapter for Etherscan-compatible explorers

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use credit_core::{OnChainActivity, Source};

use super::{ActivitySource, HttpSource, unix_timestamp, until_cancelled};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::fetch::{DataKind, FetchCache, FetchOptions, cache_key};
use crate::Result;

/// Etherscan multichain API
pub const DEFAULT_BASE_URL: &str = "https://api.etherscan.io/v2/api";

/// Ethereum mainnet
const CHAIN_ID: &str = "1";

/// Largest page the explorer serves
const PAGE_SIZE: u32 = 10_000;

const WEI_PER_ETH: f64 = 1e18;

/// One normal transaction touching the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTx {
    /// Block time
    pub timestamp: DateTime<Utc>,
    /// Sender, lowercase
    pub from: String,
    /// Recipient, lowercase; empty for contract creation
    pub to: String,
    /// Created contract, lowercase; empty otherwise
    pub contract_address: String,
}

/// One ERC-20 transfer touching the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    /// Token contract, lowercase
    pub token: String,
    /// Block time
    pub timestamp: DateTime<Utc>,
}

/// On-chain adapter
pub struct OnChainSource {
    http: Arc<HttpSource>,
    cache: FetchCache,
    api_key: Option<String>,
    transactions: FetchOptions<Vec<ChainTx>>,
    token_transfers: FetchOptions<Vec<TokenTransfer>>,
    balance: FetchOptions<f64>,
}

impl OnChainSource {
    /// Create the adapter; the explorer key travels as the `apikey` parameter
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SourceConfig, cache: FetchCache) -> Result<Self> {
        let http = HttpSource::new("onchain", config, DEFAULT_BASE_URL, cache.config().timeout)?;
        Ok(Self::with_http(Arc::new(http), cache, config.resolve_api_key()))
    }

    /// Create the adapter on top of an existing client
    #[must_use]
    pub fn with_http(http: Arc<HttpSource>, cache: FetchCache, api_key: Option<String>) -> Self {
        Self {
            http,
            cache,
            api_key,
            transactions: FetchOptions::with_transform(DataKind::ChainActivity, |v| {
                parse_transactions(&v)
            }),
            token_transfers: FetchOptions::with_transform(DataKind::ChainActivity, |v| {
                parse_token_transfers(&v)
            }),
            balance: FetchOptions::with_transform(DataKind::ChainActivity, |v| parse_balance(&v)),
        }
    }

    fn query(&self, action: &str, address: &str) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("chainid", CHAIN_ID.to_string()),
            ("module", "account".to_string()),
            ("action", action.to_string()),
            ("address", address.to_string()),
        ];
        if action == "balance" {
            query.push(("tag", "latest".to_string()));
        } else {
            query.extend([
                ("startblock", "0".to_string()),
                ("endblock", "99999999".to_string()),
                ("page", "1".to_string()),
                ("offset", PAGE_SIZE.to_string()),
                ("sort", "asc".to_string()),
            ]);
        }
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.clone()));
        }
        query
    }

    async fn load(&self, address: &str) -> std::result::Result<OnChainActivity, FetchError> {
        let tx_key = cache_key("onchain", address, "txlist");
        let token_key = cache_key("onchain", address, "tokentx");
        let balance_key = cache_key("onchain", address, "balance");

        let (transactions, tokens, balance_wei) = tokio::try_join!(
            self.http.get_cached(
                &self.cache,
                &tx_key,
                String::new(),
                self.query("txlist", address),
                &self.transactions,
            ),
            self.http.get_cached(
                &self.cache,
                &token_key,
                String::new(),
                self.query("tokentx", address),
                &self.token_transfers,
            ),
            self.http.get_cached(
                &self.cache,
                &balance_key,
                String::new(),
                self.query("balance", address),
                &self.balance,
            ),
        )?;

        Ok(assemble(address, &transactions, &tokens, balance_wei, Utc::now()))
    }
}

#[async_trait]
impl ActivitySource for OnChainSource {
    type Record = OnChainActivity;

    fn source(&self) -> Source {
        Source::OnChain
    }

    async fn fetch_activity(
        &self,
        identity: &str,
        cancel: CancellationToken,
    ) -> std::result::Result<OnChainActivity, FetchError> {
        let address = normalize_address(identity)?;
        until_cancelled(&cancel, self.load(&address)).await
    }
}

/// Lowercase a `0x`-prefixed 20-byte hex address
///
/// # Errors
///
/// Returns [`FetchError::Validation`] for anything else.
pub fn normalize_address(identity: &str) -> std::result::Result<String, FetchError> {
    let address = identity.trim().to_lowercase();
    let valid = address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(address)
    } else {
        Err(FetchError::validation(format!("invalid wallet address {identity:?}")))
    }
}

/// Unwrap the explorer's `{status, message, result}` envelope.
///
/// An empty history comes back as status `0`; quota and key problems are
/// reported in the body with a 200 status.
///
/// # Errors
///
/// Returns [`FetchError::RateLimited`], [`FetchError::AuthRequired`] or
/// [`FetchError::Validation`] depending on the explorer's message.
pub fn parse_envelope(data: &Value) -> std::result::Result<&Value, FetchError> {
    match data["status"].as_str() {
        Some("1") => Ok(&data["result"]),
        Some("0") => {
            let message = data["message"].as_str().unwrap_or_default();
            let detail = data["result"].as_str().unwrap_or(message);
            let lowered = detail.to_lowercase();
            if message.starts_with("No ") && data["result"].is_array() {
                Ok(&data["result"])
            } else if lowered.contains("rate limit") {
                Err(FetchError::RateLimited { retry_after: None })
            } else if lowered.contains("api key") {
                Err(FetchError::AuthRequired(detail.to_string()))
            } else {
                Err(FetchError::validation(format!("explorer error: {detail}")))
            }
        }
        _ => Err(FetchError::validation("missing field `status`")),
    }
}

fn lowercase(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_lowercase()
}

/// Parse `action=txlist`
///
/// # Errors
///
/// Returns the envelope error, or [`FetchError::Validation`] if `result` is not an array.
pub fn parse_transactions(data: &Value) -> std::result::Result<Vec<ChainTx>, FetchError> {
    let result = parse_envelope(data)?
        .as_array()
        .ok_or_else(|| FetchError::validation("expected an array of transactions"))?;

    Ok(result
        .iter()
        .filter_map(|tx| {
            Some(ChainTx {
                timestamp: unix_timestamp(&tx["timeStamp"])?,
                from: lowercase(&tx["from"]),
                to: lowercase(&tx["to"]),
                contract_address: lowercase(&tx["contractAddress"]),
            })
        })
        .collect())
}

/// Parse `action=tokentx`
///
/// # Errors
///
/// Returns the envelope error, or [`FetchError::Validation`] if `result` is not an array.
pub fn parse_token_transfers(data: &Value) -> std::result::Result<Vec<TokenTransfer>, FetchError> {
    let result = parse_envelope(data)?
        .as_array()
        .ok_or_else(|| FetchError::validation("expected an array of token transfers"))?;

    Ok(result
        .iter()
        .filter_map(|transfer| {
            Some(TokenTransfer {
                token: lowercase(&transfer["contractAddress"]),
                timestamp: unix_timestamp(&transfer["timeStamp"])?,
            })
        })
        .collect())
}

/// Parse `action=balance` into wei
///
/// # Errors
///
/// Returns the envelope error, or [`FetchError::Validation`] for a non-numeric balance.
pub fn parse_balance(data: &Value) -> std::result::Result<f64, FetchError> {
    parse_envelope(data)?
        .as_str()
        .and_then(|wei| wei.parse::<f64>().ok())
        .filter(|wei| wei.is_finite() && *wei >= 0.0)
        .ok_or_else(|| FetchError::validation("balance is not a decimal wei amount"))
}

fn assemble(
    address: &str,
    transactions: &[ChainTx],
    tokens: &[TokenTransfer],
    balance_wei: f64,
    fetched_at: DateTime<Utc>,
) -> OnChainActivity {
    let months: BTreeSet<(i32, u32)> = transactions
        .iter()
        .map(|tx| (tx.timestamp.year(), tx.timestamp.month()))
        .collect();

    let counterparties: BTreeSet<&str> = transactions
        .iter()
        .map(|tx| if tx.from == address { tx.to.as_str() } else { tx.from.as_str() })
        .filter(|party| !party.is_empty() && *party != address)
        .collect();

    let contracts_deployed = transactions
        .iter()
        .filter(|tx| tx.from == address && tx.to.is_empty() && !tx.contract_address.is_empty())
        .count();

    let distinct_tokens: BTreeSet<&str> = tokens
        .iter()
        .map(|t| t.token.as_str())
        .filter(|t| !t.is_empty())
        .collect();

    let to_u32 = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);

    OnChainActivity {
        address: address.to_string(),
        tx_count: to_u32(transactions.len()),
        first_tx_at: transactions.iter().map(|tx| tx.timestamp).min(),
        last_tx_at: transactions.iter().map(|tx| tx.timestamp).max(),
        active_months: to_u32(months.len()),
        unique_counterparties: to_u32(counterparties.len()),
        contracts_deployed: to_u32(contracts_deployed),
        token_transfers: to_u32(tokens.len()),
        distinct_tokens: to_u32(distinct_tokens.len()),
        balance_eth: balance_wei / WEI_PER_ETH,
        fetched_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const WALLET: &str = "0x00000000000000000000000000000000000000aa";

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            normalize_address(" 0x00000000000000000000000000000000000000AA ").unwrap(),
            WALLET
        );
        assert!(normalize_address("0x123").is_err());
        assert!(normalize_address("vitalik.eth").is_err());
    }

    #[test]
    fn test_empty_history_is_ok() {
        let data = json!({"status": "0", "message": "No transactions found", "result": []});
        assert_eq!(parse_transactions(&data).unwrap(), Vec::new());
    }

    #[test]
    fn test_envelope_errors() {
        let limited = json!({"status": "0", "message": "NOTOK",
                             "result": "Max rate limit reached"});
        assert_eq!(
            parse_envelope(&limited).unwrap_err(),
            FetchError::RateLimited { retry_after: None }
        );

        let bad_key = json!({"status": "0", "message": "NOTOK", "result": "Invalid API Key"});
        assert!(matches!(
            parse_envelope(&bad_key),
            Err(FetchError::AuthRequired(_))
        ));

        let other = json!({"status": "0", "message": "NOTOK", "result": "Error! Invalid address format"});
        assert!(matches!(parse_envelope(&other), Err(FetchError::Validation(_))));
    }

    #[test]
    fn test_parse_balance() {
        let data = json!({"status": "1", "message": "OK", "result": "2500000000000000000"});
        let wei = parse_balance(&data).unwrap();
        assert!((wei / WEI_PER_ETH - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_assemble_derives_activity() {
        let data = json!({
            "status": "1",
            "message": "OK",
            "result": [
                {"timeStamp": "1704067200", "from": WALLET, "to": "0x00000000000000000000000000000000000000bb",
                 "contractAddress": ""},
                {"timeStamp": "1706745600", "from": "0x00000000000000000000000000000000000000CC", "to": WALLET,
                 "contractAddress": ""},
                {"timeStamp": "1706832000", "from": WALLET, "to": "",
                 "contractAddress": "0x00000000000000000000000000000000000000dd"},
                {"timeStamp": "1706918400", "from": WALLET, "to": "0x00000000000000000000000000000000000000bb",
                 "contractAddress": ""}
            ]
        });
        let txs = parse_transactions(&data).unwrap();
        let tokens = vec![
            TokenTransfer {
                token: "0xtoken1".into(),
                timestamp: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            },
            TokenTransfer {
                token: "0xtoken1".into(),
                timestamp: Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap(),
            },
        ];
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let record = assemble(WALLET, &txs, &tokens, 1e18, now);

        assert_eq!(record.tx_count, 4);
        assert_eq!(record.active_months, 2);
        assert_eq!(record.unique_counterparties, 2);
        assert_eq!(record.contracts_deployed, 1);
        assert_eq!(record.token_transfers, 2);
        assert_eq!(record.distinct_tokens, 1);
        assert_eq!(
            record.first_tx_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert!((record.balance_eth - 1.0).abs() < 1e-9);
    }
}
