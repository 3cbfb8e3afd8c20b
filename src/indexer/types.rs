//! Types for the indexer, token list and block-builder services

use crate::utils::u128_string;

use serde::{Deserialize, Serialize};

/// Zero address used by the token list for the native asset.
pub const NATIVE_TOKEN_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Token index of the native asset.
pub const NATIVE_TOKEN_INDEX: u32 = 0;

/// Decimals of the native asset.
pub const NATIVE_TOKEN_DECIMALS: u32 = 18;

/// Response body that is either wrapped in `{ "data": ... }` or returned bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

/// Token standard as reported by the token service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenType {
    Native,
    Erc20,
    Erc721,
    Erc1155,
}

/// Token metadata from the token list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// L1 contract address, the zero address for the native asset.
    pub contract_address: String,
    pub decimals: u32,
    /// Index of the token inside the layer-2 balance tree.
    pub token_index: u32,
    pub token_type: TokenType,
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub image: Option<String>,
}

impl Token {
    /// Metadata for the native asset, used when the token list lacks an entry for index 0.
    pub fn native() -> Self {
        Self {
            contract_address: NATIVE_TOKEN_ADDRESS.to_string(),
            decimals: NATIVE_TOKEN_DECIMALS,
            token_index: NATIVE_TOKEN_INDEX,
            token_type: TokenType::Native,
            symbol: "ETH".to_string(),
            name: Some("Ether".to_string()),
            price: None,
            image: None,
        }
    }

    pub fn is_native(&self) -> bool {
        self.token_index == NATIVE_TOKEN_INDEX
            && self.contract_address.eq_ignore_ascii_case(NATIVE_TOKEN_ADDRESS)
    }
}

/// A block builder advertised by the indexer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockBuilderInfo {
    pub url: String,
    #[serde(default)]
    pub address: Option<String>,
}

/// A fee denominated in a layer-2 token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fee {
    pub token_index: u32,
    #[serde(with = "u128_string")]
    pub amount: u128,
}

/// Economic terms returned by a block builder for the next transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FeeQuote {
    #[serde(default)]
    pub beneficiary: Option<String>,
    #[serde(default)]
    pub fee: Option<Fee>,
    #[serde(default)]
    pub collateral_fee: Option<Fee>,
    #[serde(default)]
    pub is_registration_block: bool,
}

/// Error types for the HTTP service adapters
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{url} returned {status}: {body}")]
    StatusError {
        status: u16,
        url: String,
        body: String,
    },

    #[error("No data returned")]
    NoData,
}
