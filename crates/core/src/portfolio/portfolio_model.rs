use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single token position inside a wallet snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    /// Mint identifier of the token
    pub mint: String,
    pub symbol: String,
    /// Display amount, already scaled by `decimals`
    pub amount: Decimal,
    /// Unit price in fiat
    pub price: Decimal,
    /// Value of the position in the chain's native currency
    pub native_value: Decimal,
    /// Value of the position in fiat
    pub fiat_value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub decimals: u8,
}

impl TokenBalance {
    /// Smallest amount step representable with this token's decimals.
    pub fn unit(&self) -> Decimal {
        Decimal::new(1, u32::from(self.decimals).min(28))
    }
}

/// Snapshot of a wallet's holdings as returned by the portfolio provider.
///
/// Immutable once fetched and replaced wholesale on every refresh; two
/// snapshots are equal when their contents are equal.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub total_native_value: Decimal,
    pub total_fiat_value: Decimal,
    #[serde(default)]
    pub tokens: Vec<TokenBalance>,
}

impl Portfolio {
    pub fn new(
        total_native_value: Decimal,
        total_fiat_value: Decimal,
        tokens: Vec<TokenBalance>,
    ) -> Self {
        Self {
            total_native_value,
            total_fiat_value,
            tokens,
        }
    }

    /// A wallet with nothing in it. Distinct from a failed fetch.
    pub fn empty() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO, Vec::new())
    }

    pub fn totals(&self) -> PortfolioTotals {
        PortfolioTotals {
            native: self.total_native_value,
            fiat: self.total_fiat_value,
        }
    }

    /// Looks up a token position by mint.
    pub fn token(&self, mint: &str) -> Option<&TokenBalance> {
        self.tokens.iter().find(|t| t.mint == mint)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.total_native_value.is_zero()
    }
}

/// Native and fiat totals of a portfolio, as carried by update events.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioTotals {
    pub native: Decimal,
    pub fiat: Decimal,
}

impl PortfolioTotals {
    pub fn new(native: Decimal, fiat: Decimal) -> Self {
        Self { native, fiat }
    }
}
