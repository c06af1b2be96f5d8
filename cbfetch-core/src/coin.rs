//! Coin registry: the closed set of supported Coinbase USD pairs.
//!
//! Each coin maps a stable slug (used in cache paths) to its ticker and the
//! Coinbase product id (`{TICKER}-USD`). Adding a coin means adding a variant.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// History start used when a coin's listing date is not recorded.
pub const DEFAULT_HISTORY_START: (i32, u32, u32) = (2017, 1, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Coin {
    // Major cryptocurrencies
    Bitcoin,
    Ethereum,

    // Top 10 by market cap
    Solana,
    Xrp,
    Cardano,
    Avalanche,
    Dogecoin,
    Polkadot,
    Polygon,
    Chainlink,

    // Layer 1 & Layer 2
    Near,
    InternetComputer,
    Cosmos,
    Aptos,
    Arbitrum,
    Optimism,
    Sui,

    // DeFi
    Uniswap,
    Aave,
    Curve,
    Maker,
    Compound,
    Synthetix,
    Lido,
    Sushiswap,
    YearnFinance,
    Balancer,
    PerpetualProtocol,

    // Gaming & metaverse
    Sandbox,
    Decentraland,
    AxieInfinity,
    ImmutableX,
    EthereumNameService,
    Blur,
    ApeCoin,

    // Infrastructure
    Filecoin,
    TheGraph,
    Loopring,
    Ankr,
    Skale,
    MaskNetwork,

    // Bitcoin forks & classics
    Litecoin,
    BitcoinCash,
    EthereumClassic,

    // Privacy & payments
    Zcash,
    Stellar,

    // Enterprise & other
    VeChain,
    Hedera,
    Quant,
    Algorand,
    Eos,
    Tezos,
    Chiliz,

    // Utility tokens
    BasicAttentionToken,
    OneInch,

    // Meme coins
    ShibaInu,
    Dogwifhat,
}

impl Coin {
    pub const ALL: [Coin; 57] = [
        Coin::Bitcoin,
        Coin::Ethereum,
        Coin::Solana,
        Coin::Xrp,
        Coin::Cardano,
        Coin::Avalanche,
        Coin::Dogecoin,
        Coin::Polkadot,
        Coin::Polygon,
        Coin::Chainlink,
        Coin::Near,
        Coin::InternetComputer,
        Coin::Cosmos,
        Coin::Aptos,
        Coin::Arbitrum,
        Coin::Optimism,
        Coin::Sui,
        Coin::Uniswap,
        Coin::Aave,
        Coin::Curve,
        Coin::Maker,
        Coin::Compound,
        Coin::Synthetix,
        Coin::Lido,
        Coin::Sushiswap,
        Coin::YearnFinance,
        Coin::Balancer,
        Coin::PerpetualProtocol,
        Coin::Sandbox,
        Coin::Decentraland,
        Coin::AxieInfinity,
        Coin::ImmutableX,
        Coin::EthereumNameService,
        Coin::Blur,
        Coin::ApeCoin,
        Coin::Filecoin,
        Coin::TheGraph,
        Coin::Loopring,
        Coin::Ankr,
        Coin::Skale,
        Coin::MaskNetwork,
        Coin::Litecoin,
        Coin::BitcoinCash,
        Coin::EthereumClassic,
        Coin::Zcash,
        Coin::Stellar,
        Coin::VeChain,
        Coin::Hedera,
        Coin::Quant,
        Coin::Algorand,
        Coin::Eos,
        Coin::Tezos,
        Coin::Chiliz,
        Coin::BasicAttentionToken,
        Coin::OneInch,
        Coin::ShibaInu,
        Coin::Dogwifhat,
    ];

    fn names(self) -> (&'static str, &'static str) {
        match self {
            Coin::Bitcoin => ("bitcoin", "BTC"),
            Coin::Ethereum => ("ethereum", "ETH"),
            Coin::Solana => ("solana", "SOL"),
            Coin::Xrp => ("xrp", "XRP"),
            Coin::Cardano => ("ada", "ADA"),
            Coin::Avalanche => ("avalanche", "AVAX"),
            Coin::Dogecoin => ("dogecoin", "DOGE"),
            Coin::Polkadot => ("polkadot", "DOT"),
            Coin::Polygon => ("polygon", "MATIC"),
            Coin::Chainlink => ("chainlink", "LINK"),
            Coin::Near => ("near", "NEAR"),
            Coin::InternetComputer => ("internet-computer", "ICP"),
            Coin::Cosmos => ("cosmos", "ATOM"),
            Coin::Aptos => ("aptos", "APT"),
            Coin::Arbitrum => ("arbitrum", "ARB"),
            Coin::Optimism => ("optimism", "OP"),
            Coin::Sui => ("sui", "SUI"),
            Coin::Uniswap => ("uniswap", "UNI"),
            Coin::Aave => ("aave", "AAVE"),
            Coin::Curve => ("curve", "CRV"),
            Coin::Maker => ("maker", "MKR"),
            Coin::Compound => ("compound", "COMP"),
            Coin::Synthetix => ("synthetix", "SNX"),
            Coin::Lido => ("lido", "LDO"),
            Coin::Sushiswap => ("sushiswap", "SUSHI"),
            Coin::YearnFinance => ("yearn-finance", "YFI"),
            Coin::Balancer => ("balancer", "BAL"),
            Coin::PerpetualProtocol => ("perpetual-protocol", "PERP"),
            Coin::Sandbox => ("sandbox", "SAND"),
            Coin::Decentraland => ("decentraland", "MANA"),
            Coin::AxieInfinity => ("axie-infinity", "AXS"),
            Coin::ImmutableX => ("immutablex", "IMX"),
            Coin::EthereumNameService => ("ethereum-name-service", "ENS"),
            Coin::Blur => ("blur", "BLUR"),
            Coin::ApeCoin => ("apecoin", "APE"),
            Coin::Filecoin => ("filecoin", "FIL"),
            Coin::TheGraph => ("the-graph", "GRT"),
            Coin::Loopring => ("loopring", "LRC"),
            Coin::Ankr => ("ankr", "ANKR"),
            Coin::Skale => ("skale", "SKL"),
            Coin::MaskNetwork => ("mask-network", "MASK"),
            Coin::Litecoin => ("litecoin", "LTC"),
            Coin::BitcoinCash => ("bitcoin-cash", "BCH"),
            Coin::EthereumClassic => ("ethereum-classic", "ETC"),
            Coin::Zcash => ("zcash", "ZEC"),
            Coin::Stellar => ("stellar", "XLM"),
            Coin::VeChain => ("vechain", "VET"),
            Coin::Hedera => ("hedera", "HBAR"),
            Coin::Quant => ("quant", "QNT"),
            Coin::Algorand => ("algorand", "ALGO"),
            Coin::Eos => ("eos", "EOS"),
            Coin::Tezos => ("tezos", "XTZ"),
            Coin::Chiliz => ("chiliz", "CHZ"),
            Coin::BasicAttentionToken => ("basic-attention-token", "BAT"),
            Coin::OneInch => ("1inch", "1INCH"),
            Coin::ShibaInu => ("shiba-inu", "SHIB"),
            Coin::Dogwifhat => ("dogwifhat", "WIF"),
        }
    }

    /// Lowercase slug, e.g. `bitcoin`.
    pub fn slug(self) -> &'static str {
        self.names().0
    }

    /// Exchange ticker, e.g. `BTC`.
    pub fn ticker(self) -> &'static str {
        self.names().1
    }

    /// Coinbase product id, e.g. `BTC-USD`.
    pub fn product_id(self) -> String {
        format!("{}-USD", self.ticker())
    }

    /// First day Coinbase has candles for this pair, when known.
    pub fn listing_date(self) -> Option<NaiveDate> {
        match self {
            Coin::Bitcoin => NaiveDate::from_ymd_opt(2015, 7, 20),
            Coin::Ethereum => NaiveDate::from_ymd_opt(2016, 7, 21),
            Coin::Litecoin => NaiveDate::from_ymd_opt(2017, 5, 3),
            _ => None,
        }
    }

    /// Where a full-history prefetch starts.
    pub fn history_start(self) -> NaiveDate {
        let (y, m, d) = DEFAULT_HISTORY_START;
        self.listing_date()
            .or_else(|| NaiveDate::from_ymd_opt(y, m, d))
            .unwrap_or_default()
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown coin '{0}'")]
pub struct UnknownCoin(pub String);

impl FromStr for Coin {
    type Err = UnknownCoin;

    /// Accepts a slug (`bitcoin`), ticker (`BTC`) or product id (`BTC-USD`),
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        let ticker = match needle.rsplit_once('-') {
            Some((base, quote)) if quote.eq_ignore_ascii_case("USD") => base,
            _ => needle,
        };
        Coin::ALL
            .into_iter()
            .find(|c| {
                c.slug().eq_ignore_ascii_case(needle) || c.ticker().eq_ignore_ascii_case(ticker)
            })
            .ok_or_else(|| UnknownCoin(s.to_string()))
    }
}

impl From<Coin> for String {
    fn from(coin: Coin) -> String {
        coin.slug().to_string()
    }
}

impl TryFrom<String> for Coin {
    type Error = UnknownCoin;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn slugs_and_tickers_are_unique() {
        let slugs: HashSet<_> = Coin::ALL.iter().map(|c| c.slug()).collect();
        let tickers: HashSet<_> = Coin::ALL.iter().map(|c| c.ticker()).collect();
        assert_eq!(slugs.len(), Coin::ALL.len());
        assert_eq!(tickers.len(), Coin::ALL.len());
    }

    #[test]
    fn parses_slug_ticker_and_product_id() {
        assert_eq!("bitcoin".parse::<Coin>().unwrap(), Coin::Bitcoin);
        assert_eq!("eth".parse::<Coin>().unwrap(), Coin::Ethereum);
        assert_eq!("SOL-USD".parse::<Coin>().unwrap(), Coin::Solana);
        assert_eq!("1inch".parse::<Coin>().unwrap(), Coin::OneInch);
        assert!("notacoin".parse::<Coin>().is_err());
    }

    #[test]
    fn product_id_quote_is_case_insensitive() {
        assert_eq!("btc-Usd".parse::<Coin>().unwrap(), Coin::Bitcoin);
        assert_eq!("eth-usd".parse::<Coin>().unwrap(), Coin::Ethereum);
        assert!("btc-eur".parse::<Coin>().is_err());
    }

    #[test]
    fn product_id_is_usd_pair() {
        assert_eq!(Coin::Bitcoin.product_id(), "BTC-USD");
        assert_eq!(Coin::Polygon.product_id(), "MATIC-USD");
    }

    #[test]
    fn history_start_falls_back_to_default() {
        assert_eq!(
            Coin::Bitcoin.history_start(),
            NaiveDate::from_ymd_opt(2015, 7, 20).unwrap()
        );
        assert_eq!(
            Coin::Sui.history_start(),
            NaiveDate::from_ymd_opt(2017, 1, 1).unwrap()
        );
    }

    #[test]
    fn serializes_as_slug() {
        assert_eq!(serde_json::to_string(&Coin::ShibaInu).unwrap(), "\"shiba-inu\"");
        let c: Coin = serde_json::from_str("\"avalanche\"").unwrap();
        assert_eq!(c, Coin::Avalanche);
    }
}
