//! Canonical security symbols and per-source code translation.
//!
//! The internal form for mainland equities is `sh######` / `sz######` /
//! `bj######`. Bare 6-digit codes are dispatched by first digit: `6` is
//! Shanghai, `0` and `3` are Shenzhen, `4` and `8` are Beijing. Every cache
//! key and orchestrator output uses the canonical form; providers see their
//! own dialect and the reverse map restores the internal form on the way out.

use crate::error::{FetchError, FetchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Market {
    Shanghai,
    Shenzhen,
    Beijing,
}

impl Market {
    fn prefix(&self) -> &'static str {
        match self {
            Market::Shanghai => "sh",
            Market::Shenzhen => "sz",
            Market::Beijing => "bj",
        }
    }

    fn from_code_digit(code: &str) -> Option<Market> {
        match code.as_bytes().first()? {
            b'6' | b'9' => Some(Market::Shanghai),
            b'0' | b'2' | b'3' => Some(Market::Shenzhen),
            b'4' | b'8' => Some(Market::Beijing),
            _ => None,
        }
    }
}

/// A mainland equity symbol in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    market: Market,
    code: String,
}

impl Symbol {
    /// Accepts `sh600519`, `SZ000001`, or a bare 6-digit code.
    pub fn parse(input: &str) -> FetchResult<Symbol> {
        let input = input.trim();
        let lower = input.to_ascii_lowercase();

        let (market, code) = if let Some(code) = lower
            .strip_prefix("sh")
            .or_else(|| lower.strip_prefix("sz"))
            .or_else(|| lower.strip_prefix("bj"))
        {
            let market = match &lower[..2] {
                "sh" => Market::Shanghai,
                "sz" => Market::Shenzhen,
                _ => Market::Beijing,
            };
            (market, code)
        } else if lower.len() == 6 && lower.bytes().all(|b| b.is_ascii_digit()) {
            let market = Market::from_code_digit(&lower)
                .ok_or_else(|| FetchError::InvalidSymbol(input.to_string()))?;
            (market, lower.as_str())
        } else {
            return Err(FetchError::InvalidSymbol(input.to_string()));
        };

        if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FetchError::InvalidSymbol(input.to_string()));
        }

        Ok(Symbol { market, code: code.to_string() })
    }

    pub fn market(&self) -> Market {
        self.market
    }

    /// The bare 6-digit code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Canonical internal form, e.g. `sh600519`. Idempotent under re-parse.
    pub fn canonical(&self) -> String {
        format!("{}{}", self.market.prefix(), self.code)
    }

    /// Eastmoney `secid`: market index dot code (`1.600519` / `0.000001`).
    pub fn to_eastmoney(&self) -> String {
        let market = match self.market {
            Market::Shanghai => "1",
            Market::Shenzhen | Market::Beijing => "0",
        };
        format!("{}.{}", market, self.code)
    }

    pub fn from_eastmoney(secid: &str) -> FetchResult<Symbol> {
        let (market_id, code) = secid
            .split_once('.')
            .ok_or_else(|| FetchError::InvalidSymbol(secid.to_string()))?;
        let market = match market_id {
            "1" => Market::Shanghai,
            "0" => Market::from_code_digit(code).unwrap_or(Market::Shenzhen),
            _ => return Err(FetchError::InvalidSymbol(secid.to_string())),
        };
        if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FetchError::InvalidSymbol(secid.to_string()));
        }
        Ok(Symbol { market, code: code.to_string() })
    }

    /// Netease prefixes the exchange digit: `0` Shanghai, `1` Shenzhen.
    pub fn to_netease(&self) -> String {
        let market = match self.market {
            Market::Shanghai => "0",
            Market::Shenzhen | Market::Beijing => "1",
        };
        format!("{}{}", market, self.code)
    }

    pub fn from_netease(code7: &str) -> FetchResult<Symbol> {
        if code7.len() != 7 || !code7.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FetchError::InvalidSymbol(code7.to_string()));
        }
        let (head, code) = code7.split_at(1);
        let market = match head {
            "0" => Market::Shanghai,
            "1" => Market::from_code_digit(code).unwrap_or(Market::Shenzhen),
            _ => return Err(FetchError::InvalidSymbol(code7.to_string())),
        };
        Ok(Symbol { market, code: code.to_string() })
    }

    /// Xueqiu uses uppercase exchange prefixes: `SH600519`.
    pub fn to_xueqiu(&self) -> String {
        format!("{}{}", self.market.prefix().to_ascii_uppercase(), self.code)
    }

    pub fn from_xueqiu(code: &str) -> FetchResult<Symbol> {
        Symbol::parse(code)
    }

    /// Tencent and Sina take the canonical form as-is.
    pub fn to_tencent(&self) -> String {
        self.canonical()
    }

    pub fn to_sina(&self) -> String {
        self.canonical()
    }

    /// Sohu's historical API wants `cn_` plus the bare code.
    pub fn to_sohu(&self) -> String {
        format!("cn_{}", self.code)
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Normalize a list of user-supplied codes, deduplicating while preserving
/// order. Invalid entries surface `InvalidSymbol` rather than being dropped.
pub fn parse_all(codes: &[String]) -> FetchResult<Vec<Symbol>> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(codes.len());
    for code in codes {
        let symbol = Symbol::parse(code)?;
        if seen.insert(symbol.canonical()) {
            out.push(symbol);
        }
    }
    Ok(out)
}

/// Left-pad a Hong Kong code to the 5-digit canonical form.
pub fn canonical_hk(code: &str) -> FetchResult<String> {
    let digits = code.trim().trim_start_matches("hk");
    if digits.is_empty() || digits.len() > 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FetchError::InvalidSymbol(code.to_string()));
    }
    Ok(format!("{digits:0>5}"))
}

/// US tickers are uppercased, dots preserved (`BRK.B`).
pub fn canonical_us(code: &str) -> FetchResult<String> {
    let ticker = code.trim().to_ascii_uppercase();
    if ticker.is_empty()
        || !ticker.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'.')
    {
        return Err(FetchError::InvalidSymbol(code.to_string()));
    }
    Ok(ticker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_prefixed_and_bare_forms() {
        assert_eq!(Symbol::parse("sh600519").unwrap().canonical(), "sh600519");
        assert_eq!(Symbol::parse("SH600519").unwrap().canonical(), "sh600519");
        assert_eq!(Symbol::parse("600519").unwrap().canonical(), "sh600519");
        assert_eq!(Symbol::parse("000001").unwrap().canonical(), "sz000001");
        assert_eq!(Symbol::parse("300750").unwrap().canonical(), "sz300750");
        assert_eq!(Symbol::parse("830799").unwrap().canonical(), "bj830799");
        assert!(Symbol::parse("12345").is_err());
        assert!(Symbol::parse("abcdef").is_err());
        assert!(Symbol::parse("").is_err());
    }

    #[test]
    fn canonical_is_idempotent() {
        for input in ["sh600519", "600519", "SZ000001", "000001"] {
            let once = Symbol::parse(input).unwrap().canonical();
            let twice = Symbol::parse(&once).unwrap().canonical();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn eastmoney_round_trip() {
        for input in ["sh600519", "sz000001", "sz300750"] {
            let sym = Symbol::parse(input).unwrap();
            let back = Symbol::from_eastmoney(&sym.to_eastmoney()).unwrap();
            assert_eq!(back.canonical(), input);
        }
        assert_eq!(Symbol::parse("sh600519").unwrap().to_eastmoney(), "1.600519");
        assert_eq!(Symbol::parse("sz000001").unwrap().to_eastmoney(), "0.000001");
    }

    #[test]
    fn netease_round_trip() {
        for input in ["sh600519", "sz000001"] {
            let sym = Symbol::parse(input).unwrap();
            let back = Symbol::from_netease(&sym.to_netease()).unwrap();
            assert_eq!(back.canonical(), input);
        }
        assert_eq!(Symbol::parse("sh600000").unwrap().to_netease(), "0600000");
        assert_eq!(Symbol::parse("sz000001").unwrap().to_netease(), "1000001");
    }

    #[test]
    fn xueqiu_round_trip() {
        for input in ["sh600519", "sz000001", "bj830799"] {
            let sym = Symbol::parse(input).unwrap();
            let back = Symbol::from_xueqiu(&sym.to_xueqiu()).unwrap();
            assert_eq!(back.canonical(), input);
        }
        assert_eq!(Symbol::parse("sh600519").unwrap().to_xueqiu(), "SH600519");
    }

    #[test]
    fn dedup_preserves_first_occurrence_order() {
        let symbols = parse_all(&[
            "600519".to_string(),
            "sh600519".to_string(),
            "000001".to_string(),
        ])
        .unwrap();
        let keys: Vec<String> = symbols.iter().map(|s| s.canonical()).collect();
        assert_eq!(keys, vec!["sh600519", "sz000001"]);
    }

    #[test]
    fn hk_and_us_canonical_forms() {
        assert_eq!(canonical_hk("700").unwrap(), "00700");
        assert_eq!(canonical_hk("hk00700").unwrap(), "00700");
        assert_eq!(canonical_hk("09988").unwrap(), "09988");
        assert!(canonical_hk("123456").is_err());

        assert_eq!(canonical_us("aapl").unwrap(), "AAPL");
        assert_eq!(canonical_us("brk.b").unwrap(), "BRK.B");
        assert!(canonical_us("bad ticker").is_err());
    }
}
