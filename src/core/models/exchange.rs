use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response of the Frankfurter `latest` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateSet {
    #[serde(default)]
    pub amount: f64,
    pub base: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub rates: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_rates() {
        let json = r#"{"amount":1.0,"base":"USD","date":"2026-01-20","rates":{"CNY":6.9589,"EUR":0.85266}}"#;
        let rates: ExchangeRateSet = serde_json::from_str(json).unwrap();
        assert_eq!(rates.base, "USD");
        assert_eq!(rates.date, "2026-01-20");
        assert_eq!(rates.rates.len(), 2);
        assert!((rates.rates["EUR"] - 0.85266).abs() < 1e-10);
        assert!((rates.rates["CNY"] - 6.9589).abs() < 1e-10);
    }
}
