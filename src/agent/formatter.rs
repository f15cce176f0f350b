//! Per-tool formatting of invocation results for the model.
//!
//! Different backends return payload shapes the model should see either
//! condensed (a price quote boiled down to one number, saving context) or
//! verbatim (ledger payloads where full fidelity matters). The strategy map
//! is keyed by tool name and resolved once at session construction.

use crate::config::FormattingConfig;
use crate::dispatch::{InvocationResult, InvokeError};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    /// Extract a single price figure from the nested quote payload.
    PriceQuote,
    /// Pass the full JSON payload through unchanged.
    VerbatimJson,
    /// "Executed successfully" fallback for unrecognized tools.
    Generic,
}

/// Strategy map from tool name to result format.
#[derive(Debug, Clone, Default)]
pub struct FormatterMap {
    by_tool: HashMap<String, ResultFormat>,
}

impl FormatterMap {
    pub fn from_config(config: &FormattingConfig) -> Self {
        let mut by_tool = HashMap::new();
        for name in &config.price_quote {
            by_tool.insert(name.clone(), ResultFormat::PriceQuote);
        }
        for name in &config.verbatim {
            by_tool.insert(name.clone(), ResultFormat::VerbatimJson);
        }
        Self { by_tool }
    }

    pub fn select(&self, tool: &str) -> ResultFormat {
        self.by_tool.get(tool).copied().unwrap_or(ResultFormat::Generic)
    }

    /// Format a successful invocation as tool-result text.
    pub fn format_success(&self, tool: &str, arguments: &Value, result: &InvocationResult) -> String {
        match self.select(tool) {
            ResultFormat::PriceQuote => {
                let symbol = arguments
                    .get("symbol")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_uppercase();
                let convert = arguments
                    .get("convert")
                    .and_then(Value::as_str)
                    .unwrap_or("USD")
                    .to_uppercase();
                let price = extract_price(&result.structured, &symbol, &convert);
                format!(
                    "Tool executed successfully. The price of {symbol} is ${price} {convert}."
                )
            }
            ResultFormat::VerbatimJson => serde_json::to_string(&result.structured)
                .unwrap_or_else(|_| result.raw_body.clone()),
            ResultFormat::Generic => format!("Tool '{tool}' executed successfully."),
        }
    }

    /// Format a failed invocation so the model can adapt its next action.
    pub fn format_failure(&self, tool: &str, error: &InvokeError) -> String {
        format!("Tool '{tool}' failed: {error}")
    }
}

/// Extract `data.<SYMBOL>[0].quote.<CONVERT>.price` from a quote payload,
/// rendered with thousands grouping and four decimals, or `"not found"`.
pub fn extract_price(data: &Value, symbol: &str, convert: &str) -> String {
    data.get("data")
        .and_then(|d| d.get(symbol))
        .and_then(|s| s.get(0))
        .and_then(|first| first.get("quote"))
        .and_then(|q| q.get(convert))
        .and_then(|c| c.get("price"))
        .and_then(Value::as_f64)
        .map(format_price)
        .unwrap_or_else(|| "not found".into())
}

fn format_price(price: f64) -> String {
    let rendered = format!("{:.4}", price.abs());
    let (whole, frac) = rendered.split_once('.').unwrap_or((&rendered, "0000"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let whole: String = grouped.chars().rev().collect();

    let sign = if price < 0.0 { "-" } else { "" };
    format!("{sign}{whole}.{frac}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quote_payload() -> Value {
        json!({ "data": { "ADA": [ { "quote": { "USD": { "price": 0.45 } } } ] } })
    }

    #[test]
    fn extracts_price_with_four_decimals() {
        assert_eq!(extract_price(&quote_payload(), "ADA", "USD"), "0.4500");
    }

    #[test]
    fn groups_thousands_in_large_prices() {
        let payload = json!({ "data": { "BTC": [ { "quote": { "USD": { "price": 97123.456789 } } } ] } });
        assert_eq!(extract_price(&payload, "BTC", "USD"), "97,123.4568");
    }

    #[test]
    fn missing_quote_path_yields_not_found() {
        assert_eq!(extract_price(&quote_payload(), "ETH", "USD"), "not found");
        assert_eq!(extract_price(&json!({}), "ADA", "USD"), "not found");
    }

    #[test]
    fn price_quote_formatter_condenses_the_payload() {
        let map = FormatterMap::from_config(&FormattingConfig::default());
        let result = InvocationResult {
            structured: quote_payload(),
            raw_body: String::new(),
        };
        let text = map.format_success(
            "get_latest_crypto_quotes",
            &json!({ "symbol": "ADA", "convert": "USD" }),
            &result,
        );
        assert_eq!(
            text,
            "Tool executed successfully. The price of ADA is $0.4500 USD."
        );
    }

    #[test]
    fn verbatim_formatter_passes_json_through() {
        let map = FormatterMap::from_config(&FormattingConfig::default());
        let result = InvocationResult {
            structured: json!({ "received_sum": "42" }),
            raw_body: String::new(),
        };
        let text = map.format_success("get_address_totals", &json!({}), &result);
        assert_eq!(text, r#"{"received_sum":"42"}"#);
    }

    #[test]
    fn unrecognized_tool_gets_the_generic_fallback() {
        let map = FormatterMap::from_config(&FormattingConfig::default());
        let result = InvocationResult {
            structured: json!({ "anything": true }),
            raw_body: String::new(),
        };
        let text = map.format_success("get_network_info", &json!({}), &result);
        assert_eq!(text, "Tool 'get_network_info' executed successfully.");
    }

    #[test]
    fn failures_are_described_to_the_model() {
        let map = FormatterMap::from_config(&FormattingConfig::default());
        let err = InvokeError::Backend {
            status: 404,
            body: "no such address".into(),
        };
        assert_eq!(
            map.format_failure("get_address_info", &err),
            "Tool 'get_address_info' failed: backend returned HTTP 404: no such address"
        );
    }
}
