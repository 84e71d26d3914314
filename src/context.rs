//! Assembles the prompt sent to the AI client and parses what comes back.
//! The strict-JSON path and the regex fallback both return `Result`; neither
//! can panic the scanner loop on malformed model output.

use crate::types::{
    Analysis, AssetTrend, MarketRegime, MarketSnapshot, Timeframe, Trade, TradePermission,
    TrendDirection,
};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Recent,
    Active,
    Stale,
}

#[derive(Debug, Clone)]
pub enum PositionContext {
    ActiveTrade(Trade),
    PriorAnalysis { analysis: Analysis, urgency: Urgency },
    None,
}

#[derive(Debug, Clone)]
pub struct PromptContext {
    pub ticker: String,
    pub timeframe: Timeframe,
    pub current_price: f64,
    pub position: PositionContext,
}

/// Bands a prior analysis by urgency. An active trade always takes the
/// active-trade branch and bypasses the lookback window entirely, per the
/// "active trades are always eligible" rule.
pub fn assemble(
    ticker: &str,
    timeframe: Timeframe,
    current_price: f64,
    active_trade: Option<Trade>,
    recent_analysis: Option<(Analysis, chrono::Duration)>,
) -> PromptContext {
    let position = if let Some(trade) = active_trade {
        PositionContext::ActiveTrade(trade)
    } else if let Some((analysis, age)) = recent_analysis {
        let hours_since = age.num_minutes() as f64 / 60.0;
        let lookback = timeframe.lookback_hours();
        let urgency = if hours_since < lookback / 4.0 {
            Urgency::Recent
        } else if hours_since < lookback {
            Urgency::Active
        } else {
            Urgency::Stale
        };
        PositionContext::PriorAnalysis { analysis, urgency }
    } else {
        PositionContext::None
    };

    PromptContext { ticker: ticker.to_string(), timeframe, current_price, position }
}

/// Renders the text prompt. Always offers the four position-assessment
/// options regardless of whether a position currently exists.
pub fn render_prompt(ctx: &PromptContext) -> String {
    let mut prompt = format!(
        "Ticker: {}\nTimeframe: {}\nCurrent price: {}\n\n",
        ctx.ticker, ctx.timeframe, ctx.current_price
    );

    match &ctx.position {
        PositionContext::ActiveTrade(trade) => {
            prompt.push_str(&format!(
                "Existing position: {} entry={} target={} stop={} status={} since={}\n\n",
                trade.action, trade.entry_price, trade.target_price, trade.stop_loss, trade.status, trade.created_at
            ));
        }
        PositionContext::PriorAnalysis { analysis, urgency } => {
            prompt.push_str(&format!(
                "Prior analysis ({urgency:?}) at {}: {:?} (confidence {:.2})\n\n",
                analysis.analysis_timestamp,
                analysis.recommendation.action,
                analysis.confidence
            ));
        }
        PositionContext::None => {
            prompt.push_str("No existing position or recent analysis.\n\n");
        }
    }

    prompt.push_str(
        "Respond with a position assessment of exactly one of: MAINTAIN, MODIFY, CLOSE, REPLACE (or NEW if no position exists).",
    );
    prompt
}

/// Renders the macro sentiment prompt -- a market-regime read over the
/// attached charts, not a position assessment. Distinct from
/// `render_prompt`, which the active-trade review path uses instead.
pub fn render_macro_prompt(latest: &MarketSnapshot) -> String {
    format!(
        "Current market snapshot as of {}:\n\
         BTC price: {}\nETH price: {}\nBTC dominance: {:.2}%\nAlt strength ratio: {:.4}\n\n\
         Five charts are attached: BTC price, ETH price, BTC dominance, alt strength, and a \
         combined overview, each covering the last 30 days.\n\n\
         Respond with a JSON object containing:\n\
         - \"confidence\": a number from 0.0 to 1.0\n\
         - \"market_regime\": exactly one of BTC_SEASON, ETH_SEASON, ALT_SEASON, TRANSITION, BEAR\n\
         - \"trade_permission\": exactly one of NO_TRADE, SELECTIVE, AGGRESSIVE\n\
         - \"btc_trend\": {{\"trend_direction\": UP|DOWN|SIDEWAYS, \"trend_strength\": 0.0-1.0}}\n\
         - \"eth_trend\": {{\"trend_direction\": UP|DOWN|SIDEWAYS, \"trend_strength\": 0.0-1.0}}\n\
         - \"alt_trend\": {{\"trend_direction\": UP|DOWN|SIDEWAYS, \"trend_strength\": 0.0-1.0}}",
        latest.timestamp, latest.btc_price, latest.eth_price, latest.btc_dominance, latest.alt_strength_ratio
    )
}

#[derive(Debug, Clone)]
pub struct ParsedVerdict {
    pub analysis_type: String,
    pub confidence: f64,
    pub previous_position_status: Option<String>,
    pub market_regime: Option<MarketRegime>,
    pub trade_permission: Option<TradePermission>,
    pub btc_trend: Option<AssetTrend>,
    pub eth_trend: Option<AssetTrend>,
    pub alt_trend: Option<AssetTrend>,
    pub raw: serde_json::Value,
}

fn parse_trend(value: &serde_json::Value, key: &str) -> Option<AssetTrend> {
    let node = value.get(key)?;
    let trend_direction = node.get("trend_direction").and_then(|v| v.as_str()).and_then(TrendDirection::parse)?;
    let trend_strength = node.get("trend_strength").and_then(|v| v.as_f64()).unwrap_or(0.0).clamp(0.0, 1.0);
    Some(AssetTrend { trend_direction, trend_strength })
}

/// Strict JSON first; on failure, a best-effort text extraction that never
/// errors -- an unparseable model reply still yields a low-confidence
/// verdict rather than aborting the scan.
pub fn parse_verdict(raw: &str) -> ParsedVerdict {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => {
            let confidence = value.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.5).clamp(0.0, 1.0);
            let previous_position_status = value
                .get("context_assessment")
                .and_then(|c| c.get("previous_position_status"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            let market_regime =
                value.get("market_regime").and_then(|v| v.as_str()).and_then(MarketRegime::parse);
            let trade_permission =
                value.get("trade_permission").and_then(|v| v.as_str()).and_then(TradePermission::parse);
            let btc_trend = parse_trend(&value, "btc_trend");
            let eth_trend = parse_trend(&value, "eth_trend");
            let alt_trend = parse_trend(&value, "alt_trend");
            ParsedVerdict {
                analysis_type: "structured".into(),
                confidence,
                previous_position_status,
                market_regime,
                trade_permission,
                btc_trend,
                eth_trend,
                alt_trend,
                raw: value,
            }
        }
        Err(_) => fallback::extract(raw),
    }
}

/// Case-insensitive, whitespace-trimmed comparison, applied everywhere a
/// `previous_position_status` is compared against MAINTAIN.
pub fn is_maintain(status: Option<&str>) -> bool {
    status.map(|s| s.trim().eq_ignore_ascii_case("maintain")).unwrap_or(false)
}

mod fallback {
    use super::*;

    static SENTIMENT_WORDS: &[&str] = &["bullish", "bearish", "neutral", "maintain", "modify", "close", "replace"];

    fn number_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap())
    }

    /// Regex-scans free text for sentiment words and price-like numbers,
    /// yielding a schema-shaped but low-confidence record.
    pub fn extract(raw: &str) -> ParsedVerdict {
        let lower = raw.to_ascii_lowercase();
        let found_word = SENTIMENT_WORDS.iter().find(|w| lower.contains(**w)).copied();
        let numbers: Vec<&str> = number_re().find_iter(raw).map(|m| m.as_str()).collect();

        let previous_position_status = SENTIMENT_WORDS
            .iter()
            .take(4)
            .find(|w| lower.contains(**w))
            .map(|s| s.to_uppercase());

        ParsedVerdict {
            analysis_type: "unstructured".into(),
            confidence: 0.1,
            previous_position_status,
            market_regime: None,
            trade_permission: None,
            btc_trend: None,
            eth_trend: None,
            alt_trend: None,
            raw: serde_json::json!({
                "summary": raw,
                "found_sentiment_word": found_word,
                "found_numbers": numbers,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_maintain_ignores_case_and_whitespace() {
        assert!(is_maintain(Some("  Maintain  ")));
        assert!(is_maintain(Some("MAINTAIN")));
        assert!(!is_maintain(Some("modify")));
        assert!(!is_maintain(None));
    }

    #[test]
    fn parse_verdict_strict_path_reads_confidence_and_status() {
        let raw = r#"{"confidence": 0.9, "context_assessment": {"previous_position_status": "MODIFY"}}"#;
        let v = parse_verdict(raw);
        assert_eq!(v.analysis_type, "structured");
        assert_eq!(v.confidence, 0.9);
        assert_eq!(v.previous_position_status.as_deref(), Some("MODIFY"));
    }

    #[test]
    fn parse_verdict_clamps_out_of_range_confidence() {
        let raw = r#"{"confidence": 5.0}"#;
        assert_eq!(parse_verdict(raw).confidence, 1.0);
    }

    #[test]
    fn parse_verdict_strict_path_reads_regime_permission_and_trends() {
        let raw = r#"{
            "confidence": 0.8,
            "market_regime": "ALT_SEASON",
            "trade_permission": "AGGRESSIVE",
            "btc_trend": {"trend_direction": "UP", "trend_strength": 0.6},
            "eth_trend": {"trend_direction": "SIDEWAYS", "trend_strength": 0.1},
            "alt_trend": {"trend_direction": "UP", "trend_strength": 0.9}
        }"#;
        let v = parse_verdict(raw);
        assert_eq!(v.market_regime, Some(crate::types::MarketRegime::AltSeason));
        assert_eq!(v.trade_permission, Some(crate::types::TradePermission::Aggressive));
        assert_eq!(v.btc_trend.unwrap().trend_direction, crate::types::TrendDirection::Up);
        assert_eq!(v.eth_trend.unwrap().trend_strength, 0.1);
        assert_eq!(v.alt_trend.unwrap().trend_direction, crate::types::TrendDirection::Up);
    }

    #[test]
    fn parse_verdict_missing_regime_fields_yields_none_not_a_default() {
        let v = parse_verdict(r#"{"confidence": 0.5}"#);
        assert!(v.market_regime.is_none());
        assert!(v.trade_permission.is_none());
        assert!(v.btc_trend.is_none());
    }

    #[test]
    fn parse_verdict_falls_back_on_malformed_json_without_panicking() {
        let v = parse_verdict("the market looks bullish, BTC near 65000");
        assert_eq!(v.analysis_type, "unstructured");
        assert!(v.confidence < 0.5);
    }

    #[test]
    fn urgency_bands_match_lookback_fractions() {
        let analysis = Analysis {
            id: 1,
            ticker: "BTCUSD".into(),
            timeframe: Timeframe::H1,
            analysis_timestamp: "2026-01-01T00:00:00Z".into(),
            confidence: 0.5,
            recommendation: crate::types::Recommendation {
                action: crate::types::RecommendationAction::Hold,
                entry_price: None,
                target_price: None,
                stop_loss: None,
                reasoning: String::new(),
            },
            detailed_analysis: serde_json::json!({}),
            context_assessment: serde_json::json!({}),
            image_hash: None,
            model_used: None,
        };

        let ctx = assemble(
            "BTCUSD",
            Timeframe::H1,
            60000.0,
            None,
            Some((analysis.clone(), chrono::Duration::minutes(30))),
        );
        assert!(matches!(
            ctx.position,
            PositionContext::PriorAnalysis { urgency: Urgency::Recent, .. }
        ));

        let ctx = assemble("BTCUSD", Timeframe::H1, 60000.0, None, Some((analysis, chrono::Duration::hours(20))));
        assert!(matches!(
            ctx.position,
            PositionContext::PriorAnalysis { urgency: Urgency::Stale, .. }
        ));
    }

    #[test]
    fn active_trade_bypasses_lookback_band() {
        let trade = crate::db::trades::tests::sample_trade(1, "BTCUSD", Timeframe::H1);
        let ctx = assemble("BTCUSD", Timeframe::H1, 60000.0, Some(trade), None);
        assert!(matches!(ctx.position, PositionContext::ActiveTrade(_)));
    }
}
