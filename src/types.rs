//! Core data-model types shared across every engine. Closed sum types for
//! every status/enum column so callers get exhaustiveness checking instead
//! of stringly-typed comparisons.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1D")]
    D1,
    #[serde(rename = "1W")]
    W1,
}

impl Timeframe {
    /// Lookback window (hours) used by the context service to band a prior
    /// analysis as recent / active / stale.
    pub fn lookback_hours(self) -> f64 {
        match self {
            Timeframe::M1 => 1.0,
            Timeframe::M5 => 2.0,
            Timeframe::M15 => 4.0,
            Timeframe::M30 => 8.0,
            Timeframe::H1 => 12.0,
            Timeframe::H4 => 24.0,
            Timeframe::D1 => 72.0,
            Timeframe::W1 => 168.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1D",
            Timeframe::W1 => "1W",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "1m" => Timeframe::M1,
            "5m" => Timeframe::M5,
            "15m" => Timeframe::M15,
            "30m" => Timeframe::M30,
            "1h" => Timeframe::H1,
            "4h" => Timeframe::H4,
            "1D" | "1d" => Timeframe::D1,
            "1W" | "1w" => Timeframe::W1,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Some(TradeAction::Buy),
            "sell" => Some(TradeAction::Sell),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
        }
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recommendation action; a superset of TradeAction that also allows `hold`
/// (an Analysis can recommend holding with no trade created).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationAction {
    Buy,
    Sell,
    Hold,
}

impl RecommendationAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Some(RecommendationAction::Buy),
            "sell" => Some(RecommendationAction::Sell),
            "hold" => Some(RecommendationAction::Hold),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecommendationAction::Buy => "buy",
            RecommendationAction::Sell => "sell",
            RecommendationAction::Hold => "hold",
        }
    }

    pub fn as_trade_action(self) -> Option<TradeAction> {
        match self {
            RecommendationAction::Buy => Some(TradeAction::Buy),
            RecommendationAction::Sell => Some(TradeAction::Sell),
            RecommendationAction::Hold => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Waiting,
    Active,
    ProfitHit,
    StopHit,
    AiClosed,
    UserClosed,
}

impl TradeStatus {
    pub fn is_open(self) -> bool {
        matches!(self, TradeStatus::Waiting | TradeStatus::Active)
    }

    pub fn is_closed(self) -> bool {
        !self.is_open()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TradeStatus::Waiting => "waiting",
            TradeStatus::Active => "active",
            TradeStatus::ProfitHit => "profit_hit",
            TradeStatus::StopHit => "stop_hit",
            TradeStatus::AiClosed => "ai_closed",
            TradeStatus::UserClosed => "user_closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "waiting" => TradeStatus::Waiting,
            "active" => TradeStatus::Active,
            "profit_hit" => TradeStatus::ProfitHit,
            "stop_hit" => TradeStatus::StopHit,
            "ai_closed" => TradeStatus::AiClosed,
            "user_closed" => TradeStatus::UserClosed,
            _ => return None,
        })
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStrategy {
    Breakout,
    Pullback,
}

impl EntryStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStrategy::Breakout => "breakout",
            EntryStrategy::Pullback => "pullback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "breakout" => Some(EntryStrategy::Breakout),
            "pullback" | "traditional" => Some(EntryStrategy::Pullback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    TriggerHit,
    Maintain,
    Modify,
    AiClose,
    StatusCorrection,
    UserClose,
    OrphanCleanup,
}

impl UpdateType {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateType::TriggerHit => "trigger_hit",
            UpdateType::Maintain => "maintain",
            UpdateType::Modify => "modify",
            UpdateType::AiClose => "ai_close",
            UpdateType::StatusCorrection => "status_correction",
            UpdateType::UserClose => "user_close",
            UpdateType::OrphanCleanup => "orphan_cleanup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketRegime {
    BtcSeason,
    EthSeason,
    AltSeason,
    Transition,
    Bear,
}

impl MarketRegime {
    pub fn as_str(self) -> &'static str {
        match self {
            MarketRegime::BtcSeason => "BTC_SEASON",
            MarketRegime::EthSeason => "ETH_SEASON",
            MarketRegime::AltSeason => "ALT_SEASON",
            MarketRegime::Transition => "TRANSITION",
            MarketRegime::Bear => "BEAR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "BTC_SEASON" => MarketRegime::BtcSeason,
            "ETH_SEASON" => MarketRegime::EthSeason,
            "ALT_SEASON" => MarketRegime::AltSeason,
            "TRANSITION" => MarketRegime::Transition,
            "BEAR" => MarketRegime::Bear,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradePermission {
    NoTrade,
    Selective,
    Aggressive,
}

impl TradePermission {
    pub fn as_str(self) -> &'static str {
        match self {
            TradePermission::NoTrade => "NO_TRADE",
            TradePermission::Selective => "SELECTIVE",
            TradePermission::Aggressive => "AGGRESSIVE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "NO_TRADE" => TradePermission::NoTrade,
            "SELECTIVE" => TradePermission::Selective,
            "AGGRESSIVE" => TradePermission::Aggressive,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

impl TrendDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TrendDirection::Up => "UP",
            TrendDirection::Down => "DOWN",
            TrendDirection::Sideways => "SIDEWAYS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "UP" => TrendDirection::Up,
            "DOWN" => TrendDirection::Down,
            "SIDEWAYS" => TrendDirection::Sideways,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SystemStatus {
    Initializing,
    Active,
    Degraded,
    Halted,
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SystemStatus::Initializing => "INITIALIZING",
            SystemStatus::Active => "ACTIVE",
            SystemStatus::Degraded => "DEGRADED",
            SystemStatus::Halted => "HALTED",
        };
        write!(f, "{s}")
    }
}

impl SystemStatus {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "INITIALIZING" => SystemStatus::Initializing,
            "ACTIVE" => SystemStatus::Active,
            "DEGRADED" => SystemStatus::Degraded,
            "HALTED" => SystemStatus::Halted,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Idle => "IDLE",
            SyncState::Running => "RUNNING",
            SyncState::Completed => "COMPLETED",
            SyncState::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "IDLE" => SyncState::Idle,
            "RUNNING" => SyncState::Running,
            "COMPLETED" => SyncState::Completed,
            "FAILED" => SyncState::Failed,
            _ => return None,
        })
    }
}

// ── Entities ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: RecommendationAction,
    pub entry_price: Option<f64>,
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: i64,
    pub ticker: String,
    pub timeframe: Timeframe,
    pub analysis_timestamp: String,
    pub confidence: f64,
    pub recommendation: Recommendation,
    pub detailed_analysis: serde_json::Value,
    pub context_assessment: serde_json::Value,
    pub image_hash: Option<String>,
    pub model_used: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub analysis_id: i64,
    pub ticker: String,
    pub timeframe: Timeframe,
    pub action: TradeAction,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub entry_condition: String,
    pub entry_strategy: EntryStrategy,
    pub created_at: String,
    pub updated_at: String,
    pub status: TradeStatus,
    pub trigger_hit_time: Option<String>,
    pub trigger_hit_price: Option<f64>,
    pub current_price: Option<f64>,
    pub unrealized_pnl: Option<f64>,
    pub realized_pnl: Option<f64>,
    pub close_time: Option<String>,
    pub close_price: Option<f64>,
    pub close_reason: Option<String>,
    pub close_details: Option<serde_json::Value>,
    pub original_analysis_snapshot: serde_json::Value,
    pub original_context_snapshot: serde_json::Value,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeUpdate {
    pub id: i64,
    pub trade_id: i64,
    pub timestamp: String,
    pub price: Option<f64>,
    pub update_type: UpdateType,
    pub payload: serde_json::Value,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp: String,
    pub btc_price: f64,
    pub eth_price: f64,
    pub btc_market_cap: f64,
    pub eth_market_cap: f64,
    pub total_market_cap: f64,
    pub btc_dominance: f64,
    pub alt_strength_ratio: f64,
    pub data_quality_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetTrend {
    pub trend_direction: TrendDirection,
    pub trend_strength: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentVerdict {
    pub id: i64,
    pub analysis_timestamp: String,
    pub overall_confidence: f64,
    pub market_regime: MarketRegime,
    pub trade_permission: TradePermission,
    pub btc_trend: AssetTrend,
    pub eth_trend: AssetTrend,
    pub alt_trend: AssetTrend,
    pub model_used: String,
    pub processing_time_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemState {
    pub bootstrap_completed: bool,
    pub bootstrap_data_points: i64,
    pub scanner_running: bool,
    pub scan_interval_hours: i64,
    pub last_successful_scan: Option<String>,
    pub last_failed_scan: Option<String>,
    pub consecutive_failures: i64,
    pub consecutive_analysis_failures: i64,
    pub system_status: SystemStatus,
    pub total_scans_completed: i64,
    pub total_analyses_completed: i64,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            bootstrap_completed: false,
            bootstrap_data_points: 0,
            scanner_running: false,
            scan_interval_hours: 4,
            last_successful_scan: None,
            last_failed_scan: None,
            consecutive_failures: 0,
            consecutive_analysis_failures: 0,
            system_status: SystemStatus::Initializing,
            total_scans_completed: 0,
            total_analyses_completed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub account_type: String,
    pub wallet: String,
    /// High-water mark: fills with `time_ms` at or before this value have
    /// already been synced.
    pub last_synced_fill_time: i64,
    pub state: SyncState,
    pub last_error: Option<String>,
    pub fills_synced_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub hash: String,
    pub tid: i64,
    pub time_ms: i64,
    pub coin: String,
    pub side: String,
    pub size: f64,
    pub price: f64,
    pub account_type: String,
    pub wallet_address: String,
}

/// One OHLC bar, used only by the trigger/exit detectors. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
