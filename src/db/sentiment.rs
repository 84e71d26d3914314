use super::Store;
use crate::errors::AppResult;
use crate::types::{
    AssetTrend, MarketRegime, SentimentVerdict, SystemState, SystemStatus, TradePermission,
    TrendDirection,
};
use rusqlite::{params, OptionalExtension, Row};

fn row_to_verdict(row: &Row) -> rusqlite::Result<SentimentVerdict> {
    let regime: String = row.get("market_regime")?;
    let permission: String = row.get("trade_permission")?;
    let btc_dir: String = row.get("btc_trend_direction")?;
    let eth_dir: String = row.get("eth_trend_direction")?;
    let alt_dir: String = row.get("alt_trend_direction")?;

    Ok(SentimentVerdict {
        id: row.get("id")?,
        analysis_timestamp: row.get("analysis_timestamp")?,
        overall_confidence: row.get("overall_confidence")?,
        market_regime: MarketRegime::parse(&regime).unwrap_or(MarketRegime::Transition),
        trade_permission: TradePermission::parse(&permission).unwrap_or(TradePermission::Selective),
        btc_trend: AssetTrend {
            trend_direction: TrendDirection::parse(&btc_dir).unwrap_or(TrendDirection::Sideways),
            trend_strength: row.get("btc_trend_strength")?,
        },
        eth_trend: AssetTrend {
            trend_direction: TrendDirection::parse(&eth_dir).unwrap_or(TrendDirection::Sideways),
            trend_strength: row.get("eth_trend_strength")?,
        },
        alt_trend: AssetTrend {
            trend_direction: TrendDirection::parse(&alt_dir).unwrap_or(TrendDirection::Sideways),
            trend_strength: row.get("alt_trend_strength")?,
        },
        model_used: row.get("model_used")?,
        processing_time_ms: row.get("processing_time_ms")?,
    })
}

fn row_to_system_state(row: &Row) -> rusqlite::Result<SystemState> {
    let status: String = row.get("system_status")?;
    Ok(SystemState {
        bootstrap_completed: row.get::<_, i64>("bootstrap_completed")? != 0,
        bootstrap_data_points: row.get("bootstrap_data_points")?,
        scanner_running: row.get::<_, i64>("scanner_running")? != 0,
        scan_interval_hours: row.get("scan_interval_hours")?,
        last_successful_scan: row.get("last_successful_scan")?,
        last_failed_scan: row.get("last_failed_scan")?,
        consecutive_failures: row.get("consecutive_failures")?,
        consecutive_analysis_failures: row.get("consecutive_analysis_failures")?,
        system_status: SystemStatus::parse(&status).unwrap_or(SystemStatus::Initializing),
        total_scans_completed: row.get("total_scans_completed")?,
        total_analyses_completed: row.get("total_analyses_completed")?,
    })
}

/// Partial patch for `update_system_state`. Only the scanner loop calls
/// this -- it is the single writer for the SystemState singleton.
#[derive(Debug, Default)]
pub struct SystemStatePatch {
    pub bootstrap_completed: Option<bool>,
    pub bootstrap_data_points: Option<i64>,
    pub scanner_running: Option<bool>,
    pub scan_interval_hours: Option<i64>,
    pub last_successful_scan: Option<String>,
    pub last_failed_scan: Option<String>,
    pub consecutive_failures: Option<i64>,
    pub consecutive_analysis_failures: Option<i64>,
    pub system_status: Option<SystemStatus>,
    pub total_scans_completed: Option<i64>,
    pub total_analyses_completed: Option<i64>,
}

impl Store {
    pub fn insert_verdict(&self, v: &SentimentVerdict, charts: &crate::charts::ChartSet) -> AppResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sentiment_verdicts (analysis_timestamp, overall_confidence, market_regime,
                trade_permission, btc_trend_direction, btc_trend_strength, eth_trend_direction,
                eth_trend_strength, alt_trend_direction, alt_trend_strength,
                chart_btc_price, chart_eth_price, chart_btc_dominance, chart_alt_strength, chart_combined,
                model_used, processing_time_ms)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
            params![
                v.analysis_timestamp,
                v.overall_confidence,
                v.market_regime.as_str(),
                v.trade_permission.as_str(),
                v.btc_trend.trend_direction.as_str(),
                v.btc_trend.trend_strength,
                v.eth_trend.trend_direction.as_str(),
                v.eth_trend.trend_strength,
                v.alt_trend.trend_direction.as_str(),
                v.alt_trend.trend_strength,
                charts.btc_price,
                charts.eth_price,
                charts.btc_dominance,
                charts.alt_strength,
                charts.combined,
                v.model_used,
                v.processing_time_ms,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn latest_verdict(&self) -> AppResult<Option<SentimentVerdict>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT * FROM sentiment_verdicts ORDER BY analysis_timestamp DESC LIMIT 1",
                [],
                row_to_verdict,
            )
            .optional()?;
        Ok(row)
    }

    pub fn confidence_history(&self, since: &str) -> AppResult<Vec<(String, f64)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT analysis_timestamp, overall_confidence FROM sentiment_verdicts
             WHERE analysis_timestamp >= ?1 ORDER BY analysis_timestamp ASC",
        )?;
        let rows = stmt.query_map(params![since], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get_system_state(&self) -> AppResult<SystemState> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT * FROM system_state WHERE id = 1", [], row_to_system_state)?)
    }

    pub fn update_system_state(&self, patch: SystemStatePatch) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE system_state SET
                bootstrap_completed = COALESCE(?1, bootstrap_completed),
                bootstrap_data_points = COALESCE(?2, bootstrap_data_points),
                scanner_running = COALESCE(?3, scanner_running),
                scan_interval_hours = COALESCE(?4, scan_interval_hours),
                last_successful_scan = COALESCE(?5, last_successful_scan),
                last_failed_scan = COALESCE(?6, last_failed_scan),
                consecutive_failures = COALESCE(?7, consecutive_failures),
                consecutive_analysis_failures = COALESCE(?8, consecutive_analysis_failures),
                system_status = COALESCE(?9, system_status),
                total_scans_completed = COALESCE(?10, total_scans_completed),
                total_analyses_completed = COALESCE(?11, total_analyses_completed)
             WHERE id = 1",
            params![
                patch.bootstrap_completed.map(|b| b as i64),
                patch.bootstrap_data_points,
                patch.scanner_running.map(|b| b as i64),
                patch.scan_interval_hours,
                patch.last_successful_scan,
                patch.last_failed_scan,
                patch.consecutive_failures,
                patch.consecutive_analysis_failures,
                patch.system_status.map(|s| s.to_string()),
                patch.total_scans_completed,
                patch.total_analyses_completed,
            ],
        )?;
        Ok(())
    }
}
