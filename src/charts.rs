//! Renders sentiment charts from a validated MarketSnapshot series. Each
//! chart is independent: one render failing never fails the batch, it just
//! leaves that slot `None` in the `ChartSet` persisted alongside a verdict.

use crate::types::MarketSnapshot;
use plotters::backend::RGBPixel;
use plotters::prelude::*;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 400;
const COMBINED_WIDTH: u32 = 1000;
const COMBINED_HEIGHT: u32 = 700;

#[derive(Debug, Clone, Default)]
pub struct ChartSet {
    pub btc_price: Option<Vec<u8>>,
    pub eth_price: Option<Vec<u8>>,
    pub btc_dominance: Option<Vec<u8>>,
    pub alt_strength: Option<Vec<u8>>,
    pub combined: Option<Vec<u8>>,
}

pub fn render_all(series: &[MarketSnapshot]) -> ChartSet {
    let mut set = ChartSet::default();

    match render_line(series, "BTC Price", |s| s.btc_price, WIDTH, HEIGHT) {
        Ok(bytes) => set.btc_price = Some(bytes),
        Err(e) => tracing::warn!(error = %e, "btc price chart render failed"),
    }
    match render_line(series, "ETH Price", |s| s.eth_price, WIDTH, HEIGHT) {
        Ok(bytes) => set.eth_price = Some(bytes),
        Err(e) => tracing::warn!(error = %e, "eth price chart render failed"),
    }
    match render_line(series, "BTC Dominance (%)", |s| s.btc_dominance, WIDTH, HEIGHT) {
        Ok(bytes) => set.btc_dominance = Some(bytes),
        Err(e) => tracing::warn!(error = %e, "btc dominance chart render failed"),
    }
    match render_line(series, "Alt Strength Ratio", |s| s.alt_strength_ratio, WIDTH, HEIGHT) {
        Ok(bytes) => set.alt_strength = Some(bytes),
        Err(e) => tracing::warn!(error = %e, "alt strength chart render failed"),
    }
    match render_combined(series) {
        Ok(bytes) => set.combined = Some(bytes),
        Err(e) => tracing::warn!(error = %e, "combined panel render failed"),
    }

    set
}

fn render_line(
    series: &[MarketSnapshot],
    title: &str,
    value_of: impl Fn(&MarketSnapshot) -> f64,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, String> {
    if series.is_empty() {
        return Err("empty series".into());
    }

    let mut buffer = vec![0u8; (width * height * 3) as usize];
    {
        let backend = BitMapBackend::<RGBPixel>::with_buffer(&mut buffer, (width, height));
        let root = backend.into_drawing_area();
        root.fill(&WHITE).map_err(|e| e.to_string())?;
        draw_single_series(&root, series, title, &value_of)?;
        root.present().map_err(|e| e.to_string())?;
    }
    encode_png(&buffer, width, height)
}

fn draw_single_series<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    series: &[MarketSnapshot],
    title: &str,
    value_of: &impl Fn(&MarketSnapshot) -> f64,
) -> Result<(), String>
where
    DB::ErrorType: 'static,
{
    let values: Vec<f64> = series.iter().map(value_of).collect();
    let (min, max) = min_max(&values);
    let pad = ((max - min) * 0.05).max(f64::EPSILON);

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_cartesian_2d(0..series.len().saturating_sub(1), (min - pad)..(max + pad))
        .map_err(|e| e.to_string())?;

    chart.configure_mesh().draw().map_err(|e| e.to_string())?;
    chart
        .draw_series(LineSeries::new(values.iter().enumerate().map(|(i, v)| (i, *v)), &BLUE))
        .map_err(|e| e.to_string())?;

    Ok(())
}

fn render_combined(series: &[MarketSnapshot]) -> Result<Vec<u8>, String> {
    if series.is_empty() {
        return Err("empty series".into());
    }

    let mut buffer = vec![0u8; (COMBINED_WIDTH * COMBINED_HEIGHT * 3) as usize];
    {
        let backend = BitMapBackend::<RGBPixel>::with_buffer(&mut buffer, (COMBINED_WIDTH, COMBINED_HEIGHT));
        let root = backend.into_drawing_area();
        root.fill(&WHITE).map_err(|e| e.to_string())?;
        let panels = root.split_evenly((2, 2));

        draw_single_series(&panels[0], series, "BTC Price", &|s: &MarketSnapshot| s.btc_price)?;
        draw_single_series(&panels[1], series, "ETH Price", &|s: &MarketSnapshot| s.eth_price)?;
        draw_single_series(&panels[2], series, "BTC Dominance (%)", &|s: &MarketSnapshot| s.btc_dominance)?;
        draw_single_series(&panels[3], series, "Alt Strength Ratio", &|s: &MarketSnapshot| s.alt_strength_ratio)?;

        root.present().map_err(|e| e.to_string())?;
    }
    encode_png(&buffer, COMBINED_WIDTH, COMBINED_HEIGHT)
}

fn min_max(values: &[f64]) -> (f64, f64) {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if min.is_finite() && max.is_finite() {
        (min, max)
    } else {
        (0.0, 1.0)
    }
}

fn encode_png(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, String> {
    let image = image::RgbImage::from_raw(width, height, rgb.to_vec())
        .ok_or_else(|| "pixel buffer size mismatch".to_string())?;
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_series(n: usize) -> Vec<MarketSnapshot> {
        (0..n)
            .map(|i| MarketSnapshot {
                timestamp: format!("2026-01-{:02}T00:00:00Z", i + 1),
                btc_price: 60000.0 + i as f64 * 100.0,
                eth_price: 3000.0 + i as f64 * 10.0,
                btc_market_cap: 1.2e12,
                eth_market_cap: 3.6e11,
                total_market_cap: 2.5e12,
                btc_dominance: 48.0 + i as f64 * 0.1,
                alt_strength_ratio: 21.0,
                data_quality_score: 1.0,
            })
            .collect()
    }

    #[test]
    fn render_all_produces_every_chart_for_nonempty_series() {
        let set = render_all(&sample_series(10));
        assert!(set.btc_price.is_some());
        assert!(set.eth_price.is_some());
        assert!(set.btc_dominance.is_some());
        assert!(set.alt_strength.is_some());
        assert!(set.combined.is_some());
    }

    #[test]
    fn render_all_degrades_gracefully_on_empty_series() {
        let set = render_all(&[]);
        assert!(set.btc_price.is_none());
        assert!(set.combined.is_none());
    }

    #[test]
    fn single_chart_failure_does_not_abort_others() {
        // A one-point series still has a valid render (min==max triggers the
        // epsilon-padding path rather than a divide-by-zero).
        let set = render_all(&sample_series(1));
        assert!(set.btc_price.is_some());
    }
}
