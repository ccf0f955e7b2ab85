//! Presentation collaborator: the charts and the status panel.
//!
//! The engine hands over plain data; how it gets drawn is up to the sink.
//! `LogSink` writes everything as structured log lines.

use tracing::{debug, info};

use crate::history::HistorySnapshot;

/// Placeholder shown for an unavailable reading.
pub const NO_READING: &str = "--";

// ---------------------------------------------------------------------------
// Chart frames
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartId {
    /// Temperature (°C) and humidity (%) on one axis.
    Climate,
    /// Soil moisture, 0-100 %.
    Soil,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: &'static str,
    pub points: Vec<Option<f64>>,
}

/// Full replacement data for one chart. Sinks redraw it without animation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartFrame {
    pub chart: ChartId,
    pub labels: Vec<String>,
    pub series: Vec<Series>,
}

/// Split a history snapshot into the two dashboard charts.
pub fn chart_frames(history: HistorySnapshot) -> [ChartFrame; 2] {
    let HistorySnapshot {
        timestamps,
        temperature,
        humidity,
        soil,
    } = history;

    [
        ChartFrame {
            chart: ChartId::Climate,
            labels: timestamps.clone(),
            series: vec![
                Series {
                    label: "Temperature (°C)",
                    points: temperature,
                },
                Series {
                    label: "Humidity (%)",
                    points: humidity,
                },
            ],
        },
        ChartFrame {
            chart: ChartId::Soil,
            labels: timestamps,
            series: vec![Series {
                label: "Soil Moisture (%)",
                points: soil,
            }],
        },
    ]
}

// ---------------------------------------------------------------------------
// Status panel
// ---------------------------------------------------------------------------

/// What the pump button offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAffordance {
    TurnOn,
    TurnOff,
    /// Disabled: the server controls the pump.
    AutoMode,
}

impl ToggleAffordance {
    pub fn label(self) -> &'static str {
        match self {
            Self::TurnOn => "Turn ON",
            Self::TurnOff => "Turn OFF",
            Self::AutoMode => "Auto Mode",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    pub temperature: String,
    pub humidity: String,
    pub soil: String,
    /// Label of the newest sample.
    pub updated_at: String,
    pub mode: &'static str,
    pub pump: &'static str,
    pub toggle: ToggleAffordance,
    /// False while in auto mode or while a toggle is outstanding.
    pub toggle_enabled: bool,
    /// Set after repeated failed polls; values shown are old.
    pub stale: bool,
}

pub fn format_reading(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => NO_READING.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Sink trait + implementations
// ---------------------------------------------------------------------------

pub trait ChartSink: Send {
    fn draw_chart(&mut self, frame: &ChartFrame);
    fn draw_status(&mut self, view: &StatusView);
}

#[derive(Default)]
pub struct LogSink;

impl ChartSink for LogSink {
    fn draw_chart(&mut self, frame: &ChartFrame) {
        let latest: Vec<String> = frame
            .series
            .iter()
            .map(|s| format!("{}={}", s.label, format_reading(s.points.last().copied().flatten())))
            .collect();
        debug!(
            chart = ?frame.chart,
            points = frame.labels.len(),
            latest = %latest.join(", "),
            "chart redraw"
        );
    }

    fn draw_status(&mut self, view: &StatusView) {
        info!(
            temperature = %view.temperature,
            humidity = %view.humidity,
            soil = %view.soil,
            updated = %view.updated_at,
            mode = view.mode,
            pump = view.pump,
            button = view.toggle.label(),
            enabled = view.toggle_enabled,
            stale = view.stale,
            "status"
        );
    }
}

/// Keeps every frame it was given. Used by tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) charts: Vec<ChartFrame>,
    pub(crate) statuses: Vec<StatusView>,
}

#[cfg(test)]
impl ChartSink for RecordingSink {
    fn draw_chart(&mut self, frame: &ChartFrame) {
        self.charts.push(frame.clone());
    }

    fn draw_status(&mut self, view: &StatusView) {
        self.statuses.push(view.clone());
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_reading_uses_placeholder_for_null() {
        assert_eq!(format_reading(None), "--");
        assert_eq!(format_reading(Some(22.0)), "22");
        assert_eq!(format_reading(Some(55.5)), "55.5");
        assert_eq!(format_reading(Some(0.0)), "0");
    }

    #[test]
    fn chart_frames_share_labels() {
        let snap = HistorySnapshot {
            timestamps: vec!["10:00:00".into(), "10:00:02".into()],
            temperature: vec![Some(21.0), None],
            humidity: vec![Some(50.0), Some(51.0)],
            soil: vec![None, Some(40.0)],
        };
        let [climate, soil] = chart_frames(snap);

        assert_eq!(climate.chart, ChartId::Climate);
        assert_eq!(climate.labels, soil.labels);
        assert_eq!(climate.series.len(), 2);
        assert_eq!(climate.series[0].points, vec![Some(21.0), None]);
        assert_eq!(climate.series[1].label, "Humidity (%)");

        assert_eq!(soil.chart, ChartId::Soil);
        assert_eq!(soil.series.len(), 1);
        assert_eq!(soil.series[0].points, vec![None, Some(40.0)]);
    }

    #[test]
    fn affordance_labels() {
        assert_eq!(ToggleAffordance::TurnOn.label(), "Turn ON");
        assert_eq!(ToggleAffordance::TurnOff.label(), "Turn OFF");
        assert_eq!(ToggleAffordance::AutoMode.label(), "Auto Mode");
    }
}
