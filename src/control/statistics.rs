//! Session counters, status snapshots and performance grading.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::control::arbiter::TrackingState;
use crate::control::motion::{DispatchMode, MovementRecord};
use crate::control::tracked_object::ObjectSnapshot;
use crate::control::zoom::ZoomRecord;
use crate::device::PtzPose;
use crate::integration::FilteredBatch;

/// Detection-side counters, written by the producer thread.
#[derive(Debug, Clone, Default)]
pub struct IngestMetrics {
    pub batches: Arc<AtomicU64>,
    /// Raw entries handed to `update_detections`
    pub received: Arc<AtomicU64>,
    /// Entries that passed filtering
    pub accepted: Arc<AtomicU64>,
    pub low_confidence: Arc<AtomicU64>,
    pub out_of_size: Arc<AtomicU64>,
    pub malformed: Arc<AtomicU64>,
    /// Batches superseded by a newer one before the loop consumed them.
    pub dropped_batches: Arc<AtomicU64>,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one filtered batch.
    pub fn record(&self, received: usize, batch: &FilteredBatch) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.received.fetch_add(received as u64, Ordering::Relaxed);
        self.accepted
            .fetch_add(batch.positions.len() as u64, Ordering::Relaxed);
        self.low_confidence
            .fetch_add(batch.low_confidence as u64, Ordering::Relaxed);
        self.out_of_size
            .fetch_add(batch.out_of_size as u64, Ordering::Relaxed);
        self.malformed
            .fetch_add(batch.malformed as u64, Ordering::Relaxed);
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            batches: self.batches.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            low_confidence: self.low_confidence.load(Ordering::Relaxed),
            out_of_size: self.out_of_size.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            dropped_batches: self.dropped_batches.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IngestSummary {
    pub batches: u64,
    pub received: u64,
    pub accepted: u64,
    pub low_confidence: u64,
    pub out_of_size: u64,
    pub malformed: u64,
    pub dropped_batches: u64,
}

/// Loop-side cumulative counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SessionTotals {
    pub cycles: u64,
    pub successful_tracks: u64,
    pub failed_tracks: u64,
    pub switch_count: u64,
    pub zoom_changes: u64,
    pub target_losses: u64,
    pub reconnects: u64,
    pub objects_created: u64,
    pub objects_expired: u64,
    pub objects_evicted: u64,
}

/// Session rates derived from the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceRates {
    pub detections_per_second: f64,
    /// Successful dispatches over all dispatches
    pub success_rate: f64,
    pub switches_per_minute: f64,
}

impl PerformanceRates {
    /// Rates over the session. Durations under a second (or a minute for
    /// switch rates) count as a full unit.
    pub fn compute(detections: u64, totals: &SessionTotals, duration: f64) -> Self {
        let attempts = totals.successful_tracks + totals.failed_tracks;
        Self {
            detections_per_second: detections as f64 / duration.max(1.0),
            success_rate: totals.successful_tracks as f64 / attempts.max(1) as f64,
            switches_per_minute: totals.switch_count as f64 / (duration / 60.0).max(1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PtzMovementStats {
    pub total_movements: usize,
    pub average_pan_speed: f64,
    pub average_tilt_speed: f64,
    pub max_pan_speed: f64,
    pub max_tilt_speed: f64,
}

impl PtzMovementStats {
    pub fn from_log<'a>(log: impl Iterator<Item = &'a MovementRecord>) -> Self {
        let mut stats = Self::default();
        let (mut pan_sum, mut tilt_sum) = (0.0, 0.0);
        for record in log {
            stats.total_movements += 1;
            pan_sum += record.pan_speed;
            tilt_sum += record.tilt_speed;
            stats.max_pan_speed = stats.max_pan_speed.max(record.pan_speed.abs());
            stats.max_tilt_speed = stats.max_tilt_speed.max(record.tilt_speed.abs());
        }
        if stats.total_movements > 0 {
            stats.average_pan_speed = pan_sum / stats.total_movements as f64;
            stats.average_tilt_speed = tilt_sum / stats.total_movements as f64;
        }
        stats
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ZoomStats {
    pub total_changes: u64,
    pub current_level: f64,
    pub min_used: f64,
    pub max_used: f64,
    pub average_level: f64,
}

impl ZoomStats {
    /// With no recorded changes the min/max/average collapse to the current level.
    pub fn from_history<'a>(
        changes: u64,
        current: f64,
        history: impl Iterator<Item = &'a ZoomRecord>,
    ) -> Self {
        let levels: Vec<f64> = history.map(|r| r.to).collect();
        if levels.is_empty() {
            return Self {
                total_changes: changes,
                current_level: current,
                min_used: current,
                max_used: current,
                average_level: current,
            };
        }
        Self {
            total_changes: changes,
            current_level: current,
            min_used: levels.iter().copied().fold(f64::INFINITY, f64::min),
            max_used: levels.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            average_level: levels.iter().sum::<f64>() / levels.len() as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ObjectStats {
    pub total_tracked: usize,
    pub with_movement: usize,
    pub average_confidence: f64,
    pub average_size: f64,
}

impl ObjectStats {
    pub fn from_snapshots(objects: &[ObjectSnapshot]) -> Self {
        let n = objects.len();
        if n == 0 {
            return Self::default();
        }
        let size = |o: &ObjectSnapshot| o.position.as_ref().map_or(0.0, |p| p.area_ratio());
        Self {
            total_tracked: n,
            with_movement: objects.iter().filter(|o| o.moving).count(),
            average_confidence: objects.iter().map(|o| o.average_confidence).sum::<f64>()
                / n as f64,
            average_size: objects.iter().map(size).sum::<f64>() / n as f64,
        }
    }
}

/// Full statistics report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackingStatistics {
    pub session_duration: f64,
    pub performance: PerformanceRates,
    pub ptz_movement: PtzMovementStats,
    pub zoom_control: ZoomStats,
    pub objects: ObjectStats,
    pub totals: SessionTotals,
    pub ingest: IngestSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MovementStatus {
    pub pan_speed: f64,
    pub tilt_speed: f64,
    pub pose: PtzPose,
    pub mode: Option<DispatchMode>,
}

/// Status snapshot published once per cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerStatus {
    pub timestamp: f64,
    pub state: TrackingState,
    pub active: bool,
    pub current_target: Option<u64>,
    pub objects: Vec<ObjectSnapshot>,
    pub zoom_level: f64,
    pub movement: MovementStatus,
    pub statistics: TrackingStatistics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Poor,
    Bad,
}

impl Grade {
    fn from_score(score: f64) -> Self {
        match score {
            s if s >= 90.0 => Grade::Excellent,
            s if s >= 75.0 => Grade::Good,
            s if s >= 60.0 => Grade::Fair,
            s if s >= 45.0 => Grade::Poor,
            _ => Grade::Bad,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    /// 0 to 100.
    pub score: f64,
    pub grade: Grade,
    pub success_rate: f64,
    pub detections_per_second: f64,
    pub zoom_stability: f64,
    pub average_confidence: f64,
    pub recommendations: Vec<String>,
}

/// Detections per second treated as ideal.
const TARGET_DPS: f64 = 10.0;
/// Zoom changes per minute at which stability reaches zero.
const MAX_ZOOM_CHANGES_PER_MIN: f64 = 5.0;

/// Grade a session: success rate 40 points, detection rate 30, zoom
/// stability 20, average confidence 10.
pub fn analyze_performance(stats: &TrackingStatistics) -> PerformanceReport {
    let rates = &stats.performance;
    let minutes = (stats.session_duration / 60.0).max(1.0);
    let zoom_per_min = stats.zoom_control.total_changes as f64 / minutes;

    let dps_score = (rates.detections_per_second / TARGET_DPS).min(1.0);
    let zoom_stability = (1.0 - zoom_per_min / MAX_ZOOM_CHANGES_PER_MIN).max(0.0);
    let confidence = stats.objects.average_confidence;
    let score = rates.success_rate * 40.0 + dps_score * 30.0 + zoom_stability * 20.0 + confidence * 10.0;

    let mut recommendations = Vec::new();
    if rates.success_rate < 0.8 {
        recommendations.push("check PTZ connectivity; many commands are failing".to_string());
    }
    if rates.detections_per_second < 5.0 {
        recommendations.push("detection rate is low; speed up the detector or lower its resolution".to_string());
    }
    if zoom_per_min > 3.0 {
        recommendations.push("zoom changes too often; lower zoom_speed or widen zoom_padding".to_string());
    }
    if confidence < 0.6 {
        recommendations.push("average confidence is low; improve detection conditions or the model".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("tracking is performing well".to_string());
    }

    PerformanceReport {
        score,
        grade: Grade::from_score(score),
        success_rate: rates.success_rate,
        detections_per_second: rates.detections_per_second,
        zoom_stability,
        average_confidence: confidence,
        recommendations,
    }
}
