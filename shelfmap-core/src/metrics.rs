use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One run's timing and counts as persisted to the metrics sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub run_id: String,
    /// `dd/mm/YYYY`
    pub date: String,
    /// `HH:MM:SS`
    pub start: String,
    pub end: String,
    /// `H:MM:SS`, seconds truncated.
    pub elapsed: String,
    pub rows: usize,
    pub rows_per_minute: f64,
    pub errors: usize,
    pub reached_depth: usize,
}

/// Wall-clock timer for one run, started at construction.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    run_id: String,
    started: DateTime<Local>,
}

impl RunMetrics {
    pub fn start() -> Self {
        Self::started_at(Local::now())
    }

    pub fn started_at(started: DateTime<Local>) -> Self {
        let metrics = Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started,
        };
        info!("Start time: {}", started.format("%H:%M:%S"));
        metrics
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn started(&self) -> DateTime<Local> {
        self.started
    }

    pub fn finish(&self, rows: usize, errors: usize, reached_depth: usize) -> MetricsRecord {
        self.finish_at(Local::now(), rows, errors, reached_depth)
    }

    pub fn finish_at(
        &self,
        ended: DateTime<Local>,
        rows: usize,
        errors: usize,
        reached_depth: usize,
    ) -> MetricsRecord {
        let elapsed = (ended - self.started).max(chrono::TimeDelta::zero());
        let seconds = elapsed.num_milliseconds() as f64 / 1000.0;

        let record = MetricsRecord {
            run_id: self.run_id.clone(),
            date: self.started.format("%d/%m/%Y").to_string(),
            start: self.started.format("%H:%M:%S").to_string(),
            end: ended.format("%H:%M:%S").to_string(),
            elapsed: format_elapsed(elapsed.num_seconds()),
            rows,
            rows_per_minute: rows_per_minute(rows, seconds),
            errors,
            reached_depth,
        };

        info!("{} errors found", record.errors);
        info!("Categories extracted: {}", record.rows);
        info!("End time: {}", record.end);
        record
    }
}

/// Rows per minute rounded to two decimals; zero for an instantaneous run.
pub fn rows_per_minute(rows: usize, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds <= 0.0 {
        return 0.0;
    }
    let rate = rows as f64 / (elapsed_seconds / 60.0);
    (rate * 100.0).round() / 100.0
}

pub fn format_elapsed(total_seconds: i64) -> String {
    let total = total_seconds.max(0);
    format!(
        "{}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
