//! Periodic re-ingestion of link documents.
//!
//! One pass lists the due documents and re-ingests them in small batches with
//! a pause in between. At most one pass runs at a time; a pass triggered
//! while another is in flight is skipped, not queued.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lorebase_core::{DocumentStore, Result, SchedulerSettings};
use lorebase_ingest::IngestionPipeline;

/// Snapshot of scheduler state for status endpoints and logs.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub interval_hours: f64,
    pub processed_count: usize,
    pub total_count: usize,
    pub last_refresh_time: Option<DateTime<Utc>>,
}

struct SchedulerInner {
    documents: Arc<dyn DocumentStore>,
    pipeline: Arc<IngestionPipeline>,
    settings: SchedulerSettings,
    interval_hours: RwLock<f64>,
    enabled: AtomicBool,
    running: AtomicBool,
    processed: AtomicUsize,
    total: AtomicUsize,
    last_refresh: RwLock<Option<DateTime<Utc>>>,
}

pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
    // The loop task plus the wakeup used to interrupt its sleep on shutdown.
    task: tokio::sync::Mutex<Option<(JoinHandle<()>, Arc<Notify>)>>,
}

impl RefreshScheduler {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        pipeline: Arc<IngestionPipeline>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                documents,
                pipeline,
                interval_hours: RwLock::new(settings.refresh_interval_hours),
                settings,
                enabled: AtomicBool::new(false),
                running: AtomicBool::new(false),
                processed: AtomicUsize::new(0),
                total: AtomicUsize::new(0),
                last_refresh: RwLock::new(None),
            }),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Enable the scheduler and start the periodic loop. A previous loop is
    /// wound down first.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if let Some((handle, wakeup)) = task.take() {
            self.inner.enabled.store(false, Ordering::SeqCst);
            wakeup.notify_one();
            let _ = handle.await;
        }

        self.inner.enabled.store(true, Ordering::SeqCst);
        let wakeup = Arc::new(Notify::new());
        let loop_wakeup = wakeup.clone();
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            info!(
                "Refresh scheduler started, interval {} hours",
                *inner.interval_hours.read()
            );
            while inner.enabled.load(Ordering::SeqCst) {
                inner.refresh_pass().await;
                let pause = inner.interval_pause();
                // Shutdown interrupts the sleep, never the pass above.
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = loop_wakeup.notified() => {}
                }
            }
        });
        *task = Some((handle, wakeup));
    }

    /// Disable the scheduler and stop the loop. An in-flight pass completes
    /// before this returns; only the idle sleep is cut short.
    pub async fn stop(&self) {
        self.inner.enabled.store(false, Ordering::SeqCst);
        let mut task = self.task.lock().await;
        if let Some((handle, wakeup)) = task.take() {
            wakeup.notify_one();
            let _ = handle.await;
            info!("Refresh scheduler stopped");
        }
    }

    /// Change the interval and enabled state. Starting and stopping are
    /// idempotent; an interval change alone takes effect after the current
    /// sleep. Non-finite or non-positive intervals keep the previous value.
    pub async fn update_interval(&self, hours: f64, enabled: bool) {
        if hours.is_finite() && hours > 0.0 {
            *self.inner.interval_hours.write() = hours;
        } else {
            warn!("Ignoring invalid refresh interval: {} hours", hours);
        }
        let was_enabled = self.inner.enabled.load(Ordering::SeqCst);
        if enabled && !was_enabled {
            self.start().await;
        } else if !enabled && was_enabled {
            self.stop().await;
        }
    }

    /// Run one refresh pass immediately, outside the periodic loop.
    pub fn refresh_now(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.refresh_pass().await })
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            enabled: self.inner.enabled.load(Ordering::SeqCst),
            running: self.inner.running.load(Ordering::SeqCst),
            interval_hours: *self.inner.interval_hours.read(),
            processed_count: self.inner.processed.load(Ordering::SeqCst),
            total_count: self.inner.total.load(Ordering::SeqCst),
            last_refresh_time: *self.inner.last_refresh.read(),
        }
    }
}

impl SchedulerInner {
    fn interval_pause(&self) -> Duration {
        let secs = *self.interval_hours.read() * 3600.0;
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::from_secs(1)
        }
    }

    async fn refresh_pass(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Refresh pass already running, skipping");
            return;
        }

        if let Err(e) = self.run_pass().await {
            warn!("Refresh pass failed: {}", e);
        }

        self.running.store(false, Ordering::SeqCst);
        *self.last_refresh.write() = Some(Utc::now());
    }

    async fn run_pass(&self) -> Result<()> {
        let due = self
            .documents
            .list_due_for_refresh(self.settings.max_age_hours)
            .await?;
        self.total.store(due.len(), Ordering::SeqCst);
        self.processed.store(0, Ordering::SeqCst);

        if due.is_empty() {
            debug!("No link documents due for refresh");
            return Ok(());
        }
        info!("Refreshing {} link documents", due.len());

        let batch_size = self.settings.batch_size.max(1);
        let batch_count = due.len().div_ceil(batch_size);
        for (i, batch) in due.chunks(batch_size).enumerate() {
            for doc in batch {
                match self.pipeline.ingest(doc.id, true).await {
                    Ok(report) => {
                        debug!(
                            "Refreshed document {} ({} chunks)",
                            doc.id, report.chunk_count
                        );
                        if let Err(e) = self.documents.set_last_refreshed(doc.id, Utc::now()).await
                        {
                            warn!("Could not stamp refresh of document {}: {}", doc.id, e);
                        }
                    }
                    // A single bad document must not sink the pass.
                    Err(e) => warn!("Refresh of document {} failed: {}", doc.id, e),
                }
                self.processed.fetch_add(1, Ordering::SeqCst);
            }

            if i + 1 < batch_count && self.settings.batch_pause_secs > 0 {
                tokio::time::sleep(Duration::from_secs(self.settings.batch_pause_secs)).await;
            }
        }

        info!(
            "Refresh pass complete: {} documents",
            self.processed.load(Ordering::SeqCst)
        );
        Ok(())
    }
}
