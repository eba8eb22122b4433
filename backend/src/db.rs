use anyhow::Context;
use mission_control_shared::{LogEntry, StampedSample};
use sqlx::sqlite::SqlitePool;
use std::fs;
use std::future::Future;
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Duration;

const DB_RETRIES: usize = 5;
const DB_RETRY_DELAY_MS: u64 = 50;
const WRITER_QUEUE: usize = 64;

/// Opens (creating if needed) the SQLite file and makes sure the tables
/// exist.
pub async fn open(db_path: &str) -> anyhow::Result<SqlitePool> {
    let path = Path::new(db_path);
    if !path.exists() {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        fs::write(path, b"").with_context(|| format!("creating {db_path}"))?;
        tracing::info!("Created empty DB file at {db_path}");
    }

    let db = SqlitePool::connect(&format!("sqlite://{db_path}"))
        .await
        .with_context(|| format!("opening {db_path}"))?;
    init_schema(&db).await?;
    Ok(db)
}

pub async fn init_schema(db: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS telemetry (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            mission_started_at_ms INTEGER,
            seq                  INTEGER NOT NULL,
            received_at_ms       INTEGER NOT NULL,
            mission_elapsed_s    REAL    NOT NULL,
            sample_json          TEXT    NOT NULL
        );
        "#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp_ms INTEGER NOT NULL,
            severity     TEXT    NOT NULL, -- 'INFO', 'WARNING' or 'ERROR'
            message      TEXT    NOT NULL
        );
        "#,
    )
    .execute(db)
    .await?;

    Ok(())
}

/// Retries a statement with exponential backoff before giving up.
pub async fn insert_with_retry<T, F, Fut>(mut f: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut delay = DB_RETRY_DELAY_MS;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= DB_RETRIES => return Err(e),
            Err(e) => {
                tracing::debug!("db write failed (attempt {}): {e}", attempt + 1);
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = (delay * 2).min(1000);
            }
        }
    }
}

/// Inserts one batch of samples, each with retry.
pub async fn save_batch(
    db: &SqlitePool,
    mission_started_at_ms: Option<u64>,
    batch: &[StampedSample],
) -> anyhow::Result<usize> {
    let mut saved = 0;
    for stamped in batch {
        let sample_json = serde_json::to_string(&stamped.sample)?;
        insert_with_retry(|| {
            sqlx::query(
                r#"
                INSERT INTO telemetry
                    (mission_started_at_ms, seq, received_at_ms, mission_elapsed_s, sample_json)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(mission_started_at_ms.map(|v| v as i64))
            .bind(stamped.seq as i64)
            .bind(stamped.received_at_ms as i64)
            .bind(stamped.mission_elapsed_seconds)
            .bind(sample_json.as_str())
            .execute(db)
        })
        .await
        .with_context(|| format!("saving sample {}", stamped.seq))?;
        saved += 1;
    }
    Ok(saved)
}

enum WriterMsg {
    Save {
        mission_started_at_ms: Option<u64>,
        batch: Vec<StampedSample>,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle to the background task that writes accepted samples. Batches are
/// written in the order they are queued, and the cursor moves when a batch
/// is queued so each sample goes out once.
pub struct TelemetryWriter {
    tx: mpsc::Sender<WriterMsg>,
    queued_through: u64,
    task: JoinHandle<()>,
}

impl TelemetryWriter {
    pub fn spawn(db: SqlitePool) -> Self {
        let (tx, rx) = mpsc::channel(WRITER_QUEUE);
        Self {
            tx,
            queued_through: 0,
            task: tokio::spawn(run_writer(db, rx)),
        }
    }

    /// Samples not yet queued, oldest first.
    pub fn unsaved<'a>(
        &self,
        history: impl Iterator<Item = &'a StampedSample>,
    ) -> Vec<StampedSample> {
        history
            .filter(|s| s.seq > self.queued_through)
            .cloned()
            .collect()
    }

    /// Next mission starts counting from scratch.
    pub fn rewind(&mut self) {
        self.queued_through = 0;
    }

    /// Hands a batch to the writer without waiting on the database. A full
    /// queue leaves the cursor alone so the batch is offered again later.
    pub fn queue(&mut self, mission_started_at_ms: Option<u64>, batch: Vec<StampedSample>) -> bool {
        let Some(last) = batch.last().map(|s| s.seq) else {
            return true;
        };
        match self.tx.try_send(WriterMsg::Save {
            mission_started_at_ms,
            batch,
        }) {
            Ok(()) => {
                self.queued_through = self.queued_through.max(last);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("telemetry writer busy, batch deferred");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!("telemetry writer stopped");
                false
            }
        }
    }

    /// Waits until everything queued so far has been written.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriterMsg::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Drains the queue and stops the writer.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            tracing::error!("telemetry writer failed: {e}");
        }
    }
}

async fn run_writer(db: SqlitePool, mut rx: mpsc::Receiver<WriterMsg>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            WriterMsg::Save {
                mission_started_at_ms,
                batch,
            } => match save_batch(&db, mission_started_at_ms, &batch).await {
                Ok(n) => tracing::debug!("saved {n} samples"),
                Err(e) => tracing::error!("Failed to save telemetry: {e:#}"),
            },
            WriterMsg::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

pub async fn insert_alert(db: &SqlitePool, entry: &LogEntry) -> Result<(), sqlx::Error> {
    insert_with_retry(|| {
        sqlx::query(
            r#"
            INSERT INTO alerts (timestamp_ms, severity, message)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(entry.timestamp_ms as i64)
        .bind(entry.level.as_str())
        .bind(entry.message.as_str())
        .execute(db)
    })
    .await
    .map(|_| ())
}
