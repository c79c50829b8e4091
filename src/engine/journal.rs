use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::wal::Wal;

use super::EngineError;

/// Durable sink for ledger events. An event must be accepted here before the
/// engine applies it in memory.
#[async_trait]
pub trait Journal: Send + Sync {
    async fn append(&self, event: &Event) -> Result<(), EngineError>;

    /// Replace the log with `events`, a snapshot of the current state.
    async fn compact(&self, events: Vec<Event>) -> Result<(), EngineError>;

    async fn appends_since_compact(&self) -> u64;
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// [`Journal`] backed by a [`Wal`] owned by a background group-commit task.
pub struct WalJournal {
    tx: mpsc::Sender<WalCommand>,
}

impl WalJournal {
    /// Open the WAL and spawn its writer. Returns the journal and the events
    /// already on disk, which the caller replays.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (wal, history) = Wal::recover(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, rx));
        Ok((Self { tx }, history))
    }

    async fn request<T>(
        &self,
        cmd: WalCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, EngineError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| EngineError::Journal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Journal("WAL writer dropped response".into()))
    }
}

#[async_trait]
impl Journal for WalJournal {
    async fn append(&self, event: &Event) -> Result<(), EngineError> {
        let (response, rx) = oneshot::channel();
        let cmd = WalCommand::Append {
            event: event.clone(),
            response,
        };
        self.request(cmd, rx)
            .await?
            .map_err(|e| EngineError::Journal(e.to_string()))
    }

    async fn compact(&self, events: Vec<Event>) -> Result<(), EngineError> {
        let (response, rx) = oneshot::channel();
        self.request(WalCommand::Compact { events, response }, rx)
            .await?
            .map_err(|e| EngineError::Journal(e.to_string()))
    }

    async fn appends_since_compact(&self) -> u64 {
        let (response, rx) = oneshot::channel();
        self.request(WalCommand::AppendsSinceCompact { response }, rx)
            .await
            .unwrap_or(0)
    }
}

/// Owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued (the batch window).
/// 3. One flush_sync for the whole batch, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!("WAL flush of {} events failed: {e}", batch.len());
        }
        respond_batch(batch, &result);

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let append_result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Always flush so partially buffered bytes don't leak into the next batch.
    let flush_result = wal.flush_sync();
    append_result.and(flush_result)
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Account;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("timebarter_test_journal");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn appends_are_durable_and_counted() {
        let path = tmp_path("durable.wal");
        let (journal, history) = WalJournal::open(&path).unwrap();
        assert!(history.is_empty());

        let event = Event::AccountRegistered(Account::new(Ulid::new(), "Ada".into(), 2, 0));
        journal.append(&event).await.unwrap();
        journal.append(&event).await.unwrap();
        assert_eq!(journal.appends_since_compact().await, 2);

        assert_eq!(Wal::replay(&path).unwrap(), vec![event.clone(), event]);
    }

    #[tokio::test]
    async fn concurrent_appends_all_land() {
        let path = tmp_path("concurrent.wal");
        let (journal, _) = WalJournal::open(&path).unwrap();
        let journal = std::sync::Arc::new(journal);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let j = journal.clone();
            handles.push(tokio::spawn(async move {
                let event = Event::AccountRegistered(Account::new(Ulid::new(), "x".into(), 2, 0));
                j.append(&event).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap().len(), 32);
    }

    #[tokio::test]
    async fn compact_resets_counter() {
        let path = tmp_path("compact_counter.wal");
        let (journal, _) = WalJournal::open(&path).unwrap();
        let event = Event::AccountRegistered(Account::new(Ulid::new(), "Ada".into(), 2, 0));
        for _ in 0..3 {
            journal.append(&event).await.unwrap();
        }

        journal.compact(vec![event.clone()]).await.unwrap();

        assert_eq!(journal.appends_since_compact().await, 0);
        assert_eq!(Wal::replay(&path).unwrap(), vec![event]);
    }
}
