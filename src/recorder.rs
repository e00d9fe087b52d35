// ===============================
// src/recorder.rs
// ===============================
//
// JSONL journal:
// - Tulis setiap Event (tick, bar, keputusan, order, event venue, note) ke file .jsonl (append).
// - BufWriter, flush periodik tiap 1s dan/atau tiap 1000 event.
// - Parent directory dibuat otomatis.
// - Tulis gagal -> reopen sekali, kalau tetap gagal event di-drop.
//
// ENV: `RECORD_FILE=/path/to/events.jsonl` (lihat config.rs).
//
use std::path::Path;
use thiserror::Error;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::Event;

const FLUSH_EVERY_N_EVENTS: u32 = 1000;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("recorder: cannot open {path}: {source}")]
    Open { path: String, source: std::io::Error },
    #[error("recorder: write failed: {0}")]
    Write(#[from] std::io::Error),
    #[error("recorder: serialize failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub async fn open_writer(path: &str) -> Result<BufWriter<File>, RecorderError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(?e, %path, "recorder: create_dir_all failed");
            }
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| RecorderError::Open { path: path.to_string(), source })?;
    Ok(BufWriter::new(file))
}

async fn write_line(writer: &mut BufWriter<File>, ev: &Event) -> Result<(), RecorderError> {
    let mut line = serde_json::to_vec(ev)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}

/// Runs until every sender is dropped. A journal that cannot be opened is logged and skipped.
pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    let mut writer = match open_writer(&path).await {
        Ok(w) => w,
        Err(e) => {
            error!(error = %e, "recorder: disabled");
            return;
        }
    };
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    let _ = writer.flush().await;
                    info!("recorder: channel closed, stopped");
                    break;
                };
                match write_line(&mut writer, &ev).await {
                    Ok(()) => {}
                    Err(RecorderError::Serialize(e)) => {
                        error!(?e, "recorder: serialize error, skip event");
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "recorder: attempting reopen");
                        match open_writer(&path).await {
                            Ok(w) => writer = w,
                            Err(e2) => {
                                error!(error = %e2, "recorder: reopen failed, stopped");
                                break;
                            }
                        }
                        if let Err(e2) = write_line(&mut writer, &ev).await {
                            error!(error = %e2, "recorder: write failed again after reopen, drop event");
                            continue;
                        }
                    }
                }

                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                    let _ = writer.flush().await;
                    since_last_flush = 0;
                }
            }

            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_written_as_jsonl() {
        let dir = std::env::temp_dir().join(format!("cross_bot_rec_{}", std::process::id()));
        let path = dir.join("events.jsonl");
        let path_str = path.to_string_lossy().to_string();
        let _ = std::fs::remove_file(&path);

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run(rx, path_str));
        tx.send(Event::Note("hello".into())).await.unwrap();
        tx.send(Event::Note("world".into())).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Event = serde_json::from_str(lines[0]).unwrap();
        assert!(matches!(first, Event::Note(ref s) if s == "hello"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
