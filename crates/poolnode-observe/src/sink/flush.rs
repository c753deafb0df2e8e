use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use super::{SinkAuth, SinkConfig};

/// Collects entries until the batch is full or the flush interval elapses, then posts them.
///
/// Runs until every sender is dropped, flushing what is left. Never logs through `tracing`:
/// its own events would be fed back into the queue.
pub(super) async fn run(cfg: SinkConfig, mut entries: mpsc::UnboundedReceiver<Value>) {
    let client = reqwest::Client::new();
    let url = cfg.url();
    let batch_size = cfg.batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);

    let mut ticker = time::interval(cfg.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            entry = entries.recv() => match entry {
                Some(entry) => {
                    batch.push(entry);
                    if batch.len() < batch_size {
                        continue;
                    }
                }
                None => {
                    post(&client, &url, &cfg.auth, std::mem::take(&mut batch)).await;
                    return;
                }
            },
            _ = ticker.tick() => {
                if batch.is_empty() {
                    continue;
                }
            }
        }
        post(&client, &url, &cfg.auth, std::mem::take(&mut batch)).await;
    }
}

async fn post(client: &reqwest::Client, url: &str, auth: &SinkAuth, batch: Vec<Value>) {
    if batch.is_empty() {
        return;
    }
    let request = client.post(url).json(&batch);
    let request = match auth {
        SinkAuth::None => request,
        SinkAuth::Encoded(encoded) => request.header("Authorization", format!("Basic {encoded}")),
        SinkAuth::Credentials { username, password } => request.basic_auth(username, Some(password)),
    };
    match request.send().await {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => eprintln!(
            "remote log sink: flush of {} entries rejected with {}",
            batch.len(),
            response.status()
        ),
        Err(e) => eprintln!("remote log sink: flush of {} entries failed: {e}", batch.len()),
    }
}
