use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use beat_blob::memory::{MemoryFetcher, MemoryObjectStore};
use beat_blob::{MediaMetadata, UploadEvent, UploadOutcome, UploadSource};
use beat_client::{init_tracing, Backends, BeatClient, ClientConfig};
use beat_core::memory::{
    MemoryConnectivity, MemoryDocumentStore, MemoryIdentitySource, MemoryMediaCatalog,
};
use beat_core::{Connectivity, Identity};
use futures::StreamExt;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ClientConfig::from_env();
    init_tracing();

    let identities = MemoryIdentitySource::new();
    let documents = MemoryDocumentStore::new();
    let connectivity = MemoryConnectivity::new();
    let objects = MemoryObjectStore::new()
        .with_chunk_size(64 * 1024)
        .with_chunk_delay(Duration::from_millis(5));

    let debounce = config.monitor.debounce;
    let client = BeatClient::start(
        Backends {
            identity: Arc::new(identities.clone()),
            documents: Arc::new(documents.clone()),
            catalog: Arc::new(MemoryMediaCatalog::new()),
            objects: Arc::new(objects),
            fetcher: Arc::new(MemoryFetcher::new()),
            connectivity: Arc::new(connectivity.clone()),
        },
        config,
    );

    identities.sign_in(
        Identity::new("demo-producer")
            .with_display_name("Demo Producer")
            .with_email("demo@beats.local"),
    );
    let snapshot = client.session().wait_until_resolved().await;
    println!("[beat-demo] session {}", snapshot.state.name());

    let source = UploadSource::new("Night Drive (v2).wav", vec![7u8; 512 * 1024])
        .with_content_type("audio/wav");
    let metadata = MediaMetadata::new("Night Drive", 88, "F# minor", "Synthwave");
    let mut task = client.upload(source, metadata)?;

    let mut events = task.events();
    while let Some(event) = events.next().await {
        match event {
            UploadEvent::Progress(progress) => {
                println!("[beat-demo] upload {:.0}%", progress.percent());
            }
            UploadEvent::Succeeded(receipt) => println!("[beat-demo] stored at {}", receipt.path),
            UploadEvent::Failed(error) => println!("[beat-demo] failed: {}", error.user_message()),
            UploadEvent::Canceled => println!("[beat-demo] canceled"),
        }
    }

    let receipt = match task.wait().await {
        UploadOutcome::Succeeded { receipt, bookkeeping, .. } => {
            println!("[beat-demo] bookkeeping synchronized: {}", bookkeeping.is_synchronized());
            receipt
        }
        UploadOutcome::Failed(error) => return Err(anyhow!(error.user_message())),
        UploadOutcome::Canceled => return Err(anyhow!("upload canceled")),
    };

    let handle = client.cache().acquire(&receipt.url).await?;
    println!("[beat-demo] playing {} ({} bytes)", handle.url(), handle.size_bytes());
    client.cache().release(&receipt.url);

    let media = client.my_media().await?;
    println!("[beat-demo] {} track(s) in catalog", media.len());
    if let Some(profile) = client.session().profile() {
        println!("[beat-demo] profile media count {}", profile.media_count);
    }

    connectivity.emit(Connectivity::Offline);
    tokio::time::sleep(debounce * 2).await;
    println!("[beat-demo] offline: {}", client.is_offline());

    connectivity.emit(Connectivity::Online);
    tokio::time::sleep(debounce * 2).await;
    println!("[beat-demo] offline: {}", client.is_offline());

    client.shutdown().await?;
    Ok(())
}
