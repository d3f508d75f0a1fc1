use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::extractors::ByteStream;

use super::job::PipelineEvent;

/// Move downloaded chunks into `data_tx`, reporting progress and the end of
/// the stream on `events`. `send` suspends while the channel is full, so the
/// consumer's pace bounds how far the download runs ahead.
pub async fn pump_download(
    mut stream: ByteStream,
    data_tx: mpsc::Sender<Bytes>,
    events: mpsc::UnboundedSender<PipelineEvent>,
) {
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                let len = chunk.len();
                if data_tx.send(chunk).await.is_err() {
                    // Consumer is gone; whatever stopped it reports the outcome.
                    tracing::debug!("Consumer closed, stopping download");
                    return;
                }
                let _ = events.send(PipelineEvent::Chunk(len));
            }
            Err(e) => {
                // Report before `data_tx` drops so the failure is seen ahead
                // of anything the consumer does on end-of-input.
                let _ = events.send(PipelineEvent::DownloadFailed(e.to_string()));
                return;
            }
        }
    }

    let _ = events.send(PipelineEvent::DownloadEnded);
}

/// Write every chunk from `data_rx` into `writer`, then shut it down
pub async fn drain_into<W>(mut writer: W, mut data_rx: mpsc::Receiver<Bytes>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = data_rx.recv().await {
        writer.write_all(&chunk).await?;
    }
    writer.flush().await?;
    writer.shutdown().await
}

/// Feed the encoder's stdin; dropping it on return signals end of input
pub async fn feed_encoder<W>(
    stdin: W,
    data_rx: mpsc::Receiver<Bytes>,
    events: mpsc::UnboundedSender<PipelineEvent>,
) where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = drain_into(stdin, data_rx).await {
        let _ = events.send(PipelineEvent::StdinFailed(e));
    }
}

/// Write the download verbatim into the output file and sync it
pub async fn write_file(
    mut file: tokio::fs::File,
    data_rx: mpsc::Receiver<Bytes>,
    events: mpsc::UnboundedSender<PipelineEvent>,
) {
    let result = match drain_into(&mut file, data_rx).await {
        Ok(()) => file.sync_all().await,
        Err(e) => Err(e),
    };

    let _ = match result {
        Ok(()) => events.send(PipelineEvent::CopyFinished),
        Err(e) => events.send(PipelineEvent::CopyFailed(e)),
    };
}
