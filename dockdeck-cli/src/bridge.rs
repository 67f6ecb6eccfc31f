use anyhow::Context;
use dockdeck_actions::{Dispatcher, HostCommand, HostEvent};
use dockdeck_core::Engine;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc::{unbounded_channel, UnboundedReceiver},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Serve the host bridge until `input` closes or `shutdown` fires.
///
/// Each input line is one [`HostEvent`]; each output line one
/// [`HostCommand`]. Lines that do not parse are logged and skipped. Key and
/// dial presses run concurrently; on shutdown the ones still running are
/// cancelled, while a closed input lets them finish first.
pub async fn run<R, W>(
    engine: Engine,
    input: R,
    output: W,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = unbounded_channel();
    let writer = tokio::spawn(write_commands(rx, output));
    let mut dispatcher = Dispatcher::with_channel(engine, tx);
    let mut lines = BufReader::new(input).lines();

    info!("Host bridge ready");
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line.context("failed reading host events")?,
        };
        let Some(line) = line else {
            info!("Host closed the event stream");
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<HostEvent>(line) {
            Ok(event) => tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = dispatcher.handle(event) => {}
            },
            Err(e) => warn!(error = %e, line, "Ignoring malformed host event"),
        }
    }

    let finished = !shutdown.is_cancelled()
        && tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = dispatcher.finish_inputs() => true,
        };
    if !finished {
        debug!(pending = dispatcher.pending_inputs(), "Cancelling running inputs");
        dispatcher.abort_inputs();
    }

    dispatcher.clear().await;
    // Dropping the dispatcher closes the channel so the writer drains and ends.
    drop(dispatcher);
    writer.await.context("host writer task failed")??;

    info!("Host bridge stopped");
    Ok(())
}

async fn write_commands<W>(mut rx: UnboundedReceiver<HostCommand>, mut output: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = rx.recv().await {
        let mut line = serde_json::to_vec(&command).context("failed encoding host command")?;
        line.push(b'\n');
        output
            .write_all(&line)
            .await
            .context("failed writing host command")?;
        output.flush().await.context("failed flushing host output")?;
    }
    debug!("Host command channel closed");
    Ok(())
}
