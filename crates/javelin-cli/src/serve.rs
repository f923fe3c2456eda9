//! Serve command implementation for Javelin CLI.
//!
//! Speaks the kernel protocol as JSON lines: one [`ClientMessage`] per stdin
//! line, one [`KernelMessage`] per stdout line. Interrupts are handled as
//! soon as they are read, even while a cell runs.

use std::path::Path;
use std::sync::Arc;

use javelin_core::{
    ClientMessage, InterruptHandle, KernelConfig, KernelMessage, Resolver, Session, SessionDirs,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Serve one session until `shutdown` or end of input.
pub async fn execute(work_dir: &Path, config: &KernelConfig) -> anyhow::Result<()> {
    let resolver = Arc::new(Resolver::new(config)?);
    let dirs = SessionDirs::scratch(work_dir)?;
    let mut session = Session::start(config, resolver, dirs).await?;

    let mut stdout = tokio::io::stdout();
    send(
        &mut stdout,
        &KernelMessage::Ready {
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    )
    .await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(read_requests(session.interrupt_handle(), tx));

    while let Some(request) = rx.recv().await {
        match request {
            Ok(ClientMessage::Execute { cell }) => {
                debug!("Executing cell {}", cell.index);
                let output = session.execute(&cell).await;
                send(&mut stdout, &KernelMessage::Output(output)).await?;
            }
            Ok(ClientMessage::Shutdown) => break,
            // Handled by the reader.
            Ok(ClientMessage::Interrupt) => {}
            Err(message) => send(&mut stdout, &KernelMessage::Error { message }).await?,
        }
    }

    info!("Shutting down");
    reader.abort();
    session.shutdown().await?;
    Ok(())
}

/// Forward requests from stdin, acting on interrupts directly.
async fn read_requests(
    interrupt: InterruptHandle,
    tx: mpsc::UnboundedSender<Result<ClientMessage, String>>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request = serde_json::from_str::<ClientMessage>(&line)
            .map_err(|e| format!("invalid request: {e}"));
        if matches!(request, Ok(ClientMessage::Interrupt)) {
            interrupt.interrupt();
            continue;
        }
        if tx.send(request).is_err() {
            break;
        }
    }
    Ok(())
}

async fn send(stdout: &mut tokio::io::Stdout, message: &KernelMessage) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
