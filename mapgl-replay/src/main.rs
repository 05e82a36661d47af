use std::{thread, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use mapgl::{
    input::events::ChannelHost,
    proxy::session::{run_session, SessionInput},
    MapWidget, MemoryEngine, RenderBundle,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::mpsc,
};

const USAGE: &str = "usage: mapgl-replay <bundle.json> [messages.jsonl]

Renders the bundle on an in-memory map, applies one JSON message per line
(stdin when no file is given) and prints every host event as a JSON line.";

/// Replays a widget session without a browser
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = std::env::args().skip(1);
    let Some(bundle_path) = args.next() else {
        bail!(USAGE);
    };
    let messages_path = args.next();

    let text = tokio::fs::read_to_string(&bundle_path)
        .await
        .with_context(|| format!("reading {}", bundle_path))?;
    let bundle = RenderBundle::from_json(&text).with_context(|| format!("parsing {}", bundle_path))?;

    let (host, events) = ChannelHost::unbounded();
    let printer = thread::spawn(move || {
        let mut printed = 0usize;
        for event in events.iter() {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => log::warn!("could not print '{}': {}", event.name, e),
            }
            printed += 1;
        }
        printed
    });

    let (sender, inbox) = mpsc::channel(64);
    let feeder = tokio::spawn(feed(bundle, messages_path, sender));

    let mut widget = MapWidget::new("map", MemoryEngine::new(), host);
    let stats = run_session(&mut widget, inbox, Duration::from_millis(10)).await;
    feeder.await??;

    // dropping the widget closes the host channel
    drop(widget);
    let printed = printer.join().map_err(|_| anyhow!("event printer panicked"))?;
    log::info!(
        "replayed {} messages, {} engine events, {} host events",
        stats.messages,
        stats.events,
        printed
    );
    if stats.failed > 0 {
        bail!("{} of {} messages failed", stats.failed, stats.messages);
    }
    Ok(())
}

async fn feed(bundle: RenderBundle, path: Option<String>, sender: mpsc::Sender<SessionInput>) -> Result<()> {
    sender
        .send(SessionInput::Render(bundle))
        .await
        .context("session ended before render")?;
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("opening {}", path))?;
            send_lines(BufReader::new(file), &sender).await?;
        }
        None => send_lines(BufReader::new(tokio::io::stdin()), &sender).await?,
    }
    sender
        .send(SessionInput::Close)
        .await
        .context("session ended early")?;
    Ok(())
}

/// One message per line; blank lines and `#` comments are skipped
async fn send_lines<R: AsyncBufRead + Unpin>(reader: R, sender: &mpsc::Sender<SessionInput>) -> Result<()> {
    let mut lines = reader.lines();
    let mut number = 0usize;
    while let Some(line) = lines.next_line().await? {
        number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let message = serde_json::from_str(line).with_context(|| format!("line {} is not JSON", number))?;
        sender
            .send(SessionInput::Message(message))
            .await
            .context("session ended early")?;
    }
    Ok(())
}
