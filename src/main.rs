use peer_mesh::{Node, NodeConfig, NodeEvents, Peer};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --port <port> [--bind <addr>] [--entry <addr:port>] [--routable]",
            args[0]
        );
        eprintln!("Example: {} --port 5000", args[0]);
        eprintln!("Example: {} --port 5001 --entry 127.0.0.1:5000", args[0]);

        std::process::exit(1);
    }

    let mut port: Option<u16> = None;
    let mut bind: Option<String> = None;
    let mut entry: Option<Peer> = None;
    let mut routable = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("--port needs a value"))?;
                port = Some(value.parse()?);
                i += 2;
            }
            "--bind" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("--bind needs a value"))?;
                bind = Some(value.clone());
                i += 2;
            }
            "--entry" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("--entry needs a value"))?;
                entry = Some(Peer::parse(value)?);
                i += 2;
            }
            "--routable" => {
                routable = true;
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }

    let port = port.ok_or_else(|| anyhow::anyhow!("--port is required"))?;
    let local = match bind {
        Some(address) => Peer::new(address, port)?,
        None => Peer::resolve_self(port, routable)?,
    };

    tracing::info!("Starting node on {}", local);

    // 1. Node (HTTP server + control task):
    let (node, events) = Node::start(local, NodeConfig::default()).await?;
    let NodeEvents {
        mut inbox,
        mut errors,
    } = events;

    // 2. Join the mesh:
    match entry {
        Some(entry) => {
            tracing::info!("Joining through {}", entry);
            node.connect(entry).await?;
            tracing::info!("Connected, {} member(s)", node.members().len());
        }
        None => tracing::info!("Starting as entry point, waiting for peers"),
    }

    // 3. Print everything received:
    tokio::spawn(async move {
        while let Some(message) = inbox.recv().await {
            println!("{}", message);
        }
    });

    tokio::spawn(async move {
        while let Some(error) = errors.recv().await {
            eprintln!("! {}", error);
        }
    });

    // 4. Broadcast stdin lines until EOF or Ctrl+C:
    tracing::info!("Type a line to broadcast it, Ctrl+C to leave");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Err(e) = node.broadcast(line).await {
                        eprintln!("! {}", e);
                    }
                }
                None => break,
            },
        }
    }

    node.shutdown().await?;

    Ok(())
}
