use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use riptide::client::TorrentClient;
use riptide::constants::DEFAULT_PORT;

/// A BitTorrent download client.
#[derive(Parser)]
#[command(name = "riptide", version, about)]
struct Args {
    /// Path to the .torrent file
    torrent_file: PathBuf,

    /// Directory the downloaded files are placed in
    #[arg(short = 'o', long, default_value = ".")]
    output_dir: PathBuf,

    /// Port advertised to trackers
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Enable logging
    #[arg(short = 'l', long)]
    logging: bool,

    /// Path to the log file
    #[arg(long, default_value = "./log.txt")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.logging {
        let file = std::fs::File::create(&args.log_file)
            .with_context(|| format!("failed to create log file {}", args.log_file.display()))?;

        tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    let client = TorrentClient::new(&args.torrent_file, &args.output_dir, args.port)
        .context("failed to load torrent")?;

    client.start_download().await.context("download failed")?;

    println!("{} downloaded", client.name());
    Ok(())
}
