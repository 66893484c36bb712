mod chat;
mod ephemeral;
mod interp;
mod network;
mod presence;
mod scene;
mod voice;

use clap::Parser;
use log::info;
use scene::{FixedPose, LogChatSink, LogScene};
use voice::LoggingVoiceTransport;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name to log in with (must be unique on the server)
    #[arg(short = 'n', long)]
    name: String,

    /// Voice address to announce once logged in
    #[arg(long)]
    voice_addr: Option<String>,

    /// Local speaker gain, 0.0 to 1.0
    #[arg(long, default_value = "1.0")]
    volume: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let mut client = network::Client::new(
        &args.server,
        &args.name,
        Box::new(LogScene),
        Box::new(FixedPose::default()),
        Box::new(LogChatSink),
        Box::new(LoggingVoiceTransport::new(args.voice_addr)),
    )
    .await?;
    client.set_speaker_volume(args.volume);

    client.run().await?;

    Ok(())
}
