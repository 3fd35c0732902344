use std::path::PathBuf;

use clap::Parser;
use server::config::Overrides;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Port to listen on, overrides PORT.
    #[arg(long)]
    port: Option<u16>,

    /// JSON snapshot file, overrides DATA_PATH.
    #[arg(long)]
    data: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    server::start_server(Overrides {
        port: args.port,
        data_path: args.data,
    })
    .await?;

    Ok(())
}
