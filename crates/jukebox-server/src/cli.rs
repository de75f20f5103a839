use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "jukebox-server", version = VERSION)]
pub struct Args {
    /// Optional server config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Control protocol bind address, e.g. 127.0.0.1:7878
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Access credential clients must present with AUTH
    #[arg(long, env = "JUKEBOX_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Directory receiving raw PCM per group (audio is discarded when unset)
    #[arg(long)]
    pub sink_dir: Option<PathBuf>,
}
