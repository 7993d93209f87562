use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "treesync")]
#[command(about = "Move directory trees between hosts by tunnelling rsync over a single stream")]
#[command(after_help = "Run '<command> --help' for detailed options on each command.")]
pub struct Cli {
    /// Configuration file (TOML). Defaults to /etc/treesync/config.toml when present.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// rsync executable to drive (overrides config file)
    #[arg(long, global = true, value_name = "PATH")]
    pub rsync: Option<PathBuf>,
    /// Verbose logging and rsync output
    #[arg(long, global = true)]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mirror a local directory onto another local directory
    Copy(CopyArgs),
    /// Send a directory to a peer running `treesync recv`
    Send(SendArgs),
    /// Receive a directory from a peer running `treesync send`
    Recv(RecvArgs),
    /// Show the installed rsync version
    Version(VersionArgs),
    /// Splice stdin/stdout onto a rendezvous socket (used by rsync as its remote shell)
    #[command(hide = true)]
    Netcat(NetcatArgs),
}

#[derive(Args, Clone, Debug)]
pub struct CopyArgs {
    /// Source directory
    pub source: PathBuf,
    /// Destination directory (created when missing)
    pub destination: PathBuf,
    /// Bandwidth cap passed to rsync --bwlimit
    #[arg(long)]
    pub bwlimit: Option<String>,
    /// Preserve extended attributes (security labels excluded)
    #[arg(long)]
    pub xattrs: bool,
    /// Extra arguments appended to the rsync command line
    #[arg(last = true)]
    pub extra: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct SendArgs {
    /// Peer address (host:port) where `treesync recv` is listening
    pub address: String,
    /// Directory whose contents are sent
    pub path: PathBuf,
    /// Logical name of the transfer (defaults to the directory name)
    #[arg(long)]
    pub name: Option<String>,
    /// Transfer feature to enable (xattrs, delete, compress); repeatable
    #[arg(long = "feature", value_name = "FEATURE")]
    pub features: Vec<String>,
    /// Bandwidth cap passed to rsync --bwlimit
    #[arg(long)]
    pub bwlimit: Option<String>,
    /// Show a byte counter while sending
    #[arg(long)]
    pub progress: bool,
    /// Extra arguments appended to the rsync command line
    #[arg(last = true)]
    pub extra: Vec<String>,
}

#[derive(Args, Clone, Debug)]
pub struct RecvArgs {
    /// Directory the tree is written into
    pub path: PathBuf,
    /// Address to accept the single sender connection on
    #[arg(long, value_name = "ADDR")]
    pub listen: String,
    /// Transfer feature to enable (xattrs, delete, compress); repeatable
    #[arg(long = "feature", value_name = "FEATURE")]
    pub features: Vec<String>,
    /// Show a byte counter while receiving
    #[arg(long)]
    pub progress: bool,
}

#[derive(Args, Clone, Debug)]
pub struct VersionArgs {
    /// Exit non-zero unless rsync is at least this version
    #[arg(long, value_name = "VERSION")]
    pub at_least: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct NetcatArgs {
    /// Rendezvous endpoint (leading '@' for the abstract namespace)
    pub endpoint: String,
    /// Logical name of the transfer
    pub name: String,
    /// Arguments rsync appends for the remote host; ignored
    #[arg(last = true)]
    pub rest: Vec<String>,
}
