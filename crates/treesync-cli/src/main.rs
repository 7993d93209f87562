mod cli;
mod monitor;
mod runtime;
mod transfers;

use clap::Parser;
use cli::{Cli, Commands, NetcatArgs, VersionArgs};
use eyre::{bail, Context, Result};
use runtime::{load_runtime, Runtime};
use treesync_core::version::{probe_version, DottedVersion};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.debug);

    // rsync spawns the helper with its own arguments; keep it independent of
    // the config file.
    if let Commands::Netcat(args) = &cli.command {
        let code = match run_netcat(args).await {
            Ok(()) => 0,
            Err(err) => {
                eprintln!("Error: {err:?}");
                1
            }
        };
        // A stdin read still parked on the blocking pool would otherwise hold
        // the runtime open after the endpoint has closed.
        std::process::exit(code);
    }

    let runtime = load_runtime(&cli)?;
    for warning in &runtime.warnings {
        log::warn!("{warning}");
    }

    match &cli.command {
        Commands::Copy(args) => transfers::run_copy(&runtime, args).await,
        Commands::Send(args) => transfers::run_send(&runtime, args).await,
        Commands::Recv(args) => transfers::run_recv(&runtime, args).await,
        Commands::Version(args) => run_version(&runtime, args).await,
        Commands::Netcat(_) => Ok(()),
    }
}

fn init_logging(debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // Tests may initialise twice in one process.
    let _ = builder.try_init();
}

#[cfg(unix)]
async fn run_netcat(args: &NetcatArgs) -> Result<()> {
    treesync_core::helper::netcat(
        &args.endpoint,
        &args.name,
        tokio::io::stdin(),
        tokio::io::stdout(),
    )
    .await
    .wrap_err_with(|| format!("netcat {} via {}", args.name, args.endpoint))
}

#[cfg(not(unix))]
async fn run_netcat(_args: &NetcatArgs) -> Result<()> {
    bail!("netcat requires unix domain sockets")
}

async fn run_version(runtime: &Runtime, args: &VersionArgs) -> Result<()> {
    let version = probe_version(&runtime.transfer)
        .await
        .wrap_err("probing rsync version")?;
    println!("rsync {version}");

    if let Some(min) = &args.at_least {
        let required: DottedVersion = min
            .parse()
            .wrap_err_with(|| format!("invalid version requirement '{min}'"))?;
        if version < required {
            bail!("rsync {version} is older than required {required}");
        }
    }
    Ok(())
}
