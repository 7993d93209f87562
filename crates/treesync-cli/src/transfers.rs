use crate::cli::{CopyArgs, RecvArgs, SendArgs};
use crate::monitor::{format_bytes, spawn_progress_monitor};
use crate::runtime::Runtime;
use eyre::{bail, Context, Result};
use std::path::Path;
use std::time::Instant;
use tokio::task::JoinHandle;
use treesync_core::local_copy;

pub(crate) async fn run_copy(runtime: &Runtime, args: &CopyArgs) -> Result<()> {
    if !args.source.is_dir() {
        bail!("source directory does not exist: {}", args.source.display());
    }

    let bwlimit = runtime.bwlimit_with(args.bwlimit.as_ref());
    let start = Instant::now();
    let output = local_copy(
        &runtime.transfer,
        &args.source,
        &args.destination,
        &bwlimit,
        args.xattrs,
        &args.extra,
    )
    .await
    .wrap_err_with(|| {
        format!(
            "failed to copy {} to {}",
            args.source.display(),
            args.destination.display()
        )
    })?;

    if runtime.transfer.debug && !output.trim().is_empty() {
        eprintln!("{}", output.trim_end());
    }
    println!(
        "Copied {} -> {} in {:.2?}",
        args.source.display(),
        args.destination.display(),
        start.elapsed()
    );
    Ok(())
}

async fn finish_monitor(task: Option<JoinHandle<()>>) {
    if let Some(task) = task {
        if let Err(err) = task.await {
            log::debug!("progress monitor: {err}");
        }
    }
}

fn default_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "transfer".to_string())
}

#[cfg(unix)]
pub(crate) async fn run_send(runtime: &Runtime, args: &SendArgs) -> Result<()> {
    use tokio::net::TcpStream;
    use treesync_core::{send, SendRequest};

    if !args.path.is_dir() {
        bail!("source directory does not exist: {}", args.path.display());
    }

    let helper = std::env::current_exe().wrap_err("locating treesync executable")?;
    let name = args.name.clone().unwrap_or_else(|| default_name(&args.path));

    let stream = TcpStream::connect(&args.address)
        .await
        .wrap_err_with(|| format!("connecting to {}", args.address))?;
    if let Err(err) = stream.set_nodelay(true) {
        log::debug!("set_nodelay: {err}");
    }

    let (progress, monitor) = spawn_progress_monitor(args.progress, format!("send {name}"));
    let mut request = SendRequest::new(name.clone(), &args.path, helper)
        .with_features(runtime.features_with(&args.features))
        .with_bwlimit(runtime.bwlimit_with(args.bwlimit.as_ref()))
        .with_extra_args(args.extra.clone());
    if let Some(progress) = progress {
        request = request.with_progress(progress);
    }

    let start = Instant::now();
    let outcome = send(&runtime.transfer, request, stream).await;
    finish_monitor(monitor).await;
    let stats = outcome.wrap_err_with(|| format!("sending {} to {}", name, args.address))?;

    println!(
        "Sent {} to {}: {} out, {} in, {:.2?}",
        args.path.display(),
        args.address,
        format_bytes(stats.bytes_sent),
        format_bytes(stats.bytes_received),
        start.elapsed()
    );
    Ok(())
}

#[cfg(unix)]
pub(crate) async fn run_recv(runtime: &Runtime, args: &RecvArgs) -> Result<()> {
    use tokio::net::TcpListener;
    use treesync_core::{recv, RecvRequest};

    let listener = TcpListener::bind(&args.listen)
        .await
        .wrap_err_with(|| format!("binding {}", args.listen))?;
    let local = listener
        .local_addr()
        .wrap_err("resolving listen address")?;
    // Scripts wait for this line before starting the sender.
    println!("listening on {local}");

    let (stream, peer) = listener
        .accept()
        .await
        .wrap_err_with(|| format!("accepting on {local}"))?;
    drop(listener);
    log::debug!("accepted sender {peer}");
    if let Err(err) = stream.set_nodelay(true) {
        log::debug!("set_nodelay: {err}");
    }

    let (progress, monitor) = spawn_progress_monitor(
        args.progress,
        format!("recv {}", args.path.display()),
    );
    let mut request =
        RecvRequest::new(&args.path).with_features(runtime.features_with(&args.features));
    if let Some(progress) = progress {
        request = request.with_progress(progress);
    }

    let start = Instant::now();
    let outcome = recv(&runtime.transfer, request, stream).await;
    finish_monitor(monitor).await;
    let stats = outcome
        .wrap_err_with(|| format!("receiving into {} from {peer}", args.path.display()))?;

    println!(
        "Received into {} from {}: {} in, {} out, {:.2?}",
        args.path.display(),
        peer,
        format_bytes(stats.bytes_received),
        format_bytes(stats.bytes_sent),
        start.elapsed()
    );
    Ok(())
}

#[cfg(not(unix))]
pub(crate) async fn run_send(_runtime: &Runtime, _args: &SendArgs) -> Result<()> {
    bail!("send requires unix domain sockets")
}

#[cfg(not(unix))]
pub(crate) async fn run_recv(_runtime: &Runtime, _args: &RecvArgs) -> Result<()> {
    bail!("recv requires unix domain sockets")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn transfer_name_defaults_to_directory() {
        assert_eq!(default_name(Path::new("/var/lib/c1/rootfs")), "rootfs");
        assert_eq!(default_name(Path::new("/var/lib/c1/rootfs/")), "rootfs");
        assert_eq!(default_name(&PathBuf::from("/")), "transfer");
    }
}
