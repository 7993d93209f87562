//! Same-host mirror of one directory onto another.

use std::ffi::OsString;
use std::path::Path;

use crate::config::TransferConfig;
use crate::errors::{Result, TransferError, RSYNC_EXIT_VANISHED};
use crate::features;
use crate::process::{apply_wrapper, run_captured, Invocation};

/// Append a trailing separator so rsync copies the directory contents rather
/// than the directory itself. The path bytes are passed through untouched.
pub fn add_slash(path: &Path) -> OsString {
    let mut raw = path.as_os_str().to_os_string();
    if !raw.as_encoded_bytes().ends_with(b"/") {
        raw.push("/");
    }
    raw
}

async fn ensure_dir(dest: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o755);
    builder
        .create(dest)
        .await
        .map_err(|err| TransferError::io(format!("creating {}", dest.display()), err))
}

/// Mirror `source` onto `dest` on the local host.
///
/// Comparison is checksum based and ownership numeric, so the result does
/// not depend on clocks or user databases. Returns rsync's combined output.
/// Exit status 24 (source files vanished mid-copy) counts as success since
/// live directories are expected to change underneath the copy.
pub async fn local_copy(
    config: &TransferConfig,
    source: &Path,
    dest: &Path,
    bwlimit: &str,
    xattrs: bool,
    extra_args: &[String],
) -> Result<String> {
    ensure_dir(dest).await?;

    let mut invocation = Invocation::new(&config.rsync);
    invocation.args([
        "-a",
        "-HA",
        "--sparse",
        "--devices",
        "--delete",
        "--checksum",
        "--numeric-ids",
    ]);

    if xattrs {
        let filter = features::supports_xattr_filter(config).await;
        invocation.args(features::xattr_args(filter));
    }

    if !bwlimit.is_empty() {
        invocation.args(["--bwlimit", bwlimit]);
    }

    invocation.args(extra_args);

    let source_arg = add_slash(source);
    invocation
        .arg(if config.debug { "-vi" } else { "-q" })
        .arg(&source_arg)
        .arg(dest);

    let source = source_arg.to_string_lossy().into_owned();
    let dest = dest.to_string_lossy().into_owned();
    let _guard = apply_wrapper(config, &mut invocation, &source, &dest)?;
    let output = run_captured(&invocation).await?;
    let diagnostics = output.combined();

    match output.status.code() {
        Some(0) => Ok(diagnostics),
        Some(RSYNC_EXIT_VANISHED) => {
            log::debug!("rsync reported vanished files copying {source} to {dest}");
            Ok(diagnostics)
        }
        code => Err(TransferError::ProcessExit {
            program: invocation.program_name(),
            code,
            diagnostics,
        }),
    }
}
