// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use fuser::MountOption;
use godocfs::Workspace;
use godocfs_cli_common as cli;
use godocfs_vfs::{Config, Session};
use tokio::signal::unix::{SignalKind, signal};

#[cfg(test)]
#[path = "./cmd_fuse_test.rs"]
mod cmd_fuse_test;

// The process may daemonize before serving requests, which only
// carries the calling thread into the child. For this reason the
// async runtime is not created until after that point.
fn main() {
    // because this function exits right away it does not
    // properly handle destruction of data, so we put the actual
    // logic into a separate function/scope
    std::process::exit(main2())
}

fn main2() -> i32 {
    let mut opt = CmdFuse::parse();
    if !opt.foreground && !opt.log_foreground {
        // stderr goes away with the terminal once we move into the background
        opt.logging.syslog = true;
    }
    if let Err(err) = opt.logging.configure() {
        eprintln!("{err:#}");
        return 1;
    }

    let config = match godocfs::config::Config::load() {
        Err(err) => {
            tracing::error!(err = ?err, "failed to load config");
            return 1;
        }
        Ok(config) => config,
    };
    let result = opt.run(config);

    godocfs_cli_common::handle_result!(result)
}

/// Mount a read-only view of a source workspace with generated package docs
#[derive(Debug, Parser)]
#[clap(name = "godocfs-fuse", version = godocfs::VERSION)]
pub struct CmdFuse {
    #[clap(flatten)]
    logging: cli::Logging,

    /// Do not daemonize the filesystem, run it in the foreground instead
    #[clap(long, short)]
    foreground: bool,

    /// Do not disconnect the filesystem logs from stderr
    ///
    /// Although the filesystem will still daemonize, the logs will
    /// still appear in the stderr of the calling process/shell
    #[clap(long, short, env = "GODOCFS_FUSE_LOG_FOREGROUND")]
    log_foreground: bool,

    /// Options for the mount in the form opt1,opt2=value
    ///
    /// In addition to all existing fuse mount options, the following custom
    /// options are also supported:
    ///
    ///  uid    - the user id that should own all files in the mount, defaults to
    ///           the effective user id of the caller. Only allowed when running
    ///           as root/sudo.
    ///  gid    - the group id that should own all files in the mount, defaults to
    ///           the effective group id of the caller. Only allowed when running
    ///           as root/sudo.
    #[clap(long, short, value_delimiter = ',')]
    options: Vec<String>,

    /// The workspace to mount, whose src directory becomes the mount root
    ///
    /// Defaults to source.root from the configuration, which is
    /// the first entry of GOPATH unless configured otherwise
    #[clap(long, value_name = "PATH")]
    workspace: Option<PathBuf>,

    /// The location where to mount the filesystem
    mountpoint: PathBuf,
}

impl CmdFuse {
    pub fn run(&mut self, mut config: godocfs::config::Config) -> Result<i32> {
        let calling_uid = nix::unistd::geteuid();
        let calling_gid = nix::unistd::getegid();

        if let Some(root) = self.workspace.take() {
            config.source.root = root;
        }
        let source_root = config.source.source_root();
        if !source_root.is_dir() {
            bail!(
                "Workspace has no source directory to mount: {}",
                source_root.display()
            );
        }

        let mut opts = Config {
            uid: calling_uid,
            gid: calling_gid,
            ttl: config.filesystem.ttl(),
            ..Default::default()
        };
        apply_mount_options(
            &mut opts,
            parse_options_from_args(&self.options),
            calling_uid.is_root(),
        )?;

        tracing::debug!("FUSE Config: {opts:#?}");

        let mountpoint = self
            .mountpoint
            .canonicalize()
            .context("Invalid mount point")?;

        if !calling_uid.is_root() {
            // unprivileged callers must have write access to the directory that
            // they are trying to mount over.
            nix::unistd::access(&mountpoint, nix::unistd::AccessFlags::W_OK)
                .context("Must have write access to mountpoint")?;
        }

        if opts.gid != calling_gid {
            nix::unistd::setgid(opts.gid).context("Failed to set desired group (actual)")?;
            nix::unistd::setegid(opts.gid).context("Failed to set desired group (effective)")?;
        }
        if opts.uid != calling_uid {
            nix::unistd::setuid(opts.uid).context("Failed to become desired user (actual)")?;
            nix::unistd::seteuid(opts.uid).context("Failed to become desired user (effective)")?;
        }

        tracing::info!(
            source = %source_root.display(),
            mountpoint = %mountpoint.display(),
            generator = %config.generator.program,
            "Establishing fuse session..."
        );
        let workspace = Workspace::from_config(&config);
        let mount_opts = opts.mount_options.iter().cloned().collect::<Vec<_>>();
        let mut session =
            fuser::Session::new(Session::new(workspace, opts), &mountpoint, &mount_opts)
                .context("Failed to create a FUSE session")?;

        if !self.foreground {
            tracing::debug!("Moving into background...");
            // We cannot daemonize until the session is established above,
            // otherwise initial use of the filesystem may not show any mount
            // at all.
            nix::unistd::daemon(false, self.log_foreground)
                .context("Failed to move into the background")?;
        }

        // We also cannot go multi-thread until the daemonization process above
        // is complete, otherwise we can end up with deadlocks.
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to establish runtime")?;

        let result = rt.block_on(async move {
            let mut interrupt =
                signal(SignalKind::interrupt()).context("interrupt signal handler")?;
            let mut quit = signal(SignalKind::quit()).context("quit signal handler")?;
            let mut terminate =
                signal(SignalKind::terminate()).context("terminate signal handler")?;

            tracing::info!("Starting FUSE filesystem");
            // the session loop blocks on the fuse device, so it gets its own
            // thread while requests are spawned onto the runtime from there
            let fut = tokio::task::spawn_blocking(move || session.run());
            tokio::select! {
                res = fut => {
                    tracing::info!("Filesystem shutting down");
                    res.context("FUSE session did not complete")
                }
                // we explicitly catch any signal related to interruption
                // and will act by shutting down the filesystem early
                _ = terminate.recv() => Err(anyhow!("Terminate signal received, filesystem shutting down")),
                _ = interrupt.recv() => Err(anyhow!("Interrupt signal received, filesystem shutting down")),
                _ = quit.recv() => Err(anyhow!("Quit signal received, filesystem shutting down")),
            }
        });

        // pending requests may be waiting on a documentation generator
        // that will never be read, so don't wait on them forever
        rt.shutdown_timeout(std::time::Duration::from_secs(2));
        result?.context("FUSE session failed")?;
        Ok(0)
    }
}

/// Merge the user's mount options into the filesystem config.
///
/// Custom `uid=` and `gid=` options are only honored for root callers,
/// and a writable mount is never allowed.
fn apply_mount_options(
    opts: &mut Config,
    options: Vec<MountOption>,
    caller_is_root: bool,
) -> Result<()> {
    for option in options {
        match option {
            MountOption::CUSTOM(opt) => match opt.split_once('=') {
                Some(("uid", num)) if caller_is_root => {
                    opts.uid = num
                        .parse::<u32>()
                        .map(nix::unistd::Uid::from_raw)
                        .with_context(|| format!("Invalid parameter value for uid={num}"))?
                }
                Some(("gid", num)) if caller_is_root => {
                    opts.gid = num
                        .parse::<u32>()
                        .map(nix::unistd::Gid::from_raw)
                        .with_context(|| format!("Invalid parameter value for gid={num}"))?
                }
                Some(("uid", _)) | Some(("gid", _)) => {
                    bail!("Must be root to launch with alternate uid/gid");
                }
                _ => bail!("Unsupported mount option, or missing value: {opt}"),
            },
            MountOption::RW => bail!("rw mode is not supported, the filesystem is read-only"),
            // the required name of the filesystem cannot be replaced
            MountOption::FSName(_) | MountOption::Subtype(_) => {
                tracing::warn!("Ignoring mount option {option:?}");
            }
            _ => {
                opts.mount_options.insert(option);
            }
        }
    }
    Ok(())
}

/// Copies from the private [`fuser::MountOption::from_str`]
fn parse_options_from_args(args: &[String]) -> Vec<MountOption> {
    args.iter()
        .map(|s| match s.as_str() {
            "auto_unmount" => MountOption::AutoUnmount,
            "allow_other" => MountOption::AllowOther,
            "allow_root" => MountOption::AllowRoot,
            "default_permissions" => MountOption::DefaultPermissions,
            "dev" => MountOption::Dev,
            "nodev" => MountOption::NoDev,
            "suid" => MountOption::Suid,
            "nosuid" => MountOption::NoSuid,
            "ro" => MountOption::RO,
            "rw" => MountOption::RW,
            "exec" => MountOption::Exec,
            "noexec" => MountOption::NoExec,
            "atime" => MountOption::Atime,
            "noatime" => MountOption::NoAtime,
            "dirsync" => MountOption::DirSync,
            "sync" => MountOption::Sync,
            "async" => MountOption::Async,
            x => {
                if let Some(name) = x.strip_prefix("fsname=") {
                    MountOption::FSName(name.into())
                } else if let Some(name) = x.strip_prefix("subtype=") {
                    MountOption::Subtype(name.into())
                } else {
                    MountOption::CUSTOM(x.into())
                }
            }
        })
        .collect()
}
