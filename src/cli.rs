//! Command line front end.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use lancom::config::{expand_tilde, Config};
use lancom::server::{serve, ServeStats};
use lancom::streaming::{AckStatus, Receiver, ReceiverConfig, Sender, SenderConfig};
use lancom::transport::{connect, listen, Acceptor, Connection};
use lancom::{ReceiveOutcome, Role, RoleMode, SendReport, Session};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Parser, Debug)]
#[command(
    name = "lancom",
    version,
    about = "Send a single file to another host over a raw TCP connection"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only warnings and errors, no progress bar
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML config file (default: ~/.config/lancom/config.toml if present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a file
    Send(SendArgs),
    /// Receive a file
    Receive(ReceiveArgs),
}

#[derive(Args, Debug)]
pub struct ConnArgs {
    /// IP address to connect to or listen on [default: 127.0.0.1]
    #[arg(long, env = "LANCOM_IP")]
    pub ip: Option<String>,

    /// Port [default: 4949]
    #[arg(short, long, env = "LANCOM_PORT")]
    pub port: Option<u16>,

    /// Connect to the peer (initiative) or wait for it (passive)
    #[arg(long, value_enum)]
    pub mode: Option<RoleMode>,

    /// Keep serving peers one after another until Ctrl-C (passive only)
    #[arg(long)]
    pub standby: bool,

    /// Give up connecting after this many seconds
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Give up on the handshake after this many seconds
    #[arg(long, value_name = "SECS")]
    pub handshake_timeout: Option<u64>,
}

impl ConnArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(ip) = &self.ip {
            config.ip = ip.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.connect_timeout.is_some() {
            config.connect_timeout = self.connect_timeout;
        }
        if self.handshake_timeout.is_some() {
            config.handshake_timeout = self.handshake_timeout;
        }
    }

    fn mode_or(&self, default: RoleMode) -> Result<RoleMode> {
        let mode = self.mode.unwrap_or(default);
        if self.standby && mode != RoleMode::Passive {
            bail!("--standby requires --mode passive");
        }
        Ok(mode)
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// File to send
    pub file: PathBuf,

    #[command(flatten)]
    pub conn: ConnArgs,

    /// Block size in bytes [default: 1024]
    #[arg(short, long, env = "LANCOM_BLOCK_SIZE")]
    pub block_size: Option<u32>,

    /// Wait for the receiver to confirm the file was written
    #[arg(long)]
    pub ack: bool,
}

#[derive(Args, Debug)]
pub struct ReceiveArgs {
    #[command(flatten)]
    pub conn: ConnArgs,

    /// Write the file here instead of using the sender's file name
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Directory for received files [default: current directory]
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    pub receive_dir: Option<PathBuf>,
}

/// Per-session settings shared by every session of one run.
struct SessionOpts {
    mode: RoleMode,
    handshake_timeout: Option<Duration>,
    quiet: bool,
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::resolve(cli.config.as_deref())?;

    match cli.command {
        Command::Send(args) => {
            args.conn.apply(&mut config);
            if let Some(block_size) = args.block_size {
                config.block_size = block_size;
            }
            config.validate()?;
            run_send(&config, &args, cli.quiet).await
        }
        Command::Receive(args) => {
            args.conn.apply(&mut config);
            if let Some(output) = &args.output {
                config.output_path = Some(output.clone());
            }
            if let Some(dir) = &args.receive_dir {
                config.receive_directory = Some(dir.clone());
            }
            config.validate()?;
            run_receive(&config, &args, cli.quiet).await
        }
    }
}

async fn run_send(config: &Config, args: &SendArgs, quiet: bool) -> Result<()> {
    let path = expand_tilde(&args.file);
    let meta = tokio::fs::metadata(&path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    if !meta.is_file() {
        bail!("{} is not a regular file", path.display());
    }

    let sender = Sender::new(SenderConfig {
        block_size: config.block_size,
        ack: args.ack,
    });
    // Oversized files are rejected here, before any socket is opened.
    let header = sender.header_for(&path, meta.len())?;
    tracing::info!(
        "file size = {} bytes ({} blocks of {} + {} bytes)",
        header.total_size(),
        header.block_count(),
        header.block_size(),
        header.tail_size()
    );

    let opts = SessionOpts {
        mode: args.conn.mode_or(RoleMode::Passive)?,
        handshake_timeout: config.handshake_timeout(),
        quiet,
    };

    match opts.mode {
        RoleMode::Initiative => {
            let conn = connect(&config.addr(), config.connect_timeout()).await?;
            send_one(conn, &opts, &sender, &path).await
        }
        RoleMode::Passive => {
            let mut acceptor = listen(&config.addr()).await?;
            if args.conn.standby {
                let stats = serve(&mut acceptor, interrupted(), |conn| {
                    send_one(conn, &opts, &sender, &path)
                })
                .await;
                print_serve_stats(&stats);
                Ok(())
            } else {
                let conn = acceptor.accept().await?;
                send_one(conn, &opts, &sender, &path).await
            }
        }
    }
}

async fn run_receive(config: &Config, args: &ReceiveArgs, quiet: bool) -> Result<()> {
    let receiver = Receiver::new(ReceiverConfig {
        output_path: config.output_path.as_deref().map(expand_tilde),
        receive_dir: config.receive_directory.as_deref().map(expand_tilde),
    });

    let opts = SessionOpts {
        mode: args.conn.mode_or(RoleMode::Initiative)?,
        handshake_timeout: config.handshake_timeout(),
        quiet,
    };

    match opts.mode {
        RoleMode::Initiative => {
            let conn = connect(&config.addr(), config.connect_timeout()).await?;
            receive_one(conn, &opts, &receiver).await
        }
        RoleMode::Passive => {
            let mut acceptor = listen(&config.addr()).await?;
            if args.conn.standby {
                let stats =
                    serve(&mut acceptor, interrupted(), |conn| receive_one(conn, &opts, &receiver))
                        .await;
                print_serve_stats(&stats);
                Ok(())
            } else {
                let conn = acceptor.accept().await?;
                receive_one(conn, &opts, &receiver).await
            }
        }
    }
}

async fn send_one<S>(
    conn: Connection<S>,
    opts: &SessionOpts,
    sender: &Sender,
    path: &Path,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let bar = transfer_bar(opts.quiet);
    let report = Session::new(Role::Sender, opts.mode, conn)
        .with_handshake_timeout(opts.handshake_timeout)
        .send_file(sender, path, &bar)
        .await?;

    print_send_report(&report);
    if let AckStatus::Failed { found } = &report.ack {
        bail!(
            "{} did not confirm the transfer (got {:?})",
            report.peer,
            String::from_utf8_lossy(found)
        );
    }
    Ok(())
}

async fn receive_one<S>(conn: Connection<S>, opts: &SessionOpts, receiver: &Receiver) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let bar = transfer_bar(opts.quiet);
    let outcome = Session::new(Role::Receiver, opts.mode, conn)
        .with_handshake_timeout(opts.handshake_timeout)
        .receive_file(receiver, &bar)
        .await?;

    match outcome {
        ReceiveOutcome::Saved {
            peer,
            path,
            header,
            body,
        } => {
            if let Some(warning) = body.incomplete() {
                println!("{} {}", "warning:".yellow().bold(), warning);
                println!(
                    "  kept {} bytes of {} in {}",
                    body.written,
                    header.filename(),
                    path.display()
                );
            } else {
                println!(
                    "{} received {} ({}) from {} into {}",
                    "done:".green().bold(),
                    header.filename(),
                    HumanBytes(body.written),
                    peer,
                    path.display()
                );
            }
            Ok(())
        }
        ReceiveOutcome::SignMismatch { peer, found } => {
            bail!("{} sent an unknown sign {:?}; session aborted", peer, found)
        }
        ReceiveOutcome::Truncated { peer, received } => {
            bail!(
                "{} closed the connection after {} header bytes; session aborted",
                peer,
                received
            )
        }
    }
}

fn print_send_report(report: &SendReport) {
    let confirmed = match report.ack {
        AckStatus::Acknowledged => " (confirmed)",
        _ => "",
    };
    println!(
        "{} sent {} ({}) to {}{}",
        "done:".green().bold(),
        report.header.filename(),
        HumanBytes(report.state.bytes_transferred),
        report.peer,
        confirmed
    );
}

fn print_serve_stats(stats: &ServeStats) {
    let failed = if stats.failed > 0 {
        stats.failed.to_string().red().to_string()
    } else {
        stats.failed.to_string()
    };
    println!(
        "{} {} sessions completed, {} failed",
        "stopped:".bold(),
        stats.completed,
        failed
    );
}

fn transfer_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> "),
    );
    bar
}

/// Resolves on Ctrl-C.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("interrupt received, stopping");
}
