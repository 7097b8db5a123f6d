use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use voxarchive::api;
use voxarchive::client::{HistoryClient, ReqwestTransport};
use voxarchive::config::{self, APP_NAME, AppConfig};
use voxarchive::store::{ArchiveStore, CursorStore};
use voxarchive::sync::{SyncEngine, SyncReport, SyncSupervisor};
use voxarchive::view::scan_archive;

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_serve(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

#[tokio::main]
async fn async_sync(ctx: RuntimeContext) -> Result<()> {
    handle_sync(&ctx).await
}

#[tokio::main]
async fn async_status(ctx: RuntimeContext) -> Result<()> {
    handle_status(&ctx).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging();
    debug!("config file: {}", ctx.config_file.display());

    match cli.command {
        Command::Serve(cmd) => async_serve(ctx, cmd),
        Command::Sync => async_sync(ctx),
        Command::Status => async_status(ctx),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Mirror ElevenLabs history into a local archive and browse it.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    /// Do not change anything on disk
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
    /// Assume "yes" for interactive prompts
    #[arg(short = 'y', long = "yes", alias = "force", global = true)]
    assume_yes: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the dashboard and run syncs on demand or on a schedule
    Serve(ServeCommand),
    /// Run one sync in the foreground (Ctrl-C stops after the current item)
    Sync,
    /// Show the checkpoint and archive counts
    Status,
    /// Create the default config file
    Init(InitCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Address to bind (overrides server.host)
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Clone, Args)]
struct InitCommand {
    /// Recreate configuration even if it already exists
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration (secrets masked)
    Show,
    /// Print the resolved config file path
    Path,
    /// Regenerate the default configuration file
    Reset,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_file: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_file = config::resolve_config_file(common.config.clone())?;
        if !config_file.exists() && !common.dry_run {
            config::write_default_config(&config_file)?;
        }
        let config = config::load_config(&config_file)?;
        Ok(Self {
            common,
            config_file,
            config,
        })
    }

    fn init_logging(&self) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        let level = self.effective_log_level();
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{APP_NAME}={level},tower_http={level}"))
        });

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!disable_color),
                )
                .try_init()
                .ok();
        }
    }

    fn effective_log_level(&self) -> String {
        let level = if self.common.quiet {
            "error"
        } else if self.common.trace {
            "trace"
        } else if self.common.debug {
            "debug"
        } else {
            match self.common.verbose {
                0 => return self.config.logging.level.clone(),
                1 => "debug",
                _ => "trace",
            }
        };
        level.to_string()
    }

    fn build_engine(&self) -> Result<SyncEngine> {
        let cfg = &self.config;
        cfg.validate().context("invalid configuration")?;

        let transport = ReqwestTransport::new(cfg.api_key(), cfg.request_timeout())
            .context("creating HTTP transport")?;
        let client = HistoryClient::new(Arc::new(transport), cfg.client_config());

        let layout = cfg.archive_layout()?;
        let cursor = CursorStore::new(layout.state_file());
        let store = ArchiveStore::new(layout, client.clone());
        Ok(SyncEngine::new(client, store, cursor))
    }

    fn ensure_data_dir(&self) -> Result<PathBuf> {
        let data_dir = self.config.data_dir()?;
        if self.common.dry_run {
            info!("dry-run: would ensure data dir {}", data_dir.display());
            return Ok(data_dir);
        }
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;
        Ok(data_dir)
    }
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.config_file.exists() && !(cmd.force || ctx.common.assume_yes) {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.config_file.display()
        ));
    }

    if ctx.common.dry_run {
        info!(
            "dry-run: would write default config to {}",
            ctx.config_file.display()
        );
        return Ok(());
    }

    config::write_default_config(&ctx.config_file)
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let shown = ctx.config.redacted();
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&shown).context("serializing config to JSON")?
                );
            } else {
                print!(
                    "{}",
                    toml::to_string_pretty(&shown).context("serializing config to TOML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.config_file.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            if ctx.common.dry_run {
                info!("dry-run: would reset config at {}", ctx.config_file.display());
                return Ok(());
            }
            config::write_default_config(&ctx.config_file)
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

async fn handle_sync(ctx: &RuntimeContext) -> Result<()> {
    if ctx.common.dry_run {
        info!("dry-run: would sync into {}", ctx.config.data_dir()?.display());
        return Ok(());
    }
    ctx.ensure_data_dir()?;
    let engine = ctx.build_engine()?;

    let stop = CancellationToken::new();
    let on_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current item");
            on_signal.cancel();
        }
    });

    let report = engine.run(&stop).await;
    print_report(ctx, &report)?;

    if report.outcome.is_failure() {
        return Err(anyhow!("sync ended with {:?}", report.outcome));
    }
    Ok(())
}

fn print_report(ctx: &RuntimeContext, report: &SyncReport) -> Result<()> {
    if ctx.common.json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("serializing sync report")?
        );
    } else {
        println!(
            "{:?}: {} page(s), {} saved, {} skipped, {} failed, {} audio file(s)",
            report.outcome,
            report.pages,
            report.saved,
            report.skipped,
            report.failed,
            report.audio_written
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    data_dir: PathBuf,
    cursor: Option<String>,
    days: usize,
    messages: usize,
    audio_files: usize,
}

async fn handle_status(ctx: &RuntimeContext) -> Result<()> {
    let layout = ctx.config.archive_layout()?;
    let state = CursorStore::new(layout.state_file()).load().await;
    let data_dir = layout.root().to_path_buf();
    let days = scan_archive(&data_dir)
        .await
        .with_context(|| format!("scanning archive at {}", data_dir.display()))?;

    let messages = days.iter().map(|d| d.messages.len()).sum();
    let audio_files = days
        .iter()
        .flat_map(|d| &d.messages)
        .filter(|m| m.audio_path.is_some())
        .count();
    let status = StatusOutput {
        data_dir,
        cursor: state.cursor,
        days: days.len(),
        messages,
        audio_files,
    };

    if ctx.common.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).context("serializing status")?
        );
    } else {
        println!("data dir:    {}", status.data_dir.display());
        println!(
            "checkpoint:  {}",
            status.cursor.as_deref().unwrap_or("(start of history)")
        );
        println!("days:        {}", status.days);
        println!("messages:    {}", status.messages);
        println!("audio files: {}", status.audio_files);
    }
    Ok(())
}

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    info!("Starting voice archive server...");

    let data_dir = ctx.ensure_data_dir()?;
    info!("Archive root: {}", data_dir.display());

    let supervisor = SyncSupervisor::new(ctx.build_engine()?);
    if ctx.config.elevenlabs.disable_downloads {
        warn!("Downloads are disabled; sync runs will end immediately");
    }

    let scheduler = ctx.config.sync_interval().map(|period| {
        info!("Scheduled sync every {}s", period.as_secs());
        supervisor.spawn_scheduler(period)
    });
    if ctx.config.sync.sync_on_start {
        supervisor.start().await;
    }

    let state = api::AppState::new(supervisor.clone(), data_dir)
        .with_control_token(ctx.config.server.control_token.clone());
    if state.control_token.is_some() {
        info!("Start/stop require the control token");
    }
    let app = api::create_router(state);

    let host = cmd.host.unwrap_or_else(|| ctx.config.server.host.clone());
    let port = cmd.port.unwrap_or(ctx.config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("invalid address")?;

    info!("Listening on http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .context("binding to address")?;

    let shutdown_signal = async move {
        wait_for_signal().await;
        info!("Shutdown signal received, stopping sync...");

        if let Some(handle) = scheduler {
            handle.abort();
        }
        if let Some(report) = supervisor.shutdown().await {
            debug!("Last sync ended with {:?}", report.outcome);
        }

        info!("Shutdown complete");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("running server")?;

    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
