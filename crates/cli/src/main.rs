mod receive_commands;
mod send_commands;

use {
    clap::{Parser, Subcommand},
    tracing::{error, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use wabridge_config::WabridgeConfig;

use send_commands::SendAction;

#[derive(Parser)]
#[command(name = "wabridge", about = "wabridge: WhatsApp Web bridge", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to the config
    /// value, `debug` when `DEBUG=true`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value and `PORT`).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Custom config directory (overrides default ~/.config/wabridge/).
    #[arg(long, global = true, env = "WABRIDGE_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway (default when no subcommand is provided).
    Gateway,
    #[command(flatten)]
    Send(SendAction),
    /// Log incoming messages and read receipts until Ctrl+C.
    Receive,
}

fn init_telemetry(cli: &Cli, config: &WabridgeConfig) {
    let level = cli
        .log_level
        .as_deref()
        .unwrap_or_else(|| config.logging.effective_level());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs || config.logging.json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Some(ref dir) = cli.config_dir {
        wabridge_config::set_config_dir(dir.clone());
    }
    let mut config = wabridge_config::discover_and_load();
    if let Some(ref bind) = cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_telemetry(&cli, &config);
    info!(version = env!("CARGO_PKG_VERSION"), "wabridge starting");

    let result = match cli.command {
        None | Some(Commands::Gateway) => wabridge_gateway::start_gateway(config).await,
        Some(Commands::Send(action)) => send_commands::handle_send(&config, action).await,
        Some(Commands::Receive) => receive_commands::handle_receive(&config).await,
    };

    if let Err(e) = result {
        error!(error = %e, "wabridge failed");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_to_gateway() {
        let cli = Cli::try_parse_from(["wabridge"]);
        assert!(cli.is_ok_and(|c| c.command.is_none()));
    }

    #[test]
    fn parses_send_video() {
        let cli = Cli::try_parse_from([
            "wabridge",
            "send-video",
            "--to",
            "+1 234",
            "--path",
            "clip.mp4",
            "--caption",
            "hi",
        ]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Some(Commands::Send(SendAction::SendVideo { .. })))
        ));
    }

    #[test]
    fn send_text_requires_message() {
        assert!(Cli::try_parse_from(["wabridge", "send-text", "--to", "1"]).is_err());
    }
}
