//! Co-simulation bridge CLI.
//!
//! This binary provides a single entry point for every process of a deployment. It performs:
//! 1. **Multiplexer:** Pairs simulator instances with external clients on one shared rendezvous.
//! 2. **Simulator run:** Runs the reference simulator with a firmware model behind a bridge session.
//! 3. **Scripted drive:** Plays the external runtime's side for smoke tests without a physics engine.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cosim_bridge::config::BridgeConfig;
use cosim_bridge::scheduler::Termination;
use cosim_bridge::session::{ClientSession, Multiplexer, Session};
use cosim_bridge::sim::{BumpController, Firmware, FirmwareSimulator, Loopback};
use cosim_bridge::Scheduler;

#[derive(Parser, Debug)]
#[command(
    name = "cosim",
    author,
    version,
    about = "Run-ahead co-simulation bridge",
    long_about = "Keep a cycle-accurate MCU simulator and an external physics runtime in lockstep.\n\nExamples:\n  cosim mux --route R0=gem5-0 --route R1=gem5-1\n  cosim run --server-name gem5-0\n  cosim drive --client-id R0 --window-ms 32 --steps 100\n\nLog verbosity follows RUST_LOG (default: info)."
)]
struct Cli {
    /// JSON configuration file; missing values take their defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FirmwareKind {
    /// Bumper-driven wheel controller.
    Bump,
    /// Echo the request back.
    Loopback,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the session multiplexer until every route is paired and its relays end.
    Mux {
        /// Route a client identity to a server name (CLIENT=SERVER); replaces the configured routes.
        #[arg(long = "route", value_parser = parse_route)]
        routes: Vec<(String, String)>,
    },

    /// Run the reference simulator behind one bridge session.
    Run {
        /// Session name; overrides `session.name`.
        #[arg(long)]
        server_name: Option<String>,

        /// Listen on the session's own rendezvous instead of registering with the multiplexer.
        #[arg(long)]
        direct: bool,

        /// Firmware model servicing the bridge IO interrupt.
        #[arg(long, value_enum, default_value = "bump")]
        firmware: FirmwareKind,
    },

    /// Drive a session from the external side with a scripted bumper signal.
    Drive {
        /// Client identity to register with the multiplexer.
        #[arg(long, conflicts_with = "direct")]
        client_id: Option<String>,

        /// Connect straight to this session name instead of the multiplexer.
        #[arg(long)]
        direct: Option<String>,

        /// Run-ahead window in milliseconds.
        #[arg(long, default_value_t = 32)]
        window_ms: i32,

        /// Number of request/response exchanges.
        #[arg(long, default_value_t = 10)]
        steps: u32,

        /// Report a bump every N steps (0 never bumps).
        #[arg(long, default_value_t = 0)]
        bump_every: u32,
    },
}

fn parse_route(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((client, server)) if !client.is_empty() && !server.is_empty() => {
            Ok((client.to_string(), server.to_string()))
        }
        _ => Err(format!("expected CLIENT=SERVER, got '{s}'")),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::from_json_file(path).unwrap_or_else(|e| fail(&e)),
        None => BridgeConfig::default(),
    };

    let code = match cli.command {
        Commands::Mux { routes } => {
            if !routes.is_empty() {
                config.mux.routes = routes.into_iter().collect();
            }
            cmd_mux(&config)
        }
        Commands::Run {
            server_name,
            direct,
            firmware,
        } => {
            if let Some(name) = server_name {
                config.session.name = name;
            }
            cmd_run(&config, direct, firmware)
        }
        Commands::Drive {
            client_id,
            direct,
            window_ms,
            steps,
            bump_every,
        } => cmd_drive(&config, client_id, direct, window_ms, steps, bump_every),
    };
    process::exit(code);
}

fn fail(e: &dyn std::fmt::Display) -> ! {
    error!("{e}");
    process::exit(1);
}

/// Serves the multiplexer; exits non-zero if any registration failed.
fn cmd_mux(config: &BridgeConfig) -> i32 {
    if let Err(e) = config.validate() {
        fail(&e);
    }
    let mut mux = Multiplexer::from_config(config).unwrap_or_else(|e| fail(&e));
    info!(path = %mux.path().display(), "waiting for registrations");

    let shutdown = AtomicBool::new(false);
    let summary = mux.serve(&shutdown).unwrap_or_else(|e| fail(&e));
    for e in &summary.errors {
        error!("{e}");
    }
    mux.join_relays();
    i32::from(!summary.errors.is_empty())
}

/// Runs one simulator session; the process exit code is the firmware's.
fn cmd_run(config: &BridgeConfig, direct: bool, kind: FirmwareKind) -> i32 {
    if let Err(e) = config.validate() {
        fail(&e);
    }
    let name = config.session.name.as_str();
    let max_payload = config.transport.max_payload;
    let established = if direct {
        Session::listen_with_limit(&config.session.socket_dir, name, max_payload)
    } else {
        config
            .mux_socket_path()
            .map_err(Into::into)
            .and_then(|path| Session::register_with_limit(&path, name, max_payload))
    };
    let session = established.unwrap_or_else(|e| fail(&e));
    info!(session = name, peer = %session.peer(), "session ready");

    let firmware: Box<dyn Firmware> = match kind {
        FirmwareKind::Bump => Box::new(BumpController::new(&config.firmware, &config.device)),
        FirmwareKind::Loopback => Box::new(Loopback::new(config.device.base_addr)),
    };
    let sim = FirmwareSimulator::from_config(&config.device, &config.firmware, firmware);
    let mut scheduler = Scheduler::new(
        name,
        sim,
        session.into_connection(),
        config.scheduler.clone(),
    );

    match scheduler.run() {
        Ok(summary) => {
            println!("{}", summary.stats);
            match summary.termination {
                Termination::FirmwareExit { code } => code as i32,
                Termination::PeerDone => 0,
            }
        }
        Err(e) => fail(&e),
    }
}

/// Plays the external runtime: INIT, `steps` requests, DONE.
fn cmd_drive(
    config: &BridgeConfig,
    client_id: Option<String>,
    direct: Option<String>,
    window_ms: i32,
    steps: u32,
    bump_every: u32,
) -> i32 {
    let connected = match (client_id, direct) {
        (_, Some(name)) => ClientSession::connect_direct(&config.session.socket_dir, &name),
        (Some(id), None) => config
            .mux_socket_path()
            .map_err(Into::into)
            .and_then(|path| ClientSession::connect(&path, &id)),
        (None, None) => fail(&"pass --client-id or --direct"),
    };
    let mut client = connected.unwrap_or_else(|e| fail(&e));
    client.init(window_ms).unwrap_or_else(|e| fail(&e));

    for step in 1..=steps {
        let bumped = bump_every != 0 && step % bump_every == 0;
        let mut request = i32::from(bumped).to_le_bytes().to_vec();
        request.resize(config.scheduler.element_width.max(4), 0);

        match client.exchange(&request).unwrap_or_else(|e| fail(&e)) {
            Some(reply) => {
                let values: Vec<i32> = reply
                    .chunks_exact(4)
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                println!("step {step:>4} bump={} reply={values:?}", u8::from(bumped));
            }
            None => {
                info!(step, "simulator ended the session");
                return 0;
            }
        }
    }

    client.finish().unwrap_or_else(|e| fail(&e));
    0
}
