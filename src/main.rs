//! wk-bridge - WinKeyer to virtual key bridge
//!
//! Connects to the keyer, then runs a line console on stdin until `quit`,
//! end of input or a session fault. Key transitions go to the tracing log.

use std::io::{self, BufReader, Write as _};
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use rust_wk_bridge::config::BridgeConfig;
use rust_wk_bridge::console::{format_notification, spawn_line_reader, Console, ConsoleExit};
use rust_wk_bridge::engine::OverflowPolicy;
use rust_wk_bridge::keys::{KeyingMode, TracingSink};
use rust_wk_bridge::log_output::{init_subscriber, spawn_drain, Verbosity};
use rust_wk_bridge::logging::{log_stream, LOG_BUFFER_SIZE};
use rust_wk_bridge::session::{ControlSurface, Notification, Session};
use rust_wk_bridge::timing::{is_plausible, MAX_WPM, MIN_WPM};
use rust_wk_bridge::transport::{available_ports, suggest_port};

#[derive(Parser, Debug)]
#[command(version = env!("VERSION_STRING"), about, long_about = None)]
struct Args {
    /// Serial port of the keyer (default: best guess from attached ports)
    #[arg(short, long)]
    port: Option<String>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Leave the keyer's sidetone on
    #[arg(long)]
    no_mute: bool,

    /// Swap DIT-key and DAH-key
    #[arg(long)]
    swap: bool,

    /// Clear the paddle swap bit in the keyer's mode register
    #[arg(long)]
    no_device_swap: bool,

    /// Key every element on one key (remote set to straight key)
    #[arg(long)]
    straight: bool,

    /// Fixed speed in WPM instead of the keyer's pot
    #[arg(short, long)]
    wpm: Option<u32>,

    /// Pending character capacity
    #[arg(long, default_value_t = 64)]
    queue: usize,

    /// Drop the oldest pending character on overflow instead of the newest
    #[arg(long)]
    drop_oldest: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn bridge_config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.link.mute_sidetone = !self.no_mute;
        config.link.device_paddle_swap = !self.no_device_swap;
        config.engine.paddle_swap = self.swap;
        config.engine.queue_capacity = self.queue;
        if self.straight {
            config.engine.keying_mode = KeyingMode::Straight;
        }
        if self.drop_oldest {
            config.engine.overflow = OverflowPolicy::DropOldest;
        }
        if let Some(wpm) = self.wpm {
            config.engine.initial_wpm = wpm;
        }
        config
    }
}

fn list_ports() -> Result<()> {
    let ports = available_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("no serial ports found");
        return Ok(());
    }
    let suggested = suggest_port(&ports).map(|p| p.name.clone());
    for port in &ports {
        let mark = if Some(&port.name) == suggested.as_ref() { "*" } else { " " };
        println!("{} {:<20} {}", mark, port.name, port.description.as_deref().unwrap_or(""));
    }
    Ok(())
}

fn pick_port(requested: Option<String>) -> Result<String> {
    if let Some(port) = requested {
        return Ok(port);
    }
    let ports = available_ports().context("failed to enumerate serial ports")?;
    match suggest_port(&ports) {
        Some(port) => {
            info!(port = %port.name, description = ?port.description, "using suggested port");
            Ok(port.name.clone())
        }
        None => bail!("no serial ports found; pass --port"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_subscriber(Verbosity::from_flags(args.verbose, args.quiet))
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    if args.list_ports {
        return list_ports();
    }
    if let Some(wpm) = args.wpm {
        if !is_plausible(wpm) {
            bail!("--wpm {wpm} outside {MIN_WPM}..={MAX_WPM}");
        }
    }

    let config = args.bridge_config();
    let port = pick_port(args.port.clone())?;

    let (log, drain) = log_stream(LOG_BUFFER_SIZE);
    let drain_thread = spawn_drain(drain).context("failed to start log drain")?;

    warn!("no OS key injection backend; key transitions are logged only");
    let session = Session::connect(&port, &config, TracingSink, log)
        .with_context(|| format!("failed to connect to keyer on {port}"))?;
    let controller = session.controller();

    if let Some(wpm) = args.wpm {
        controller.set_speed_override(Some(wpm)).context("failed to set speed")?;
    }

    let notifications = session.notifications().clone();
    let (ended_tx, ended) = crossbeam_channel::bounded(1);
    let notify_thread = thread::Builder::new()
        .name("notify".into())
        .spawn(move || {
            for note in notifications.iter() {
                println!("{}", format_notification(&note));
                if matches!(note, Notification::Fault(_)) {
                    let _ = ended_tx.try_send(());
                }
            }
        })
        .context("failed to start notification thread")?;

    let lines = spawn_line_reader(BufReader::new(io::stdin())).context("failed to start console input")?;
    let mut console = Console::new(&controller);
    let exit = console.run(&lines, &ended, |text| {
        print!("{}", text);
        let _ = io::stdout().flush();
    });
    if exit == ConsoleExit::SessionEnded {
        println!();
    }

    if let Err(err) = controller.disconnect() {
        warn!(error = %err, "disconnect failed");
    }
    let status = controller.status();
    let reason = session.wait();
    info!(?reason, emitted = status.engine.emitted, "session ended");

    drop(controller);
    let _ = notify_thread.join();
    let _ = drain_thread.join();

    if status.fault.active {
        bail!("session ended: {}", status.fault.code.message());
    }
    Ok(())
}
