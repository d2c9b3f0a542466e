//! bmslink — command-line front end.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  stdin / --request        GattEvent channel      Ctrl-C      │
//! │         │                        │                  │        │
//! │         └────────────┬───────────┴──────────────────┘        │
//! │                      ▼                                       │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │            DeviceControl (single owner task)           │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │          │                                │                  │
//! │   GattPort (btle / sim)       EventSink (console + log)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::time::Instant;

use bmslink::adapters::config_file::JsonConfigStore;
use bmslink::adapters::console::ConsoleView;
use bmslink::adapters::log_sink::LogEventSink;
use bmslink::adapters::sim::SimulatedBms;
use bmslink::app::commands::AppCommand;
use bmslink::app::events::GattEvent;
use bmslink::app::ports::{ConfigError, ConfigPort, EventSink, GattPort};
use bmslink::app::service::DeviceControl;
use bmslink::config::AppConfig;
use bmslink::protocol::Opcode;

/// Address the simulated board answers to when none is configured.
const SIM_ADDRESS: &str = "A4:C1:38:00:00:01";

#[derive(Parser, Debug)]
#[command(name = "bmslink", version, about = "Talk to a JBD-style BMS over Bluetooth LE")]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device address (XX:XX:XX:XX:XX:XX), overrides the config
    #[arg(short, long)]
    address: Option<String>,

    /// Display name, overrides the config
    #[arg(short, long)]
    name: Option<String>,

    /// Talk to an in-memory board instead of the radio
    #[arg(long)]
    simulate: bool,

    /// Send a request and exit; repeatable (basic-info, cell-voltages, extended-info or hex)
    #[arg(short, long = "request", value_parser = parse_opcode)]
    requests: Vec<Opcode>,

    /// How long to wait for replies after each request (ms)
    #[arg(long)]
    wait_ms: Option<u32>,

    /// Write the effective config back to --config
    #[arg(long, requires = "config")]
    save: bool,

    /// More log output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// One line of interactive input.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Command(AppCommand),
    List,
    Resume,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  03 | 04 | 12 | <hex> | <label>   send a read request
  connect | disconnect             change the link
  list                             show discovered characteristics
  select <group> <child>           read/notify a characteristic
  resume                           reconnect if the link dropped
  quit";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let config = effective_config(&args)?;
    info!("Target {} ({:?})", config.device_address, config.device_name);

    if args.simulate {
        let (tx, rx) = unbounded_channel();
        let gatt = SimulatedBms::new().with_broadcast(move |event| {
            let _ = tx.send(event);
        });
        session(gatt, rx, &config, &args).await
    } else {
        radio_session(&config, &args).await
    }
}

#[cfg(feature = "btle")]
async fn radio_session(config: &AppConfig, args: &Args) -> Result<()> {
    let (gatt, rx) = bmslink::adapters::btle::BtleGatt::open(config).await?;
    session(gatt, rx, config, args).await
}

#[cfg(not(feature = "btle"))]
async fn radio_session(_config: &AppConfig, _args: &Args) -> Result<()> {
    bail!("built without Bluetooth support (enable the `btle` feature) - use --simulate")
}

/// File, then command-line overrides, then validation.
fn effective_config(args: &Args) -> Result<AppConfig> {
    let store = args.config.as_ref().map(JsonConfigStore::new);

    let mut config = match &store {
        Some(store) => match store.load() {
            Ok(config) => config,
            Err(ConfigError::NotFound) => {
                warn!("{} not found, using defaults", store.path().display());
                AppConfig::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("loading {}", store.path().display()));
            }
        },
        None => AppConfig::default(),
    };

    if let Some(address) = &args.address {
        config.device_address = address.to_ascii_uppercase();
    }
    if let Some(name) = &args.name {
        config.device_name = Some(name.clone());
    }
    if let Some(wait) = args.wait_ms {
        config.response_timeout_ms = wait;
    }
    if args.simulate && config.device_address.is_empty() {
        config.device_address = SIM_ADDRESS.to_string();
    }

    config.validate().context("invalid configuration")?;

    if args.save {
        if let Some(store) = &store {
            store.save(&config)?;
        }
    }
    Ok(config)
}

async fn session<G: GattPort>(
    mut gatt: G,
    mut events: UnboundedReceiver<GattEvent>,
    config: &AppConfig,
    args: &Args,
) -> Result<()> {
    let mut control = DeviceControl::new(config);
    let mut sink = (ConsoleView::new(std::io::stdout()), LogEventSink::new());

    control.bind(&mut gatt, &mut sink)?;

    let result = if args.requests.is_empty() {
        interactive(&mut control, &mut gatt, &mut events, &mut sink).await
    } else {
        batch(&mut control, &mut gatt, &mut events, &mut sink, config, &args.requests).await
    };

    if control.is_connected() {
        control.handle_command(AppCommand::Disconnect, &mut gatt, &mut sink);
        pump_until(&mut control, &mut gatt, &mut events, &mut sink, Duration::from_millis(500), |c| {
            !c.is_connected()
        })
        .await;
    }
    control.unbind();
    result
}

/// Connect, send every request, print what comes back, exit.
async fn batch<G: GattPort, S: EventSink>(
    control: &mut DeviceControl,
    gatt: &mut G,
    events: &mut UnboundedReceiver<GattEvent>,
    sink: &mut S,
    config: &AppConfig,
    requests: &[Opcode],
) -> Result<()> {
    // Connect covers the scan; discovery must finish before the
    // notify subscription exists.
    let connect_window = Duration::from_secs(u64::from(config.scan_timeout_secs) + 5);
    let linked = pump_until(control, gatt, events, sink, connect_window, |c| {
        c.is_connected() && !c.services().is_empty()
    })
    .await;
    if !linked {
        bail!("could not connect to {}", control.address());
    }

    let wait = Duration::from_millis(u64::from(config.response_timeout_ms));
    for &opcode in requests {
        control.handle_command(AppCommand::SendRequest(opcode), gatt, sink);
        pump_until(control, gatt, events, sink, wait, |_| false).await;
    }
    info!("{} request(s) sent", control.requests_sent());
    Ok(())
}

async fn interactive<G: GattPort, S: EventSink>(
    control: &mut DeviceControl,
    gatt: &mut G,
    events: &mut UnboundedReceiver<GattEvent>,
    sink: &mut S,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        tokio::select! {
            Some(event) = events.recv() => control.handle_event(event, gatt, sink),
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line) {
                    Ok(Input::Command(cmd)) => control.handle_command(cmd, gatt, sink),
                    Ok(Input::List) => print_services(control),
                    Ok(Input::Resume) => control.resume(gatt),
                    Ok(Input::Help) => println!("{HELP}"),
                    Ok(Input::Quit) => break,
                    Err(msg) => eprintln!("{msg}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
        }
    }
    Ok(())
}

/// Feed events to the controller until `done` holds or `window` runs
/// out.  Returns whether `done` was reached.
async fn pump_until<G: GattPort, S: EventSink>(
    control: &mut DeviceControl,
    gatt: &mut G,
    events: &mut UnboundedReceiver<GattEvent>,
    sink: &mut S,
    window: Duration,
    done: impl Fn(&DeviceControl) -> bool,
) -> bool {
    let deadline = Instant::now() + window;
    while !done(control) {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(event)) => control.handle_event(event, gatt, sink),
            Ok(None) | Err(_) => return done(control),
        }
    }
    true
}

fn print_services(control: &DeviceControl) {
    if control.services().is_empty() {
        println!("no services discovered");
        return;
    }
    let active = control.notify_characteristic().map(|c| c.uuid);
    for (g, service) in control.services().iter().enumerate() {
        println!("[{g}] {}", service.uuid);
        for (c, ch) in service.characteristics.iter().enumerate() {
            let marker = if Some(ch.uuid) == active { " *" } else { "" };
            println!("  [{g} {c}] {} props=0x{:02X}{marker}", ch.uuid, ch.properties.0);
        }
    }
}

fn parse_opcode(s: &str) -> Result<Opcode, String> {
    Opcode::parse(s).ok_or_else(|| format!("unknown request `{s}`"))
}

fn parse_input(line: &str) -> Result<Input, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(Input::Help);
    };

    let input = match head.to_ascii_lowercase().as_str() {
        "connect" => Input::Command(AppCommand::Connect),
        "disconnect" => Input::Command(AppCommand::Disconnect),
        "list" => Input::List,
        "resume" => Input::Resume,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        "select" => {
            let mut index = || {
                words
                    .next()
                    .and_then(|w| w.parse::<usize>().ok())
                    .ok_or_else(|| "usage: select <group> <child>".to_string())
            };
            let group = index()?;
            let child = index()?;
            Input::Command(AppCommand::SelectCharacteristic { group, child })
        }
        other => Input::Command(AppCommand::SendRequest(
            parse_opcode(other).map_err(|e| format!("{e} (try `help`)"))?,
        )),
    };
    Ok(input)
}
