//! `warden shell`: interactive operator session against the engine thread.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;
use warden_hub::{Appliance, ControlOutcome, EngineError, EngineHandle, EnrollOutcome, Hub};

const HELP: &str = "\
commands:
  status                      show the status panel
  face                        authenticate by face scan
  pin <pin>                   authenticate by PIN
  rfid <card-id>              authenticate by RFID card
  logout                      end the session
  on|off <light|security|tv>  switch an appliance
  outage | restore | heal     power outage, power restored, self-heal
  sim on|off                  toggle simulation mode
  enroll <label> <password>   register a face (admin)
  clear <password>            remove every enrolled face (admin)
  list                        list enrolled labels
  alerts                      list unacknowledged alerts
  ack <alert-id>              acknowledge an alert
  log [n]                     show the last n ledger entries (default 10)
  export <path>               copy the ledger file
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Help,
    Quit,
    Status,
    Face,
    Pin(String),
    Rfid(String),
    Logout,
    Control(Appliance, bool),
    Outage,
    Restore,
    Heal,
    Simulation(bool),
    Enroll { label: String, password: String },
    Clear(String),
    List,
    Alerts,
    Ack(Uuid),
    Log(usize),
    Export(String),
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ShellCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let one = |name: &str| -> Result<String, String> {
        match args.as_slice() {
            [arg] => Ok(arg.to_string()),
            _ => Err(format!("usage: {verb} <{name}>")),
        }
    };
    let none = |cmd: ShellCommand| -> Result<ShellCommand, String> {
        if args.is_empty() {
            Ok(cmd)
        } else {
            Err(format!("{verb} takes no arguments"))
        }
    };

    let cmd = match verb.to_ascii_lowercase().as_str() {
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        "status" => none(ShellCommand::Status)?,
        "face" => none(ShellCommand::Face)?,
        "pin" => ShellCommand::Pin(one("pin")?),
        "rfid" => ShellCommand::Rfid(one("card-id")?),
        "logout" => none(ShellCommand::Logout)?,
        v @ ("on" | "off") => {
            let appliance = one("appliance")?.parse::<Appliance>()?;
            ShellCommand::Control(appliance, v == "on")
        }
        "outage" => none(ShellCommand::Outage)?,
        "restore" => none(ShellCommand::Restore)?,
        "heal" => none(ShellCommand::Heal)?,
        "sim" => match one("on|off")?.as_str() {
            "on" => ShellCommand::Simulation(true),
            "off" => ShellCommand::Simulation(false),
            other => return Err(format!("sim: expected on or off, got {other:?}")),
        },
        "enroll" => match args.as_slice() {
            [label, password] => ShellCommand::Enroll {
                label: label.to_string(),
                password: password.to_string(),
            },
            _ => return Err("usage: enroll <label> <password>".into()),
        },
        "clear" => ShellCommand::Clear(one("password")?),
        "list" => none(ShellCommand::List)?,
        "alerts" => none(ShellCommand::Alerts)?,
        "ack" => {
            let raw = one("alert-id")?;
            ShellCommand::Ack(raw.parse().map_err(|e| format!("ack: {e}"))?)
        }
        "log" => match args.as_slice() {
            [] => ShellCommand::Log(10),
            [n] => ShellCommand::Log(n.parse().map_err(|_| format!("log: not a number: {n}"))?),
            _ => return Err("usage: log [n]".into()),
        },
        "export" => ShellCommand::Export(one("path")?),
        other => return Err(format!("unknown command {other:?}; try help")),
    };
    Ok(Some(cmd))
}

/// Run the REPL until `quit` or end of input.
pub async fn run_shell(handle: EngineHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("warden shell (type help for commands)");
    loop {
        stdout.write_all(b"warden> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(msg) => {
                eprintln!("{msg}");
                continue;
            }
        };
        if cmd == ShellCommand::Quit {
            break;
        }
        if let Err(e) = dispatch(&handle, cmd).await {
            match e {
                EngineError::ChannelClosed | EngineError::Spawn(_) => return Err(e.into()),
                EngineError::Hub(e) => eprintln!("error: {e}"),
            }
        }
    }
    Ok(())
}

async fn dispatch(handle: &EngineHandle, cmd: ShellCommand) -> Result<(), EngineError> {
    match cmd {
        ShellCommand::Help => println!("{HELP}"),
        ShellCommand::Quit => {}
        ShellCommand::Status => {
            let panel = handle.call(Hub::status).await?;
            match serde_json::to_string_pretty(&panel) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("error: {e}"),
            }
        }
        ShellCommand::Face => {
            println!("Scanning... look at the camera");
            let user = handle.authenticate_face().await?;
            println!("Access granted. Welcome {user}!");
        }
        ShellCommand::Pin(pin) => {
            let user = handle.call(move |hub| hub.authenticate_pin(&pin)).await??;
            println!("Access granted as {user}");
        }
        ShellCommand::Rfid(card) => {
            let user = handle.call(move |hub| hub.authenticate_rfid(&card)).await??;
            println!("Access granted. Welcome {user}!");
        }
        ShellCommand::Logout => {
            handle.call(Hub::logout).await??;
            println!("Logged out");
        }
        ShellCommand::Control(appliance, on) => {
            match handle.call(move |hub| hub.control(appliance, on)).await?? {
                ControlOutcome::Changed { appliance, on } => {
                    println!("{appliance} is now {}", if on { "ON" } else { "OFF" })
                }
                ControlOutcome::Unchanged => println!("{appliance} already {}", if on { "ON" } else { "OFF" }),
                ControlOutcome::Refused { reason } => println!("refused: {reason}"),
            }
        }
        ShellCommand::Outage => {
            if handle.call(Hub::power_outage).await? {
                println!("Power outage: running on battery backup");
            } else {
                println!("Already on battery backup");
            }
        }
        ShellCommand::Restore => {
            if handle.call(Hub::restore_power).await? {
                println!("Main power restored");
            } else {
                println!("Not on battery backup");
            }
        }
        ShellCommand::Heal => {
            let outcome = handle.call(Hub::self_heal).await?;
            println!(
                "Self-heal complete ({} fault(s) cleared{})",
                outcome.cleared_faults,
                if outcome.entered_backup { ", battery backup engaged" } else { "" }
            );
        }
        ShellCommand::Simulation(enabled) => {
            handle.call(move |hub| hub.set_simulation_mode(enabled)).await?;
            println!("Simulation mode {}", if enabled { "on" } else { "off" });
        }
        ShellCommand::Enroll { label, password } => {
            println!("Scanning... look at the camera");
            match handle.enroll(&label, &password).await? {
                EnrollOutcome::Registered {
                    label,
                    score,
                    meets_quality_threshold,
                    frames,
                } => {
                    println!("Registered {label} (score {score:.1} over {frames} frames)");
                    if !meets_quality_threshold {
                        println!("warning: capture quality is low; consider re-enrolling in better light");
                    }
                }
                EnrollOutcome::NoUsableFace { frames } => {
                    println!("No face detected in {frames} frames. Try again with better lighting.")
                }
            }
        }
        ShellCommand::Clear(password) => {
            let removed = handle.call(move |hub| hub.clear_store(&password)).await??;
            println!("Removed {removed} identities");
        }
        ShellCommand::List => {
            let labels = handle.call(|hub| hub.enrolled_labels()).await?;
            if labels.is_empty() {
                println!("No faces enrolled");
            }
            for label in labels {
                println!("  {label}");
            }
        }
        ShellCommand::Alerts => {
            let alerts: Vec<_> = handle
                .call(|hub| hub.alerts().unacknowledged().cloned().collect::<Vec<_>>())
                .await?;
            if alerts.is_empty() {
                println!("No pending alerts");
            }
            for a in alerts {
                println!("{} [{}] {} ({})", a.time_label(), a.level, a.message, a.id);
            }
        }
        ShellCommand::Ack(id) => {
            if handle.call(move |hub| hub.acknowledge_alert(id)).await? {
                println!("Acknowledged");
            } else {
                println!("No alert with id {id}");
            }
        }
        ShellCommand::Log(n) => {
            let entries = handle.call(move |hub| hub.ledger().recent(n).to_vec()).await?;
            for e in entries {
                println!("{}", e.to_line());
            }
        }
        ShellCommand::Export(path) => {
            let bytes = handle
                .call(move |hub| hub.export_ledger(std::path::Path::new(&path)))
                .await??;
            println!("Exported {bytes} bytes");
        }
    }
    Ok(())
}
