use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::clock::duration::format_clock_time;
use crate::clock::engine::ClockEngine;
use crate::clock::events::{ClockEvent, EventMailbox};
use crate::clock::side::SideId;
use crate::config::ClockConfig;

const EVENT_POLL: Duration = Duration::from_millis(100);
const BELL: &str = "\x07";

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleOptions {
    pub json: bool,
    pub show_ticks: bool,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Command {
    Press(SideId),
    Toggle,
    Start,
    Stop,
    Reset,
    Setup { starting_time: String, increment: String },
    Preset(String),
    Presets,
    Status,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let args = words.collect::<Vec<_>>();

    let command = match (name.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("white" | "w", []) => Command::Press(SideId::White),
        ("black" | "b", []) => Command::Press(SideId::Black),
        ("play" | "p", []) => Command::Toggle,
        ("start", []) => Command::Start,
        ("stop", []) => Command::Stop,
        ("reset" | "r", []) => Command::Reset,
        ("setup", [starting_time, increment]) => Command::Setup {
            starting_time: starting_time.to_string(),
            increment: increment.to_string(),
        },
        ("setup", _) => bail!("usage: setup <mm:ss> <mm:ss>"),
        ("preset", [id]) => Command::Preset(id.to_string()),
        ("preset", _) => bail!("usage: preset <id>"),
        ("presets", []) => Command::Presets,
        ("status" | "s", []) => Command::Status,
        ("help" | "h" | "?", []) => Command::Help,
        ("quit" | "q" | "exit", []) => Command::Quit,
        (other, []) => bail!("unknown command '{other}'"),
        (other, _) => bail!("'{other}' takes no arguments"),
    };
    Ok(Some(command))
}

/// Prints engine events as they arrive on the mailbox.
struct EventPrinter {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl EventPrinter {
    fn start(mailbox: Arc<EventMailbox>, show_ticks: bool) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let join = thread::spawn(move || {
            while !stop_for_thread.load(Ordering::Relaxed) {
                print_events(&mailbox.recv_timeout(EVENT_POLL), show_ticks);
            }
            print_events(&mailbox.recv_timeout(Duration::ZERO), show_ticks);
        });
        Self {
            stop,
            join: Some(join),
        }
    }
}

impl Drop for EventPrinter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn print_events(events: &[ClockEvent], show_ticks: bool) {
    for event in events {
        if let Some(line) = describe_event(event, show_ticks) {
            println!("{line}");
        }
    }
}

fn describe_event(event: &ClockEvent, show_ticks: bool) -> Option<String> {
    match *event {
        ClockEvent::TimeUpdated { side, remaining } => {
            show_ticks.then(|| format!("{side} {}", format_clock_time(remaining)))
        }
        ClockEvent::WarningCrossed(side) => Some(format!("{BELL}{side} is low on time")),
        ClockEvent::Flagged(side) => Some(format!("{BELL}{side} flagged")),
        ClockEvent::TurnSwitched(side) => Some(format!("{side} to move")),
        ClockEvent::RunningChanged(true) => Some("clock running".to_string()),
        ClockEvent::RunningChanged(false) => Some("clock stopped".to_string()),
    }
}

/// Reads commands from `input` until `quit` or end of input, forwarding them
/// to the engine.
pub fn run_console<R: BufRead>(
    engine: &ClockEngine,
    mailbox: Arc<EventMailbox>,
    config: &ClockConfig,
    options: ConsoleOptions,
    input: R,
) -> Result<()> {
    let printer = EventPrinter::start(mailbox, options.show_ticks);

    for line in input.lines() {
        let line = line.context("failed to read command")?;
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("error: {err}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(err) = execute(engine, config, options, command) {
            println!("error: {err:#}");
        }
    }

    engine.stop();
    drop(printer);
    Ok(())
}

fn execute(
    engine: &ClockEngine,
    config: &ClockConfig,
    options: ConsoleOptions,
    command: Command,
) -> Result<()> {
    match command {
        Command::Press(side) => engine.press(side)?,
        Command::Toggle => {
            engine.toggle()?;
        }
        Command::Start => engine.start()?,
        Command::Stop => engine.stop(),
        Command::Reset => engine.reset(None),
        Command::Setup {
            starting_time,
            increment,
        } => {
            let applied = engine.configure(&starting_time, &increment)?;
            println!("time control set to {applied}");
        }
        Command::Preset(id) => {
            let preset = config
                .find_preset(&id)
                .ok_or_else(|| anyhow!("unknown preset '{id}'"))?;
            engine.apply_preset(preset);
            println!("time control set to {}", preset.time_control);
        }
        Command::Presets => {
            for preset in &config.presets {
                println!("{preset}");
            }
        }
        Command::Status => print_status(engine, options)?,
        Command::Help => print_help(),
        Command::Quit => {}
    }
    Ok(())
}

fn print_status(engine: &ClockEngine, options: ConsoleOptions) -> Result<()> {
    let snapshot = engine.snapshot();
    if options.json {
        println!("{}", serde_json::to_string(&snapshot)?);
    } else {
        println!("{}", snapshot.summary());
    }
    Ok(())
}

fn print_help() {
    println!("commands:");
    println!("  white | w            white finished a move");
    println!("  black | b            black finished a move");
    println!("  play | p             start or pause the clock");
    println!("  start, stop          start or pause explicitly");
    println!("  reset | r            reset both clocks");
    println!("  setup <mm:ss> <mm:ss> set starting time and increment");
    println!("  preset <id>          apply a preset");
    println!("  presets              list presets");
    println!("  status | s           show both clocks");
    println!("  quit | q             exit");
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::clock::engine::{ClockSettings, ClockStatus};
    use crate::clock::side::TimeControl;

    #[test]
    fn parses_side_presses_and_aliases() {
        assert_eq!(
            parse_command("w").expect("w"),
            Some(Command::Press(SideId::White))
        );
        assert_eq!(
            parse_command("  BLACK ").expect("black"),
            Some(Command::Press(SideId::Black))
        );
        assert_eq!(parse_command("p").expect("p"), Some(Command::Toggle));
        assert_eq!(parse_command("").expect("blank"), None);
    }

    #[test]
    fn parses_setup_arguments() {
        assert_eq!(
            parse_command("setup 05:00 00:03").expect("setup"),
            Some(Command::Setup {
                starting_time: "05:00".to_string(),
                increment: "00:03".to_string(),
            })
        );
        assert!(parse_command("setup 05:00").is_err());
        assert!(parse_command("status now").is_err());
        assert!(parse_command("castle").is_err());
    }

    #[test]
    fn tick_lines_are_opt_in() {
        let event = ClockEvent::TimeUpdated {
            side: SideId::Black,
            remaining: Duration::from_millis(9_450),
        };
        assert_eq!(describe_event(&event, false), None);
        assert_eq!(
            describe_event(&event, true).as_deref(),
            Some("black 00:09.4")
        );
        assert_eq!(
            describe_event(&ClockEvent::Flagged(SideId::White), false).as_deref(),
            Some("\x07white flagged")
        );
    }

    #[test]
    fn console_script_drives_the_engine() {
        let mailbox = Arc::new(EventMailbox::new());
        let engine = ClockEngine::manual(
            TimeControl::default(),
            ClockSettings::default(),
            mailbox.clone(),
        );
        let config = ClockConfig::default();
        let script = Cursor::new("preset blitz-3+2\nw\nbogus\nb\nquit\nw\n");

        run_console(&engine, mailbox, &config, ConsoleOptions::default(), script)
            .expect("console run");

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.status, ClockStatus::Paused);
        assert_eq!(snapshot.active_side, SideId::White);
        assert_eq!(snapshot.black.remaining, Duration::from_secs(182));
        assert_eq!(snapshot.white.remaining, Duration::from_secs(180));
    }
}
