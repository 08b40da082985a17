//! Line-oriented control console running on its own thread.
//!
//! The console reads commands from an input stream and forwards them to the
//! view over a channel; the view answers with text to print.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use ambience_core::CatalogKind;
use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;
use tracing::{debug, info};

pub const HELP: &str = "\
commands:
  list [effects|backgrounds]        show catalog entries and their state
  enable <kind> <id>                activate an entry
  disable <kind> <id>               deactivate an entry
  disable all                       deactivate every entry
  set <kind> <id> <field> <value>   change one parameter
  reset <kind> <id>                 restore catalog defaults
  pause | play                      global playback switch
  mute | unmute | volume <0..1>     ambient audio
  status                            running instances and playback
  quit";

/// A parsed console line, sent from the console thread to the view.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    List(Option<CatalogKind>),
    Enable(CatalogKind, String),
    Disable(CatalogKind, String),
    DisableAll,
    Set {
        catalog: CatalogKind,
        id: String,
        field: String,
        value: String,
    },
    Reset(CatalogKind, String),
    Pause,
    Play,
    Mute,
    Unmute,
    Volume(f32),
    Status,
    Help,
    Quit,
}

/// Sent from the view to the console thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleReply {
    Print(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unknown command `{0}` (try `help`)")]
    UnknownCommand(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown catalog `{0}`, expected `effects` or `backgrounds`")]
    UnknownCatalog(String),
    #[error("volume must be a number between 0 and 1, got `{0}`")]
    Volume(String),
}

pub struct ConsoleHandles {
    pub reply_sender: Sender<ConsoleReply>,
    pub command_receiver: Receiver<ConsoleCommand>,
}

fn catalog(token: &str) -> Result<CatalogKind, ParseError> {
    CatalogKind::parse(token).ok_or_else(|| ParseError::UnknownCatalog(token.to_string()))
}

/// Parses one input line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let words: Vec<&str> = line.split_whitespace().collect();
    let command = match words.as_slice() {
        ["list"] | ["ls"] => ConsoleCommand::List(None),
        ["list" | "ls", kind] => ConsoleCommand::List(Some(catalog(kind)?)),
        ["list" | "ls", ..] => return Err(ParseError::Usage("list [effects|backgrounds]")),
        ["enable" | "on", kind, id] => ConsoleCommand::Enable(catalog(kind)?, id.to_string()),
        ["enable" | "on", ..] => return Err(ParseError::Usage("enable <kind> <id>")),
        ["disable" | "off", "all"] => ConsoleCommand::DisableAll,
        ["disable" | "off", kind, id] => ConsoleCommand::Disable(catalog(kind)?, id.to_string()),
        ["disable" | "off", ..] => {
            return Err(ParseError::Usage("disable <kind> <id> | disable all"))
        }
        ["set", kind, id, field, value @ ..] if !value.is_empty() => ConsoleCommand::Set {
            catalog: catalog(kind)?,
            id: id.to_string(),
            field: field.to_string(),
            value: value.join(" "),
        },
        ["set", ..] => return Err(ParseError::Usage("set <kind> <id> <field> <value>")),
        ["reset", kind, id] => ConsoleCommand::Reset(catalog(kind)?, id.to_string()),
        ["reset", ..] => return Err(ParseError::Usage("reset <kind> <id>")),
        ["pause"] => ConsoleCommand::Pause,
        ["play" | "resume"] => ConsoleCommand::Play,
        ["mute"] => ConsoleCommand::Mute,
        ["unmute"] => ConsoleCommand::Unmute,
        ["volume", level] => match level.parse::<f32>() {
            Ok(volume) if (0.0..=1.0).contains(&volume) => ConsoleCommand::Volume(volume),
            _ => return Err(ParseError::Volume(level.to_string())),
        },
        ["volume", ..] => return Err(ParseError::Usage("volume <0..1>")),
        ["status"] => ConsoleCommand::Status,
        ["help" | "?"] => ConsoleCommand::Help,
        ["quit" | "exit" | "q"] => ConsoleCommand::Quit,
        [word, ..] => return Err(ParseError::UnknownCommand(word.to_string())),
        [] => return Ok(None),
    };
    Ok(Some(command))
}

/// Spawns the console on its own thread, reading `input` and writing replies
/// and parse errors to `output`.
///
/// The reader ends after `quit` or at end of input; in both cases the view
/// receives [`ConsoleCommand::Quit`]. `help` is answered locally.
pub fn spawn_console_thread<R, W>(input: R, output: W) -> ConsoleHandles
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    let (command_sender, command_receiver) = crossbeam_channel::unbounded::<ConsoleCommand>();
    let (reply_sender, reply_receiver) = crossbeam_channel::unbounded::<ConsoleReply>();
    let output = Arc::new(Mutex::new(output));

    let printer_output = Arc::clone(&output);
    std::thread::spawn(move || {
        for ConsoleReply::Print(text) in reply_receiver.iter() {
            print_line(&printer_output, &text);
        }
    });

    std::thread::spawn(move || {
        for line in input.lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    debug!("console input failed: {err}");
                    break;
                }
            };
            match parse_command(&line) {
                Ok(Some(ConsoleCommand::Help)) => print_line(&output, HELP),
                Ok(Some(command)) => {
                    let quit = command == ConsoleCommand::Quit;
                    if command_sender.send(command).is_err() || quit {
                        return;
                    }
                }
                Ok(None) => {}
                Err(err) => print_line(&output, &format!("error: {err}")),
            }
        }
        info!("console input ended");
        let _ = command_sender.send(ConsoleCommand::Quit);
    });

    ConsoleHandles {
        reply_sender,
        command_receiver,
    }
}

fn print_line<W: Write>(output: &Mutex<W>, text: &str) {
    let mut out = output.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _ = writeln!(out, "{text}");
    let _ = out.flush();
}
