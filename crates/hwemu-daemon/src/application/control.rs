//! Line-oriented control language.
//!
//! Every request is one line of whitespace-separated words and every reply
//! is one line:
//!
//! ```text
//! > add-device tty
//! < ok 0
//! > add-pair tty tty0 deadbeef=cafe
//! < ok 0
//! > transfer tty 0 deadbeef
//! < ok cafe
//! > add-pair tty 0 deadbeef=00
//! < err 17 request already mapped by pair 0
//! ```
//!
//! Device operands accept either the index (`3`) or the name (`tty3`).
//! Interface kinds accept the lower- or upper-case spelling (`i2c`, `I2C`).
//! Errors carry the numeric code of [`CoreError::code`]; syntax errors use
//! [`ControlError::CODE`].

use std::fmt;
use std::str::{FromStr, SplitWhitespace};

use thiserror::Error;
use tracing::debug;

use hwemu_core::{CoreError, Emulator, InterfaceKind, UnknownInterface, MAX_REQUEST, MAX_RESPONSE};

use crate::application::snapshot;

/// Longest command line accepted, in bytes, excluding the newline.
///
/// Fits a full-size pair in hex plus the command words.
pub const MAX_LINE: usize = 2 * (MAX_REQUEST + MAX_RESPONSE) + 64;

/// Errors raised while parsing a control line or a reply line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("{command}: missing {argument}")]
    MissingArgument {
        command: String,
        argument: &'static str,
    },

    #[error("{command}: unexpected argument '{extra}'")]
    TooManyArguments { command: String, extra: String },

    #[error(transparent)]
    UnknownInterface(#[from] UnknownInterface),

    #[error("invalid {argument} '{value}'")]
    InvalidNumber {
        argument: &'static str,
        value: String,
    },

    #[error("invalid hex data '{0}'")]
    InvalidHex(String),

    #[error("line too long (max {max} bytes)")]
    LineTooLong { max: usize },

    /// A reply line that is neither `ok ...` nor `err <code> ...`.
    #[error("malformed reply '{0}'")]
    MalformedReply(String),
}

impl ControlError {
    /// Code reported for syntax errors (`EINVAL`).
    pub const CODE: i32 = 22;
}

/// A device operand: index or name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRef {
    Index(usize),
    Name(String),
}

impl DeviceRef {
    /// Resolves the operand to an index for `kind`.
    ///
    /// A name of another kind, or one that is not `<kind><number>`, is
    /// reported as not found.  Whether the device exists is left to the
    /// operation itself.
    fn resolve(&self, kind: InterfaceKind) -> Result<usize, CoreError> {
        match self {
            DeviceRef::Index(index) => Ok(*index),
            DeviceRef::Name(name) => kind
                .parse_device_name(name)
                .ok_or_else(|| CoreError::NotFound(name.clone())),
        }
    }
}

/// One parsed control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddDevice {
        kind: InterfaceKind,
    },
    DeleteDevice {
        kind: InterfaceKind,
        device: DeviceRef,
    },
    List {
        kind: InterfaceKind,
    },
    Count {
        kind: InterfaceKind,
        device: DeviceRef,
    },
    GetPair {
        kind: InterfaceKind,
        device: DeviceRef,
        pair: usize,
    },
    Pairs {
        kind: InterfaceKind,
        device: DeviceRef,
    },
    AddPair {
        kind: InterfaceKind,
        device: DeviceRef,
        spec: String,
    },
    DeletePair {
        kind: InterfaceKind,
        device: DeviceRef,
        pair: usize,
    },
    Clear {
        kind: InterfaceKind,
        device: DeviceRef,
    },
    /// Hands a request to the device and reads up to `max_len` bytes of the
    /// matched response; the rest stays staged for `read`.
    Transfer {
        kind: InterfaceKind,
        device: DeviceRef,
        request: Vec<u8>,
        max_len: usize,
    },
    Read {
        kind: InterfaceKind,
        device: DeviceRef,
        max_len: usize,
    },
    Snapshot,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

struct Args<'a> {
    command: &'a str,
    words: SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn word(&mut self, argument: &'static str) -> Result<&'a str, ControlError> {
        self.words.next().ok_or_else(|| ControlError::MissingArgument {
            command: self.command.to_string(),
            argument,
        })
    }

    fn kind(&mut self) -> Result<InterfaceKind, ControlError> {
        Ok(self.word("interface")?.parse()?)
    }

    fn device(&mut self) -> Result<DeviceRef, ControlError> {
        let word = self.word("device")?;
        Ok(word
            .parse()
            .map(DeviceRef::Index)
            .unwrap_or_else(|_| DeviceRef::Name(word.to_string())))
    }

    fn number(&mut self, argument: &'static str) -> Result<usize, ControlError> {
        let word = self.word(argument)?;
        parse_number(argument, word)
    }

    fn finish(mut self) -> Result<(), ControlError> {
        match self.words.next() {
            None => Ok(()),
            Some(extra) => Err(ControlError::TooManyArguments {
                command: self.command.to_string(),
                extra: extra.to_string(),
            }),
        }
    }
}

fn parse_number(argument: &'static str, word: &str) -> Result<usize, ControlError> {
    word.parse().map_err(|_| ControlError::InvalidNumber {
        argument,
        value: word.to_string(),
    })
}

impl FromStr for Command {
    type Err = ControlError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(ControlError::Empty)?;
        let mut args = Args {
            command: name,
            words,
        };

        let command = match name {
            "add-device" => Command::AddDevice { kind: args.kind()? },
            "delete-device" => Command::DeleteDevice {
                kind: args.kind()?,
                device: args.device()?,
            },
            "list" => Command::List { kind: args.kind()? },
            "count" => Command::Count {
                kind: args.kind()?,
                device: args.device()?,
            },
            "get-pair" => Command::GetPair {
                kind: args.kind()?,
                device: args.device()?,
                pair: args.number("pair index")?,
            },
            "pairs" => Command::Pairs {
                kind: args.kind()?,
                device: args.device()?,
            },
            "add-pair" => Command::AddPair {
                kind: args.kind()?,
                device: args.device()?,
                spec: args.word("pair spec")?.to_string(),
            },
            "delete-pair" => Command::DeletePair {
                kind: args.kind()?,
                device: args.device()?,
                pair: args.number("pair index")?,
            },
            "clear" => Command::Clear {
                kind: args.kind()?,
                device: args.device()?,
            },
            "transfer" => {
                let kind = args.kind()?;
                let device = args.device()?;
                let data = args.word("request")?;
                let request = hex::decode(data).map_err(|_| ControlError::InvalidHex(data.to_string()))?;
                let max_len = match args.words.next() {
                    Some(word) => parse_number("length", word)?,
                    None => usize::MAX,
                };
                Command::Transfer {
                    kind,
                    device,
                    request,
                    max_len,
                }
            }
            "read" => Command::Read {
                kind: args.kind()?,
                device: args.device()?,
                max_len: args.number("length")?,
            },
            "snapshot" => Command::Snapshot,
            other => return Err(ControlError::UnknownCommand(other.to_string())),
        };
        args.finish()?;
        Ok(command)
    }
}

// ── Execution ─────────────────────────────────────────────────────────────────

/// Runs `command` against the emulator.  Returns the reply value, if any.
///
/// # Errors
///
/// Whatever [`CoreError`] the underlying operation reports.
pub fn execute(emulator: &Emulator, command: &Command) -> Result<Option<String>, CoreError> {
    let value = match command {
        Command::AddDevice { kind } => Some(emulator.add_device(*kind)?.to_string()),
        Command::DeleteDevice { kind, device } => {
            emulator.delete_device(*kind, device.resolve(*kind)?)?;
            None
        }
        Command::List { kind } => {
            let names: Vec<String> = emulator
                .devices(*kind)?
                .into_iter()
                .map(|index| kind.device_name(index))
                .collect();
            Some(names.join(" "))
        }
        Command::Count { kind, device } => {
            Some(emulator.pair_count(*kind, device.resolve(*kind)?)?.to_string())
        }
        Command::GetPair { kind, device, pair } => {
            Some(emulator.get_pair(*kind, device.resolve(*kind)?, *pair)?)
        }
        Command::Pairs { kind, device } => {
            let entries: Vec<String> = emulator
                .pairs(*kind, device.resolve(*kind)?)?
                .into_iter()
                .map(|(index, spec)| format!("{index}:{spec}"))
                .collect();
            Some(entries.join(" "))
        }
        Command::AddPair { kind, device, spec } => {
            Some(emulator.add_pair(*kind, device.resolve(*kind)?, spec)?.to_string())
        }
        Command::DeletePair { kind, device, pair } => {
            emulator.delete_pair(*kind, device.resolve(*kind)?, *pair)?;
            None
        }
        Command::Clear { kind, device } => {
            emulator.clear_pairs(*kind, device.resolve(*kind)?)?;
            None
        }
        Command::Transfer {
            kind,
            device,
            request,
            max_len,
        } => {
            let index = device.resolve(*kind)?;
            emulator
                .write_read(*kind, index, request, *max_len)?
                .map(hex::encode)
        }
        Command::Read {
            kind,
            device,
            max_len,
        } => Some(hex::encode(
            emulator.read(*kind, device.resolve(*kind)?, *max_len)?,
        )),
        Command::Snapshot => Some(snapshot::capture(emulator).to_json()),
    };
    Ok(value)
}

/// Parses and executes one control line.
pub fn handle_line(emulator: &Emulator, line: &str) -> Reply {
    let reply = match line.parse::<Command>() {
        Ok(command) => Reply::from(execute(emulator, &command)),
        Err(e) => Reply::from(e),
    };
    debug!("control: {} -> {reply}", line.trim());
    reply
}

// ── Replies ───────────────────────────────────────────────────────────────────

/// One reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok(Option<String>),
    Err { code: i32, message: String },
}

impl From<Result<Option<String>, CoreError>> for Reply {
    fn from(result: Result<Option<String>, CoreError>) -> Self {
        match result {
            Ok(value) => Reply::Ok(value.filter(|v| !v.is_empty())),
            Err(e) => Reply::Err {
                code: e.code(),
                message: e.to_string(),
            },
        }
    }
}

impl From<ControlError> for Reply {
    fn from(e: ControlError) -> Self {
        Reply::Err {
            code: ControlError::CODE,
            message: e.to_string(),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok(None) => f.write_str("ok"),
            Reply::Ok(Some(value)) => write!(f, "ok {value}"),
            Reply::Err { code, message } => write!(f, "err {code} {message}"),
        }
    }
}

impl FromStr for Reply {
    type Err = ControlError;

    fn from_str(line: &str) -> Result<Self, ControlError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let malformed = || ControlError::MalformedReply(line.to_string());

        if line == "ok" {
            return Ok(Reply::Ok(None));
        }
        if let Some(value) = line.strip_prefix("ok ") {
            return Ok(Reply::Ok(Some(value.to_string())));
        }
        let rest = line.strip_prefix("err ").ok_or_else(malformed)?;
        let (code, message) = rest.split_once(' ').unwrap_or((rest, ""));
        Ok(Reply::Err {
            code: code.parse().map_err(|_| malformed())?,
            message: message.to_string(),
        })
    }
}
