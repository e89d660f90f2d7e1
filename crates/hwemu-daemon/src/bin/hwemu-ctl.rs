//! hwemu-ctl: sends one control command to a running `hwemud`.
//!
//! ```text
//! hwemu-ctl [--addr HOST:PORT] <command words...>
//!
//! hwemu-ctl add-device tty
//! hwemu-ctl add-pair tty tty0 deadbeef=cafe
//! hwemu-ctl transfer tty 0 deadbeef
//! ```
//!
//! Prints the reply value (if any) on stdout.  An `err` reply is printed on
//! stderr and the process exits with status 1.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use hwemu_daemon::application::control::Reply;
use hwemu_daemon::infrastructure::client::send_command;

/// Control client for hwemud.
#[derive(Debug, Parser)]
#[command(name = "hwemu-ctl", about = "Send a control command to hwemud", version)]
struct Cli {
    /// Control server address.
    #[arg(long, default_value = "127.0.0.1:24850", env = "HWEMU_ADDR")]
    addr: String,

    /// Command and its arguments, e.g. `list tty`.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let line = cli.command.join(" ");

    let reply = send_command(&cli.addr, &line)
        .await
        .with_context(|| format!("command '{line}' failed"))?;

    match reply {
        Reply::Ok(Some(value)) => {
            println!("{value}");
            Ok(ExitCode::SUCCESS)
        }
        Reply::Ok(None) => Ok(ExitCode::SUCCESS),
        Reply::Err { code, message } => {
            eprintln!("error {code}: {message}");
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_collects_command_words() {
        let cli = Cli::parse_from(["hwemu-ctl", "add-pair", "tty", "0", "01=02"]);
        assert_eq!(cli.addr, "127.0.0.1:24850");
        assert_eq!(cli.command.join(" "), "add-pair tty 0 01=02");
    }

    #[test]
    fn test_cli_addr_override() {
        let cli = Cli::parse_from(["hwemu-ctl", "--addr", "10.0.0.5:1", "snapshot"]);
        assert_eq!(cli.addr, "10.0.0.5:1");
        assert_eq!(cli.command, vec!["snapshot"]);
    }

    #[test]
    fn test_cli_requires_a_command() {
        assert!(Cli::try_parse_from(["hwemu-ctl"]).is_err());
    }
}
