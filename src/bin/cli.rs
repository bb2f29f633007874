//! mdex-cli: trigger daemon jobs over the control socket.
//!
//! Exit code is zero when the run finished with updates or had nothing
//! to do, non-zero for failures, rejected triggers and socket errors.

use std::io::Write as _;
use std::process::ExitCode;

use anyhow::{Result, bail};

use mdex_tracker_lib::control::{ControlClient, ControlEvent};
use mdex_tracker_lib::infrastructure::ConfigManager;

const USAGE: &str = "usage: mdex-cli <title-check|deep-check>";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("mdex-cli: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<bool> {
    let command = parse_args()?;

    let manager = ConfigManager::new()?;
    let mut config = manager.load_config().await?;
    config.apply_env_overrides();

    let client = ControlClient::new(config.socket_path());
    let mut progress_shown = false;
    let event = client
        .trigger(&command, |text| {
            // Redraw the counter in place; the terminal line is cleared
            // before the final verdict goes to stdout.
            progress_shown = true;
            eprint!("\r\x1b[K{text}");
            let _ = std::io::stderr().flush();
        })
        .await?;
    if progress_shown {
        eprint!("\r\x1b[K");
        let _ = std::io::stderr().flush();
    }

    match &event {
        ControlEvent::Success { count } => println!("{count} title(s) with new chapters"),
        ControlEvent::NoItems => println!("nothing to check"),
        ControlEvent::AlreadyRunning => println!("a run of this job is already in flight"),
        ControlEvent::Failure { code } => println!("check failed (code {code})"),
        ControlEvent::Unsupported => println!("command not supported by the daemon"),
        // The client only ever returns terminal events.
        ControlEvent::Progress { .. } => {}
    }
    Ok(event.indicates_success())
}

fn parse_args() -> Result<String> {
    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        bail!("{USAGE}");
    };
    if command == "--help" || command == "-h" {
        println!("{USAGE}");
        std::process::exit(0);
    }
    if args.next().is_some() {
        bail!("{USAGE}");
    }
    Ok(command)
}
