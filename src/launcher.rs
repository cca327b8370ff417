// src/launcher.rs
use log::{info, warn};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

use crate::error::LaunchFailure;
use crate::models::game::{GameInfo, Settings};

/// Hands a validated command line to the operating system.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, program: &str, args: &[String]) -> std::io::Result<()>;
}

/// Spawns the game client detached from this process's stdio.
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, program: &str, args: &[String]) -> std::io::Result<()> {
        spawn_reaped(program, args).map(|_| ())
    }
}

/// Starts `program` and waits for it on a background thread so the exited
/// client is reaped while the browser keeps running.
fn spawn_reaped(program: &str, args: &[String]) -> std::io::Result<JoinHandle<std::io::Result<ExitStatus>>> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    info!("Started {} (pid {})", program, child.id());

    let program = program.to_string();
    Ok(thread::spawn(move || {
        let status = child.wait();
        match &status {
            Ok(status) => info!("{} exited with {}", program, status),
            Err(e) => warn!("Could not wait for {}: {}", program, e),
        }
        status
    }))
}

fn substitute(template: &str, host: &str, password: &str) -> String {
    template.replace("{host}", host).replace("{password}", password)
}

/// Builds the program and arguments for joining `host`.
pub fn build_command(
    game: &GameInfo,
    settings: &Settings,
    host: &str,
    password: &str,
) -> Result<(String, Vec<String>), LaunchFailure> {
    let host = host.trim();
    if host.is_empty() {
        return Err(LaunchFailure::EmptyHost);
    }
    let mapping = game
        .launch
        .as_ref()
        .ok_or_else(|| LaunchFailure::NoLaunchMapping(game.id.clone()))?;

    let program = settings
        .get(&mapping.binary_option)
        .and_then(|v| v.as_text())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(&mapping.default_binary)
        .to_string();

    let mut args: Vec<String> = mapping
        .connect_args
        .iter()
        .map(|a| substitute(a, host, password))
        .collect();
    if !password.is_empty() {
        args.extend(mapping.password_args.iter().map(|a| substitute(a, host, password)));
    }

    Ok((program, args))
}
