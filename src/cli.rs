//! Command-line interface, built on clap derive.

use clap::{Parser, Subcommand};

/// perch — concurrent seat-reservation sniper.
#[derive(Debug, Parser)]
#[command(name = "perch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "perch.toml")]
    pub config: String,

    /// Print the full per-seat outcome reports as JSON.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Wait for the configured login and open instants, then acquire seats.
    Run,

    /// Log in and acquire immediately, ignoring the wall-clock gate.
    Now,

    /// Check in to today's existing reservation for every user.
    Checkin {
        /// Wait until this time of day (HH:MM or HH:MM:SS) first.
        #[arg(long)]
        at: Option<String>,
    },
}
