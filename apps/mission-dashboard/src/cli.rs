use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mission-dashboard", version, about = "Mission map dashboard client")]
pub struct Cli {
    /// Overrides DASHBOARD_STATE_DIR.
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the mission dataset and print its bounds.
    Missions,
    /// Mount a headless map, sync it with the missions and print the result.
    Map(MapArgs),
    Register(RegisterArgs),
    Login(LoginArgs),
    Logout,
    VerifyEmail(VerifyEmailArgs),
    /// Confirm the stored session with the backend.
    Whoami,
    /// Take a position fix and center the map on it.
    Locate(LocateArgs),
}

#[derive(Args, Debug)]
pub struct MapArgs {
    /// Click the point layer at `lng,lat` after syncing.
    #[arg(long)]
    pub click: Option<String>,
    /// Reset the view to the default center afterwards.
    #[arg(long, default_value_t = false)]
    pub home: bool,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long, env = "DASHBOARD_PASSWORD", hide_env_values = true)]
    pub password: String,
    #[arg(long, default_value = "")]
    pub first_name: String,
    #[arg(long, default_value = "")]
    pub last_name: String,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long, env = "DASHBOARD_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Args, Debug)]
pub struct VerifyEmailArgs {
    /// Key from the verification link, percent-encoded or not.
    pub key: String,
}

#[derive(Args, Debug)]
pub struct LocateArgs {
    /// Fix to report instead of DASHBOARD_GPS_FIX, as `lng,lat`.
    #[arg(long)]
    pub fix: Option<String>,
}
