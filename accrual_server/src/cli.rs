use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 15] = [
        "RUST_LOG",
        "LPS_DATABASE_URL",
        "LPS_DB_MAX_CONNECTIONS",
        "LPS_ACCRUAL_SYSTEM_ADDRESS",
        "LPS_ORACLE_TIMEOUT_MS",
        "LPS_DEFAULT_RETRY_AFTER_SECS",
        "LPS_MAX_RETRY_AFTER_SECS",
        "LPS_WORKERS",
        "LPS_POLL_INTERVAL_MS",
        "LPS_RETRY_BASE_MS",
        "LPS_RETRY_CAP_MS",
        "LPS_MAX_RETRY_ATTEMPTS",
        "LPS_RETRY_JITTER",
        "LPS_RECOVERY_SWEEP",
        "LPS_SWEEP_INTERVAL_SECS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
