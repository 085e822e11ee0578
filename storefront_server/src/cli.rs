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
    const DISPLAY_ENVS: [&str; 21] = [
        "RUST_LOG",
        "SF_HOST",
        "SF_PORT",
        "SF_DATABASE_URL",
        "SF_USE_X_FORWARDED_FOR",
        "SF_USE_FORWARDED",
        "SF_TAX_RATE_BPS",
        "SF_RETURN_WINDOW_DAYS",
        "SF_PAYMENT_POLL_INTERVAL",
        "SF_PAYMENT_EXPIRY_HOURS",
        "SF_NOTIFICATION_URL",
        "SF_EVENT_BUFFER_SIZE",
        "SF_CARD_API_URL",
        "SF_PAYPAL_API_URL",
        "SF_BTC_GATEWAY_URL",
        "SF_BTC_CONFIRMATIONS",
        "SF_XMR_GATEWAY_URL",
        "SF_XMR_CONFIRMATIONS",
        "SF_RATE_API_URL",
        "SF_HTTP_TIMEOUT",
        "SF_TOKEN_LIFETIME_HOURS",
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
