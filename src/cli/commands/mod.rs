use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};
use std::path::PathBuf;

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    Command::new("sentinela")
        .about("SecureTeam Access client")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("api-url")
                .short('u')
                .long("api-url")
                .help("Base URL of the SecureTeam Access backend API")
                .default_value("http://localhost:8080/secureteam-access/api")
                .env("SENTINELA_API_URL")
                .global(true),
        )
        .arg(
            Arg::new("state-dir")
                .long("state-dir")
                .help("Directory holding the session token and device identity")
                .env("SENTINELA_STATE_DIR")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("SENTINELA_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .subcommand(
            Command::new("login")
                .about("Establish a session: credentials followed by a one-time code")
                .arg(
                    Arg::new("username")
                        .long("username")
                        .help("User identity (prompted when omitted)"),
                ),
        )
        .subcommand(Command::new("logout").about("End the session and clear the stored token"))
        .subcommand(Command::new("status").about("Show session, backend, and client status"))
        .subcommand(
            Command::new("register")
                .about("Register a new user account")
                .arg(
                    Arg::new("username")
                        .long("username")
                        .help("User identity")
                        .required(true),
                )
                .arg(
                    Arg::new("email")
                        .long("email")
                        .help("Contact email")
                        .required(true),
                )
                .arg(
                    Arg::new("department")
                        .long("department")
                        .help("Department used for access policy evaluation"),
                ),
        )
        .subcommand(Command::new("projects").about("List projects the session is scoped to"))
        .subcommand(Command::new("audit").about("Fetch the access audit log"))
        .subcommand(
            Command::new("stego")
                .about("Steganographic payload operations")
                .subcommand_required(true)
                .subcommand(
                    Command::new("hide")
                        .about("Embed a message into a cover image")
                        .arg(
                            Arg::new("cover")
                                .long("cover")
                                .help("Path to the cover image")
                                .value_parser(clap::value_parser!(PathBuf))
                                .required(true),
                        )
                        .arg(
                            Arg::new("message")
                                .long("message")
                                .help("Message to embed")
                                .required(true),
                        ),
                )
                .subcommand(
                    Command::new("extract")
                        .about("Extract a hidden message from a stego image")
                        .arg(
                            Arg::new("image")
                                .long("image")
                                .help("Path to the stego image")
                                .value_parser(clap::value_parser!(PathBuf))
                                .required(true),
                        ),
                ),
        )
        .subcommand(Command::new("health").about("Probe backend liveness once"))
}
