use crate::cli::actions::Action;
use anyhow::{Context, Result};

/// Map parsed arguments onto an `Action`.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let (name, sub) = matches
        .subcommand()
        .context("a subcommand is required, try --help")?;

    let action = match name {
        "login" => Action::Login {
            username: sub.get_one::<String>("username").cloned(),
        },
        "logout" => Action::Logout,
        "status" => Action::Status,
        "register" => Action::Register {
            username: sub
                .get_one::<String>("username")
                .cloned()
                .context("missing required argument: --username")?,
            email: sub
                .get_one::<String>("email")
                .cloned()
                .context("missing required argument: --email")?,
            department: sub.get_one::<String>("department").cloned(),
        },
        "projects" => Action::Projects,
        "audit" => Action::Audit,
        "stego" => match sub.subcommand() {
            Some(("hide", hide)) => Action::StegoHide {
                cover: hide
                    .get_one::<std::path::PathBuf>("cover")
                    .cloned()
                    .context("missing required argument: --cover")?,
                message: hide
                    .get_one::<String>("message")
                    .cloned()
                    .context("missing required argument: --message")?,
            },
            Some(("extract", extract)) => Action::StegoExtract {
                image: extract
                    .get_one::<std::path::PathBuf>("image")
                    .cloned()
                    .context("missing required argument: --image")?,
            },
            _ => anyhow::bail!("stego requires `hide` or `extract`"),
        },
        "health" => Action::Health,
        other => anyhow::bail!("unknown subcommand: {other}"),
    };

    Ok(action)
}
