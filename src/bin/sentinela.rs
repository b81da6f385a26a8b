use anyhow::Result;
use sentinela::cli::{actions, actions::Action, start};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    // Start the program
    let (action, globals) = start()?;

    // Handle the action
    match action {
        Action::Login { username } => actions::session::login(username, &globals).await?,
        Action::Logout => actions::session::logout(&globals).await?,
        Action::Status => actions::session::status(&globals).await?,
        Action::Health => actions::session::health(&globals).await?,
        Action::Register {
            username,
            email,
            department,
        } => actions::api::register(username, email, department, &globals).await?,
        Action::Projects => actions::api::projects(&globals).await?,
        Action::Audit => actions::api::audit(&globals).await?,
        Action::StegoHide { cover, message } => {
            actions::api::stego_hide(&cover, &message, &globals).await?;
        }
        Action::StegoExtract { image } => actions::api::stego_extract(&image, &globals).await?,
    }

    Ok(())
}
