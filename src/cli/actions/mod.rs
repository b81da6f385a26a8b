pub mod api;
pub mod session;

use std::path::PathBuf;

/// Everything the CLI can be asked to do.
#[derive(Debug)]
pub enum Action {
    Login { username: Option<String> },
    Logout,
    Status,
    Register {
        username: String,
        email: String,
        department: Option<String>,
    },
    Projects,
    Audit,
    StegoHide { cover: PathBuf, message: String },
    StegoExtract { image: PathBuf },
    Health,
}
