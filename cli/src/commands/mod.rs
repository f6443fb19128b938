//! CLI command implementations

pub mod chat;
pub mod import;
pub mod run;
pub mod script;
pub mod tools;
pub mod whoami;

pub use chat::chat_command;
pub use import::import_command;
pub use run::run_command;
pub use script::script_command;
pub use tools::tools_command;
pub use whoami::whoami_command;
