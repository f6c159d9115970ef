// ABOUTME: Command implementations behind the CLI
// ABOUTME: Exports run, check and status

pub mod check;
pub mod run;
pub mod status;

pub use check::check;
pub use run::run;
pub use status::status;
