mod args;
mod render;

pub use args::CliArgs;
pub(crate) use render::{error_details, progress_lines};
