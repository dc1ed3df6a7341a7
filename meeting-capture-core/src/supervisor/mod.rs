pub mod command;
pub mod process_supervisor;
