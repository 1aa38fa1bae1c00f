pub mod logger;
pub mod retry;
pub mod runner;

pub use logger::setup_logger;
pub use runner::WorkerRunner;
