pub mod scheduler;

pub use scheduler::{JobScheduler, JobTask};
