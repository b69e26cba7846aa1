pub mod enrollment;
pub mod execute;
pub mod scheduler;
