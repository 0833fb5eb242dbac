pub mod approval;
pub mod audit;
pub mod environment;
pub mod lock;
pub mod role;
