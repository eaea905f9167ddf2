// Utility modules shared by services and the HTTP layer

pub mod common;
pub mod logger;
