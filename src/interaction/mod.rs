pub mod retry;
pub mod wait;
