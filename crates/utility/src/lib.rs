pub mod poll;
pub mod shutdown_signal;
