mod restart;
pub use restart::RestartStrategy;
