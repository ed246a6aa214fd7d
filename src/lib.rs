pub mod affinity;
pub mod cas;
pub mod config;
pub mod csemutex;
pub mod harness;

pub use crate::csemutex::{CseMutex, Mutex, MutexGuard};
