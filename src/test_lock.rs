//! This module contains a lock that serializes the heavy multi-threaded
//! tests.
use crate::loom_bindings::sync::Mutex;

pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());
