mod mutex;

pub mod hint {
    pub use std::hint::spin_loop;
}

pub mod sync {
    pub use std::sync::Arc;

    pub use crate::loom_bindings::std::mutex::Mutex;

    pub mod atomic {
        pub use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, AtomicUsize};
    }
}

pub mod thread {
    pub use std::thread::{current, spawn, yield_now, JoinHandle};
}
