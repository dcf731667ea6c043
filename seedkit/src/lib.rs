//! Entry point for `SeedKit` bindings. Everything lives in [`seedkit_core`];
//! this crate only re-exports it so the foreign libraries get a stable name.

pub use seedkit_core::*;
