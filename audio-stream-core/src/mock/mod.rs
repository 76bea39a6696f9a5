//! In-process audio driver for exercising streams without hardware.

mod driver;

pub use driver::MockDriver;
