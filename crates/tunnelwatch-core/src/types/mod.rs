mod common;
mod device;
mod flow;

pub use common::*;
pub use device::*;
pub use flow::*;
