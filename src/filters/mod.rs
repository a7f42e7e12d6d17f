pub mod exec;
pub mod factory;
pub mod signal;
pub mod spec;

pub use exec::process_data;
pub use factory::create_data_operators;
pub use spec::{FilterSpec, Operation};
