pub mod hosts;
pub mod registry;
