pub mod arm;
pub mod emit;
pub mod frame;
