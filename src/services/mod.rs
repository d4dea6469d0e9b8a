pub mod broadcaster;
pub mod intake;
pub mod registry;
pub mod storage;
