pub mod ask;
pub mod bootstrap;
pub mod classify;
pub mod export;
pub mod load;
pub mod status;
