pub mod proxy;
pub mod resolve;
pub mod viewer;
pub mod ws;
