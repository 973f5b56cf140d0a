pub mod config;
pub mod locator;
pub mod preflight;
pub mod render;
pub mod resource;
pub mod storage;
pub mod viewer;
pub mod web;
