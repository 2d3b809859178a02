pub mod catalog;
pub mod config;
pub mod platform;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod shuffle;
pub mod view;
