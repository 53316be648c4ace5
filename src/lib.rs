pub mod audio;
pub mod config;
pub mod device;
pub mod feed;
pub mod item;
pub mod media;
pub mod runtime;
pub mod source;
pub mod viewer;
