mod exports;
pub use exports::*;

pub mod error;
pub mod scanner;
pub mod compression;
pub mod projdata;
pub mod space;
pub mod fov;
pub mod image;
pub mod index;
pub mod engine;
pub mod projector;
pub mod config;
pub mod utils;
