pub mod cache;
pub mod covers;
pub mod library;
pub mod monogram;
pub mod progress;
pub mod resolver;
pub mod storage;
