//! Shared utility helpers

pub mod filenames;
