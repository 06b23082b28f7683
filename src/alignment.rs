pub mod inventory;
pub mod phonemes;
pub mod transcript;

pub use inventory::PhonemeInventory;
pub use phonemes::{align, frame_times};
