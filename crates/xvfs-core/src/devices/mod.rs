//! Device backends.

pub mod disc_image;

pub use disc_image::{DiscImageDevice, DiscImageEntry, DiscImageFile};
