pub mod addressing;
pub mod composite;
pub mod config;
pub mod error;
pub mod leaf;
pub mod stream;
pub mod window;

pub use addressing::{BLOCK_COPY_SIZE, bits_to_bytes, bytes_needed};
pub use composite::CompositeStream;
pub use config::BitwiseConfig;
pub use error::{Result, StreamError};
pub use leaf::LeafStream;
pub use stream::{Anchor, BitwiseStream, GROW_FILLER, Stream};
pub use window::{Resource, SharedResource, Window, share};
