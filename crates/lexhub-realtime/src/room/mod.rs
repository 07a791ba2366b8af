//! Room membership: which connections are in which rooms.

pub mod index;
pub mod room;
pub mod subscription;

pub use index::RoomIndex;
pub use room::Room;
