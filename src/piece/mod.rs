mod bitfield;
mod store;

pub use bitfield::Bitfield;
pub use store::PieceStore;
