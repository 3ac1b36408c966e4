pub mod codec;

pub use codec::{Claims, TokenCodec, TokenError};
