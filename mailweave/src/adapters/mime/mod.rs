//! Raw message parsing and decoding to text fragments

mod charset;
mod decode;
mod raw;

pub use charset::decode_text;
pub use decode::{
    decode, decode_header_value, decode_part, split_address_list, transfer_decode,
    DecodedHeaders, DecodedMessage,
};
pub use raw::{RawHeader, RawMessage, RawPart};
