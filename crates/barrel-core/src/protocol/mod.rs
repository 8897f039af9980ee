//! Protocol module containing message types, version negotiation, and the binary codec.

pub mod codec;
pub mod messages;
pub mod semver;

pub use codec::{
    decode_client_handshake, decode_client_status, decode_server_frame, encode_client_handshake,
    encode_client_status, encode_error_frame, encode_server_announce,
    encode_server_announce_into, encode_server_status, encode_server_status_into, ProtocolError,
};
pub use messages::*;
pub use semver::{compatible, SemVer, SERVER_VERSION};
