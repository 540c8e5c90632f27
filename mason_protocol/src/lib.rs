// mason_protocol — wire protocol for the Mason multiplayer session layer.
//
// This crate defines the message vocabulary and text codec used by hosts
// and clients to keep a shared world (player positions, block edits)
// consistent over TCP. It is shared by both sides and has no dependency on
// the session core or any engine code.
//
// Module overview:
// - `types.rs`:   Core value types — `PlayerId`, `Slot`, `Vec3`, `BlockKind`,
//                 and the `BLOCK_EPSILON` positional-identity tolerance.
// - `message.rs`: The `Message` enum covering the full protocol vocabulary.
// - `codec.rs`:   `encode`/`decode` for the pipe- and colon-delimited ASCII
//                 grammar, plus `DecodeError`.
//
// Design decisions:
// - **Hand-written text grammar.** The wire format predates this crate and
//   is compatibility-critical, so it is parsed by hand rather than through
//   a serialization framework.
// - **No framing.** One logical message per send call, no length prefix.
//   This matches the deployed protocol; the coalescing hazard it creates on
//   a stream socket is documented in `codec.rs` rather than fixed.
// - **No I/O.** Pure functions over byte slices, usable from any transport.

pub mod codec;
pub mod message;
pub mod types;

pub use codec::{DecodeError, decode, encode};
pub use message::Message;
pub use types::{BLOCK_EPSILON, BlockKind, PlayerId, Slot, Vec3};
