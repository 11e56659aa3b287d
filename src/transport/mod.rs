//! JSON-RPC transport framing. Minimal by design — see module docs on
//! [`stdio`].

pub mod stdio;
