//! Tether Core Library
//!
//! Engine-independent half of a host/guest memory bridge. A guest module owns
//! one flat, relocatable byte buffer; the host owns reference-semantic values.
//! This crate lets the two exchange primitives, strings, byte buffers and
//! opaque object handles across repeated calls.
//!
//! # Key Components
//!
//! - **Heap**: slot table mapping integer handles to host values
//! - **View**: typed views over guest memory, rebuilt when the buffer moves
//! - **Codec**: strict UTF-8 decode and two-phase encode into guest memory
//! - **Closure**: reference-counted adapters for calling guest closures
//! - **Intrinsics**: bodies of the `__wbindgen_*` host imports
//!
//! # Example
//!
//! ```ignore
//! use tether_core::prelude::*;
//!
//! let mut guest = MockGuest::new(1024);
//! let slice = codec::encode("hello", &mut guest)?;
//! let handle = intrinsics::string_new(&mut guest, slice.ptr, slice.len)?;
//! assert_eq!(guest.bridge().get(handle)?.as_str(), Some("hello"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod closure;
pub mod codec;
pub mod debug;
pub mod error;
pub mod exception;
pub mod guest;
pub mod heap;
pub mod intrinsics;
pub mod prelude;
pub mod testing;
pub mod value;
pub mod view;

pub use bridge::{Bridge, HostContext};
pub use closure::{Closure, ClosureFlavor};
pub use error::{BridgeError, Result};
pub use guest::{ClosureGuest, GuestMemory, GuestSlice, Word};
pub use heap::SlotTable;
pub use value::{HostError, HostObject, HostValue};
pub use view::{TypedView, ViewCache};
