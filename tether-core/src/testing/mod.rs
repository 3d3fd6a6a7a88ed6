//! In-process guest for exercising the bridge without an engine.
//!
//! [`MockGuest`] keeps its linear memory in a `Vec` with a bump allocator.
//! Growing memory moves it to a fresh allocation, the same way a real guest
//! buffer is replaced on growth, so stale views are observable in tests.
//!
//! # Example
//!
//! ```ignore
//! use tether_core::testing::MockGuest;
//! use tether_core::closure::Closure;
//!
//! let mut guest = MockGuest::new(256);
//! let handler = Closure::repeatable(0x100, 0, 7, "invoke");
//! handler.invoke(&mut guest, &[])?;
//! assert_eq!(guest.invocations().len(), 1);
//! ```

pub mod mock_guest;

pub use mock_guest::{MockGuest, TrampolineCall};
