//! Prelude for convenient imports.
//!
//! ```ignore
//! use tether_core::prelude::*;
//! ```

// Bridge state
pub use crate::bridge::{Bridge, HostContext};
pub use crate::exception::{ExceptionRegister, handle_error};
pub use crate::heap::{FALSE, HEAP_RESERVED, NULL, SlotTable, TRUE, UNDEFINED};

// Error handling
pub use crate::error::{BridgeError, Result};

// Guest seams
pub use crate::guest::{ClosureGuest, GuestMemory, GuestSlice, Word};
pub use crate::view::{TypedView, ViewCache};

// Values and adapters
pub use crate::closure::{Closure, ClosureFlavor};
pub use crate::value::{HostError, HostObject, HostValue};

// Codec and intrinsics
pub use crate::{codec, intrinsics};

// Testing
pub use crate::testing::MockGuest;
