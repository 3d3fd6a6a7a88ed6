//! Error types for the bridge.
//!
//! Every error carries the handle, pointer or export name involved so that a
//! failure at the host/guest boundary can be traced back to the call site.

use thiserror::Error;

/// The main error type for bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    // =========================================================================
    // Host Object Table Errors (E100-E199)
    // =========================================================================
    /// Handle does not refer to a live slot.
    #[error("E101: Invalid handle {handle}: {cause}")]
    InvalidHandle {
        /// The offending handle.
        handle: u32,
        /// Why the handle was rejected.
        cause: String,
    },

    /// Handle was released twice.
    #[error("E102: Handle {handle} released twice")]
    DoubleRelease {
        /// The handle that was already on the free list.
        handle: u32,
    },

    /// The borrowed-object stack has no room left.
    #[error("E103: Borrowed-object stack exhausted ({depth} slots in use)")]
    StackExhausted {
        /// Number of stack slots in use.
        depth: u32,
    },

    /// A borrowed-object pop without a matching push.
    #[error("E104: Borrowed-object stack underflow")]
    StackUnderflow,

    /// Value in a slot was not of the expected kind.
    #[error("E105: Handle {handle} holds {actual}, expected {expected}")]
    UnexpectedValue {
        /// The handle inspected.
        handle: u32,
        /// The kind that was expected.
        expected: &'static str,
        /// The kind that was found.
        actual: &'static str,
    },

    // =========================================================================
    // Memory / View Errors (E200-E299)
    // =========================================================================
    /// Access outside the guest buffer.
    #[error("E201: Out-of-bounds guest memory access: offset={offset}, size={size}, buffer={buffer_len}")]
    OutOfBounds {
        /// Byte offset of the access.
        offset: u64,
        /// Size of the access in bytes.
        size: u64,
        /// Current guest buffer length.
        buffer_len: u64,
    },

    /// Element index not aligned to the view width.
    #[error("E202: Pointer {ptr} is not aligned to {width} bytes")]
    Misaligned {
        /// The byte pointer.
        ptr: u32,
        /// Element width of the view.
        width: usize,
    },

    /// Guest allocator failed.
    #[error("E203: Guest allocation of {requested} bytes failed: {cause}")]
    GuestAlloc {
        /// Requested size in bytes.
        requested: u64,
        /// Reason reported by the guest or engine.
        cause: String,
    },

    // =========================================================================
    // Codec Errors (E300-E399)
    // =========================================================================
    /// Guest bytes were not valid UTF-8.
    #[error("E301: Invalid UTF-8 at guest offset {ptr} (len {len}): {cause}")]
    InvalidUtf8 {
        /// Start of the decoded range.
        ptr: u32,
        /// Length of the decoded range.
        len: u32,
        /// Decoder message.
        cause: String,
    },

    /// Text too large to address in 32-bit guest memory.
    #[error("E302: Text of {units} units exceeds guest address space")]
    TextTooLarge {
        /// Number of text units.
        units: usize,
    },

    // =========================================================================
    // Closure Errors (E400-E499)
    // =========================================================================
    /// Closure environment already released.
    #[error("E401: Closure {trampoline} invoked after release")]
    ClosureReleased {
        /// Trampoline export the closure is bound to.
        trampoline: String,
    },

    /// Guest destructor failed.
    #[error("E402: Destructor {destructor} failed: {cause}")]
    ClosureDestructor {
        /// Destructor table index.
        destructor: u32,
        /// Reason reported by the guest.
        cause: String,
    },

    /// Trampoline invocation failed.
    #[error("E403: Trampoline '{trampoline}' failed: {cause}")]
    Trampoline {
        /// Trampoline export name.
        trampoline: String,
        /// Reason reported by the guest.
        cause: String,
    },

    /// Closure invoked again while a call into it is still in flight.
    #[error("E404: Closure {trampoline} invoked recursively")]
    ClosureReentered {
        /// Trampoline export the closure is bound to.
        trampoline: String,
    },

    // =========================================================================
    // Exception Errors (E500-E599)
    // =========================================================================
    /// A host failure that could not be delivered to the guest.
    #[error("E501: Host exception could not be stored: {cause}")]
    ExceptionStore {
        /// Reason for the failure.
        cause: String,
    },

    /// Guest raised an error through `__wbindgen_throw`.
    #[error("E502: Guest threw: {message}")]
    GuestThrow {
        /// The message the guest passed.
        message: String,
    },

    // =========================================================================
    // WASM Errors (E700-E799)
    // =========================================================================
    /// Failed to compile or validate a module.
    #[error("E701: Failed to load WASM module '{module}': {cause}")]
    WasmLoad {
        /// Module name or URL.
        module: String,
        /// Reason for the failure.
        cause: String,
    },

    /// Guest execution failed.
    #[error("E702: WASM execution failed in '{export}': {cause}")]
    WasmExecution {
        /// The export being executed.
        export: String,
        /// Reason for the failure.
        cause: String,
    },

    /// Required guest export missing or mistyped.
    #[error("E703: Missing or invalid export '{export}': {cause}")]
    MissingExport {
        /// The export name.
        export: String,
        /// Reason it was rejected.
        cause: String,
    },

    /// Host function registration failed.
    #[error("E704: WASM host function '{function}' failed: {cause}")]
    WasmHostFunction {
        /// The host function name.
        function: String,
        /// Reason for the failure.
        cause: String,
    },

    /// Bridge used before the instance was finalized.
    #[error("E705: Bridge not initialized: {cause}")]
    NotInitialized {
        /// What was attempted.
        cause: String,
    },

    // =========================================================================
    // IO / Config / Network Errors (E900-E999)
    // =========================================================================
    /// Filesystem failure.
    #[error("E901: IO error at {path}: {cause}")]
    Io {
        /// Path involved.
        path: String,
        /// Reason for the failure.
        cause: String,
    },

    /// Network failure.
    #[error("E902: Network error fetching {url}: {cause}")]
    Network {
        /// URL being fetched.
        url: String,
        /// Reason for the failure.
        cause: String,
    },

    /// Invalid configuration.
    #[error("E903: Invalid configuration '{field}': {cause}")]
    Config {
        /// Configuration field.
        field: String,
        /// Reason it was rejected.
        cause: String,
    },
}

impl BridgeError {
    /// Stable error code, useful for log filtering.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidHandle { .. } => "E101",
            Self::DoubleRelease { .. } => "E102",
            Self::StackExhausted { .. } => "E103",
            Self::StackUnderflow => "E104",
            Self::UnexpectedValue { .. } => "E105",
            Self::OutOfBounds { .. } => "E201",
            Self::Misaligned { .. } => "E202",
            Self::GuestAlloc { .. } => "E203",
            Self::InvalidUtf8 { .. } => "E301",
            Self::TextTooLarge { .. } => "E302",
            Self::ClosureReleased { .. } => "E401",
            Self::ClosureDestructor { .. } => "E402",
            Self::Trampoline { .. } => "E403",
            Self::ClosureReentered { .. } => "E404",
            Self::ExceptionStore { .. } => "E501",
            Self::GuestThrow { .. } => "E502",
            Self::WasmLoad { .. } => "E701",
            Self::WasmExecution { .. } => "E702",
            Self::MissingExport { .. } => "E703",
            Self::WasmHostFunction { .. } => "E704",
            Self::NotInitialized { .. } => "E705",
            Self::Io { .. } => "E901",
            Self::Network { .. } => "E902",
            Self::Config { .. } => "E903",
        }
    }

    /// Whether the error reflects a broken handle contract by the guest.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidHandle { .. }
                | Self::DoubleRelease { .. }
                | Self::StackUnderflow
                | Self::ClosureReleased { .. }
                | Self::ClosureReentered { .. }
        )
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_prefixed_in_display() {
        let err = BridgeError::DoubleRelease { handle: 140 };
        assert_eq!(err.code(), "E102");
        assert!(err.to_string().starts_with("E102:"));
    }

    #[test]
    fn contract_violations() {
        assert!(BridgeError::StackUnderflow.is_contract_violation());
        assert!(
            BridgeError::InvalidHandle {
                handle: 9000,
                cause: "out of range".into()
            }
            .is_contract_violation()
        );
        assert!(
            !BridgeError::GuestThrow {
                message: "boom".into()
            }
            .is_contract_violation()
        );
    }
}
