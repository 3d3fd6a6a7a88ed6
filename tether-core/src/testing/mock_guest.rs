//! Vec-backed guest with a bump allocator and call recording.

use crate::bridge::{Bridge, HostContext};
use crate::closure::Closure;
use crate::error::{BridgeError, Result};
use crate::guest::{ClosureGuest, GuestMemory, Word};
use crate::view::ViewCache;

/// Start of the allocatable region; zero stays the null pointer.
const HEAP_BASE: u32 = 8;
const ALIGN: u32 = 8;

/// One recorded trampoline call.
#[derive(Debug, Clone, PartialEq)]
pub struct TrampolineCall {
    /// Trampoline export name.
    pub trampoline: String,
    /// Environment pointer the trampoline received.
    pub env_ptr: u32,
    /// Second environment word.
    pub env_extra: u32,
    /// Arguments passed.
    pub args: Vec<Word>,
    /// `(refcount, env_ptr)` of the observed closure during the call.
    pub observed: Option<(u32, u32)>,
}

/// A guest implemented in Rust, for tests.
#[derive(Debug)]
pub struct MockGuest {
    memory: Vec<u8>,
    bridge: Bridge,
    next_alloc: u32,
    realloc_enabled: bool,
    malloc_calls: usize,
    realloc_calls: usize,
    free_calls: usize,
    grow_calls: usize,
    invocations: Vec<TrampolineCall>,
    destructions: Vec<(u32, u32, u32)>,
    fail_next: Option<String>,
    observed: Option<Closure>,
    cb_drop_target: Option<Closure>,
    cb_drop_results: Vec<bool>,
    reinvoke_target: Option<Closure>,
    reinvoke_results: Vec<Result<()>>,
}

impl MockGuest {
    /// A guest with `size` bytes of memory.
    pub fn new(size: usize) -> Self {
        Self {
            memory: vec![0; size],
            bridge: Bridge::new(),
            next_alloc: HEAP_BASE,
            realloc_enabled: true,
            malloc_calls: 0,
            realloc_calls: 0,
            free_calls: 0,
            grow_calls: 0,
            invocations: Vec::new(),
            destructions: Vec::new(),
            fail_next: None,
            observed: None,
            cb_drop_target: None,
            cb_drop_results: Vec::new(),
            reinvoke_target: None,
            reinvoke_results: Vec::new(),
        }
    }

    /// Pretend the guest exports no reallocator.
    pub fn without_realloc(mut self) -> Self {
        self.realloc_enabled = false;
        self
    }

    /// Skip `size` bytes of the allocator, returning where they start.
    pub fn reserve(&mut self, size: u32) -> u32 {
        let ptr = self.next_alloc;
        self.next_alloc = align_up(ptr + size);
        self.ensure_capacity(self.next_alloc);
        ptr
    }

    /// Grow memory by `extra` bytes, moving it to a new allocation.
    pub fn grow(&mut self, extra: usize) {
        let mut grown = Vec::with_capacity(self.memory.len() + extra);
        grown.extend_from_slice(&self.memory);
        grown.resize(self.memory.len() + extra, 0);
        self.memory = grown;
        self.grow_calls += 1;
        tracing::trace!(len = self.memory.len(), "mock guest memory grown");
    }

    /// Current memory size in bytes.
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// The view cache, for inspecting its counters.
    pub fn views(&self) -> &ViewCache {
        self.bridge.views()
    }

    /// Number of `malloc` calls.
    pub fn malloc_calls(&self) -> usize {
        self.malloc_calls
    }

    /// Number of `realloc` calls.
    pub fn realloc_calls(&self) -> usize {
        self.realloc_calls
    }

    /// Number of `free` calls.
    pub fn free_calls(&self) -> usize {
        self.free_calls
    }

    /// Number of memory growths.
    pub fn grow_calls(&self) -> usize {
        self.grow_calls
    }

    /// Trampoline calls so far.
    pub fn invocations(&self) -> &[TrampolineCall] {
        &self.invocations
    }

    /// Destructor calls so far, as `(destructor, env_ptr, env_extra)`.
    pub fn destructions(&self) -> &[(u32, u32, u32)] {
        &self.destructions
    }

    /// Make the next trampoline call fail with `message`.
    pub fn fail_next_invoke(&mut self, message: impl Into<String>) {
        self.fail_next = Some(message.into());
    }

    /// Record `closure`'s refcount and pointer from inside each call.
    pub fn observe_during_invoke(&mut self, closure: Closure) {
        self.observed = Some(closure);
    }

    /// Have the next trampoline call drop `closure` from the guest side.
    pub fn cb_drop_during_next_invoke(&mut self, closure: Closure) {
        self.cb_drop_target = Some(closure);
    }

    /// Results of guest-side drops made during calls.
    pub fn cb_drop_results(&self) -> &[bool] {
        &self.cb_drop_results
    }

    /// Have the next trampoline call invoke `closure` again.
    pub fn reinvoke_during_next_invoke(&mut self, closure: Closure) {
        self.reinvoke_target = Some(closure);
    }

    /// Results of reentrant invocations made during calls.
    pub fn reinvoke_results(&self) -> &[Result<()>] {
        &self.reinvoke_results
    }

    fn bump(&mut self, size: u32) -> u32 {
        let ptr = self.next_alloc;
        self.next_alloc = align_up(ptr + size.max(1));
        self.ensure_capacity(self.next_alloc);
        ptr
    }

    fn ensure_capacity(&mut self, end: u32) {
        let end = end as usize;
        if end > self.memory.len() {
            let extra = (end - self.memory.len()).max(self.memory.len());
            self.grow(extra);
        }
    }
}

fn align_up(value: u32) -> u32 {
    value.div_ceil(ALIGN) * ALIGN
}

impl GuestMemory for MockGuest {
    fn memory_and_views(&mut self) -> (&mut [u8], &mut ViewCache) {
        (&mut self.memory, self.bridge.views_mut())
    }

    fn malloc(&mut self, size: u32) -> Result<u32> {
        self.malloc_calls += 1;
        Ok(self.bump(size))
    }

    fn realloc(&mut self, ptr: u32, old_size: u32, new_size: u32) -> Result<u32> {
        self.realloc_calls += 1;
        if new_size <= old_size {
            return Ok(ptr);
        }
        let new_ptr = self.bump(new_size);
        let (from, to) = (ptr as usize, new_ptr as usize);
        self.memory
            .copy_within(from..from + old_size as usize, to);
        Ok(new_ptr)
    }

    fn free(&mut self, _ptr: u32, _size: u32) -> Result<()> {
        self.free_calls += 1;
        Ok(())
    }

    fn supports_realloc(&self) -> bool {
        self.realloc_enabled
    }
}

impl HostContext for MockGuest {
    fn bridge(&mut self) -> &mut Bridge {
        &mut self.bridge
    }
}

impl ClosureGuest for MockGuest {
    fn invoke_trampoline(
        &mut self,
        trampoline: &str,
        env_ptr: u32,
        env_extra: u32,
        args: &[Word],
    ) -> Result<()> {
        let observed = self
            .observed
            .as_ref()
            .map(|c| (c.refcount(), c.env_ptr()));
        self.invocations.push(TrampolineCall {
            trampoline: trampoline.to_string(),
            env_ptr,
            env_extra,
            args: args.to_vec(),
            observed,
        });

        if let Some(target) = self.cb_drop_target.take() {
            self.cb_drop_results.push(target.cb_drop());
        }
        if let Some(target) = self.reinvoke_target.take() {
            let result = target.invoke(self, args);
            self.reinvoke_results.push(result);
        }
        match self.fail_next.take() {
            Some(cause) => Err(BridgeError::Trampoline {
                trampoline: trampoline.to_string(),
                cause,
            }),
            None => Ok(()),
        }
    }

    fn destroy_closure(&mut self, destructor: u32, env_ptr: u32, env_extra: u32) -> Result<()> {
        self.destructions.push((destructor, env_ptr, env_extra));
        Ok(())
    }
}
