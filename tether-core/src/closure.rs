//! Closure call adapters.
//!
//! A guest closure crosses the boundary as a two-word environment
//! (`env_ptr`, `env_extra`) plus the index of a guest destructor. The host
//! keeps that record behind an `Rc` so every heap slot and every in-flight call
//! shares one state, and counts references explicitly: one for the owner (the
//! guest, or whoever holds the adapter) and one per in-flight invocation.
//!
//! Each invocation runs under a guard. Settling the guard, on return or on
//! unwind, either restores `env_ptr` or, once the count reaches zero, hands the
//! environment back to the guest destructor.

use crate::error::{BridgeError, Result};
use crate::guest::{ClosureGuest, Word};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// How an adapter treats its environment across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureFlavor {
    /// Persistent handler, callable any number of times.
    #[default]
    Repeatable,
    /// One-time callback; the first call consumes it.
    SingleShot,
}

struct ClosureState {
    env_ptr: Cell<u32>,
    original_env: u32,
    env_extra: u32,
    count: Cell<u32>,
    owner_released: Cell<bool>,
    destroyed: Cell<bool>,
    destructor: u32,
    trampoline: Rc<str>,
    flavor: ClosureFlavor,
}

impl ClosureState {
    fn released_error(&self) -> BridgeError {
        BridgeError::ClosureReleased {
            trampoline: self.trampoline.to_string(),
        }
    }

    fn decrement(&self) -> u32 {
        let remaining = self.count.get().saturating_sub(1);
        self.count.set(remaining);
        remaining
    }

    /// Give up the owner's reference. Returns false if it was already given up.
    fn release_owner(&self) -> bool {
        if self.owner_released.replace(true) {
            return false;
        }
        self.decrement();
        true
    }

    fn destroy<G: ClosureGuest + ?Sized>(&self, guest: &mut G) -> Result<()> {
        if self.destroyed.replace(true) {
            return Ok(());
        }
        self.env_ptr.set(0);
        tracing::debug!(
            trampoline = %self.trampoline,
            destructor = self.destructor,
            "destroying closure environment"
        );
        guest
            .destroy_closure(self.destructor, self.original_env, self.env_extra)
            .map_err(|e| BridgeError::ClosureDestructor {
                destructor: self.destructor,
                cause: e.to_string(),
            })
    }
}

/// A guest closure callable from the host.
#[derive(Clone)]
pub struct Closure(Rc<ClosureState>);

impl Closure {
    /// Wrap a guest closure environment.
    pub fn new(
        env_ptr: u32,
        env_extra: u32,
        destructor: u32,
        trampoline: impl Into<Rc<str>>,
        flavor: ClosureFlavor,
    ) -> Self {
        Self(Rc::new(ClosureState {
            env_ptr: Cell::new(env_ptr),
            original_env: env_ptr,
            env_extra,
            count: Cell::new(1),
            owner_released: Cell::new(false),
            destroyed: Cell::new(false),
            destructor,
            trampoline: trampoline.into(),
            flavor,
        }))
    }

    /// A persistent handler.
    pub fn repeatable(
        env_ptr: u32,
        env_extra: u32,
        destructor: u32,
        trampoline: impl Into<Rc<str>>,
    ) -> Self {
        Self::new(
            env_ptr,
            env_extra,
            destructor,
            trampoline,
            ClosureFlavor::Repeatable,
        )
    }

    /// A one-time callback.
    pub fn single_shot(
        env_ptr: u32,
        env_extra: u32,
        destructor: u32,
        trampoline: impl Into<Rc<str>>,
    ) -> Self {
        Self::new(
            env_ptr,
            env_extra,
            destructor,
            trampoline,
            ClosureFlavor::SingleShot,
        )
    }

    /// Call the closure through its trampoline.
    ///
    /// Errors from the trampoline take precedence over errors from settling.
    pub fn invoke<G: ClosureGuest + ?Sized>(&self, guest: &mut G, args: &[Word]) -> Result<()> {
        let mut call = Invocation::enter(Rc::clone(&self.0), guest)?;
        let outcome = call.run(args);
        let settled = call.settle();
        outcome.and(settled)
    }

    /// Drop the owner's reference from the host side.
    ///
    /// Runs the guest destructor when no call is in flight. Returns whether the
    /// environment was destroyed now.
    pub fn drop_ref<G: ClosureGuest + ?Sized>(&self, guest: &mut G) -> Result<bool> {
        let state = &self.0;
        if !state.release_owner() {
            return Ok(false);
        }
        if state.count.get() == 0 {
            state.destroy(guest)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Drop the owner's reference on behalf of the guest (`__wbindgen_cb_drop`).
    ///
    /// Returns true when the guest should free the environment itself; the host
    /// destructor is not called on this path.
    pub fn cb_drop(&self) -> bool {
        let state = &self.0;
        if !state.release_owner() {
            return false;
        }
        if state.count.get() == 0 {
            state.destroyed.set(true);
            state.env_ptr.set(0);
            return true;
        }
        false
    }

    /// Current reference count (owner plus in-flight calls).
    pub fn refcount(&self) -> u32 {
        self.0.count.get()
    }

    /// Current environment pointer; zero while a call is in flight or after release.
    pub fn env_ptr(&self) -> u32 {
        self.0.env_ptr.get()
    }

    /// Second environment word.
    pub fn env_extra(&self) -> u32 {
        self.0.env_extra
    }

    /// Guest destructor index.
    pub fn destructor(&self) -> u32 {
        self.0.destructor
    }

    /// Trampoline export name.
    pub fn trampoline(&self) -> &str {
        &self.0.trampoline
    }

    /// Adapter flavor.
    pub fn flavor(&self) -> ClosureFlavor {
        self.0.flavor
    }

    /// Whether the environment has been handed back to the guest.
    pub fn is_released(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Whether two adapters share the same environment.
    pub fn ptr_eq(&self, other: &Closure) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("trampoline", &self.trampoline())
            .field("flavor", &self.flavor())
            .field("env_ptr", &self.env_ptr())
            .field("refcount", &self.refcount())
            .finish()
    }
}

/// Guard for one in-flight call.
struct Invocation<'g, G: ClosureGuest + ?Sized> {
    state: Rc<ClosureState>,
    guest: &'g mut G,
    env: u32,
    settled: bool,
}

impl<'g, G: ClosureGuest + ?Sized> Invocation<'g, G> {
    fn enter(state: Rc<ClosureState>, guest: &'g mut G) -> Result<Self> {
        if state.destroyed.get() {
            return Err(state.released_error());
        }
        let env = state.env_ptr.get();
        if env == 0 {
            return Err(match state.flavor {
                ClosureFlavor::Repeatable => BridgeError::ClosureReentered {
                    trampoline: state.trampoline.to_string(),
                },
                ClosureFlavor::SingleShot => state.released_error(),
            });
        }

        state.count.set(state.count.get() + 1);
        // Zeroed for the duration so a reentrant drop cannot free it under us.
        state.env_ptr.set(0);

        Ok(Self {
            state,
            guest,
            env,
            settled: false,
        })
    }

    fn run(&mut self, args: &[Word]) -> Result<()> {
        self.guest
            .invoke_trampoline(&self.state.trampoline, self.env, self.state.env_extra, args)
    }

    fn settle(&mut self) -> Result<()> {
        if self.settled {
            return Ok(());
        }
        self.settled = true;

        let state = &self.state;
        let mut remaining = state.decrement();
        if state.flavor == ClosureFlavor::SingleShot && state.release_owner() {
            remaining = state.count.get();
        }

        if remaining == 0 {
            state.destroy(self.guest)
        } else {
            if state.flavor == ClosureFlavor::Repeatable && !state.destroyed.get() {
                state.env_ptr.set(self.env);
            }
            Ok(())
        }
    }
}

impl<G: ClosureGuest + ?Sized> Drop for Invocation<'_, G> {
    fn drop(&mut self) {
        if let Err(e) = self.settle() {
            tracing::error!(error = %e, "failed to settle closure invocation");
        }
    }
}
