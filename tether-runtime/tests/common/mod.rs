//! Shared guest fixtures.

#![allow(dead_code)]

use tether_runtime::{AdapterRegistry, AdapterSpec, BridgeInstance, BridgeRuntime, RuntimeConfig};

/// Import name of the repeatable wrapper in [`GUEST_WAT`].
pub const REPEATABLE_WRAPPER: &str = "__wbindgen_closure_wrapper7";

/// Import name of the single-shot wrapper in [`GUEST_WAT`].
pub const SINGLE_SHOT_WRAPPER: &str = "__wbindgen_closure_wrapper8";

/// A guest shaped like generated glue: bump allocator, exception slot,
/// start function, one trampoline and a destructor table.
pub const GUEST_WAT: &str = r#"
(module
  (import "wbg" "__wbindgen_string_new" (func $string_new (param i32 i32) (result i32)))
  (import "wbg" "__wbindgen_string_get" (func $string_get (param i32 i32)))
  (import "wbg" "__wbindgen_cb_drop" (func $cb_drop (param i32) (result i32)))
  (import "wbg" "__wbindgen_throw" (func $throw (param i32 i32)))
  (import "wbg" "__tether_log" (func $log (param i32 i32 i32) (result i32)))
  (import "wbg" "__wbindgen_memory" (func $memory_handle (result i32)))
  (import "wbg" "__wbindgen_closure_wrapper7" (func $wrap_repeatable (param i32 i32 i32) (result i32)))
  (import "wbg" "__wbindgen_closure_wrapper8" (func $wrap_once (param i32 i32 i32) (result i32)))

  (memory (export "memory") 1)
  (table (export "__wbindgen_export_2") 2 funcref)
  (elem (i32.const 1) $destroy)

  (data (i32.const 512) "boom")
  (data (i32.const 520) "hello")

  (global $bump (mut i32) (i32.const 1024))
  (global $started (mut i32) (i32.const 0))
  (global $calls (mut i32) (i32.const 0))
  (global $destroyed (mut i32) (i32.const 0))
  (global $exn (mut i32) (i32.const 0))

  (func $malloc (export "__wbindgen_malloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $bump))
    (global.set $bump
      (i32.and
        (i32.add (i32.add (local.get $ptr) (local.get $size)) (i32.const 7))
        (i32.const -8)))
    (local.get $ptr))

  (func (export "__wbindgen_realloc") (param $ptr i32) (param $old i32) (param $new i32) (result i32)
    (local $dst i32)
    (local.set $dst (call $malloc (local.get $new)))
    (memory.copy
      (local.get $dst)
      (local.get $ptr)
      (select (local.get $old) (local.get $new) (i32.lt_u (local.get $old) (local.get $new))))
    (local.get $dst))

  (func (export "__wbindgen_free") (param i32 i32))

  (func (export "__wbindgen_exn_store") (param $handle i32)
    (global.set $exn (local.get $handle)))

  (func (export "__wbindgen_start")
    (global.set $started (i32.add (global.get $started) (i32.const 1))))

  (func $destroy (param $env i32) (param $extra i32)
    (global.set $destroyed (i32.add (global.get $destroyed) (i32.const 1))))

  ;; Adds the argument to the counter stored in the closure environment.
  (func (export "invoke_counter") (param $env i32) (param $extra i32) (param $arg i32)
    (i32.store (local.get $env) (i32.add (i32.load (local.get $env)) (local.get $arg)))
    (global.set $calls (i32.add (global.get $calls) (local.get $arg))))

  (func $new_env (result i32)
    (local $env i32)
    (local.set $env (call $malloc (i32.const 8)))
    (i32.store (local.get $env) (i32.const 0))
    (local.get $env))

  (func (export "make_repeatable") (result i32)
    (call $wrap_repeatable (call $new_env) (i32.const 0) (i32.const 0)))

  (func (export "make_once") (result i32)
    (call $wrap_once (call $new_env) (i32.const 0) (i32.const 0)))

  (func (export "drop_callback") (param $handle i32) (result i32)
    (call $cb_drop (local.get $handle)))

  (func (export "new_string") (param $ptr i32) (param $len i32) (result i32)
    (call $string_new (local.get $ptr) (local.get $len)))

  ;; Length of the string behind a handle, via the return area at 16.
  (func (export "string_len") (param $handle i32) (result i32)
    (call $string_get (i32.const 16) (local.get $handle))
    (i32.load (i32.const 20)))

  (func (export "string_ptr") (param $handle i32) (result i32)
    (call $string_get (i32.const 16) (local.get $handle))
    (i32.load (i32.const 16)))

  (func (export "grow") (param $pages i32) (result i32)
    (memory.grow (local.get $pages)))

  (func (export "fail")
    (call $throw (i32.const 512) (i32.const 4)))

  (func (export "log_hello") (result i32)
    (call $log (i32.const 2) (i32.const 520) (i32.const 5)))

  (func (export "memory_handle") (result i32)
    (call $memory_handle))

  (func (export "started") (result i32) (global.get $started))
  (func (export "calls") (result i32) (global.get $calls))
  (func (export "destroyed") (result i32) (global.get $destroyed))
  (func (export "exn") (result i32) (global.get $exn))
)
"#;

/// Adapters matching the wrapper imports of [`GUEST_WAT`].
pub fn adapters() -> AdapterRegistry {
    AdapterRegistry::new()
        .with(AdapterSpec::repeatable(REPEATABLE_WRAPPER, "invoke_counter", 1))
        .with(AdapterSpec::single_shot(SINGLE_SHOT_WRAPPER, "invoke_counter", 1))
}

/// A runtime with test settings and no module cache.
pub fn runtime() -> BridgeRuntime {
    BridgeRuntime::new(RuntimeConfig::default().with_cache(false)).expect("runtime")
}

/// A finalized instance of [`GUEST_WAT`].
pub fn guest(runtime: &BridgeRuntime) -> BridgeInstance {
    let module = runtime.compile("guest", GUEST_WAT.as_bytes()).expect("compile");
    let mut instance =
        BridgeInstance::instantiate(runtime, &module, &adapters()).expect("instantiate");
    instance.finalize().expect("finalize");
    instance
}

/// Call a nullary export returning `i32`.
pub fn get_i32(instance: &mut BridgeInstance, name: &str) -> i32 {
    instance.call_export(name, &[]).expect(name)[0].unwrap_i32()
}
