//! Host intrinsics behind the `__wbindgen_*` imports.
//!
//! Each function here is the engine-independent body of one import. The
//! engine layer only unpacks its arguments and hands over a [`HostContext`].

use crate::bridge::HostContext;
use crate::codec;
use crate::debug::debug_string;
use crate::error::{BridgeError, Result};
use crate::guest::{GuestSlice, offset};
use crate::value::HostValue;

/// `__wbindgen_object_drop_ref`: the guest gave up a handle.
pub fn object_drop_ref<C: HostContext + ?Sized>(cx: &mut C, handle: u32) -> Result<()> {
    cx.bridge().heap_mut().release(handle)
}

/// `__wbindgen_object_clone_ref`: the guest wants a second handle.
pub fn object_clone_ref<C: HostContext + ?Sized>(cx: &mut C, handle: u32) -> Result<u32> {
    cx.bridge().heap_mut().clone_ref(handle)
}

/// `__wbindgen_string_new`: decode guest bytes into a host string.
pub fn string_new<C: HostContext + ?Sized>(cx: &mut C, ptr: u32, len: u32) -> Result<u32> {
    let text = codec::decode(cx, ptr, len)?;
    Ok(cx.bridge().add(text))
}

/// `__wbindgen_string_get`: encode a host string into guest memory.
///
/// Writes `(ptr, len)` into the return area, or `(0, 0)` when the handle does
/// not hold a string.
pub fn string_get<C: HostContext + ?Sized>(cx: &mut C, retptr: u32, handle: u32) -> Result<()> {
    offset(retptr, 4)?;
    let text = cx.bridge().get(handle)?.as_str().map(str::to_owned);
    let slice = match text {
        Some(text) => codec::encode(text.as_str(), cx)?,
        None => GuestSlice::empty(),
    };
    cx.write_slice_return(retptr, slice)
}

/// `__wbindgen_number_new`.
pub fn number_new<C: HostContext + ?Sized>(cx: &mut C, value: f64) -> u32 {
    cx.bridge().add(value)
}

/// `__wbindgen_number_get`: presence flag at `retptr`, value at `retptr + 8`.
pub fn number_get<C: HostContext + ?Sized>(cx: &mut C, retptr: u32, handle: u32) -> Result<()> {
    let number = cx.bridge().get(handle)?.as_number();
    // Value first: if it fits, so does the flag below it.
    cx.floats64().set_at(offset(retptr, 8)?, number.unwrap_or(0.0))?;
    cx.ints32().set_at(retptr, i32::from(number.is_some()))
}

/// `__wbindgen_boolean_get`: 1 or 0 for booleans, 2 for anything else.
pub fn boolean_get<C: HostContext + ?Sized>(cx: &mut C, handle: u32) -> Result<i32> {
    Ok(match cx.bridge().get(handle)?.as_bool() {
        Some(true) => 1,
        Some(false) => 0,
        None => 2,
    })
}

/// `__wbindgen_is_null`.
pub fn is_null<C: HostContext + ?Sized>(cx: &mut C, handle: u32) -> Result<bool> {
    Ok(matches!(cx.bridge().get(handle)?, HostValue::Null))
}

/// `__wbindgen_is_undefined`.
pub fn is_undefined<C: HostContext + ?Sized>(cx: &mut C, handle: u32) -> Result<bool> {
    Ok(matches!(cx.bridge().get(handle)?, HostValue::Undefined))
}

/// `__wbindgen_is_object`.
pub fn is_object<C: HostContext + ?Sized>(cx: &mut C, handle: u32) -> Result<bool> {
    Ok(cx.bridge().get(handle)?.is_object())
}

/// `__wbindgen_is_string`.
pub fn is_string<C: HostContext + ?Sized>(cx: &mut C, handle: u32) -> Result<bool> {
    Ok(matches!(cx.bridge().get(handle)?, HostValue::String(_)))
}

/// `__wbindgen_is_function`.
pub fn is_function<C: HostContext + ?Sized>(cx: &mut C, handle: u32) -> Result<bool> {
    Ok(matches!(cx.bridge().get(handle)?, HostValue::Closure(_)))
}

/// `__wbindgen_cb_drop`: the guest dropped its closure handle.
///
/// Returns true when the guest must free the environment itself.
pub fn cb_drop<C: HostContext + ?Sized>(cx: &mut C, handle: u32) -> Result<bool> {
    match cx.bridge().take(handle)? {
        HostValue::Closure(closure) => Ok(closure.cb_drop()),
        other => Err(BridgeError::UnexpectedValue {
            handle,
            expected: "function",
            actual: other.kind(),
        }),
    }
}

/// `__wbindgen_debug_string`: describe a value into the return area.
pub fn debug_string_into<C: HostContext + ?Sized>(
    cx: &mut C,
    retptr: u32,
    handle: u32,
) -> Result<()> {
    offset(retptr, 4)?;
    let text = debug_string(cx.bridge().get(handle)?);
    let slice = codec::encode(text.as_str(), cx)?;
    cx.write_slice_return(retptr, slice)
}

/// `__wbindgen_throw`: the guest raised an error with a message.
///
/// Always returns the error to raise.
pub fn throw<C: HostContext + ?Sized>(cx: &mut C, ptr: u32, len: u32) -> BridgeError {
    match codec::decode(cx, ptr, len) {
        Ok(message) => BridgeError::GuestThrow { message },
        Err(e) => e,
    }
}

/// `__wbindgen_rethrow`: the guest re-raises a host value.
pub fn rethrow<C: HostContext + ?Sized>(cx: &mut C, handle: u32) -> BridgeError {
    match cx.bridge().take(handle) {
        Ok(HostValue::Error(err)) => BridgeError::GuestThrow {
            message: err.to_string(),
        },
        Ok(value) => BridgeError::GuestThrow {
            message: debug_string(&value),
        },
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::Closure;
    use crate::guest::GuestMemory;
    use crate::heap::{FALSE, NULL, TRUE, UNDEFINED};
    use crate::testing::MockGuest;

    const RET: u32 = 8;

    fn read_return(guest: &mut MockGuest) -> GuestSlice {
        let ints = guest.ints32();
        GuestSlice::new(
            ints.get_at(RET).unwrap() as u32,
            ints.get_at(RET + 4).unwrap() as u32,
        )
    }

    fn guest_with_text(text: &str) -> (MockGuest, GuestSlice) {
        let mut guest = MockGuest::new(256);
        guest.reserve(32);
        let slice = guest.copy_to_guest(text.as_bytes()).unwrap();
        (guest, slice)
    }

    #[test]
    fn string_new_then_get_round_trips() {
        let (mut guest, slice) = guest_with_text("héllo");
        let h = string_new(&mut guest, slice.ptr, slice.len).unwrap();
        assert_eq!(guest.bridge().get(h).unwrap().as_str(), Some("héllo"));

        string_get(&mut guest, RET, h).unwrap();
        let out = read_return(&mut guest);
        assert_ne!(out.ptr, slice.ptr);
        assert_eq!(guest.copy_from_guest(out).unwrap(), "héllo".as_bytes());
    }

    #[test]
    fn string_get_of_non_string_writes_empty() {
        let mut guest = MockGuest::new(256);
        guest.reserve(32);
        string_get(&mut guest, RET, NULL).unwrap();
        assert_eq!(read_return(&mut guest), GuestSlice::empty());
    }

    #[test]
    fn number_get_writes_flag_and_value() {
        let mut guest = MockGuest::new(256);
        guest.reserve(32);
        let h = number_new(&mut guest, 4.25);
        number_get(&mut guest, RET, h).unwrap();
        assert_eq!(guest.ints32().get_at(RET).unwrap(), 1);
        assert_eq!(guest.floats64().get_at(RET + 8).unwrap(), 4.25);

        number_get(&mut guest, RET, UNDEFINED).unwrap();
        assert_eq!(guest.ints32().get_at(RET).unwrap(), 0);
    }

    #[test]
    fn return_areas_past_address_space_fail_cleanly() {
        let mut guest = MockGuest::new(64);
        let h = number_new(&mut guest, 1.5);
        let s = guest.bridge().add("ok");
        let before = guest.bytes().slice(0, 64).unwrap().to_vec();

        let err = number_get(&mut guest, u32::MAX - 7, h).unwrap_err();
        assert_eq!(err.code(), "E201");
        let err = string_get(&mut guest, u32::MAX - 3, s).unwrap_err();
        assert_eq!(err.code(), "E201");
        let err = number_get(&mut guest, 60, h).unwrap_err();
        assert_eq!(err.code(), "E201");

        assert_eq!(guest.bytes().slice(0, 64).unwrap(), before.as_slice());
    }

    #[test]
    fn type_tests() {
        let mut guest = MockGuest::new(64);
        let s = guest.bridge().add("s");
        let f = guest.bridge().add(Closure::repeatable(8, 0, 0, "invoke"));
        let bytes = guest.bridge().add(vec![1u8]);

        assert_eq!(boolean_get(&mut guest, TRUE).unwrap(), 1);
        assert_eq!(boolean_get(&mut guest, FALSE).unwrap(), 0);
        assert_eq!(boolean_get(&mut guest, s).unwrap(), 2);
        assert!(is_null(&mut guest, NULL).unwrap());
        assert!(is_undefined(&mut guest, UNDEFINED).unwrap());
        assert!(is_string(&mut guest, s).unwrap());
        assert!(is_function(&mut guest, f).unwrap());
        assert!(is_object(&mut guest, bytes).unwrap());
        assert!(!is_object(&mut guest, NULL).unwrap());
    }

    #[test]
    fn drop_and_clone_refs() {
        let mut guest = MockGuest::new(64);
        let a = guest.bridge().add("x");
        let b = object_clone_ref(&mut guest, a).unwrap();
        object_drop_ref(&mut guest, a).unwrap();
        assert!(matches!(
            object_drop_ref(&mut guest, a),
            Err(BridgeError::DoubleRelease { .. })
        ));
        assert_eq!(guest.bridge().get(b).unwrap().as_str(), Some("x"));
        object_drop_ref(&mut guest, NULL).unwrap();
    }

    #[test]
    fn cb_drop_retires_handle() {
        let mut guest = MockGuest::new(64);
        let closure = Closure::repeatable(8, 0, 0, "invoke");
        let h = guest.bridge().add(closure.clone());
        assert!(cb_drop(&mut guest, h).unwrap());
        assert!(closure.is_released());
        assert!(guest.bridge().get(h).is_err());

        let n = guest.bridge().add(1.0);
        assert!(matches!(
            cb_drop(&mut guest, n),
            Err(BridgeError::UnexpectedValue { .. })
        ));
    }

    #[test]
    fn debug_string_is_encoded() {
        let mut guest = MockGuest::new(256);
        guest.reserve(32);
        let h = guest
            .bridge()
            .add(HostValue::Array(vec![1.0.into(), "é".into()]));
        debug_string_into(&mut guest, RET, h).unwrap();
        let out = read_return(&mut guest);
        assert_eq!(
            guest.copy_from_guest(out).unwrap(),
            "[1, \"é\"]".as_bytes()
        );
    }

    #[test]
    fn throw_and_rethrow_produce_messages() {
        let (mut guest, slice) = guest_with_text("unreachable state");
        match throw(&mut guest, slice.ptr, slice.len) {
            BridgeError::GuestThrow { message } => assert_eq!(message, "unreachable state"),
            other => panic!("unexpected {other}"),
        }

        let h = guest
            .bridge()
            .add(crate::value::HostError::named("TypeError", "bad"));
        match rethrow(&mut guest, h) {
            BridgeError::GuestThrow { message } => assert_eq!(message, "TypeError: bad"),
            other => panic!("unexpected {other}"),
        }
        assert!(guest.bridge().get(h).is_err());
    }
}
