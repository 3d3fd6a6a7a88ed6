//! Human-readable rendering of host values for `__wbindgen_debug_string`.

use crate::value::HostValue;
use std::fmt::Write;

/// Render `value` the way the host console would describe it.
pub fn debug_string(value: &HostValue) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &HostValue) {
    match value {
        HostValue::Undefined => out.push_str("undefined"),
        HostValue::Null => out.push_str("null"),
        HostValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        HostValue::Number(n) => write_number(out, *n),
        HostValue::String(s) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
        HostValue::Bytes(_) => out.push_str("Uint8Array"),
        HostValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        HostValue::Error(err) => {
            let _ = write!(out, "{err}");
        }
        HostValue::Closure(_) => out.push_str("Function"),
        HostValue::Object(obj) => out.push_str(obj.type_name()),
    }
}

fn write_number(out: &mut String, n: f64) {
    if n.is_nan() {
        out.push_str("NaN");
    } else if n.is_infinite() {
        out.push_str(if n > 0.0 { "Infinity" } else { "-Infinity" });
    } else if n == 0.0 {
        // Negative zero prints as plain zero.
        out.push('0');
    } else {
        let _ = write!(out, "{n}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::Closure;
    use crate::value::{HostError, HostObject};

    #[test]
    fn primitives() {
        assert_eq!(debug_string(&HostValue::Undefined), "undefined");
        assert_eq!(debug_string(&HostValue::Null), "null");
        assert_eq!(debug_string(&true.into()), "true");
        assert_eq!(debug_string(&"hi".into()), "\"hi\"");
    }

    #[test]
    fn numbers_follow_host_formatting() {
        assert_eq!(debug_string(&1.0.into()), "1");
        assert_eq!(debug_string(&(-2.5).into()), "-2.5");
        assert_eq!(debug_string(&(-0.0).into()), "0");
        assert_eq!(debug_string(&f64::NAN.into()), "NaN");
        assert_eq!(debug_string(&f64::NEG_INFINITY.into()), "-Infinity");
    }

    #[test]
    fn composites() {
        let nested = HostValue::Array(vec![
            1.0.into(),
            "a".into(),
            HostValue::Array(vec![]),
            HostValue::Null,
        ]);
        assert_eq!(debug_string(&nested), "[1, \"a\", [], null]");
        assert_eq!(debug_string(&vec![1u8, 2].into()), "Uint8Array");
        assert_eq!(
            debug_string(&HostError::named("RangeError", "too big").into()),
            "RangeError: too big"
        );
    }

    #[test]
    fn functions_and_objects() {
        let f = Closure::repeatable(8, 0, 1, "invoke");
        assert_eq!(debug_string(&f.into()), "Function");

        struct WebSocket;
        let obj = HostValue::Object(HostObject::new(WebSocket));
        assert_eq!(debug_string(&obj), "WebSocket");
    }
}
