/// DataPool text protocol
///
/// Values are flattened into the renderer's brace notation and framed as one
/// NUL-terminated command per variable.
use serde_json::Value;

/// Command prefix understood by the renderer's command interface
pub const DATAPOOL_COMMAND: &str = "send RENDERER*FUNCTION*DataPool*Data SET";

/// Render a value in DataPool notation
///
/// - null: empty
/// - scalars: literal text, strings unquoted
/// - arrays: `{a, b},`
/// - objects: `{k=v; k2=v2;}`
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(u)) => u.to_string(),
            _ => n.as_f64().map(format_float).unwrap_or_else(|| n.to_string()),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(stringify).collect();
            format!("{{{}}},", inner.join(", "))
        }
        Value::Object(entries) => {
            let inner: Vec<String> = entries
                .iter()
                .map(|(key, child)| format!("{}={};", key, stringify(child)))
                .collect();
            format!("{{{}}}", inner.join(" "))
        }
    }
}

/// Shortest round-trip text of a float in the renderer's number notation
///
/// Plain decimals between 1e-6 and 1e21, exponent form (`1e-7`, `1.5e+21`)
/// outside that range. Negative zero prints as `0`.
pub fn format_float(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value < 0.0 {
        return format!("-{}", format_float(-value));
    }

    // `{:e}` yields the shortest digits, e.g. "1.2345e-7"
    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);

    let k = digits.len() as i32;
    let n = exponent + 1;

    if k <= n && n <= 21 {
        format!("{}{}", digits, "0".repeat((n - k) as usize))
    } else if 0 < n && n <= 21 {
        format!("{}.{}", &digits[..n as usize], &digits[n as usize..])
    } else if -6 < n && n <= 0 {
        format!("0.{}{}", "0".repeat((-n) as usize), digits)
    } else {
        let sign = if n - 1 < 0 { '-' } else { '+' };
        let (head, tail) = digits.split_at(1);
        if tail.is_empty() {
            format!("{}e{}{}", head, sign, (n - 1).abs())
        } else {
            format!("{}.{}e{}{}", head, tail, sign, (n - 1).abs())
        }
    }
}

/// Variable key; arrays carry their index range, `name[0-N-1]`
pub fn format_key(name: &str, value: &Value) -> String {
    match value {
        Value::Array(items) => format!("{}[0-{}]", name, items.len() as i64 - 1),
        _ => name.to_string(),
    }
}

/// Full NUL-terminated message for one variable
pub fn frame_message(name: &str, value: &Value, command_interface: bool) -> String {
    let body = stringify(value);
    if command_interface {
        format!("{} {}={}\0", DATAPOOL_COMMAND, format_key(name, value), body)
    } else {
        format!("{}|{}\0", name, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stringify_scalars() {
        assert_eq!(stringify(&Value::Null), "");
        assert_eq!(stringify(&json!("EUR/USD")), "EUR/USD");
        assert_eq!(stringify(&json!(42)), "42");
        assert_eq!(stringify(&json!(-7)), "-7");
        assert_eq!(stringify(&json!(1.5)), "1.5");
        assert_eq!(stringify(&json!(2.0)), "2");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!(1e-7)), "1e-7");
        assert_eq!(stringify(&json!(1e21)), "1e+21");
        assert_eq!(stringify(&json!(-0.0)), "0");
    }

    #[test]
    fn test_format_float_ranges() {
        assert_eq!(format_float(0.000001), "0.000001");
        assert_eq!(format_float(0.00000123), "0.00000123");
        assert_eq!(format_float(1.5e-7), "1.5e-7");
        assert_eq!(format_float(123456789.25), "123456789.25");
        assert_eq!(format_float(1e20), "100000000000000000000");
        assert_eq!(format_float(1.25e21), "1.25e+21");
        assert_eq!(format_float(-2.5e-9), "-2.5e-9");
        assert_eq!(format_float(0.1), "0.1");
    }

    #[test]
    fn test_stringify_record_with_array() {
        assert_eq!(stringify(&json!({"a": 1, "b": [1, 2]})), "{a=1; b={1, 2},;}");
    }

    #[test]
    fn test_stringify_nested() {
        let value = json!([
            {"name": "DAX", "last": "15000.5", "change": null},
            {"name": "SMI", "last": 11000, "change": {"abs": -3, "pct": "0.1%"}}
        ]);
        assert_eq!(
            stringify(&value),
            "{{name=DAX; last=15000.5; change=;}, {name=SMI; last=11000; change={abs=-3; pct=0.1%;};}},"
        );
        assert_eq!(stringify(&json!([])), "{},");
        assert_eq!(stringify(&json!({})), "{}");
    }

    #[test]
    fn test_format_key() {
        assert_eq!(format_key("quotes", &json!([1, 2, 3])), "quotes[0-2]");
        assert_eq!(format_key("quotes", &json!([])), "quotes[0--1]");
        assert_eq!(format_key("quotes", &json!({"a": 1})), "quotes");
    }

    #[test]
    fn test_frame_message() {
        let value = json!([{"n": "a"}]);
        assert_eq!(
            frame_message("fx", &value, true),
            "send RENDERER*FUNCTION*DataPool*Data SET fx[0-0]={{n=a;}},\0"
        );
        assert_eq!(frame_message("fx", &value, false), "fx|{{n=a;}},\0");
        assert_eq!(frame_message("title", &json!("Markets"), true), "send RENDERER*FUNCTION*DataPool*Data SET title=Markets\0");
    }
}
