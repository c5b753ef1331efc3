//! Builtin scalar functions callable from `ScalarNode::FunctionCall`.
//!
//! Deliberately small: the surface this crate drives end to end doesn't need
//! a full builtin library, just enough to exercise CASE/CAST-adjacent SQL.

use crate::error::{QuereusError, QuereusResult};
use crate::value::SqlValue;

pub fn call(name: &str, args: &[SqlValue]) -> QuereusResult<SqlValue> {
    match name.to_ascii_lowercase().as_str() {
        "abs" => unary_numeric(args, |f| f.abs()),
        "round" => match args {
            [v] => unary_numeric(&[v.clone()], |f| f.round()),
            [v, digits] => {
                if v.is_null() {
                    return Ok(SqlValue::Null);
                }
                let f = v.as_f64().ok_or_else(|| QuereusError::Type("round() expects a number".into()))?;
                let d = digits.as_i64().unwrap_or(0).max(0) as u32;
                let scale = 10f64.powi(d as i32);
                Ok(SqlValue::Real((f * scale).round() / scale))
            }
            _ => Err(QuereusError::Planning("round() takes 1 or 2 arguments".into())),
        },
        "lower" => text_map(args, |s| s.to_lowercase()),
        "upper" => text_map(args, |s| s.to_uppercase()),
        "length" => match args {
            [SqlValue::Null] => Ok(SqlValue::Null),
            [SqlValue::Text(s)] => Ok(SqlValue::Integer(s.chars().count() as i64)),
            [SqlValue::Blob(b)] => Ok(SqlValue::Integer(b.len() as i64)),
            [other] => Ok(SqlValue::Integer(other.to_string().chars().count() as i64)),
            _ => Err(QuereusError::Planning("length() takes 1 argument".into())),
        },
        "trim" => text_map(args, |s| s.trim().to_string()),
        "ltrim" => text_map(args, |s| s.trim_start().to_string()),
        "rtrim" => text_map(args, |s| s.trim_end().to_string()),
        "substr" | "substring" => substr(args),
        "coalesce" => Ok(args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(SqlValue::Null)),
        "ifnull" => match args {
            [a, b] => Ok(if a.is_null() { b.clone() } else { a.clone() }),
            _ => Err(QuereusError::Planning("ifnull() takes 2 arguments".into())),
        },
        "nullif" => match args {
            [a, b] => Ok(if a == b { SqlValue::Null } else { a.clone() }),
            _ => Err(QuereusError::Planning("nullif() takes 2 arguments".into())),
        },
        "typeof" => Ok(SqlValue::Text(
            match args.first() {
                Some(SqlValue::Null) | None => "null",
                Some(SqlValue::Integer(_)) => "integer",
                Some(SqlValue::Real(_)) => "real",
                Some(SqlValue::Text(_)) => "text",
                Some(SqlValue::Blob(_)) => "blob",
                Some(SqlValue::Boolean(_)) => "boolean",
            }
            .to_string(),
        )),
        other => Err(QuereusError::unsupported(format!("unknown function {other}()"))),
    }
}

fn unary_numeric(args: &[SqlValue], f: impl Fn(f64) -> f64) -> QuereusResult<SqlValue> {
    match args {
        [v] => {
            if v.is_null() {
                return Ok(SqlValue::Null);
            }
            let x = v
                .as_f64()
                .ok_or_else(|| QuereusError::Type(format!("non-numeric argument: {v}")))?;
            if matches!(v, SqlValue::Integer(_)) {
                Ok(SqlValue::Integer(f(x) as i64))
            } else {
                Ok(SqlValue::Real(f(x)))
            }
        }
        _ => Err(QuereusError::Planning("expected exactly 1 argument".into())),
    }
}

fn text_map(args: &[SqlValue], f: impl Fn(&str) -> String) -> QuereusResult<SqlValue> {
    match args {
        [SqlValue::Null] => Ok(SqlValue::Null),
        [v] => Ok(SqlValue::Text(f(v.as_text().unwrap_or(&v.to_string())))),
        _ => Err(QuereusError::Planning("expected exactly 1 argument".into())),
    }
}

fn substr(args: &[SqlValue]) -> QuereusResult<SqlValue> {
    let (text, start, len) = match args {
        [SqlValue::Null, ..] => return Ok(SqlValue::Null),
        [v, start] => (v.as_text().map(str::to_string).unwrap_or(v.to_string()), start.as_i64().unwrap_or(1), None),
        [v, start, len] => (
            v.as_text().map(str::to_string).unwrap_or(v.to_string()),
            start.as_i64().unwrap_or(1),
            Some(len.as_i64().unwrap_or(0)),
        ),
        _ => return Err(QuereusError::Planning("substr() takes 2 or 3 arguments".into())),
    };
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len() as i64;
    // sqlite convention: 1-based, negative start counts from the end.
    let start_idx = if start > 0 { start - 1 } else { (n + start).max(0) };
    let start_idx = start_idx.clamp(0, n) as usize;
    let end_idx = match len {
        Some(l) => (start_idx as i64 + l.max(0)).clamp(0, n) as usize,
        None => n as usize,
    };
    let slice: String = chars[start_idx..end_idx.max(start_idx)].iter().collect();
    Ok(SqlValue::Text(slice))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_skips_nulls() {
        let v = call("coalesce", &[SqlValue::Null, SqlValue::Null, SqlValue::Integer(3)]).unwrap();
        assert_eq!(v, SqlValue::Integer(3));
    }

    #[test]
    fn substr_negative_start() {
        let v = call("substr", &[SqlValue::Text("hello".into()), SqlValue::Integer(-3)]).unwrap();
        assert_eq!(v, SqlValue::Text("llo".into()));
    }

    #[test]
    fn unknown_function_is_unsupported() {
        assert!(call("frobnicate", &[]).is_err());
    }
}
