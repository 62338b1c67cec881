//! Scalar flatten/expand rules.
//!
//! Most scalars pass through unchanged. Three rules are not identities:
//!
//! - integers may arrive as JSON floats and are coerced by [`convintf2i`];
//! - address/netmask pairs are rewritten to CIDR by [`normalize_cidr`] when
//!   the prior local value already uses CIDR;
//! - sensitive fields keep their prior local value when the device answers
//!   with nothing.

use std::net::Ipv4Addr;

use crate::error::MapperError;
use crate::schema::ScalarKind;
use crate::value::{wire_kind_name, LocalValue, WireValue};

/// Flatten one wire scalar.
///
/// `prior` is the previously stored local value for the same field, if any.
pub fn flatten_scalar(
    kind: ScalarKind,
    wire: &WireValue,
    prior: Option<&LocalValue>,
    sensitive: bool,
    path: &str,
) -> Result<LocalValue, MapperError> {
    if sensitive && is_blank(wire) {
        if let Some(prior) = prior.filter(|p| !p.is_zero()) {
            return Ok(prior.clone());
        }
    }

    match (kind, wire) {
        (_, WireValue::Null) => Ok(LocalValue::Null),
        (ScalarKind::String, WireValue::String(s)) => Ok(LocalValue::String(s.clone())),
        (ScalarKind::Integer, _) => convintf2i(wire, path),
        // Integer-typed numbers stay integers so they expand back unchanged.
        (ScalarKind::Float, WireValue::Number(_)) => Ok(LocalValue::from(wire)),
        (ScalarKind::Bool, WireValue::Bool(b)) => Ok(LocalValue::Bool(*b)),
        (ScalarKind::Ipv4Mask, _) => normalize_cidr(prior, wire, path),
        (ScalarKind::Any, WireValue::Array(_) | WireValue::Object(_)) => Err(
            MapperError::type_mismatch(path, kind.name(), wire_kind_name(wire)),
        ),
        (ScalarKind::Any, _) => Ok(LocalValue::from(wire)),
        _ => Err(MapperError::type_mismatch(
            path,
            kind.name(),
            wire_kind_name(wire),
        )),
    }
}

/// Expand one local scalar into its wire form.
pub fn expand_scalar(
    kind: ScalarKind,
    local: &LocalValue,
    path: &str,
) -> Result<WireValue, MapperError> {
    let mismatch = || MapperError::type_mismatch(path, kind.name(), local.kind_name());

    match (kind, local) {
        (_, LocalValue::Null) => Ok(WireValue::Null),
        (ScalarKind::String | ScalarKind::Ipv4Mask, LocalValue::String(s)) => {
            Ok(WireValue::String(s.clone()))
        },
        (ScalarKind::Integer, LocalValue::Int(i)) => Ok(WireValue::from(*i)),
        (ScalarKind::Integer, LocalValue::Float(f)) if is_integral(*f) => {
            Ok(WireValue::from(*f as i64))
        },
        (ScalarKind::Float, LocalValue::Int(i)) => Ok(WireValue::from(*i)),
        (ScalarKind::Float, LocalValue::Float(f)) => serde_json::Number::from_f64(*f)
            .map(WireValue::Number)
            .ok_or_else(mismatch),
        (ScalarKind::Bool, LocalValue::Bool(b)) => Ok(WireValue::Bool(*b)),
        (ScalarKind::Any, LocalValue::List(_) | LocalValue::Map(_)) => Err(mismatch()),
        (ScalarKind::Any, _) => Ok(local.to_wire()),
        _ => Err(mismatch()),
    }
}

/// Coerce a wire integer into a local integer.
///
/// FortiOS encodes integers as JSON numbers that may carry a `.0`, and a few
/// endpoints quote them. Numbers with a fractional part are rejected.
pub fn convintf2i(wire: &WireValue, path: &str) -> Result<LocalValue, MapperError> {
    match wire {
        WireValue::Null => Ok(LocalValue::Null),
        WireValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(LocalValue::Int(i));
            }
            match n.as_f64() {
                Some(f) if is_integral(f) => Ok(LocalValue::Int(f as i64)),
                _ => Err(MapperError::type_mismatch(path, "integer", "number")),
            }
        },
        WireValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map(LocalValue::Int)
            .map_err(|_| MapperError::type_mismatch(path, "integer", "string")),
        other => Err(MapperError::type_mismatch(
            path,
            "integer",
            wire_kind_name(other),
        )),
    }
}

/// Flatten an address/netmask field, preserving the CIDR form of local state.
///
/// The wire value is rewritten as `a.b.c.d/nn` only when the prior local
/// value is itself CIDR. Otherwise it is returned unchanged. Newer firmware
/// answers with a `[address, mask]` array, which is joined with a space.
pub fn normalize_cidr(
    prior: Option<&LocalValue>,
    wire: &WireValue,
    path: &str,
) -> Result<LocalValue, MapperError> {
    let text = match wire {
        WireValue::Null => return Ok(LocalValue::Null),
        WireValue::String(s) => s.clone(),
        WireValue::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    WireValue::String(s) => parts.push(s.as_str()),
                    other => {
                        return Err(MapperError::type_mismatch(
                            path,
                            ScalarKind::Ipv4Mask.name(),
                            wire_kind_name(other),
                        ))
                    },
                }
            }
            parts.join(" ")
        },
        other => {
            return Err(MapperError::type_mismatch(
                path,
                ScalarKind::Ipv4Mask.name(),
                wire_kind_name(other),
            ))
        },
    };

    let prior_cidr = prior.and_then(LocalValue::as_str).filter(|p| is_cidr(p));
    if let Some(prior) = prior_cidr {
        if prior != text {
            if let Some(cidr) = ipmask_to_cidr(&text) {
                return Ok(LocalValue::String(cidr));
            }
        }
    }
    Ok(LocalValue::String(text))
}

/// Rewrite `"10.0.0.1 255.255.255.0"` as `"10.0.0.1/24"`.
///
/// Returns `None` unless the input is exactly an address and a contiguous mask.
pub fn ipmask_to_cidr(text: &str) -> Option<String> {
    let mut parts = text.split_whitespace();
    let addr = parts.next()?.parse::<Ipv4Addr>().ok()?;
    let mask = parts.next()?.parse::<Ipv4Addr>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let prefix = mask_prefix_len(mask)?;
    Some(format!("{}/{}", addr, prefix))
}

/// Prefix length of a contiguous netmask.
pub fn mask_prefix_len(mask: Ipv4Addr) -> Option<u32> {
    let bits = u32::from(mask);
    let ones = bits.leading_ones();
    (bits.count_ones() == ones).then_some(ones)
}

/// Whether `text` is `a.b.c.d/nn` with `nn <= 32`.
pub fn is_cidr(text: &str) -> bool {
    match text.split_once('/') {
        Some((addr, prefix)) => {
            addr.parse::<Ipv4Addr>().is_ok() && prefix.parse::<u8>().is_ok_and(|p| p <= 32)
        },
        None => false,
    }
}

fn is_blank(wire: &WireValue) -> bool {
    match wire {
        WireValue::Null => true,
        WireValue::String(s) => s.is_empty(),
        _ => false,
    }
}

fn is_integral(f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64
}
