//! [`Value`] <-> `VARIANT` conversion.
//!
//! Scalars map onto their natural variant types.  Byte sequences travel as
//! `VT_ARRAY | VT_UI1` safe arrays, other arrays as `VT_ARRAY | VT_VARIANT`.
//! Object-valued arguments are not supported and are rejected with
//! `InvalidArgument`.

use std::ffi::c_void;

use windows::core::{IUnknown, Interface, BSTR, VARIANT};
use windows::Win32::System::Com::IDispatch;
use windows::Win32::System::Variant::{
    InitVariantFromBuffer, InitVariantFromVariantArray, VariantGetElem, VariantGetElementCount,
    VariantToBuffer, VARENUM, VT_ARRAY, VT_BOOL, VT_BSTR, VT_BYREF, VT_CY, VT_DATE, VT_DECIMAL,
    VT_DISPATCH, VT_EMPTY, VT_ERROR, VT_I1, VT_I2, VT_I4, VT_I8, VT_INT, VT_NULL, VT_R4, VT_R8,
    VT_TYPEMASK, VT_UI1, VT_UI2, VT_UI4, VT_UI8, VT_UINT, VT_UNKNOWN,
};

use crate::com::object::ComObject;
use crate::errors::{CanoeError, Result};
use crate::proxy::Handle;
use crate::value::Value;

/// Build the `VARIANT` passed for `value`.
pub fn to_variant(value: &Value) -> Result<VARIANT> {
    Ok(match value {
        Value::Empty => VARIANT::default(),
        Value::Bool(b) => VARIANT::from(*b),
        Value::Int(i) => match i32::try_from(*i) {
            Ok(small) => VARIANT::from(small),
            Err(_) => VARIANT::from(*i),
        },
        Value::Float(f) => VARIANT::from(*f),
        Value::Str(s) => VARIANT::from(BSTR::from(s.as_str())),
        Value::Bytes(bytes) => {
            let len = u32::try_from(bytes.len())
                .map_err(|_| CanoeError::InvalidArgument("byte sequence too long".into()))?;
            unsafe { InitVariantFromBuffer(bytes.as_ptr() as *const c_void, len)? }
        }
        Value::Array(items) => {
            let elements = items.iter().map(to_variant).collect::<Result<Vec<_>>>()?;
            unsafe { InitVariantFromVariantArray(&elements)? }
        }
        Value::Object(_) => {
            return Err(CanoeError::InvalidArgument(
                "object-valued arguments are not supported".into(),
            ))
        }
    })
}

fn vt(v: &VARIANT) -> VARENUM {
    VARENUM(unsafe { v.as_raw().Anonymous.Anonymous.vt })
}

/// Convert a `VARIANT` received from the server.
pub fn from_variant(v: &VARIANT) -> Result<Value> {
    let kind = vt(v);

    if kind.0 & VT_BYREF.0 != 0 {
        return Err(CanoeError::ComError(format!(
            "by-reference variant 0x{:04X} not supported",
            kind.0
        )));
    }

    if kind.0 & VT_ARRAY.0 != 0 {
        return array_from_variant(v, VARENUM(kind.0 & VT_TYPEMASK.0));
    }

    match kind {
        VT_EMPTY | VT_NULL | VT_ERROR => Ok(Value::Empty),
        VT_BOOL => Ok(Value::Bool(bool::try_from(v)?)),
        VT_I1 | VT_I2 | VT_I4 | VT_I8 | VT_INT | VT_UI1 | VT_UI2 | VT_UI4 | VT_UINT => {
            Ok(Value::Int(i64::try_from(v)?))
        }
        VT_UI8 => {
            let wide = u64::try_from(v)?;
            i64::try_from(wide)
                .map(Value::Int)
                .map_err(|_| CanoeError::ComError(format!("unsigned value {wide} out of range")))
        }
        VT_R4 | VT_R8 | VT_CY | VT_DATE | VT_DECIMAL => Ok(Value::Float(f64::try_from(v)?)),
        VT_BSTR => Ok(Value::Str(BSTR::try_from(v)?.to_string())),
        VT_DISPATCH | VT_UNKNOWN => object_from_variant(v),
        other => Err(CanoeError::ComError(format!(
            "unsupported variant type 0x{:04X}",
            other.0
        ))),
    }
}

fn object_from_variant(v: &VARIANT) -> Result<Value> {
    // punkVal and pdispVal share storage.
    let raw = unsafe { v.as_raw().Anonymous.Anonymous.Anonymous.punkVal };
    if raw.is_null() {
        return Ok(Value::Empty);
    }
    let unknown = unsafe { IUnknown::from_raw_borrowed(&raw) }
        .cloned()
        .ok_or_else(|| CanoeError::ComError("null object reference".into()))?;
    let dispatch: IDispatch = unknown.cast()?;
    Ok(Value::Object(Handle::new(ComObject::from_dispatch(dispatch))))
}

fn array_from_variant(v: &VARIANT, element: VARENUM) -> Result<Value> {
    let count = unsafe { VariantGetElementCount(v) };
    if element == VT_UI1 {
        let mut bytes = vec![0u8; count as usize];
        if count > 0 {
            unsafe { VariantToBuffer(v, bytes.as_mut_ptr() as *mut c_void, count)? };
        }
        return Ok(Value::Bytes(bytes));
    }
    let mut items = Vec::with_capacity(count as usize);
    for i in 0..count {
        let elem = unsafe { VariantGetElem(v, i)? };
        items.push(from_variant(&elem)?);
    }
    Ok(Value::Array(items))
}
