//! [`Dispatch`] over a live `IDispatch` pointer.
//!
//! Member names are resolved with `GetIDsOfNames` once per object and
//! cached.  Every call is a single `Invoke`; server exceptions
//! (`DISP_E_EXCEPTION`) are reported as `ComError` carrying the server's
//! source and description.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use windows::core::{Interface, GUID, HSTRING, PCWSTR, VARIANT};
use windows::Win32::Foundation::DISP_E_EXCEPTION;
use windows::Win32::System::Com::{
    CLSIDFromProgID, CoCreateInstance, IDispatch, CLSCTX_ALL, DISPATCH_FLAGS, DISPATCH_METHOD,
    DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS, EXCEPINFO,
};
use windows::Win32::System::Ole::GetActiveObject;

use crate::com::variant::{from_variant, to_variant};
use crate::com::{sink, LOCALE_USER_DEFAULT};
use crate::errors::{CanoeError, Result};
use crate::event::EventSink;
use crate::proxy::{Dispatch, Handle, Subscription};
use crate::value::Value;

const DISPID_PROPERTYPUT: i32 = -3;

/// One remote automation object.
pub struct ComObject {
    dispatch: IDispatch,
    dispids: Mutex<HashMap<String, i32>>,
}

// SAFETY: the automation server is an out-of-process, free-threaded MTA
// server; interface pointers obtained in the MTA are proxies that may be
// called from any MTA thread (see `MtaGuard`).
unsafe impl Send for ComObject {}
unsafe impl Sync for ComObject {}

impl ComObject {
    pub fn from_dispatch(dispatch: IDispatch) -> Self {
        Self {
            dispatch,
            dispids: Mutex::new(HashMap::new()),
        }
    }

    /// Start (or connect to the single instance of) the server `progid`.
    pub fn create(progid: &str) -> Result<Handle> {
        let dispatch: IDispatch = unsafe {
            let clsid = CLSIDFromProgID(PCWSTR(HSTRING::from(progid).as_ptr()))?;
            CoCreateInstance(&clsid, None, CLSCTX_ALL)?
        };
        debug!("{progid}: instance created");
        Ok(Handle::new(Self::from_dispatch(dispatch)))
    }

    /// Connect to a running instance of `progid`.
    pub fn active(progid: &str) -> Result<Handle> {
        let unknown = unsafe {
            let clsid = CLSIDFromProgID(PCWSTR(HSTRING::from(progid).as_ptr()))?;
            let mut unknown = None;
            GetActiveObject(&clsid, None, &mut unknown)?;
            unknown
        }
        .ok_or_else(|| CanoeError::RemoteUnavailable(format!("{progid}: no running instance")))?;
        let dispatch: IDispatch = unknown.cast()?;
        debug!("{progid}: attached to running instance");
        Ok(Handle::new(Self::from_dispatch(dispatch)))
    }

    pub fn dispatch(&self) -> &IDispatch {
        &self.dispatch
    }

    fn dispid(&self, name: &str) -> Result<i32> {
        if let Some(&id) = self.dispids.lock().get(name) {
            return Ok(id);
        }
        let wide = HSTRING::from(name);
        let names = [PCWSTR(wide.as_ptr())];
        let mut id = 0i32;
        unsafe {
            self.dispatch.GetIDsOfNames(
                &GUID::zeroed(),
                names.as_ptr(),
                1,
                LOCALE_USER_DEFAULT,
                &mut id,
            )
        }
        .map_err(|e| match CanoeError::from(e) {
            CanoeError::NotFound(msg) => CanoeError::NotFound(format!("{name}: {msg}")),
            other => other,
        })?;
        self.dispids.lock().insert(name.to_owned(), id);
        Ok(id)
    }

    fn invoke(&self, name: &str, flags: DISPATCH_FLAGS, args: &[Value], put: Option<&Value>) -> Result<Value> {
        let id = self.dispid(name)?;

        // DISPPARAMS carries arguments right to left; a put value goes first.
        let mut vargs = Vec::with_capacity(args.len() + 1);
        if let Some(v) = put {
            vargs.push(to_variant(v)?);
        }
        for arg in args.iter().rev() {
            vargs.push(to_variant(arg)?);
        }
        let mut named = DISPID_PROPERTYPUT;
        let params = DISPPARAMS {
            rgvarg: if vargs.is_empty() { std::ptr::null_mut() } else { vargs.as_mut_ptr() },
            rgdispidNamedArgs: if put.is_some() { &mut named } else { std::ptr::null_mut() },
            cArgs: vargs.len() as u32,
            cNamedArgs: u32::from(put.is_some()),
        };

        let mut result = VARIANT::default();
        let mut excep = EXCEPINFO::default();
        let mut arg_err = 0u32;
        let outcome = unsafe {
            self.dispatch.Invoke(
                id,
                &GUID::zeroed(),
                LOCALE_USER_DEFAULT,
                flags,
                &params,
                &mut result,
                &mut excep,
                &mut arg_err,
            )
        };

        match outcome {
            Ok(()) => from_variant(&result),
            Err(e) if e.code() == DISP_E_EXCEPTION => {
                let source = excep.bstrSource.to_string();
                let description = excep.bstrDescription.to_string();
                debug!("{name}: server exception (scode 0x{:08X})", excep.scode as u32);
                Err(CanoeError::ComError(format!("{name}: {source}: {description}")))
            }
            Err(e) => {
                debug!("{name}: invoke failed ({e})");
                Err(e.into())
            }
        }
    }
}

impl Dispatch for ComObject {
    fn get(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.invoke(name, DISPATCH_PROPERTYGET | DISPATCH_METHOD, args, None)
    }

    fn put(&self, name: &str, args: &[Value], value: Value) -> Result<()> {
        self.invoke(name, DISPATCH_PROPERTYPUT, args, Some(&value)).map(drop)
    }

    fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.invoke(name, DISPATCH_METHOD | DISPATCH_PROPERTYGET, args, None)
    }

    fn advise(&self, sink: Arc<dyn EventSink>) -> Result<Subscription> {
        sink::advise(&self.dispatch, sink)
    }
}
