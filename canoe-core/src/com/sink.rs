//! Connection-point event sink.
//!
//! The server calls back through the object's default source dispinterface.
//! Its IID and member names are only known from the type library, so the
//! sink is a hand-built `IDispatch` whose `QueryInterface` answers that IID
//! and whose `Invoke` translates the DISPID back to the notification name
//! before forwarding to an [`EventSink`].
//!
//! Callbacks arrive on RPC threads.  A panicking [`EventSink`] is caught at
//! the FFI boundary and logged.

use std::collections::HashMap;
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, error, warn};
use windows::core::{IUnknown, Interface, BSTR, GUID, HRESULT, PCWSTR, VARIANT};
use windows::Win32::Foundation::{DISP_E_UNKNOWNNAME, E_NOINTERFACE, E_NOTIMPL, E_POINTER, S_OK};
use windows::Win32::System::Com::{
    IConnectionPoint, IConnectionPointContainer, IDispatch, ITypeInfo, ITypeLib, DISPATCH_FLAGS,
    DISPPARAMS, EXCEPINFO,
};

use crate::com::variant::from_variant;
use crate::com::LOCALE_USER_DEFAULT;
use crate::errors::{CanoeError, Result};
use crate::event::EventSink;
use crate::proxy::Subscription;
use crate::value::Value;

/// Register `sink` on the first connection point of `source` whose
/// interface is described in the source's type library.
pub fn advise(source: &IDispatch, sink: Arc<dyn EventSink>) -> Result<Subscription> {
    let container: IConnectionPointContainer = source.cast()?;
    let points = unsafe { container.EnumConnectionPoints()? };
    let type_lib = containing_type_lib(source)?;

    let mut slot = [None];
    loop {
        let mut fetched = 0u32;
        let hr = unsafe { points.Next(&mut slot, &mut fetched) };
        if hr.is_err() || fetched == 0 {
            break;
        }
        let Some(point) = slot[0].take() else { break };
        let iid = unsafe { point.GetConnectionInterface()? };
        let names = match member_names(&type_lib, &iid) {
            Ok(names) => names,
            Err(e) => {
                debug!("connection point {iid:?} skipped: {e}");
                continue;
            }
        };

        let unknown = SinkObject::create(iid, names, sink);
        let cookie = unsafe { point.Advise(&unknown)? };
        debug!("event sink advised on {iid:?} (cookie {cookie})");
        let advised = Advised { point, cookie };
        return Ok(Subscription::new(move || advised.unadvise()));
    }

    Err(CanoeError::NotFound(
        "object exposes no connection point with a described source interface".into(),
    ))
}

struct Advised {
    point: IConnectionPoint,
    cookie: u32,
}

// SAFETY: connection point proxies obtained in the MTA are free-threaded.
unsafe impl Send for Advised {}
unsafe impl Sync for Advised {}

impl Advised {
    fn unadvise(self) {
        match unsafe { self.point.Unadvise(self.cookie) } {
            Ok(()) => debug!("event sink unadvised (cookie {})", self.cookie),
            Err(e) => warn!("Unadvise(cookie {}) failed: {e}", self.cookie),
        }
    }
}

// ---------------------------------------------------------------------------
// Type library lookup
// ---------------------------------------------------------------------------

fn containing_type_lib(source: &IDispatch) -> Result<ITypeLib> {
    let info: ITypeInfo = unsafe { source.GetTypeInfo(0, LOCALE_USER_DEFAULT)? };
    let mut lib = None;
    let mut index = 0u32;
    unsafe { info.GetContainingTypeLib(&mut lib, &mut index)? };
    lib.ok_or_else(|| CanoeError::ComError("object has no containing type library".into()))
}

/// DISPID -> member name for the dispinterface `iid`.
fn member_names(lib: &ITypeLib, iid: &GUID) -> Result<HashMap<i32, String>> {
    let info = unsafe { lib.GetTypeInfoOfGuid(iid)? };
    let attr = unsafe { info.GetTypeAttr()? };
    let count = unsafe { (*attr).cFuncs };
    unsafe { info.ReleaseTypeAttr(attr) };

    let mut names = HashMap::with_capacity(count as usize);
    for i in 0..u32::from(count) {
        let desc = unsafe { info.GetFuncDesc(i)? };
        let memid = unsafe { (*desc).memid };
        unsafe { info.ReleaseFuncDesc(desc) };

        let mut bstrs = [BSTR::new()];
        let mut found = 0u32;
        unsafe { info.GetNames(memid, &mut bstrs, &mut found)? };
        if found > 0 {
            names.insert(memid, bstrs[0].to_string());
        }
    }
    Ok(names)
}

// ---------------------------------------------------------------------------
// Hand-built IDispatch
// ---------------------------------------------------------------------------

#[repr(C)]
struct SinkVtbl {
    query_interface: unsafe extern "system" fn(*mut c_void, *const GUID, *mut *mut c_void) -> HRESULT,
    add_ref: unsafe extern "system" fn(*mut c_void) -> u32,
    release: unsafe extern "system" fn(*mut c_void) -> u32,
    get_type_info_count: unsafe extern "system" fn(*mut c_void, *mut u32) -> HRESULT,
    get_type_info: unsafe extern "system" fn(*mut c_void, u32, u32, *mut *mut c_void) -> HRESULT,
    get_ids_of_names:
        unsafe extern "system" fn(*mut c_void, *const GUID, *const PCWSTR, u32, u32, *mut i32) -> HRESULT,
    invoke: unsafe extern "system" fn(
        *mut c_void,
        i32,
        *const GUID,
        u32,
        DISPATCH_FLAGS,
        *const DISPPARAMS,
        *mut VARIANT,
        *mut EXCEPINFO,
        *mut u32,
    ) -> HRESULT,
}

static SINK_VTBL: SinkVtbl = SinkVtbl {
    query_interface: sink_query_interface,
    add_ref: sink_add_ref,
    release: sink_release,
    get_type_info_count: sink_get_type_info_count,
    get_type_info: sink_get_type_info,
    get_ids_of_names: sink_get_ids_of_names,
    invoke: sink_invoke,
};

/// COM object layout: the vtable pointer must stay the first field.
#[repr(C)]
struct SinkObject {
    vtbl: &'static SinkVtbl,
    refs: AtomicU32,
    iid: GUID,
    names: HashMap<i32, String>,
    sink: Arc<dyn EventSink>,
}

impl SinkObject {
    fn create(iid: GUID, names: HashMap<i32, String>, sink: Arc<dyn EventSink>) -> IUnknown {
        let object = Box::new(SinkObject {
            vtbl: &SINK_VTBL,
            refs: AtomicU32::new(1),
            iid,
            names,
            sink,
        });
        // The initial reference is owned by the returned IUnknown.
        unsafe { IUnknown::from_raw(Box::into_raw(object) as *mut c_void) }
    }

    unsafe fn from_this<'a>(this: *mut c_void) -> &'a SinkObject {
        &*(this as *const SinkObject)
    }

    fn dispatch(&self, dispid: i32, params: &DISPPARAMS) {
        let Some(name) = self.names.get(&dispid) else {
            debug!("event with unknown DISPID {dispid} ignored");
            return;
        };
        let raw: &[VARIANT] = if params.rgvarg.is_null() || params.cArgs == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(params.rgvarg, params.cArgs as usize) }
        };
        let args: Vec<Value> = raw
            .iter()
            .rev()
            .map(|v| {
                from_variant(v).unwrap_or_else(|e| {
                    debug!("{name}: argument not converted: {e}");
                    Value::Empty
                })
            })
            .collect();

        let sink = &self.sink;
        if catch_unwind(AssertUnwindSafe(|| sink.notify(name, &args))).is_err() {
            error!("event handler for {name} panicked");
        }
    }
}

unsafe extern "system" fn sink_query_interface(
    this: *mut c_void,
    iid: *const GUID,
    out: *mut *mut c_void,
) -> HRESULT {
    if out.is_null() || iid.is_null() {
        return E_POINTER;
    }
    let object = SinkObject::from_this(this);
    let iid = &*iid;
    if *iid == IUnknown::IID || *iid == IDispatch::IID || *iid == object.iid {
        object.refs.fetch_add(1, Ordering::Relaxed);
        *out = this;
        S_OK
    } else {
        *out = std::ptr::null_mut();
        E_NOINTERFACE
    }
}

unsafe extern "system" fn sink_add_ref(this: *mut c_void) -> u32 {
    SinkObject::from_this(this).refs.fetch_add(1, Ordering::Relaxed) + 1
}

unsafe extern "system" fn sink_release(this: *mut c_void) -> u32 {
    let remaining = SinkObject::from_this(this).refs.fetch_sub(1, Ordering::AcqRel) - 1;
    if remaining == 0 {
        drop(Box::from_raw(this as *mut SinkObject));
    }
    remaining
}

unsafe extern "system" fn sink_get_type_info_count(_this: *mut c_void, count: *mut u32) -> HRESULT {
    if count.is_null() {
        return E_POINTER;
    }
    *count = 0;
    S_OK
}

unsafe extern "system" fn sink_get_type_info(
    _this: *mut c_void,
    _index: u32,
    _lcid: u32,
    _out: *mut *mut c_void,
) -> HRESULT {
    E_NOTIMPL
}

unsafe extern "system" fn sink_get_ids_of_names(
    _this: *mut c_void,
    _iid: *const GUID,
    _names: *const PCWSTR,
    _count: u32,
    _lcid: u32,
    _ids: *mut i32,
) -> HRESULT {
    DISP_E_UNKNOWNNAME
}

unsafe extern "system" fn sink_invoke(
    this: *mut c_void,
    dispid: i32,
    _iid: *const GUID,
    _lcid: u32,
    _flags: DISPATCH_FLAGS,
    params: *const DISPPARAMS,
    _result: *mut VARIANT,
    _excep: *mut EXCEPINFO,
    _arg_err: *mut u32,
) -> HRESULT {
    if params.is_null() {
        return E_POINTER;
    }
    SinkObject::from_this(this).dispatch(dispid, &*params);
    S_OK
}
