//! Process MTA keep-alive guard.
//!
//! [`MtaGuard`] wraps `CoIncrementMTAUsage` / `CoDecrementMTAUsage` in an
//! RAII pattern.  While a guard lives, every thread that has not entered an
//! apartment of its own is implicitly a member of the process MTA, so the
//! free-threaded proxies held by a session can be used from whichever thread
//! the caller (or the Python interpreter) happens to run on.
//!
//! Unlike a per-thread `CoInitializeEx` guard, the usage cookie is not tied
//! to the creating thread, so the guard is `Send` and may be dropped
//! anywhere.

use tracing::{debug, warn};
use windows::Win32::System::Com::{
    CoDecrementMTAUsage, CoIncrementMTAUsage, CoInitializeEx, CoUninitialize, CO_MTA_USAGE_COOKIE,
    COINIT_MULTITHREADED,
};

use crate::errors::{CanoeError, Result};

/// RAII handle on the process MTA.
#[must_use = "MtaGuard must be kept alive for the duration of COM usage"]
pub struct MtaGuard {
    cookie: CO_MTA_USAGE_COOKIE,
}

// SAFETY: the cookie is an opaque token released through a free-threaded
// API; it carries no thread affinity.
unsafe impl Send for MtaGuard {}
unsafe impl Sync for MtaGuard {}

impl MtaGuard {
    /// Keep the process MTA alive and report the calling thread's apartment.
    ///
    /// A calling thread that already lives in an STA (`RPC_E_CHANGED_MODE`)
    /// is logged and tolerated: it keeps its apartment, and objects created
    /// from it are marshaled by COM as usual.
    pub fn init() -> Result<Self> {
        check_apartment()?;
        let cookie = unsafe { CoIncrementMTAUsage() }.map_err(|e| {
            CanoeError::ComError(format!(
                "CoIncrementMTAUsage failed: HRESULT 0x{:08X}",
                e.code().0 as u32
            ))
        })?;
        debug!("process MTA usage acquired");
        Ok(Self { cookie })
    }
}

impl Drop for MtaGuard {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CoDecrementMTAUsage(self.cookie) } {
            warn!("CoDecrementMTAUsage failed: {e}");
        }
    }
}

/// Check which apartment the calling thread is in, leaving it unchanged.
fn check_apartment() -> Result<()> {
    let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
    let hresult_value = hr.0 as u32;
    match hresult_value {
        // S_OK (newly joined) or S_FALSE (already MTA): balance our call.
        0x0 | 0x1 => {
            unsafe { CoUninitialize() };
            Ok(())
        }
        // RPC_E_CHANGED_MODE -- thread already has STA.
        0x8001_0106 => {
            warn!(
                "CoInitializeEx: RPC_E_CHANGED_MODE -- calling thread has an STA apartment, \
                 remote objects will be marshaled"
            );
            Ok(())
        }
        _ => Err(CanoeError::ComError(format!(
            "CoInitializeEx failed: HRESULT 0x{hresult_value:08X}"
        ))),
    }
}
