//! User interface: desktops and the Write window.

use crate::errors::{CanoeError, Result};
use crate::objects::version::VersionInfo;
use crate::proxy::Proxy;
use crate::value::Value;

/// First release supporting `CreateDesktop`.
pub const CREATE_DESKTOP_MIN_VERSION: (i32, i32) = (15, 3);

proxy! {
    pub struct Ui;
}

impl Ui {
    children! {
        write: Write => "Write";
    }

    pub fn activate_desktop(&self, name: &str) -> Result<()> {
        self.handle.invoke("ActivateDesktop", &[Value::from(name)]).map(drop)
    }

    /// Create a desktop.  `version` is the running application's version;
    /// releases before 15.3 are rejected without contacting the server.
    pub fn create_desktop(&self, name: &str, version: &VersionInfo) -> Result<()> {
        let (major, minor) = CREATE_DESKTOP_MIN_VERSION;
        if !version.at_least(major, minor) {
            return Err(CanoeError::InvalidArgument(format!(
                "creating desktop '{name}' requires version {major}.{minor} or newer, running {}.{}",
                version.major, version.minor
            )));
        }
        self.handle.invoke("CreateDesktop", &[Value::from(name)]).map(drop)
    }

    pub fn open_baudrate_dialog(&self) -> Result<()> {
        self.handle.invoke("OpenBaudrateDialog", &[]).map(drop)
    }

    pub fn command_enabled(&self, command: &str) -> Result<bool> {
        self.handle.call("GetCommandEnabled", &[Value::from(command)])
    }

    pub fn set_command_enabled(&self, command: &str, enabled: bool) -> Result<()> {
        self.handle
            .invoke("SetCommandEnabled", &[Value::from(command), Value::from(enabled)])
            .map(drop)
    }
}

proxy! {
    /// The Write window.  `tab` selects a page; `None` means the default.
    pub struct Write;
}

impl Write {
    getters! {
        text: String => "Text";
    }

    pub fn output(&self, text: &str) -> Result<()> {
        self.handle.invoke("Output", &[Value::from(text)]).map(drop)
    }

    pub fn clear(&self) -> Result<()> {
        self.handle.invoke("Clear", &[]).map(drop)
    }

    /// Copy the window content to the clipboard.
    pub fn copy(&self) -> Result<()> {
        self.handle.invoke("Copy", &[]).map(drop)
    }

    pub fn enable_output_file(&self, path: &str, tab: Option<i32>) -> Result<()> {
        let mut args = vec![Value::from(path)];
        args.extend(tab.map(Value::from));
        self.handle.invoke("EnableOutputFile", &args).map(drop)
    }

    pub fn disable_output_file(&self, tab: Option<i32>) -> Result<()> {
        let args: Vec<Value> = tab.map(Value::from).into_iter().collect();
        self.handle.invoke("DisableOutputFile", &args).map(drop)
    }
}
