//! Application root object.

use std::fmt;
use std::str::FromStr;

use crate::collection::Collection;
use crate::errors::{CanoeError, Result};
use crate::objects::bus::Bus;
use crate::objects::capl::Capl;
use crate::objects::configuration::Configuration;
use crate::objects::environment::Environment;
use crate::objects::measurement::Measurement;
use crate::objects::networks::Network;
use crate::objects::system::System;
use crate::objects::ui::Ui;
use crate::objects::version::Version;
use crate::proxy::Proxy;
use crate::value::Value;

/// Application notification names.
pub mod events {
    /// Payload: full path of the opened configuration.
    pub const ON_OPEN: &str = "OnOpen";
    pub const ON_QUIT: &str = "OnQuit";
}

/// Bus kinds accepted by `GetBus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusType {
    Can,
    J1939,
    Ttp,
    Lin,
    Most,
    Kline,
}

impl BusType {
    pub const ALL: [BusType; 6] = [
        BusType::Can,
        BusType::J1939,
        BusType::Ttp,
        BusType::Lin,
        BusType::Most,
        BusType::Kline,
    ];

    /// Numeric code reported by `Network.BusType`.
    pub fn code(self) -> i32 {
        match self {
            BusType::Can => 1,
            BusType::J1939 => 2,
            BusType::Ttp => 4,
            BusType::Lin => 5,
            BusType::Most => 6,
            BusType::Kline => 14,
        }
    }

    /// Name passed to `GetBus`.
    pub fn as_str(self) -> &'static str {
        match self {
            BusType::Can => "CAN",
            BusType::J1939 => "J1939",
            BusType::Ttp => "TTP",
            BusType::Lin => "LIN",
            BusType::Most => "MOST",
            BusType::Kline => "Kline",
        }
    }
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusType {
    type Err = CanoeError;

    fn from_str(s: &str) -> Result<Self> {
        BusType::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<_> = BusType::ALL.iter().map(|b| b.as_str()).collect();
                CanoeError::InvalidArgument(format!(
                    "invalid bus type '{s}', supported: {}",
                    names.join(", ")
                ))
            })
    }
}

impl TryFrom<i32> for BusType {
    type Error = CanoeError;

    fn try_from(code: i32) -> Result<Self> {
        BusType::ALL
            .into_iter()
            .find(|b| b.code() == code)
            .ok_or_else(|| CanoeError::InvalidArgument(format!("unknown bus type code {code}")))
    }
}

proxy! {
    /// `CANoe.Application`.
    pub struct Application;
}

impl Application {
    getters! {
        full_name: String => "FullName";
        name: String => "Name";
        path: String => "Path";
        visible: bool => "Visible";
    }

    setters! {
        set_visible: bool => "Visible";
    }

    children! {
        measurement: Measurement => "Measurement";
        configuration: Configuration => "Configuration";
        system: System => "System";
        capl: Capl => "CAPL";
        ui: Ui => "UI";
        environment: Environment => "Environment";
        version: Version => "Version";
    }

    pub fn networks(&self) -> Result<Collection<Network>> {
        self.handle.child("Networks")
    }

    pub fn bus(&self, bus_type: BusType) -> Result<Bus> {
        self.handle.call_child("GetBus", &[Value::from(bus_type.as_str())])
    }

    /// Request loading `path`.  Completion is signalled by `OnOpen`.
    pub fn open(&self, path: &str, auto_save: bool, prompt_user: bool) -> Result<()> {
        self.handle
            .invoke(
                "Open",
                &[Value::from(path), Value::from(auto_save), Value::from(prompt_user)],
            )
            .map(drop)
    }

    /// Request a new empty configuration.  Completion is signalled by
    /// `OnOpen`.
    pub fn new_configuration(&self, auto_save: bool, prompt_user: bool) -> Result<()> {
        self.handle
            .invoke("New", &[Value::from(auto_save), Value::from(prompt_user)])
            .map(drop)
    }

    pub fn quit(&self) -> Result<()> {
        self.handle.invoke("Quit", &[]).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockObject;

    #[test]
    fn test_bus_type_parsing_and_codes() {
        assert_eq!("can".parse::<BusType>().unwrap(), BusType::Can);
        assert_eq!("KLINE".parse::<BusType>().unwrap(), BusType::Kline);
        assert_eq!(BusType::Lin.code(), 5);
        assert_eq!(BusType::try_from(14).unwrap(), BusType::Kline);
        assert!(matches!("FlexRay".parse::<BusType>(), Err(CanoeError::InvalidArgument(_))));
        assert!(BusType::try_from(3).is_err());
    }

    #[test]
    fn test_get_bus_passes_name() {
        let app = MockObject::new("Application");
        app.on_call("GetBus", |args| {
            Ok(Value::Object(MockObject::new("Bus").with_prop("Name", args[0].clone()).handle()))
        });
        let a = Application::from_handle(app.handle());
        assert_eq!(a.bus(BusType::Lin).unwrap().name().unwrap(), "LIN");
    }

    #[test]
    fn test_children_are_fresh_wrappers() {
        let meas = MockObject::new("Measurement").with_prop("Running", false);
        let app = MockObject::new("Application").with_prop("Measurement", meas.handle());
        let a = Application::from_handle(app.handle());

        assert!(!a.measurement().unwrap().running().unwrap());
        meas.set_prop("Running", true);
        assert!(a.measurement().unwrap().running().unwrap());
        assert!(matches!(a.system(), Err(CanoeError::NotFound(_))));
    }
}
