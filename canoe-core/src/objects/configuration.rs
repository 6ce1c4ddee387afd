//! Loaded configuration.

use std::path::Path;

use crate::collection::Collection;
use crate::errors::{CanoeError, Result};
use crate::objects::bus::Database;
use crate::objects::measurement_setup::MeasurementSetup;
use crate::objects::simulation::SimulationSetup;
use crate::objects::test_setup::TestSetup;
use crate::proxy::Proxy;
use crate::value::Value;

/// Configuration notification names.
pub mod events {
    /// The configuration is about to be closed.
    pub const ON_CLOSE: &str = "OnClose";
    pub const ON_SYSTEM_VARIABLES_DEFINITION_CHANGED: &str = "OnSystemVariablesDefinitionChanged";
}

proxy! {
    pub struct Configuration;
}

impl Configuration {
    getters! {
        name: String => "Name";
        full_name: String => "FullName";
        path: String => "Path";
        comment: String => "Comment";
        /// 0 = online, 1 = offline.
        mode: i32 => "Mode";
        modified: bool => "Modified";
        read_only: bool => "ReadOnly";
        saved: bool => "Saved";
        fdx_enabled: bool => "FDXEnabled";
    }

    setters! {
        set_mode: i32 => "Mode";
        set_modified: bool => "Modified";
        set_fdx_enabled: bool => "FDXEnabled";
    }

    children! {
        /// Setup used while the measurement runs online.
        online_setup: MeasurementSetup => "OnlineSetup";
        /// Setup used for offline replay of log files.
        offline_setup: MeasurementSetup => "OfflineSetup";
        simulation_setup: SimulationSetup => "SimulationSetup";
        test_setup: TestSetup => "TestSetup";
        general_setup: GeneralSetup => "GeneralSetup";
    }

    pub fn save(&self) -> Result<()> {
        self.handle.invoke("Save", &[]).map(drop)
    }

    /// Save under `path` in the file format of release `major.minor`.
    ///
    /// With `create_dir`, the parent directory is created first.
    pub fn save_as(&self, path: &str, major: i32, minor: i32, prompt_user: bool, create_dir: bool) -> Result<()> {
        if create_dir {
            if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|e| {
                    CanoeError::IoError(format!("cannot create {}: {e}", dir.display()))
                })?;
            }
        }
        self.handle
            .invoke(
                "SaveAs",
                &[
                    Value::from(path),
                    Value::from(major),
                    Value::from(minor),
                    Value::from(prompt_user),
                ],
            )
            .map(drop)
    }

    pub fn compile_and_verify(&self) -> Result<()> {
        self.handle.invoke("CompileAndVerify", &[]).map(drop)
    }
}

proxy! {
    pub struct GeneralSetup;
}

impl GeneralSetup {
    children! {
        database_setup: DatabaseSetup => "DatabaseSetup";
    }
}

proxy! {
    pub struct DatabaseSetup;
}

impl DatabaseSetup {
    pub fn databases(&self) -> Result<Collection<Database>> {
        self.handle.child("Databases")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCollection, MockObject};

    #[test]
    fn test_save_as_creates_parent_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("out").join("demo.cfg");
        let cfg = MockObject::new("Configuration");
        cfg.on_call("SaveAs", |_| Ok(Value::Empty));

        let c = Configuration::from_handle(cfg.handle());
        c.save_as(&target.to_string_lossy(), 17, 0, false, true).unwrap();
        assert!(tmp.path().join("out").is_dir());
        assert_eq!(cfg.calls()[0].1[1], Value::Int(17));
    }

    #[test]
    fn test_modified_flag_round_trip() {
        let cfg = MockObject::new("Configuration").with_prop("Modified", true);
        let c = Configuration::from_handle(cfg.handle());
        c.set_modified(false).unwrap();
        assert!(!c.modified().unwrap());
    }

    #[test]
    fn test_save_as_reports_blocked_directory_as_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("taken");
        std::fs::write(&blocker, b"file").unwrap();
        let target = blocker.join("sub").join("demo.cfg");
        let cfg = MockObject::new("Configuration");
        cfg.on_call("SaveAs", |_| Ok(Value::Empty));

        let c = Configuration::from_handle(cfg.handle());
        let err = c.save_as(&target.to_string_lossy(), 17, 0, false, true).unwrap_err();
        assert!(matches!(err, CanoeError::IoError(_)), "{err:?}");
        assert_eq!(cfg.call_count("SaveAs"), 0);
    }

    #[test]
    fn test_compile_and_verify_is_a_plain_call() {
        let cfg = MockObject::new("Configuration");
        cfg.on_call("CompileAndVerify", |_| Ok(Value::Empty));
        Configuration::from_handle(cfg.handle()).compile_and_verify().unwrap();
        assert_eq!(cfg.calls(), vec![("CompileAndVerify".to_owned(), vec![])]);
    }

    #[test]
    fn test_database_setup_chain() {
        let dbs = MockCollection::new("Databases")
            .with_item(MockObject::new("Database").with_prop("FullName", "C:/db/body.dbc").with_prop("Channel", 1));
        let db_setup = MockObject::new("DatabaseSetup").with_prop("Databases", dbs.handle());
        let general = MockObject::new("GeneralSetup").with_prop("DatabaseSetup", db_setup.handle());
        let cfg = MockObject::new("Configuration").with_prop("GeneralSetup", general.handle());

        let databases = Configuration::from_handle(cfg.handle())
            .general_setup()
            .unwrap()
            .database_setup()
            .unwrap()
            .databases()
            .unwrap();
        assert_eq!(databases.count().unwrap(), 1);
        assert_eq!(databases.item(0).unwrap().full_name().unwrap(), "C:/db/body.dbc");
    }
}
