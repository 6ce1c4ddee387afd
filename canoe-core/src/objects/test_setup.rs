//! Test setup: environments, folders and test modules.
//!
//! A test module reports its progress through notifications (`OnStart`,
//! `OnStop(reason)`, `OnReportGenerated`, ...).  [`TestModule::start_run`]
//! advises an [`EventLatch`] on the module before requesting the start, so
//! no notification of that run can be missed; the returned [`TestModuleRun`]
//! keeps the registration alive and waits on the latch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::collection::Collection;
use crate::errors::{CanoeError, Result};
use crate::event::EventLatch;
use crate::proxy::{Proxy, Subscription};
use crate::value::{FromValue, Value};

/// Test module notification names.
pub mod events {
    pub const ON_START: &str = "OnStart";
    pub const ON_PAUSE: &str = "OnPause";
    /// Payload: stop reason code.
    pub const ON_STOP: &str = "OnStop";
    /// Payload: success flag, source file, generated report file.
    pub const ON_REPORT_GENERATED: &str = "OnReportGenerated";
    pub const ON_VERDICT_FAIL: &str = "OnVerdictFail";
}

/// Verdict of a test module run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestVerdict {
    NotAvailable,
    Passed,
    Failed,
    None,
    Inconclusive,
    ErrorInTestSystem,
    Unknown(i32),
}

impl TestVerdict {
    pub fn code(self) -> i32 {
        match self {
            TestVerdict::NotAvailable => 0,
            TestVerdict::Passed => 1,
            TestVerdict::Failed => 2,
            TestVerdict::None => 3,
            TestVerdict::Inconclusive => 4,
            TestVerdict::ErrorInTestSystem => 5,
            TestVerdict::Unknown(code) => code,
        }
    }
}

impl From<i32> for TestVerdict {
    fn from(code: i32) -> Self {
        match code {
            0 => TestVerdict::NotAvailable,
            1 => TestVerdict::Passed,
            2 => TestVerdict::Failed,
            3 => TestVerdict::None,
            4 => TestVerdict::Inconclusive,
            5 => TestVerdict::ErrorInTestSystem,
            other => TestVerdict::Unknown(other),
        }
    }
}

impl fmt::Display for TestVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestVerdict::Unknown(code) => write!(f, "Unknown({code})"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

/// Why a test module stopped, as reported by `OnStop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// The module ran to completion.
    TestModuleEnd,
    UserAbortion,
    /// Stopped by the measurement stopping.
    GeneralError,
    Unknown(i32),
}

impl From<i32> for StopReason {
    fn from(code: i32) -> Self {
        match code {
            0 => StopReason::TestModuleEnd,
            1 => StopReason::UserAbortion,
            2 => StopReason::GeneralError,
            other => StopReason::Unknown(other),
        }
    }
}

/// Payload of `OnReportGenerated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestReport {
    pub success: bool,
    pub source_full_name: String,
    pub generated_full_name: String,
}

// ---------------------------------------------------------------------------
// Setup tree
// ---------------------------------------------------------------------------

proxy! {
    pub struct TestSetup;
}

impl TestSetup {
    pub fn test_environments(&self) -> Result<Collection<TestEnvironment>> {
        self.handle.child("TestEnvironments")
    }

    pub fn save_all(&self, prompt_user: bool) -> Result<()> {
        self.handle.invoke("SaveAll", &[Value::from(prompt_user)]).map(drop)
    }
}

proxy! {
    pub struct TestEnvironment;
}

impl TestEnvironment {
    getters! {
        enabled: bool => "Enabled";
        full_name: String => "FullName";
        name: String => "Name";
        path: String => "Path";
    }

    setters! {
        set_enabled: bool => "Enabled";
    }

    pub fn test_modules(&self) -> Result<Collection<TestModule>> {
        self.handle.child("TestModules")
    }

    pub fn folders(&self) -> Result<Collection<TestSetupFolder>> {
        self.handle.child("Folders")
    }

    pub fn execute_all(&self) -> Result<()> {
        self.handle.invoke("ExecuteAll", &[]).map(drop)
    }

    pub fn stop_sequence(&self) -> Result<()> {
        self.handle.invoke("StopSequence", &[]).map(drop)
    }

    /// Modules directly in the environment, then those of each folder,
    /// depth first.
    pub fn all_test_modules(&self) -> Result<Vec<TestModule>> {
        let mut modules = Vec::new();
        collect_modules(&self.test_modules()?, &self.folders()?, &mut modules)?;
        Ok(modules)
    }
}

fn collect_modules(
    modules: &Collection<TestModule>,
    folders: &Collection<TestSetupFolder>,
    out: &mut Vec<TestModule>,
) -> Result<()> {
    for module in modules.iter()? {
        out.push(module?);
    }
    for folder in folders.iter()? {
        let folder = folder?;
        collect_modules(&folder.test_modules()?, &folder.folders()?, out)?;
    }
    Ok(())
}

proxy! {
    /// Folder inside a test environment.
    pub struct TestSetupFolder;
}

impl TestSetupFolder {
    getters! {
        enabled: bool => "Enabled";
        name: String => "Name";
    }

    setters! {
        set_enabled: bool => "Enabled";
    }

    pub fn test_modules(&self) -> Result<Collection<TestModule>> {
        self.handle.child("TestModules")
    }

    pub fn folders(&self) -> Result<Collection<TestSetupFolder>> {
        self.handle.child("Folders")
    }

    pub fn execute_all(&self) -> Result<()> {
        self.handle.invoke("ExecuteAll", &[]).map(drop)
    }

    pub fn stop_sequence(&self) -> Result<()> {
        self.handle.invoke("StopSequence", &[]).map(drop)
    }
}

// ---------------------------------------------------------------------------
// Test module
// ---------------------------------------------------------------------------

proxy! {
    pub struct TestModule;
}

impl TestModule {
    getters! {
        name: String => "Name";
        full_name: String => "FullName";
        path: String => "Path";
        number_of_executions: i32 => "NumberOfExecutions";
        start_on_measurement: bool => "StartOnMeasurement";
        verdict_code: i32 => "Verdict";
        /// 0 = no impact, 1 = end test case on fail, 2 = end module on fail.
        verdict_impact: i32 => "VerdictImpact";
    }

    setters! {
        set_number_of_executions: i32 => "NumberOfExecutions";
        set_start_on_measurement: bool => "StartOnMeasurement";
        set_verdict_impact: i32 => "VerdictImpact";
    }

    pub fn verdict(&self) -> Result<TestVerdict> {
        self.verdict_code().map(TestVerdict::from)
    }

    pub fn start(&self) -> Result<()> {
        self.handle.invoke("Start", &[]).map(drop)
    }

    pub fn stop(&self) -> Result<()> {
        self.handle.invoke("Stop", &[]).map(drop)
    }

    pub fn pause(&self) -> Result<()> {
        self.handle.invoke("Pause", &[]).map(drop)
    }

    pub fn resume(&self) -> Result<()> {
        self.handle.invoke("Resume", &[]).map(drop)
    }

    pub fn reload(&self) -> Result<()> {
        self.handle.invoke("Reload", &[]).map(drop)
    }

    pub fn set_execution_time(&self, days: i32, hours: i32, minutes: i32) -> Result<()> {
        self.handle
            .invoke(
                "SetExecutionTime",
                &[Value::from(days), Value::from(hours), Value::from(minutes)],
            )
            .map(drop)
    }

    /// Register for the module's notifications, then request the start.
    pub fn start_run(&self) -> Result<TestModuleRun> {
        let events = Arc::new(EventLatch::new());
        let subscription = self.handle.advise(events.clone())?;
        self.start()?;
        Ok(TestModuleRun {
            module: self.clone(),
            events,
            _subscription: subscription,
        })
    }
}

/// One started run of a test module.  Dropping it unregisters the latch.
#[derive(Debug)]
pub struct TestModuleRun {
    module: TestModule,
    events: Arc<EventLatch>,
    _subscription: Subscription,
}

impl TestModuleRun {
    pub fn module(&self) -> &TestModule {
        &self.module
    }

    pub fn wait_started(&self, timeout: Duration) -> bool {
        self.events.wait(events::ON_START, timeout)
    }

    /// Stop reason, or `None` if the module did not stop within `timeout`.
    pub fn wait_stopped(&self, timeout: Duration) -> Option<StopReason> {
        if !self.events.wait(events::ON_STOP, timeout) {
            return None;
        }
        let code = self
            .events
            .payload(events::ON_STOP)
            .and_then(|args| args.into_iter().next())
            .and_then(|v| i32::from_value(v).ok())
            .unwrap_or(-1);
        Some(StopReason::from(code))
    }

    /// Request a stop and wait for `OnStop`.
    pub fn stop(&self, timeout: Duration) -> Result<StopReason> {
        self.module.stop()?;
        self.wait_stopped(timeout)
            .ok_or_else(|| CanoeError::Timeout(format!("test module stop after {timeout:?}")))
    }

    /// `true` once any test case of this run reported a failed verdict.
    pub fn verdict_failed(&self) -> bool {
        self.events.is_set(events::ON_VERDICT_FAIL)
    }

    pub fn report(&self) -> Option<TestReport> {
        let args = self.events.payload(events::ON_REPORT_GENERATED)?;
        let mut args = args.into_iter();
        Some(TestReport {
            success: bool::from_value(args.next()?).ok()?,
            source_full_name: String::from_value(args.next()?).ok()?,
            generated_full_name: String::from_value(args.next()?).ok()?,
        })
    }
}
