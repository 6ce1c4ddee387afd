//! Entity wrappers over the application's automation object model.
//!
//! Each type holds one [`Handle`](crate::proxy::Handle) and maps its
//! accessors 1:1 onto remote members.  Child accessors build a fresh wrapper
//! on every call.

pub mod application;
pub mod bus;
pub mod capl;
pub mod configuration;
pub mod diagnostic;
pub mod environment;
pub mod measurement;
pub mod measurement_setup;
pub mod networks;
pub mod simulation;
pub mod system;
pub mod test_setup;
pub mod ui;
pub mod version;

pub use application::{Application, BusType};
pub use bus::{Bus, Database, DatabaseInfo, Node, NodeInfo, Signal, SignalState};
pub use capl::{Capl, CaplFunction, CompileResult};
pub use configuration::{Configuration, DatabaseSetup, GeneralSetup};
pub use diagnostic::{DiagResponseInfo, Diagnostic, DiagnosticRequest, DiagnosticResponse};
pub use environment::{EnvVarType, Environment, EnvironmentVariable};
pub use measurement::Measurement;
pub use measurement_setup::{
    BusStatistic, BusStatistics, CanBusStatistics, Exporter, ExporterFilter, ExporterMessage, ExporterSymbol,
    LoggingBlock, MeasurementSetup, Source, SourceFiles, Trigger,
};
pub use networks::{fetch_diag_devices, AudioInterface, Device, Network};
pub use simulation::{ReplayBlock, SimulationSetup};
pub use system::{Namespace, SysVarPath, System, Variable, VariableWatch};
pub use test_setup::{
    StopReason, TestEnvironment, TestModule, TestModuleRun, TestReport, TestSetup, TestSetupFolder, TestVerdict,
};
pub use ui::{Ui, Write};
pub use version::{Version, VersionInfo};
