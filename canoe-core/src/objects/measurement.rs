//! Measurement control.
//!
//! These calls only issue the request.  Start and stop complete
//! asynchronously and are confirmed by the `OnStart` / `OnStop`
//! notifications; [`session::Canoe`](crate::session::Canoe) waits for them.

use crate::errors::Result;
use crate::proxy::Proxy;

/// Measurement notification names.
pub mod events {
    pub const ON_INIT: &str = "OnInit";
    pub const ON_START: &str = "OnStart";
    pub const ON_STOP: &str = "OnStop";
    pub const ON_EXIT: &str = "OnExit";
}

proxy! {
    pub struct Measurement;
}

impl Measurement {
    getters! {
        running: bool => "Running";
        /// Delay between animation steps, in ms.
        animation_delay: i32 => "AnimationDelay";
        measurement_index: i32 => "MeasurementIndex";
    }

    setters! {
        set_animation_delay: i32 => "AnimationDelay";
        set_measurement_index: i32 => "MeasurementIndex";
    }

    pub fn start(&self) -> Result<()> {
        self.handle.invoke("Start", &[]).map(drop)
    }

    pub fn stop(&self) -> Result<()> {
        self.handle.invoke("Stop", &[]).map(drop)
    }

    /// Stop and wait for the server to finish pending stop handlers.
    pub fn stop_ex(&self) -> Result<()> {
        self.handle.invoke("StopEx", &[]).map(drop)
    }

    /// Start offline replay in animation mode.
    pub fn animate(&self) -> Result<()> {
        self.handle.invoke("Animate", &[]).map(drop)
    }

    /// Interrupt offline replay.
    pub fn break_measurement(&self) -> Result<()> {
        self.handle.invoke("Break", &[]).map(drop)
    }

    /// Reset offline replay to the start.
    pub fn reset(&self) -> Result<()> {
        self.handle.invoke("Reset", &[]).map(drop)
    }

    /// Single-step offline replay.
    pub fn step(&self) -> Result<()> {
        self.handle.invoke("Step", &[]).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockObject;
    use crate::value::Value;

    #[test]
    fn test_start_fires_lifecycle() {
        let meas = MockObject::new("Measurement").with_prop("Running", false);
        let m = meas.clone();
        meas.on_call("Start", move |_| {
            m.set_prop("Running", true);
            m.fire(events::ON_INIT, &[]);
            m.fire(events::ON_START, &[]);
            Ok(Value::Empty)
        });
        let latch = std::sync::Arc::new(crate::event::EventLatch::new());
        let _sub = meas.handle().advise(latch.clone()).unwrap();

        let w = Measurement::from_handle(meas.handle());
        assert!(!w.running().unwrap());
        w.start().unwrap();
        assert!(w.running().unwrap());
        assert!(latch.is_set(events::ON_INIT));
        assert!(latch.is_set(events::ON_START));
    }

    #[test]
    fn test_animation_delay_round_trip() {
        let meas = MockObject::new("Measurement").with_prop("AnimationDelay", 0);
        let w = Measurement::from_handle(meas.handle());
        w.set_animation_delay(100).unwrap();
        assert_eq!(w.animation_delay().unwrap(), 100);
    }
}
