//! Simulation setup and its replay blocks.

use crate::collection::Collection;
use crate::errors::{CanoeError, Result};
use crate::objects::bus::Node;
use crate::proxy::Proxy;
use crate::value::Value;

proxy! {
    pub struct SimulationSetup;
}

impl SimulationSetup {
    pub fn replay_collection(&self) -> Result<Collection<ReplayBlock>> {
        self.handle.child("ReplayCollection")
    }

    pub fn nodes(&self) -> Result<Collection<Node>> {
        self.handle.child("Nodes")
    }
}

impl Collection<ReplayBlock> {
    pub fn add_replay_block(&self, name: &str) -> Result<ReplayBlock> {
        self.add(&[Value::from(name)])
    }

    /// First block called `name`.  The server's `Item` only takes indices
    /// here, so the blocks are walked.
    pub fn find(&self, name: &str) -> Result<ReplayBlock> {
        for block in self.iter()? {
            let block = block?;
            if block.name()? == name {
                return Ok(block);
            }
        }
        Err(CanoeError::NotFound(format!("replay block '{name}'")))
    }
}

proxy! {
    /// Replay block of the simulation setup.
    pub struct ReplayBlock;
}

impl ReplayBlock {
    getters! {
        enabled: bool => "Enabled";
        name: String => "Name";
        /// Recording file replayed by the block.
        path: String => "Path";
    }

    setters! {
        set_enabled: bool => "Enabled";
        set_name: &str => "Name";
        set_path: &str => "Path";
    }

    pub fn start(&self) -> Result<()> {
        self.handle.invoke("Start", &[]).map(drop)
    }

    pub fn stop(&self) -> Result<()> {
        self.handle.invoke("Stop", &[]).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCollection, MockObject};

    fn blocks() -> MockCollection {
        let coll = MockCollection::new("ReplayCollection");
        for name in ["Idle", "Drive"] {
            let block = MockObject::new("ReplayBlock")
                .with_prop("Name", name)
                .with_prop("Enabled", false)
                .with_prop("Path", "");
            block.on_call("Start", |_| Ok(Value::Empty));
            coll.push(block);
        }
        coll
    }

    #[test]
    fn test_find_walks_by_name() {
        let mock = blocks();
        let setup = MockObject::new("SimulationSetup").with_prop("ReplayCollection", mock.handle());
        let coll = SimulationSetup::from_handle(setup.handle()).replay_collection().unwrap();

        let drive = coll.find("Drive").unwrap();
        drive.set_path("C:/rec/drive.blf").unwrap();
        drive.set_enabled(true).unwrap();
        drive.start().unwrap();

        let raw = mock.get(1).unwrap();
        assert_eq!(raw.prop("Path"), Some(Value::from("C:/rec/drive.blf")));
        assert_eq!(raw.prop("Enabled"), Some(Value::Bool(true)));
        assert_eq!(raw.call_count("Start"), 1);
        assert_eq!(mock.get(0).unwrap().call_count("Start"), 0);
    }

    #[test]
    fn test_find_missing_block_is_not_found() {
        let coll: Collection<ReplayBlock> = Collection::from_handle(blocks().handle());
        assert!(matches!(coll.find("Park"), Err(CanoeError::NotFound(_))));
    }
}
