//! Persistence boundary.
//!
//! Serializers are external collaborators with no privileged access: the
//! only surface they consume is `Environment::snapshot_records`, the same
//! canonical record stream the sync protocol uses. The JSON implementation
//! here is the reference one; alternative formats implement the trait the
//! same way.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::debug;

use super::environment::Environment;
use super::sync::EventRecord;
use crate::errors::Result;

pub trait EnvironmentSerializer {
    fn serialize(&self, env: &Environment, path: &Path) -> Result<()>;

    fn unserialize(&self, path: &Path) -> Result<Environment>;
}

/// Stores the full record stream as one pretty-printed JSON file.
#[derive(Debug, Default)]
pub struct JsonFileSerializer;

impl EnvironmentSerializer for JsonFileSerializer {
    fn serialize(&self, env: &Environment, path: &Path) -> Result<()> {
        let records = env.snapshot_records()?;
        debug!("writing {} records to {}", records.len(), path.display());
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &records)?;
        Ok(())
    }

    fn unserialize(&self, path: &Path) -> Result<Environment> {
        let reader = BufReader::new(File::open(path)?);
        let records: Vec<EventRecord> = serde_json::from_reader(reader)?;
        debug!("read {} records from {}", records.len(), path.display());
        let mut env = Environment::new();
        env.apply_events(&records)?;
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::transform::RigidTransform;
    use glam::DVec3;

    #[test]
    fn test_json_roundtrip_through_file() {
        let mut env = Environment::new();
        let root = env.root_id().clone();
        let f = env
            .create_frame(RigidTransform::from_translation(DVec3::new(0.5, 0.0, 1.0)))
            .unwrap();
        env.add_child_frame(&root, &f).unwrap();
        let map = env.create_map("grid").unwrap();
        env.set_frame_node(&map, &f).unwrap();

        let path = std::env::temp_dir().join(format!("envgraph-roundtrip-{}.json", std::process::id()));
        let serializer = JsonFileSerializer;
        serializer.serialize(&env, &path).unwrap();
        let restored = serializer.unserialize(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(restored.item_count(), env.item_count());
        assert_eq!(restored.frame_parent(&f), Some(&root));
        assert_eq!(restored.get_frame_node(&map), Some(&f));
        let t = restored.relative_transform(&f, &root).unwrap();
        assert!((t.translation - DVec3::new(0.5, 0.0, 1.0)).length() < 1e-12);
    }

    #[test]
    fn test_unserialize_missing_file() {
        let serializer = JsonFileSerializer;
        let result = serializer.unserialize(Path::new("/nonexistent/envgraph.json"));
        assert!(matches!(result, Err(crate::errors::EnvError::Io(_))));
    }
}
