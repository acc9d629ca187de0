
use std::{
    path::Path,
    fs::File,
    io::{
        BufReader,
        BufWriter,
    },
};
use serde::{Serialize, Deserialize};
use anyhow::*;


pub const SETTINGS_FILE_NAME: &'static str = "render_settings.json";


/// Render scheduling settings. A client-side global resource, propagated
/// from user settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Horizontal radius of the tracked section window, in sections.
    pub view_radius: i64,
    /// Vertical radius of the tracked section window, in sections.
    pub view_radius_vertical: i64,
    /// Mesh worker count override. Defaults to the pool-size formula over
    /// the machine's cores.
    pub mesh_workers: Option<usize>,
    /// Thread count of other pools sharing the machine, fed into the
    /// pool-size formula. Defaults to the core count.
    pub other_pool_threads: Option<usize>,
    /// Debug flag: schedule every queued section regardless of visibility,
    /// for testing geometry independent of frustum logic.
    pub disable_culling: bool,
    /// Most finished meshes delivered per frame call.
    pub results_per_frame: usize,
    /// Most culled sections promoted per frame call.
    pub culled_promotions_per_frame: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            view_radius: 12,
            view_radius_vertical: 8,
            mesh_workers: None,
            other_pool_threads: None,
            disable_culling: false,
            results_per_frame: 64,
            culled_promotions_per_frame: 16,
        }
    }
}

impl Settings {
    pub fn read(path: impl AsRef<Path>) -> Self {
        Self::try_read(path).unwrap_or_default()
    }

    pub fn try_read(path: impl AsRef<Path>) -> Result<Self> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), self)?;
        Ok(())
    }
}


#[test]
fn test_settings_json_round_trip() {
    let settings = Settings {
        view_radius: 20,
        mesh_workers: Some(3),
        disable_culling: true,
        ..Default::default()
    };
    let json = serde_json::to_string(&settings).unwrap();
    let parsed = serde_json::from_str::<Settings>(&json).unwrap();
    assert_eq!(parsed, settings);
}

#[test]
fn test_read_falls_back_to_default() {
    assert_eq!(
        Settings::read("definitely/not/a/real/settings/path.json"),
        Settings::default(),
    );
}
