use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// One camera's crossing-line geometry and direction semantics, as read from an
/// optional `cameras.json` file. Falls back to per-process env configuration when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraEntry {
    pub camera_id: String,
    pub floor_id: i64,
    pub video_type: String,
    pub video_source: String,
    pub line_crossing_points: ((i32, i32), (i32, i32)),
    #[serde(default)]
    pub direction_mapping: HashMap<String, String>,
}

/// Loads and indexes `cameras.json` by `camera_id`. Returns an empty map if the file
/// does not exist; a malformed file is a fatal configuration error.
pub fn load_cameras_config(path: &Path) -> Result<HashMap<String, CameraEntry>, String> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = fs::read_to_string(path).map_err(|err| format!("reading {path:?}: {err}"))?;
    let entries: Vec<CameraEntry> =
        serde_json::from_str(&raw).map_err(|err| format!("parsing {path:?}: {err}"))?;
    Ok(entries
        .into_iter()
        .map(|entry| (entry.camera_id.clone(), entry))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_empty_map() {
        let map = load_cameras_config(Path::new("/nonexistent/cameras.json")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn loads_and_indexes_by_camera_id() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"camera_id":"cam-1","floor_id":2,"video_type":"file","video_source":"a.mp4","line_crossing_points":[[0,360],[1280,360]],"direction_mapping":{{"down":"entry","up":"exit"}}}}]"#
        )
        .unwrap();
        let map = load_cameras_config(file.path()).unwrap();
        let entry = map.get("cam-1").unwrap();
        assert_eq!(entry.floor_id, 2);
        assert_eq!(entry.direction_mapping.get("down").unwrap(), "entry");
    }
}
