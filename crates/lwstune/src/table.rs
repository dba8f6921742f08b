//! The tuning-parameter table: a persistent cache mapping composite
//! configuration keys to previously discovered optimal tuning parameters.
//!
//! Two persistence formats: the line-oriented text format
//! `key;lws_x;lws_y;lws_z` (where `0;0;0` means "no override"), and a JSON
//! snapshot of the whole table.

use crate::error::TunerError;
use log::{debug, info};
use lwstune_core::kernel::UNTUNABLE_CONFIG_ID;
use lwstune_core::tuning_params::{LocalWorkSize, TuningParams};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

/// Mapping from configuration key to tuning parameters.
///
/// Keys look like `<config_id>_<target>_MP<compute_units>`; the untunable
/// sentinel id never appears as a key.
#[derive(Debug, Default, Clone)]
pub struct TuningTable {
    entries: HashMap<String, TuningParams>,
}

impl TuningTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<TuningParams> {
        self.entries.get(key).copied()
    }

    /// Insert or overwrite an entry.
    ///
    /// # Panics
    ///
    /// Panics when `key` belongs to an untunable kernel: the tuner must
    /// never have looked such a kernel up in the first place.
    pub fn put(&mut self, key: impl Into<String>, params: TuningParams) {
        let key = key.into();
        assert!(
            config_id_component(&key) != UNTUNABLE_CONFIG_ID,
            "untunable sentinel key '{key}' must not enter the tuning table"
        );
        self.entries.insert(key, params);
    }

    /// Replace the entire table.
    pub fn import(&mut self, entries: HashMap<String, TuningParams>) {
        self.entries.clear();
        for (key, params) in entries {
            self.put(key, params);
        }
    }

    /// Snapshot of the entire table.
    pub fn export(&self) -> HashMap<String, TuningParams> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load the table from the text format, replacing current contents.
    ///
    /// Any malformed row aborts the whole load with the offending row and
    /// path; the table is left empty rather than partially filled.
    pub fn load_from_text(&mut self, path: impl AsRef<Path>) -> Result<(), TunerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TunerError::Io {
            path: path.display().to_string(),
            source,
        })?;

        self.entries.clear();
        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (key, params) = parse_row(line).ok_or_else(|| TunerError::Parse {
                path: path.display().to_string(),
                line_no: line_no + 1,
                line: line.to_owned(),
            })?;
            self.put(key, params);
        }
        info!("loaded {} tuning entries from {}", self.entries.len(), path.display());
        Ok(())
    }

    /// Write the table in the text format, one row per entry.
    pub fn save_to_text(&self, path: impl AsRef<Path>) -> Result<(), TunerError> {
        let path = path.as_ref();
        let mut out = String::new();
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        for key in keys {
            let [x, y, z] = self.entries[key].lws.raw();
            let _ = writeln!(out, "{key};{x};{y};{z}");
        }
        std::fs::write(path, out).map_err(|source| TunerError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!("saved {} tuning entries to {}", self.entries.len(), path.display());
        Ok(())
    }

    /// JSON snapshot of the table.
    pub fn to_json_string(&self) -> Result<String, TunerError> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    /// Replace the table from a JSON snapshot.
    pub fn from_json_str(&mut self, json: &str) -> Result<(), TunerError> {
        let entries: HashMap<String, TuningParams> = serde_json::from_str(json)?;
        self.import(entries);
        Ok(())
    }
}

/// Config-id component of a `<config_id>_<target>_MP<n>` key.
///
/// Config ids may themselves contain underscores, so the device components
/// are stripped from the right: first a trailing `_MP<digits>`, then the
/// single target name. Keys without that structure are returned whole.
fn config_id_component(key: &str) -> &str {
    let Some((head, digits)) = key.rsplit_once("_MP") else {
        return key;
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return key;
    }
    head.rsplit_once('_').map_or(head, |(config_id, _target)| config_id)
}

/// Parse one `key;x;y;z` row. `None` on any malformation.
fn parse_row(line: &str) -> Option<(String, TuningParams)> {
    let fields: Vec<&str> = line.split(';').collect();
    if fields.len() != 4 {
        return None;
    }
    let x: usize = fields[1].trim().parse().ok()?;
    let y: usize = fields[2].trim().parse().ok()?;
    let z: usize = fields[3].trim().parse().ok()?;
    let lws = LocalWorkSize::from_raw(x, y, z)?;
    Some((fields[0].to_owned(), TuningParams::new(lws, 0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(x: usize, y: usize, z: usize) -> TuningParams {
        TuningParams::new(LocalWorkSize::xyz(x, y, z), 0)
    }

    #[test]
    fn put_get_overwrite() {
        let mut t = TuningTable::new();
        t.put("gemm_128_G72_MP8", params(4, 4, 1));
        assert_eq!(t.get("gemm_128_G72_MP8"), Some(params(4, 4, 1)));

        t.put("gemm_128_G72_MP8", params(8, 2, 1));
        assert_eq!(t.get("gemm_128_G72_MP8"), Some(params(8, 2, 1)));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn import_replaces_everything() {
        let mut t = TuningTable::new();
        t.put("old_G72_MP8", params(2, 2, 2));

        let mut incoming = HashMap::new();
        incoming.insert("new_G72_MP8".to_owned(), params(16, 1, 1));
        t.import(incoming);

        assert_eq!(t.len(), 1);
        assert!(t.get("old_G72_MP8").is_none());
        assert_eq!(t.get("new_G72_MP8"), Some(params(16, 1, 1)));
    }

    #[test]
    #[should_panic(expected = "untunable sentinel")]
    fn sentinel_key_is_rejected() {
        let mut t = TuningTable::new();
        t.put(format!("{UNTUNABLE_CONFIG_ID}_G72_MP8"), params(4, 4, 1));
    }

    #[test]
    fn config_id_merely_prefixed_by_sentinel_is_accepted() {
        let mut t = TuningTable::new();
        t.put("no_config_id_check_f32_G72_MP8", params(4, 4, 1));
        assert_eq!(t.get("no_config_id_check_f32_G72_MP8"), Some(params(4, 4, 1)));
    }

    #[test]
    fn config_id_component_strips_device_suffix_only() {
        assert_eq!(config_id_component("conv_32x32_f32_G72_MP8"), "conv_32x32_f32");
        assert_eq!(config_id_component("no_config_id_G710_MP10"), "no_config_id");
        assert_eq!(config_id_component("no_config_id_check_f32_G72_MP8"), "no_config_id_check_f32");
        // No device suffix: the key is its own component.
        assert_eq!(config_id_component("bare_key"), "bare_key");
        assert_eq!(config_id_component("ends_MPx"), "ends_MPx");
    }

    #[test]
    fn parse_row_formats() {
        let (key, p) = parse_row("conv_32x32_f32_G72_MP8;4;4;1").unwrap();
        assert_eq!(key, "conv_32x32_f32_G72_MP8");
        assert_eq!(p.lws, LocalWorkSize::xyz(4, 4, 1));

        // 0;0;0 is the explicit "no override" row.
        let (_, p) = parse_row("somekey;0;0;0").unwrap();
        assert!(p.lws.is_null());
    }

    #[test]
    fn parse_row_rejects_malformed() {
        assert!(parse_row("missing_fields;4;4").is_none());
        assert!(parse_row("too;many;fields;1;2;3").is_none());
        assert!(parse_row("bad_int;a;4;1").is_none());
        // A zero mixed with non-zeros is neither unset nor a valid LWS.
        assert!(parse_row("partial_zero;4;0;1").is_none());
    }

    #[test]
    fn text_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning.csv");

        let mut t = TuningTable::new();
        t.put("a_G72_MP8", params(4, 4, 1));
        t.put("b_G76_MP12", TuningParams::null());
        t.save_to_text(&path).unwrap();

        let mut loaded = TuningTable::new();
        loaded.load_from_text(&path).unwrap();
        assert_eq!(loaded.export(), t.export());
    }

    #[test]
    fn load_aborts_on_malformed_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "good_G72_MP8;4;4;1\nbroken_row;4;4\n").unwrap();

        let mut t = TuningTable::new();
        let err = t.load_from_text(&path).unwrap_err();
        match err {
            TunerError::Parse { line_no, ref line, .. } => {
                assert_eq!(line_no, 2);
                assert_eq!(line, "broken_row;4;4");
            }
            other => panic!("expected parse error, got {other}"),
        }
    }

    #[test]
    fn load_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning.csv");
        std::fs::write(&path, "fresh_G72_MP8;8;1;1\n").unwrap();

        let mut t = TuningTable::new();
        t.put("stale_G72_MP8", params(2, 2, 2));
        t.load_from_text(&path).unwrap();

        assert_eq!(t.len(), 1);
        assert!(t.get("stale_G72_MP8").is_none());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let mut t = TuningTable::new();
        let err = t.load_from_text("/nonexistent/tuning.csv").unwrap_err();
        assert!(matches!(err, TunerError::Io { .. }));
    }

    #[test]
    fn json_round_trip() {
        let mut t = TuningTable::new();
        t.put("a_G72_MP8", params(8, 2, 1));
        t.put("b_G72_MP8", TuningParams::null());

        let json = t.to_json_string().unwrap();
        let mut loaded = TuningTable::new();
        loaded.from_json_str(&json).unwrap();
        assert_eq!(loaded.export(), t.export());
    }

    proptest! {
        /// Property: text round-trip reproduces the table exactly (the
        /// zero-means-unset convention is bijective by construction).
        #[test]
        fn prop_text_round_trip(entries in proptest::collection::hash_map(
            "[a-z]{1,8}_G7[0-9]_MP[0-9]{1,2}",
            prop_oneof![
                Just(LocalWorkSize::NULL),
                (1usize..=64, 1usize..=64, 1usize..=8)
                    .prop_map(|(x, y, z)| LocalWorkSize::xyz(x, y, z)),
            ],
            0..16,
        )) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("prop.csv");

            let mut t = TuningTable::new();
            for (k, lws) in &entries {
                t.put(k.clone(), TuningParams::new(*lws, 0));
            }
            t.save_to_text(&path).unwrap();

            let mut loaded = TuningTable::new();
            loaded.load_from_text(&path).unwrap();
            prop_assert_eq!(loaded.export(), t.export());
        }
    }
}
